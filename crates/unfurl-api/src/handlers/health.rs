//! Liveness, pool status and the service index.

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::json;

use unfurl_headless::PoolCapacity;

use crate::state::AppState;

#[derive(Serialize)]
struct RateLimiterSnapshot {
    enabled: bool,
    window_ms: u64,
    max_requests: u32,
    tracked_clients: usize,
}

/// `GET /health`: liveness plus pool and limiter snapshots.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let capacity = state.pool.capacity().await;
    let limiter = RateLimiterSnapshot {
        enabled: state.limiter.enabled(),
        window_ms: state.limiter.window().as_millis() as u64,
        max_requests: state.limiter.max_requests(),
        tracked_clients: state.limiter.tracked_clients(),
    };

    Json(json!({
        "status": "ok",
        "service": "unfurl",
        "version": env!("CARGO_PKG_VERSION"),
        "pool": capacity,
        "rate_limiter": limiter,
    }))
}

/// Pool capacity in the debug endpoint's wire shape.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolStatusData {
    total_browsers: usize,
    healthy_browsers: usize,
    active_leases: usize,
    available_slots: usize,
    queue_length: usize,
    max_browsers: usize,
    max_contexts_per_browser: usize,
}

impl From<PoolCapacity> for PoolStatusData {
    fn from(capacity: PoolCapacity) -> Self {
        Self {
            total_browsers: capacity.browsers,
            healthy_browsers: capacity.healthy_browsers,
            active_leases: capacity.active_leases,
            available_slots: capacity.available_slots,
            queue_length: capacity.queue_length,
            max_browsers: capacity.max_browsers,
            max_contexts_per_browser: capacity.max_contexts_per_browser,
        }
    }
}

/// `GET /v1/pool/status`: capacity totals for debugging.
pub async fn pool_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let data: PoolStatusData = state.pool.capacity().await.into();
    Json(json!({
        "success": true,
        "data": data,
    }))
}

/// `GET /`: service identity and endpoint index.
pub async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "service": "unfurl",
        "description": "headless browser rendering service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "render": "POST /v1/render",
            "health": "GET /health",
            "pool_status": "GET /v1/pool/status",
        },
    }))
}
