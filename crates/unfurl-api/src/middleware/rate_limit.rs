//! Fixed-window per-client rate limiting.
//!
//! State is one counter per client key (first `X-Forwarded-For` value, else
//! the socket peer). The window check is atomic per key through the map's
//! entry API, a periodic sweep evicts expired entries so memory tracks the
//! active-client count, and every render response carries the
//! `X-RateLimit-*` headers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{ErrorCode, ErrorEntry};
use crate::models::RenderResponse;
use crate::state::AppState;

/// One client's window.
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    window_start: SystemTime,
}

/// The admission decision for one request, including what the response
/// headers must report.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds at which the client's window resets.
    pub reset_at: u64,
}

/// Fixed-window counter keyed by client identifier. Disabled instances
/// always allow and keep no state.
pub struct RateLimiter {
    enabled: bool,
    window: Duration,
    max_requests: u32,
    clients: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(enabled: bool, window: Duration, max_requests: u32) -> Self {
        Self {
            enabled,
            window,
            max_requests,
            clients: DashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Check (and count) one request for `key`. Atomic per key.
    pub fn check(&self, key: &str) -> Decision {
        let now = SystemTime::now();
        if !self.enabled {
            return Decision {
                allowed: true,
                limit: self.max_requests,
                remaining: self.max_requests,
                reset_at: epoch_secs(now) + self.window.as_secs(),
            };
        }

        let mut entry = self
            .clients
            .entry(key.to_string())
            .or_insert_with(|| Window {
                count: 0,
                window_start: now,
            });

        let elapsed = now
            .duration_since(entry.window_start)
            .unwrap_or_default();
        if elapsed >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        let reset_at = epoch_secs(entry.window_start) + self.window.as_secs();
        if entry.count >= self.max_requests {
            return Decision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_at,
            };
        }

        entry.count += 1;
        Decision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - entry.count,
            reset_at,
        }
    }

    /// Drop entries whose window has fully elapsed.
    pub fn evict_expired(&self) {
        let now = SystemTime::now();
        let window = self.window;
        let before = self.clients.len();
        self.clients
            .retain(|_, w| now.duration_since(w.window_start).unwrap_or_default() < window);
        let evicted = before.saturating_sub(self.clients.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.clients.len(), "rate limiter sweep");
        }
    }

    /// Periodic eviction, one sweep per window.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        let period = self.window;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.evict_expired();
            }
        })
    }
}

fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Identify the client: first `X-Forwarded-For` value, else the socket peer.
fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn apply_headers(response: &mut Response, decision: &Decision) {
    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from_str(&decision.limit.to_string())
            .unwrap_or(HeaderValue::from_static("0")),
    );
    headers.insert(
        "X-RateLimit-Remaining",
        HeaderValue::from_str(&decision.remaining.to_string())
            .unwrap_or(HeaderValue::from_static("0")),
    );
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from_str(&decision.reset_at.to_string())
            .unwrap_or(HeaderValue::from_static("0")),
    );
}

/// Admission middleware for the render endpoint.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    let decision = state.limiter.check(&key);

    if !decision.allowed {
        warn!(client = %key, reset_at = decision.reset_at, "rate limit exceeded");
        let envelope = RenderResponse::failure(
            &Uuid::new_v4().to_string(),
            vec![ErrorEntry::new(
                ErrorCode::RateLimited,
                format!(
                    "rate limit of {} requests per {}s exceeded",
                    decision.limit,
                    state.limiter.window().as_secs()
                ),
            )],
        );
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(envelope)).into_response();
        apply_headers(&mut response, &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(&mut response, &decision);
    response
}
