//! # unfurl-api
//!
//! The HTTP facade of the unfurl rendering service: request validation, the
//! render pipeline, per-client rate limiting and the axum router wiring it
//! all to a [`unfurl_headless::BrowserPool`].

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod scroll;
pub mod state;
pub mod validation;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the service router. CORS is attached according to the state's
/// configuration; the rate limiter wraps only the render endpoint so health
/// probes are never throttled.
pub fn build_router(state: AppState) -> Router {
    let cors_enabled = state.config.cors_enabled;

    let render = Router::new()
        .route("/v1/render", post(handlers::render::render))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ));

    let router = Router::new()
        .route("/", get(handlers::health::index))
        .route("/health", get(handlers::health::health))
        .route("/v1/pool/status", get(handlers::health::pool_status))
        .merge(render)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
