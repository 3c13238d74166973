//! Shared application state.
//!
//! The pool and broker are explicit values constructed by whoever builds the
//! router (the binary in production, tests elsewhere); nothing here is a
//! process global.

use std::sync::Arc;

use unfurl_headless::{BrowserPool, ContextBroker};

use crate::config::ServiceConfig;
use crate::middleware::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<BrowserPool>,
    pub broker: Arc<ContextBroker>,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        let pool = Arc::new(BrowserPool::new(config.pool.clone()));
        let broker = Arc::new(ContextBroker::new(pool.clone()));
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_enabled,
            config.rate_limit_window,
            config.rate_limit_max_requests,
        ));
        Self {
            pool,
            broker,
            limiter,
            config: Arc::new(config),
        }
    }
}
