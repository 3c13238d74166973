//! Error types for pool and broker operations.

use crate::proxy::ProxyError;
use thiserror::Error;

/// Failures surfaced by [`crate::pool::BrowserPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool is shutting down; no further acquisitions are served.
    #[error("browser pool is shutting down")]
    ShuttingDown,

    /// A queued acquisition outlived its deadline.
    #[error("Timeout waiting for available browser")]
    QueueTimeout,

    /// A browser process could not be launched.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// The engine rejected or dropped a call mid-flight.
    #[error("browser engine error: {0}")]
    Engine(String),
}

/// Failures surfaced by [`crate::broker::ContextBroker`].
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// Context or page preparation failed after a slot was reserved. The
    /// reservation is rolled back before this is returned.
    #[error("failed to prepare browsing context: {0}")]
    Context(String),
}
