//! # unfurl-headless
//!
//! Browser process supervision for the unfurl rendering service: a bounded
//! pool of long-lived Chromium processes, each lending out isolated browsing
//! contexts as [`Lease`]s, and the [`ContextBroker`] that dresses every
//! context with fingerprint overrides, stealth injection and proxy settings
//! before the render pipeline touches it.
//!
//! The pool is an explicit value owned by whoever constructs it (the HTTP
//! server in production, a test elsewhere); there is no process-global
//! instance. Tests can run it with `min_browsers = 0` and never launch a
//! browser.

pub mod broker;
pub mod error;
pub mod pool;
pub mod proxy;

pub use broker::{ContextBroker, SessionOptions};
pub use error::{BrokerError, PoolError};
pub use pool::{BrowserPool, Lease, PoolCapacity, PoolConfig};
pub use proxy::{ProxyError, ProxyProtocol, ProxySettings};
