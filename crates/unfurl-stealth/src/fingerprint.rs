//! Browser fingerprint options applied at context creation.

use serde::{Deserialize, Serialize};

/// Page viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 768,
        }
    }
}

/// Fingerprint configuration for one browsing context.
///
/// `user_agent: None` means the broker picks a random desktop agent from the
/// pool; the other fields carry the service defaults unless the request
/// overrides them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintOptions {
    pub user_agent: Option<String>,
    pub viewport: Viewport,
    pub locale: String,
    pub timezone: String,
}

impl Default for FingerprintOptions {
    fn default() -> Self {
        Self {
            user_agent: None,
            viewport: Viewport::default(),
            locale: "en-US".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }
}

impl FingerprintOptions {
    /// `Accept-Language` header value consistent with the configured locale.
    pub fn accept_language(&self) -> String {
        crate::user_agent::accept_language_for(&self.locale)
    }
}
