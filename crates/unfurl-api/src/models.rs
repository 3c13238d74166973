//! Request and response models for `/v1/render`.
//!
//! The wire request is fully optional ([`RenderRequestBody`]); the validator
//! turns it into a defaulted, range-checked [`RenderRequest`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use unfurl_headless::ProxySettings;
use unfurl_stealth::{BlockVerdict, CaptchaVerdict, FingerprintOptions};

use crate::errors::ErrorEntry;

// ---- wire request ----------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderRequestBody {
    pub url: Option<String>,
    #[serde(default)]
    pub render: RenderOptionsBody,
    #[serde(default)]
    pub browser: BrowserOptionsBody,
    pub proxy: Option<ProxyBody>,
    #[serde(default)]
    pub debug: DebugOptionsBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderOptionsBody {
    pub wait_until: Option<String>,
    pub timeout_ms: Option<i64>,
    pub javascript: Option<bool>,
    pub scroll: Option<ScrollBody>,
    pub wait_for: Option<String>,
    pub js_code: Option<JsCode>,
}

/// `js_code` accepts a single script or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JsCode {
    One(String),
    Many(Vec<String>),
}

impl JsCode {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            JsCode::One(script) => vec![script],
            JsCode::Many(scripts) => scripts,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrollBody {
    pub enabled: Option<bool>,
    pub max_scrolls: Option<i64>,
    pub delay_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowserOptionsBody {
    pub viewport: Option<ViewportBody>,
    pub user_agent: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewportBody {
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyBody {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub rotate: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugOptionsBody {
    pub screenshot: Option<bool>,
    pub har: Option<bool>,
}

// ---- validated request -----------------------------------------------------

/// Navigation completion criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Commit,
    DomContentLoaded,
    Load,
    NetworkIdle,
}

impl WaitUntil {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "commit" => Some(WaitUntil::Commit),
            "domcontentloaded" => Some(WaitUntil::DomContentLoaded),
            "load" => Some(WaitUntil::Load),
            "networkidle" => Some(WaitUntil::NetworkIdle),
            _ => None,
        }
    }
}

/// A scripted wait directive, dispatched by prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitTarget {
    Css(String),
    Js(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollConfig {
    pub enabled: bool,
    pub max_scrolls: u32,
    pub delay_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_scrolls: 5,
            delay_ms: 500,
        }
    }
}

/// A validated, fully defaulted render job.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: Url,
    pub wait_until: WaitUntil,
    pub timeout: Duration,
    pub javascript: bool,
    pub scroll: ScrollConfig,
    pub wait_for: Option<WaitTarget>,
    pub js_code: Vec<String>,
    pub fingerprint: FingerprintOptions,
    pub proxy: Option<ProxySettings>,
    pub screenshot: bool,
    pub har: bool,
}

// ---- response --------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct RenderContent {
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub har: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct RenderMeta {
    pub http_status: u16,
    pub duration_ms: u64,
    pub captcha_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha_type: Option<String>,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    pub proxy_used: bool,
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// The response envelope every render returns, success or not.
#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub success: bool,
    pub request_id: String,
    pub url: Option<String>,
    pub content: Option<RenderContent>,
    pub meta: Option<RenderMeta>,
    pub errors: Option<Vec<ErrorEntry>>,
    pub timestamp: String,
}

/// Everything the pipeline produces for a successful render.
#[derive(Debug)]
pub struct RenderOutcome {
    pub final_url: String,
    pub html: String,
    pub title: Option<String>,
    pub http_status: u16,
    pub captcha: CaptchaVerdict,
    pub block: BlockVerdict,
    pub screenshot: Option<String>,
    pub notes: Vec<String>,
    pub proxy_used: bool,
}

impl RenderResponse {
    pub fn success(request_id: &str, outcome: RenderOutcome, duration: Duration) -> Self {
        let meta = RenderMeta {
            http_status: outcome.http_status,
            duration_ms: duration.as_millis() as u64,
            captcha_detected: outcome.captcha.detected,
            captcha_type: outcome
                .captcha
                .provider
                .map(|p| p.as_str().to_string()),
            blocked: outcome.block.blocked,
            block_reason: outcome.block.reason.map(|r| r.as_str().to_string()),
            proxy_used: outcome.proxy_used,
            title: outcome.title,
            notes: outcome.notes,
        };
        Self {
            success: true,
            request_id: request_id.to_string(),
            url: Some(outcome.final_url),
            content: Some(RenderContent {
                html: outcome.html,
                screenshot: outcome.screenshot,
                har: None,
            }),
            meta: Some(meta),
            errors: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn failure(request_id: &str, errors: Vec<ErrorEntry>) -> Self {
        Self {
            success: false,
            request_id: request_id.to_string(),
            url: None,
            content: None,
            meta: None,
            errors: Some(errors),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCode, ErrorEntry};

    #[test]
    fn wait_until_parses_all_modes() {
        assert_eq!(WaitUntil::parse("commit"), Some(WaitUntil::Commit));
        assert_eq!(
            WaitUntil::parse("domcontentloaded"),
            Some(WaitUntil::DomContentLoaded)
        );
        assert_eq!(WaitUntil::parse("load"), Some(WaitUntil::Load));
        assert_eq!(WaitUntil::parse("networkidle"), Some(WaitUntil::NetworkIdle));
        assert_eq!(WaitUntil::parse("eventually"), None);
    }

    #[test]
    fn js_code_accepts_string_or_list() {
        let one: JsCode = serde_json::from_str("\"return 1;\"").unwrap();
        assert_eq!(one.into_vec(), vec!["return 1;".to_string()]);

        let many: JsCode = serde_json::from_str("[\"a\", \"b\"]").unwrap();
        assert_eq!(many.into_vec().len(), 2);
    }

    #[test]
    fn failure_envelope_shape() {
        let response = RenderResponse::failure(
            "req-1",
            vec![ErrorEntry::new(ErrorCode::Timeout, "navigation timed out")],
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["request_id"], "req-1");
        assert!(json["content"].is_null());
        assert_eq!(json["errors"][0]["code"], "TIMEOUT");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn empty_body_deserializes_with_no_url() {
        let body: RenderRequestBody = serde_json::from_str("{}").unwrap();
        assert!(body.url.is_none());
        assert!(body.render.wait_until.is_none());
        assert!(body.proxy.is_none());
    }
}
