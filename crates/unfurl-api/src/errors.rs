//! Stable error codes and the structured entries the response envelope
//! carries.

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// The service's stable error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NavigationFailed,
    Timeout,
    TotalTimeout,
    ProxyError,
    BrowserError,
    RenderFailed,
    InternalError,
    ValidationError,
    RateLimited,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NavigationFailed => "NAVIGATION_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::TotalTimeout => "TOTAL_TIMEOUT",
            ErrorCode::ProxyError => "PROXY_ERROR",
            ErrorCode::BrowserError => "BROWSER_ERROR",
            ErrorCode::RenderFailed => "RENDER_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::RateLimited => "RATE_LIMITED",
        }
    }

    /// HTTP status this code maps to at the edge.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Timeout | ErrorCode::TotalTimeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// One machine-readable entry in the response's `errors` array.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorEntry {
    pub fn new<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn for_field<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self {
            code: ErrorCode::ValidationError,
            message: message.into(),
            field: Some(field.into()),
            details: None,
        }
    }

    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Strip raw detail strings; applied before serialization in production.
    pub fn redacted(mut self) -> Self {
        self.details = None;
        self
    }
}

/// A failed request: either a batch of validation findings or one pipeline
/// failure.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request validation failed")]
    Validation(Vec<ErrorEntry>),

    #[error("{}", .0.message)]
    Render(ErrorEntry),
}

impl ApiError {
    pub fn render<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self::Render(ErrorEntry::new(code, message))
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::render(ErrorCode::InternalError, message)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Render(entry) => entry.code.http_status(),
        }
    }

    /// The ordered error list for the response envelope.
    pub fn into_entries(self, expose_details: bool) -> Vec<ErrorEntry> {
        let entries = match self {
            ApiError::Validation(entries) => entries,
            ApiError::Render(entry) => vec![entry],
        };
        if expose_details {
            entries
        } else {
            entries.into_iter().map(ErrorEntry::redacted).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::NavigationFailed).unwrap();
        assert_eq!(json, "\"NAVIGATION_FAILED\"");
        assert_eq!(ErrorCode::TotalTimeout.as_str(), "TOTAL_TIMEOUT");
    }

    #[test]
    fn status_mapping_follows_the_contract() {
        assert_eq!(
            ErrorCode::ValidationError.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::RateLimited.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ErrorCode::Timeout.http_status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ErrorCode::TotalTimeout.http_status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        for code in [
            ErrorCode::NavigationFailed,
            ErrorCode::ProxyError,
            ErrorCode::BrowserError,
            ErrorCode::RenderFailed,
            ErrorCode::InternalError,
        ] {
            assert_eq!(code.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn production_redaction_strips_details_only() {
        let err = ApiError::Render(
            ErrorEntry::new(ErrorCode::BrowserError, "engine call failed")
                .with_details("ws closed unexpectedly"),
        );
        let entries = err.into_entries(false);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].details.is_none());
        assert_eq!(entries[0].message, "engine call failed");
    }
}
