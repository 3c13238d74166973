//! Request validation: schema constraints and defaulting.
//!
//! All findings are collected per field and returned together so a client
//! can fix a request in one round trip.

use std::time::Duration;

use url::Url;

use unfurl_headless::ProxySettings;
use unfurl_stealth::{FingerprintOptions, Viewport};

use crate::errors::ErrorEntry;
use crate::models::{
    RenderRequest, RenderRequestBody, ScrollConfig, WaitTarget, WaitUntil,
};

const TIMEOUT_RANGE_MS: (i64, i64) = (1_000, 120_000);
const MAX_SCROLLS_RANGE: (i64, i64) = (1, 50);
const SCROLL_DELAY_RANGE_MS: (i64, i64) = (100, 5_000);
const VIEWPORT_WIDTH_RANGE: (i64, i64) = (320, 3_840);
const VIEWPORT_HEIGHT_RANGE: (i64, i64) = (240, 2_160);

/// Validate the wire body into a fully defaulted job description.
pub fn validate(body: RenderRequestBody) -> Result<RenderRequest, Vec<ErrorEntry>> {
    let mut errors = Vec::new();

    let url = match body.url.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push(ErrorEntry::for_field("url", "url is required"));
            None
        }
        Some(raw) => match Url::parse(raw) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(parsed),
            Ok(parsed) => {
                errors.push(ErrorEntry::for_field(
                    "url",
                    format!("unsupported URL scheme: {}", parsed.scheme()),
                ));
                None
            }
            Err(_) => {
                errors.push(ErrorEntry::for_field(
                    "url",
                    "url must be an absolute http(s) URL",
                ));
                None
            }
        },
    };

    let wait_until = match body.render.wait_until.as_deref() {
        None => WaitUntil::NetworkIdle,
        Some(raw) => WaitUntil::parse(raw).unwrap_or_else(|| {
            errors.push(ErrorEntry::for_field(
                "render.wait_until",
                "must be one of commit, domcontentloaded, load, networkidle",
            ));
            WaitUntil::NetworkIdle
        }),
    };

    let timeout_ms = range_checked(
        body.render.timeout_ms,
        30_000,
        TIMEOUT_RANGE_MS,
        "render.timeout_ms",
        &mut errors,
    );

    let javascript = body.render.javascript.unwrap_or(true);

    let scroll = {
        let scroll_body = body.render.scroll.unwrap_or_default();
        let defaults = ScrollConfig::default();
        ScrollConfig {
            enabled: scroll_body.enabled.unwrap_or(defaults.enabled),
            max_scrolls: range_checked(
                scroll_body.max_scrolls,
                defaults.max_scrolls as i64,
                MAX_SCROLLS_RANGE,
                "render.scroll.max_scrolls",
                &mut errors,
            ) as u32,
            delay_ms: range_checked(
                scroll_body.delay_ms,
                defaults.delay_ms as i64,
                SCROLL_DELAY_RANGE_MS,
                "render.scroll.delay_ms",
                &mut errors,
            ) as u64,
        }
    };

    let wait_for = match body.render.wait_for.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match parse_wait_target(raw) {
            Some(target) => Some(target),
            None => {
                errors.push(ErrorEntry::for_field(
                    "render.wait_for",
                    "wait target must not be empty",
                ));
                None
            }
        },
    };

    let js_code = body
        .render
        .js_code
        .map(|code| code.into_vec())
        .unwrap_or_default();

    let viewport_body = body.browser.viewport.unwrap_or_default();
    let default_viewport = Viewport::default();
    let viewport = Viewport {
        width: range_checked(
            viewport_body.width,
            default_viewport.width as i64,
            VIEWPORT_WIDTH_RANGE,
            "browser.viewport.width",
            &mut errors,
        ) as u32,
        height: range_checked(
            viewport_body.height,
            default_viewport.height as i64,
            VIEWPORT_HEIGHT_RANGE,
            "browser.viewport.height",
            &mut errors,
        ) as u32,
    };

    let fingerprint_defaults = FingerprintOptions::default();
    let fingerprint = FingerprintOptions {
        user_agent: body.browser.user_agent.filter(|ua| !ua.trim().is_empty()),
        viewport,
        locale: body
            .browser
            .locale
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(fingerprint_defaults.locale),
        timezone: body
            .browser
            .timezone
            .filter(|tz| !tz.trim().is_empty())
            .unwrap_or(fingerprint_defaults.timezone),
    };

    let proxy = match body.proxy {
        None => None,
        Some(proxy_body) => {
            let server = proxy_body.server.unwrap_or_default();
            if server.trim().is_empty() {
                errors.push(ErrorEntry::for_field(
                    "proxy.server",
                    "proxy.server is required when proxy is set",
                ));
                None
            } else {
                match ProxySettings::parse(&server, proxy_body.username, proxy_body.password) {
                    Ok(mut settings) => {
                        settings.rotate = proxy_body.rotate.unwrap_or(false);
                        Some(settings)
                    }
                    Err(e) => {
                        errors.push(ErrorEntry::for_field("proxy", e.to_string()));
                        None
                    }
                }
            }
        }
    };

    let screenshot = body.debug.screenshot.unwrap_or(false);
    let har = body.debug.har.unwrap_or(false);

    if !errors.is_empty() {
        return Err(errors);
    }
    // A missing url always records a finding above, so this arm is only a
    // safeguard.
    let Some(url) = url else {
        return Err(vec![ErrorEntry::for_field("url", "url is required")]);
    };

    Ok(RenderRequest {
        url,
        wait_until,
        timeout: Duration::from_millis(timeout_ms as u64),
        javascript,
        scroll,
        wait_for,
        js_code,
        fingerprint,
        proxy,
        screenshot,
        har,
    })
}

/// Dispatch a `wait_for` directive by prefix: `css:`, `js:`, or a bare CSS
/// selector.
fn parse_wait_target(raw: &str) -> Option<WaitTarget> {
    let target = if let Some(selector) = raw.strip_prefix("css:") {
        WaitTarget::Css(selector.trim().to_string())
    } else if let Some(expr) = raw.strip_prefix("js:") {
        WaitTarget::Js(expr.trim().to_string())
    } else {
        WaitTarget::Css(raw.to_string())
    };
    match &target {
        WaitTarget::Css(s) | WaitTarget::Js(s) if s.is_empty() => None,
        _ => Some(target),
    }
}

fn range_checked(
    value: Option<i64>,
    default: i64,
    (min, max): (i64, i64),
    field: &str,
    errors: &mut Vec<ErrorEntry>,
) -> i64 {
    match value {
        None => default,
        Some(v) if v >= min && v <= max => v,
        Some(v) => {
            errors.push(ErrorEntry::for_field(
                field,
                format!("must be between {min} and {max}, got {v}"),
            ));
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProxyBody, RenderOptionsBody, ScrollBody};

    fn body_with_url(url: &str) -> RenderRequestBody {
        RenderRequestBody {
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn minimal_request_gets_full_defaults() {
        let request = validate(body_with_url("https://example.com")).unwrap();
        assert_eq!(request.wait_until, WaitUntil::NetworkIdle);
        assert_eq!(request.timeout, Duration::from_millis(30_000));
        assert!(request.javascript);
        assert!(!request.scroll.enabled);
        assert_eq!(request.scroll.max_scrolls, 5);
        assert_eq!(request.scroll.delay_ms, 500);
        assert_eq!(request.fingerprint.viewport.width, 1366);
        assert_eq!(request.fingerprint.locale, "en-US");
        assert!(request.proxy.is_none());
        assert!(!request.screenshot);
    }

    #[test]
    fn missing_url_is_rejected() {
        let errors = validate(RenderRequestBody::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field.as_deref(), Some("url"));
    }

    #[test]
    fn relative_url_is_rejected() {
        let errors = validate(body_with_url("not-a-valid-url")).unwrap_err();
        assert_eq!(errors[0].field.as_deref(), Some("url"));
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let errors = validate(body_with_url("file:///etc/passwd")).unwrap_err();
        assert!(errors[0].message.contains("scheme"));
    }

    #[test]
    fn timeout_bounds_are_enforced() {
        let mut body = body_with_url("https://example.com");
        body.render.timeout_ms = Some(500);
        let errors = validate(body).unwrap_err();
        assert_eq!(errors[0].field.as_deref(), Some("render.timeout_ms"));

        let mut body = body_with_url("https://example.com");
        body.render.timeout_ms = Some(120_000);
        assert!(validate(body).is_ok());
    }

    #[test]
    fn scroll_bounds_are_enforced() {
        let mut body = body_with_url("https://example.com");
        body.render.scroll = Some(ScrollBody {
            enabled: Some(true),
            max_scrolls: Some(51),
            delay_ms: Some(50),
        });
        let errors = validate(body).unwrap_err();
        let fields: Vec<_> = errors.iter().filter_map(|e| e.field.as_deref()).collect();
        assert!(fields.contains(&"render.scroll.max_scrolls"));
        assert!(fields.contains(&"render.scroll.delay_ms"));
    }

    #[test]
    fn wait_for_prefixes_dispatch() {
        let mut body = body_with_url("https://example.com");
        body.render = RenderOptionsBody {
            wait_for: Some("css: .results".to_string()),
            ..Default::default()
        };
        let request = validate(body).unwrap();
        assert_eq!(
            request.wait_for,
            Some(WaitTarget::Css(".results".to_string()))
        );

        let mut body = body_with_url("https://example.com");
        body.render.wait_for = Some("js: window.ready === true".to_string());
        let request = validate(body).unwrap();
        assert_eq!(
            request.wait_for,
            Some(WaitTarget::Js("window.ready === true".to_string()))
        );

        let mut body = body_with_url("https://example.com");
        body.render.wait_for = Some("#content".to_string());
        let request = validate(body).unwrap();
        assert_eq!(request.wait_for, Some(WaitTarget::Css("#content".to_string())));
    }

    #[test]
    fn invalid_wait_until_is_a_field_error() {
        let mut body = body_with_url("https://example.com");
        body.render.wait_until = Some("eventually".to_string());
        let errors = validate(body).unwrap_err();
        assert_eq!(errors[0].field.as_deref(), Some("render.wait_until"));
    }

    #[test]
    fn proxy_requires_server_and_full_credentials() {
        let mut body = body_with_url("https://example.com");
        body.proxy = Some(ProxyBody::default());
        let errors = validate(body).unwrap_err();
        assert_eq!(errors[0].field.as_deref(), Some("proxy.server"));

        let mut body = body_with_url("https://example.com");
        body.proxy = Some(ProxyBody {
            server: Some("http://proxy.example.com:3128".to_string()),
            username: Some("user".to_string()),
            password: None,
            rotate: None,
        });
        let errors = validate(body).unwrap_err();
        assert_eq!(errors[0].field.as_deref(), Some("proxy"));

        let mut body = body_with_url("https://example.com");
        body.proxy = Some(ProxyBody {
            server: Some("socks5://proxy.example.com".to_string()),
            username: None,
            password: None,
            rotate: Some(true),
        });
        let request = validate(body).unwrap();
        let proxy = request.proxy.unwrap();
        assert_eq!(proxy.server_url(), "socks5://proxy.example.com:1080");
        assert!(proxy.rotate);
    }

    #[test]
    fn multiple_findings_are_reported_together() {
        let mut body = RenderRequestBody::default();
        body.render.timeout_ms = Some(1);
        body.render.wait_until = Some("whenever".to_string());
        let errors = validate(body).unwrap_err();
        assert!(errors.len() >= 3); // url + timeout + wait_until
    }
}
