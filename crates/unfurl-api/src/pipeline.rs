//! The render pipeline: one request end-to-end under a single wall-clock
//! deadline.
//!
//! Stage order: acquire lease, navigate, stabilize (network-idle only),
//! pre-extraction scripts, scripted wait, scroll, detection, extraction,
//! debug artifacts. Script and wait failures are logged and never fail the
//! render; navigation and extraction failures do. The lease is released on
//! every path; cancellation by the outer deadline tears it down through the
//! lease's drop guard.

use std::time::{Duration, Instant};

use base64::Engine;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventDomContentEventFired, EventLoadEventFired,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use unfurl_headless::{BrokerError, ContextBroker, PoolError, SessionOptions};
use unfurl_stealth::{detect_block, detect_captcha, PageSnapshot};

use crate::errors::{ApiError, ErrorCode};
use crate::models::{RenderOutcome, RenderRequest, WaitTarget, WaitUntil};
use crate::scroll;

/// Teardown headroom added to the request's own timeout.
const OUTER_DEADLINE_SLACK: Duration = Duration::from_secs(30);
/// Acquisition sub-timeout; covers the pool's 30 s queue deadline.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(35);
/// Wrapper buffer around the navigation call.
const NAVIGATION_SLACK: Duration = Duration::from_secs(5);
/// Network-idle stabilization: sampling period and total budget.
const STABILIZE_INTERVAL: Duration = Duration::from_millis(200);
const STABILIZE_BUDGET: Duration = Duration::from_secs(3);
/// Delay between consecutive pre-extraction scripts.
const INTER_SCRIPT_DELAY: Duration = Duration::from_millis(100);

/// Execute one validated render request.
pub async fn execute(
    broker: &ContextBroker,
    request_id: &str,
    request: &RenderRequest,
) -> Result<RenderOutcome, ApiError> {
    let outer_deadline = request.timeout + OUTER_DEADLINE_SLACK;
    match timeout(outer_deadline, run(broker, request_id, request)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(request_id, "render exceeded its total deadline");
            Err(ApiError::render(
                ErrorCode::TotalTimeout,
                "render exceeded its total deadline",
            ))
        }
    }
}

async fn run(
    broker: &ContextBroker,
    request_id: &str,
    request: &RenderRequest,
) -> Result<RenderOutcome, ApiError> {
    let options = SessionOptions {
        fingerprint: request.fingerprint.clone(),
        proxy: request.proxy.clone(),
        javascript_enabled: request.javascript,
        acquire_timeout: None,
    };

    let lease = timeout(ACQUIRE_TIMEOUT, broker.lease_context(&options))
        .await
        .map_err(|_| {
            ApiError::render(ErrorCode::Timeout, "timed out acquiring a browser context")
        })?
        .map_err(map_broker_error)?;

    debug!(request_id, browser_id = %lease.browser_id(), "lease acquired");

    // One release point for success and failure alike; the drop guard only
    // covers cancellation and panics.
    let result = stages(lease.page(), request_id, request).await;
    lease.release().await;
    result
}

async fn stages(
    page: &Page,
    request_id: &str,
    request: &RenderRequest,
) -> Result<RenderOutcome, ApiError> {
    let http_status = navigate(page, request_id, request).await?;

    if request.wait_until == WaitUntil::NetworkIdle {
        stabilize(page, request_id).await;
    }

    if !request.js_code.is_empty() {
        run_pre_extraction_scripts(page, request_id, &request.js_code).await;
    }

    if let Some(target) = &request.wait_for {
        scripted_wait(page, request_id, target, request.timeout).await;
    }

    if request.scroll.enabled {
        scroll::run(page, &request.scroll, request_id).await;
    }

    // One snapshot feeds both classifiers and the extraction stage.
    let html = timeout(Duration::from_secs(10), page.content())
        .await
        .map_err(|_| ApiError::render(ErrorCode::Timeout, "content extraction timed out"))?
        .map_err(|e| {
            ApiError::render(
                ErrorCode::RenderFailed,
                format!("content extraction failed: {e}"),
            )
        })?;
    let text = visible_text(page).await;

    let snapshot = PageSnapshot {
        html: &html,
        text: &text,
        status: http_status,
    };
    let (captcha, block) = tokio::join!(
        async { detect_captcha(&snapshot) },
        async { detect_block(&snapshot) }
    );
    if captcha.detected || block.blocked {
        info!(
            request_id,
            captcha = captcha.detected,
            blocked = block.blocked,
            "detection flagged the page"
        );
    }

    let title = evaluate_string(page, "document.title").await;
    let final_url = match timeout(Duration::from_secs(2), page.url()).await {
        Ok(Ok(Some(url))) => url,
        _ => request.url.to_string(),
    };

    let mut notes = Vec::new();
    let screenshot = if request.screenshot {
        capture_screenshot(page, request_id, &mut notes).await
    } else {
        None
    };
    if request.har {
        notes.push("HAR capture is not supported".to_string());
    }

    Ok(RenderOutcome {
        final_url,
        html,
        title: title.filter(|t| !t.is_empty()),
        http_status,
        captcha,
        block,
        screenshot,
        notes,
        proxy_used: request.proxy.is_some(),
    })
}

/// Navigate and wait for the requested completion criterion. Returns the
/// main document's HTTP status; a missing main response (some redirect
/// chains) counts as 200.
async fn navigate(
    page: &Page,
    request_id: &str,
    request: &RenderRequest,
) -> Result<u16, ApiError> {
    let budget = request.timeout + NAVIGATION_SLACK;
    let started = Instant::now();

    // Listeners must be in place before the navigation is dispatched.
    let mut dom_ready = page
        .event_listener::<EventDomContentEventFired>()
        .await
        .map_err(|e| ApiError::render(ErrorCode::BrowserError, format!("event listener: {e}")))?;
    let mut loaded = page
        .event_listener::<EventLoadEventFired>()
        .await
        .map_err(|e| ApiError::render(ErrorCode::BrowserError, format!("event listener: {e}")))?;

    timeout(budget, page.goto(request.url.as_str()))
        .await
        .map_err(|_| ApiError::render(ErrorCode::Timeout, "navigation timed out"))?
        .map_err(|e| {
            ApiError::render(ErrorCode::NavigationFailed, format!("navigation failed: {e}"))
        })?;

    let remaining = budget.saturating_sub(started.elapsed());
    let http_status = match timeout(remaining, page.wait_for_navigation_response()).await {
        Ok(Ok(Some(response))) => response
            .response
            .as_ref()
            .map(|r| r.status as u16)
            .unwrap_or(200),
        Ok(Ok(None)) => 200,
        Ok(Err(e)) => {
            debug!(request_id, error = %e, "no main navigation response; assuming 200");
            200
        }
        Err(_) => {
            return Err(ApiError::render(
                ErrorCode::Timeout,
                "timed out waiting for the navigation response",
            ))
        }
    };

    let remaining = budget.saturating_sub(started.elapsed());
    match request.wait_until {
        WaitUntil::Commit => {}
        WaitUntil::DomContentLoaded => {
            if timeout(remaining, dom_ready.next()).await.is_err() {
                return Err(ApiError::render(
                    ErrorCode::Timeout,
                    "timed out waiting for DOMContentLoaded",
                ));
            }
        }
        WaitUntil::Load | WaitUntil::NetworkIdle => {
            if timeout(remaining, loaded.next()).await.is_err() {
                return Err(ApiError::render(
                    ErrorCode::Timeout,
                    "timed out waiting for the load event",
                ));
            }
        }
    }

    debug!(
        request_id,
        http_status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "navigation completed"
    );
    Ok(http_status)
}

/// Network-idle settling: poll the DOM size until two consecutive samples
/// agree (or the budget runs out).
async fn stabilize(page: &Page, request_id: &str) {
    let deadline = Instant::now() + STABILIZE_BUDGET;
    let mut last_length: Option<u64> = None;
    let mut stable_samples = 0u32;

    while Instant::now() < deadline {
        let length = page
            .evaluate("document.body ? document.body.innerHTML.length : 0")
            .await
            .ok()
            .and_then(|v| v.into_value::<u64>().ok())
            .unwrap_or(0);

        if last_length == Some(length) {
            stable_samples += 1;
            if stable_samples >= 2 {
                break;
            }
        } else {
            stable_samples = 0;
        }
        last_length = Some(length);
        sleep(STABILIZE_INTERVAL).await;
    }

    let settled = stable_samples >= 2;
    debug!(request_id, settled, "stabilization finished");
}

/// Run caller-supplied scripts sequentially. A failure short-circuits the
/// remaining scripts but never the render.
async fn run_pre_extraction_scripts(page: &Page, request_id: &str, scripts: &[String]) {
    for (index, script) in scripts.iter().enumerate() {
        match page.evaluate(script.as_str()).await {
            Ok(result) => {
                let value = result.into_value::<serde_json::Value>().unwrap_or_default();
                debug!(request_id, index, %value, "pre-extraction script completed");
            }
            Err(e) => {
                warn!(
                    request_id,
                    index,
                    error = %e,
                    "pre-extraction script failed; skipping the rest"
                );
                break;
            }
        }
        if index + 1 < scripts.len() {
            sleep(INTER_SCRIPT_DELAY).await;
        }
    }
}

/// Scripted wait: CSS selectors poll for attachment, JS expressions poll for
/// truthiness. Failure is logged and the render continues.
async fn scripted_wait(page: &Page, request_id: &str, target: &WaitTarget, budget: Duration) {
    let deadline = Instant::now() + budget;
    match target {
        WaitTarget::Css(selector) => {
            while Instant::now() < deadline {
                if page.find_element(selector.as_str()).await.is_ok() {
                    debug!(request_id, selector = %selector, "wait_for selector attached");
                    return;
                }
                sleep(Duration::from_millis(100)).await;
            }
            warn!(request_id, selector = %selector, "wait_for selector never appeared");
        }
        WaitTarget::Js(expression) => {
            while Instant::now() < deadline {
                let truthy = page
                    .evaluate(format!("!!({expression})").as_str())
                    .await
                    .ok()
                    .and_then(|v| v.into_value::<bool>().ok())
                    .unwrap_or(false);
                if truthy {
                    debug!(request_id, "wait_for expression became truthy");
                    return;
                }
                sleep(Duration::from_millis(100)).await;
            }
            warn!(request_id, "wait_for expression never became truthy");
        }
    }
}

async fn visible_text(page: &Page) -> String {
    page.evaluate("document.body ? document.body.innerText : ''")
        .await
        .ok()
        .and_then(|v| v.into_value::<String>().ok())
        .unwrap_or_default()
}

async fn evaluate_string(page: &Page, expression: &str) -> Option<String> {
    page.evaluate(expression)
        .await
        .ok()
        .and_then(|v| v.into_value::<String>().ok())
}

async fn capture_screenshot(
    page: &Page,
    request_id: &str,
    notes: &mut Vec<String>,
) -> Option<String> {
    let params = ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Png)
        .full_page(true)
        .build();
    match timeout(Duration::from_secs(15), page.screenshot(params)).await {
        Ok(Ok(bytes)) => {
            debug!(request_id, size_bytes = bytes.len(), "screenshot captured");
            Some(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        Ok(Err(e)) => {
            warn!(request_id, error = %e, "screenshot capture failed");
            notes.push("screenshot capture failed".to_string());
            None
        }
        Err(_) => {
            warn!(request_id, "screenshot capture timed out");
            notes.push("screenshot capture timed out".to_string());
            None
        }
    }
}

fn map_broker_error(error: BrokerError) -> ApiError {
    match error {
        BrokerError::Pool(PoolError::QueueTimeout) => {
            ApiError::render(ErrorCode::Timeout, PoolError::QueueTimeout.to_string())
        }
        BrokerError::Pool(e) => {
            ApiError::render(ErrorCode::BrowserError, e.to_string())
        }
        BrokerError::Proxy(e) => ApiError::render(ErrorCode::ProxyError, e.to_string()),
        BrokerError::Context(message) => ApiError::render(ErrorCode::BrowserError, message),
    }
}
