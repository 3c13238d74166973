//! Human-like scroll engine.
//!
//! A bounded loop that scrolls like a person reading: randomized step sizes
//! (60-90 % of the viewport), jittered delays, longer pauses when new
//! content streams in, one overshoot at the bottom to poke infinite-scroll
//! loaders, and occasional multi-second idles.

use std::time::Duration;

use chromiumoxide::Page;
use rand::Rng;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

use crate::models::ScrollConfig;

/// Fraction of visible-text growth that counts as a content change.
const CONTENT_GROWTH_FACTOR: f64 = 1.02;
/// Distance from the bottom (px) at which the page counts as fully scrolled.
const BOTTOM_SLACK_PX: f64 = 100.0;

#[derive(Debug, Clone, Copy, Deserialize)]
struct PageMetrics {
    #[serde(rename = "viewportHeight")]
    viewport_height: f64,
    #[serde(rename = "scrollHeight")]
    scroll_height: f64,
    #[serde(rename = "scrollY")]
    scroll_y: f64,
    #[serde(rename = "contentLength")]
    content_length: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScrollOutcome {
    pub steps: u32,
    pub content_changes: u32,
}

/// Run the scroll loop. Engine failures end the loop early but never fail
/// the render.
pub async fn run(page: &Page, config: &ScrollConfig, request_id: &str) -> ScrollOutcome {
    let mut outcome = ScrollOutcome::default();
    let mut overshot = false;

    for _ in 0..config.max_scrolls {
        let Some(before) = sample_metrics(page).await else {
            break;
        };

        let step = step_size(before.viewport_height);
        if page
            .evaluate(format!("window.scrollBy(0, {step:.0});").as_str())
            .await
            .is_err()
        {
            break;
        }
        outcome.steps += 1;

        sleep(jittered_delay(config.delay_ms)).await;

        let Some(after) = sample_metrics(page).await else {
            break;
        };

        let height_grew = after.scroll_height > before.scroll_height;
        let content_grew = after.content_length > before.content_length * CONTENT_GROWTH_FACTOR;
        if height_grew || content_grew {
            outcome.content_changes += 1;
            sleep(Duration::from_millis(content_pause_ms())).await;
        }

        if after.viewport_height + after.scroll_y >= after.scroll_height - BOTTOM_SLACK_PX {
            if overshot {
                break;
            }
            overshot = true;
            // Poke infinite-scroll loaders once; stop if nothing loads.
            let _ = page
                .evaluate(format!("window.scrollBy(0, {:.0});", after.viewport_height).as_str())
                .await;
            sleep(jittered_delay(config.delay_ms)).await;
            match sample_metrics(page).await {
                Some(post) if post.scroll_height > after.scroll_height => {}
                _ => break,
            }
        }

        if takes_human_pause() {
            sleep(Duration::from_millis(human_pause_ms())).await;
        }
    }

    debug!(
        request_id,
        steps = outcome.steps,
        content_changes = outcome.content_changes,
        "scroll loop finished"
    );
    outcome
}

async fn sample_metrics(page: &Page) -> Option<PageMetrics> {
    let result = page
        .evaluate(
            "({ viewportHeight: window.innerHeight, \
               scrollHeight: document.body ? document.body.scrollHeight : 0, \
               scrollY: window.scrollY, \
               contentLength: document.body ? document.body.innerHTML.length : 0 })",
        )
        .await
        .ok()?;
    result.into_value::<PageMetrics>().ok()
}

fn step_size(viewport_height: f64) -> f64 {
    let fraction = rand::thread_rng().gen_range(0.6..=0.9);
    viewport_height * fraction
}

fn jittered_delay(delay_ms: u64) -> Duration {
    let factor = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_millis((delay_ms as f64 * factor) as u64)
}

fn content_pause_ms() -> u64 {
    rand::thread_rng().gen_range(200..=500)
}

fn takes_human_pause() -> bool {
    rand::thread_rng().gen_bool(0.2)
}

fn human_pause_ms() -> u64 {
    rand::thread_rng().gen_range(500..=1500)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_size_stays_within_human_range() {
        for _ in 0..200 {
            let step = step_size(768.0);
            assert!(step >= 768.0 * 0.6 - f64::EPSILON);
            assert!(step <= 768.0 * 0.9 + f64::EPSILON);
        }
    }

    #[test]
    fn delay_jitter_stays_within_quarter() {
        for _ in 0..200 {
            let delay = jittered_delay(500);
            assert!(delay >= Duration::from_millis(375));
            assert!(delay <= Duration::from_millis(625));
        }
    }

    #[test]
    fn pause_ranges_match_contract() {
        for _ in 0..200 {
            let pause = content_pause_ms();
            assert!((200..=500).contains(&pause));
            let idle = human_pause_ms();
            assert!((500..=1500).contains(&idle));
        }
    }

    #[test]
    fn metrics_deserialize_from_page_shape() {
        let metrics: PageMetrics = serde_json::from_str(
            r#"{"viewportHeight": 768, "scrollHeight": 4096, "scrollY": 0, "contentLength": 20000}"#,
        )
        .unwrap();
        assert_eq!(metrics.scroll_height, 4096.0);
        assert_eq!(metrics.content_length, 20000.0);
    }
}
