//! CAPTCHA and WAF-block detection over a rendered page.
//!
//! Both classifiers are pure functions over a [`PageSnapshot`] (HTML,
//! visible text, final HTTP status) so they can run concurrently on the same
//! snapshot and never touch the browser. A classifier that finds nothing
//! returns a negative verdict at low confidence; neither can fail the
//! render.

mod block;
mod captcha;

pub use block::{detect_block, BlockReason, BlockVerdict, WafProvider};
pub use captcha::{detect_captcha, CaptchaProvider, CaptchaVerdict};

use serde::{Deserialize, Serialize};

/// What the classifiers read: one immutable snapshot of the loaded page.
#[derive(Debug, Clone, Copy)]
pub struct PageSnapshot<'a> {
    /// Full page HTML (`page.content()`).
    pub html: &'a str,
    /// Visible text (`document.body.innerText`).
    pub text: &'a str,
    /// Final HTTP status of the main document.
    pub status: u16,
}

/// Classifier confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_orders_low_to_high() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
    }

    #[test]
    fn clean_page_is_negative_on_both_classifiers() {
        let snapshot = PageSnapshot {
            html: "<html><body><h1>Example Domain</h1><p>This domain is for use in \
                   illustrative examples in documents.</p></body></html>",
            text: "Example Domain This domain is for use in illustrative examples in documents.",
            status: 200,
        };

        let captcha = detect_captcha(&snapshot);
        assert!(!captcha.detected);

        let block = detect_block(&snapshot);
        assert!(!block.blocked);
        assert_eq!(block.confidence, Confidence::Low);
    }
}
