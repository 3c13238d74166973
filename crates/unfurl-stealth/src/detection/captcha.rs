//! CAPTCHA provider detection.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{Confidence, PageSnapshot};

/// Known CAPTCHA providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaProvider {
    Recaptcha,
    Hcaptcha,
    Turnstile,
    Arkose,
}

impl CaptchaProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptchaProvider::Recaptcha => "recaptcha",
            CaptchaProvider::Hcaptcha => "hcaptcha",
            CaptchaProvider::Turnstile => "turnstile",
            CaptchaProvider::Arkose => "arkose",
        }
    }
}

/// Result of the CAPTCHA classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaVerdict {
    pub detected: bool,
    pub provider: Option<CaptchaProvider>,
    pub confidence: Confidence,
    /// The CSS selector whose DOM signature matched, when detection came
    /// from the selector tier.
    pub selector: Option<String>,
}

impl CaptchaVerdict {
    fn none() -> Self {
        Self {
            detected: false,
            provider: None,
            confidence: Confidence::Low,
            selector: None,
        }
    }
}

/// Selector tier: each CSS selector paired with the HTML signature its
/// presence leaves in the document, so the check stays a pure string scan.
struct ProviderSelectors {
    provider: CaptchaProvider,
    selectors: &'static [(&'static str, &'static str)],
}

const SELECTOR_TIER: &[ProviderSelectors] = &[
    ProviderSelectors {
        provider: CaptchaProvider::Recaptcha,
        selectors: &[
            ("iframe[src*=\"recaptcha\"]", "google.com/recaptcha"),
            (".g-recaptcha", "g-recaptcha"),
            ("#recaptcha", "id=\"recaptcha\""),
        ],
    },
    ProviderSelectors {
        provider: CaptchaProvider::Hcaptcha,
        selectors: &[
            ("iframe[src*=\"hcaptcha\"]", "hcaptcha.com"),
            (".h-captcha", "h-captcha"),
        ],
    },
    ProviderSelectors {
        provider: CaptchaProvider::Turnstile,
        selectors: &[
            (
                "iframe[src*=\"challenges.cloudflare.com\"]",
                "challenges.cloudflare.com",
            ),
            (".cf-turnstile", "cf-turnstile"),
        ],
    },
    ProviderSelectors {
        provider: CaptchaProvider::Arkose,
        selectors: &[
            ("iframe[src*=\"arkoselabs\"]", "arkoselabs"),
            ("#FunCaptcha", "id=\"FunCaptcha\""),
        ],
    },
];

/// Pattern tier: per-provider regexes scanned over HTML and visible text.
static PATTERN_TIER: Lazy<Vec<(CaptchaProvider, Vec<Regex>)>> = Lazy::new(|| {
    let compile = |patterns: &[&str]| {
        patterns
            .iter()
            .map(|p| Regex::new(p).expect("captcha pattern"))
            .collect::<Vec<_>>()
    };
    vec![
        (
            CaptchaProvider::Recaptcha,
            compile(&[r"(?i)grecaptcha", r"(?i)recaptcha", r"(?i)data-sitekey"]),
        ),
        (
            CaptchaProvider::Hcaptcha,
            compile(&[r"(?i)hcaptcha"]),
        ),
        (
            CaptchaProvider::Turnstile,
            compile(&[r"(?i)turnstile", r"(?i)checking your browser"]),
        ),
        (
            CaptchaProvider::Arkose,
            compile(&[r"(?i)funcaptcha", r"(?i)arkose"]),
        ),
    ]
});

/// Generic tier: phrases any challenge page tends to contain.
const GENERIC_PHRASES: &[&str] = &[
    "captcha",
    "prove you're human",
    "prove you are human",
    "verify you are human",
    "are you a robot",
    "security check to access",
];

/// Classify the snapshot for CAPTCHA challenges.
///
/// Tiers in order: provider selector signatures (high confidence),
/// provider pattern sets over HTML and text (medium), generic challenge
/// phrases (low). First hit wins.
pub fn detect_captcha(snapshot: &PageSnapshot<'_>) -> CaptchaVerdict {
    for entry in SELECTOR_TIER {
        for (selector, signature) in entry.selectors {
            if snapshot.html.contains(signature) {
                return CaptchaVerdict {
                    detected: true,
                    provider: Some(entry.provider),
                    confidence: Confidence::High,
                    selector: Some((*selector).to_string()),
                };
            }
        }
    }

    for (provider, patterns) in PATTERN_TIER.iter() {
        for pattern in patterns {
            if pattern.is_match(snapshot.html) || pattern.is_match(snapshot.text) {
                return CaptchaVerdict {
                    detected: true,
                    provider: Some(*provider),
                    confidence: Confidence::Medium,
                    selector: None,
                };
            }
        }
    }

    let html_lower = snapshot.html.to_lowercase();
    let text_lower = snapshot.text.to_lowercase();
    for phrase in GENERIC_PHRASES {
        if html_lower.contains(phrase) || text_lower.contains(phrase) {
            return CaptchaVerdict {
                detected: true,
                provider: None,
                confidence: Confidence::Low,
                selector: None,
            };
        }
    }

    CaptchaVerdict::none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot<'a>(html: &'a str, text: &'a str) -> PageSnapshot<'a> {
        PageSnapshot {
            html,
            text,
            status: 200,
        }
    }

    #[test]
    fn recaptcha_selector_signature_is_high_confidence() {
        let html = r#"<div class="g-recaptcha" data-sitekey="key"></div>"#;
        let verdict = detect_captcha(&snapshot(html, ""));
        assert!(verdict.detected);
        assert_eq!(verdict.provider, Some(CaptchaProvider::Recaptcha));
        assert_eq!(verdict.confidence, Confidence::High);
        assert_eq!(verdict.selector.as_deref(), Some(".g-recaptcha"));
    }

    #[test]
    fn hcaptcha_iframe_detected() {
        let html = r#"<iframe src="https://hcaptcha.com/1/api.js"></iframe>"#;
        let verdict = detect_captcha(&snapshot(html, ""));
        assert_eq!(verdict.provider, Some(CaptchaProvider::Hcaptcha));
        assert_eq!(verdict.confidence, Confidence::High);
    }

    #[test]
    fn turnstile_challenge_frame_detected() {
        let html =
            r#"<iframe src="https://challenges.cloudflare.com/turnstile/v0/api.js"></iframe>"#;
        let verdict = detect_captcha(&snapshot(html, ""));
        assert_eq!(verdict.provider, Some(CaptchaProvider::Turnstile));
        assert_eq!(
            verdict.selector.as_deref(),
            Some("iframe[src*=\"challenges.cloudflare.com\"]")
        );
    }

    #[test]
    fn arkose_script_falls_back_to_pattern_tier() {
        let html = r#"<script>window.setupEnforcement = arkoseEnforcement;</script>"#;
        let verdict = detect_captcha(&snapshot(html, ""));
        assert!(verdict.detected);
        assert_eq!(verdict.provider, Some(CaptchaProvider::Arkose));
        assert_eq!(verdict.confidence, Confidence::Medium);
        assert!(verdict.selector.is_none());
    }

    #[test]
    fn generic_phrase_in_text_is_low_confidence() {
        let verdict = detect_captcha(&snapshot(
            "<html><body>...</body></html>",
            "Please complete this security check to access the site. Prove you're human.",
        ));
        assert!(verdict.detected);
        assert!(verdict.provider.is_none());
        assert_eq!(verdict.confidence, Confidence::Low);
    }

    #[test]
    fn plain_page_is_negative() {
        let verdict = detect_captcha(&snapshot(
            "<html><body><p>Weather today: sunny</p></body></html>",
            "Weather today: sunny",
        ));
        assert!(!verdict.detected);
        assert!(verdict.provider.is_none());
    }
}
