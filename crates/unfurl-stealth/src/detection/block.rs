//! WAF / anti-bot block detection.

use serde::{Deserialize, Serialize};

use super::{Confidence, PageSnapshot};

/// Known WAF vendors, plus `Unknown` for blocks nobody claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WafProvider {
    Cloudflare,
    Akamai,
    Datadome,
    Perimeterx,
    Imperva,
    Unknown,
}

impl WafProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            WafProvider::Cloudflare => "cloudflare",
            WafProvider::Akamai => "akamai",
            WafProvider::Datadome => "datadome",
            WafProvider::Perimeterx => "perimeterx",
            WafProvider::Imperva => "imperva",
            WafProvider::Unknown => "unknown",
        }
    }
}

/// Why the page is considered blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    RateLimited,
    AccessDenied,
    BotChallenge,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::RateLimited => "rate_limited",
            BlockReason::AccessDenied => "access_denied",
            BlockReason::BotChallenge => "bot_challenge",
        }
    }
}

/// Result of the block classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockVerdict {
    pub blocked: bool,
    pub provider: Option<WafProvider>,
    pub reason: Option<BlockReason>,
    pub confidence: Confidence,
    pub details: Option<String>,
}

impl BlockVerdict {
    fn clean() -> Self {
        Self {
            blocked: false,
            provider: None,
            reason: None,
            confidence: Confidence::Low,
            details: None,
        }
    }
}

/// HTTP statuses that signal a block at the edge.
const BLOCKING_STATUSES: &[u16] = &[403, 429, 503];

struct WafSignature {
    provider: WafProvider,
    /// Statuses this vendor serves block pages with.
    statuses: &'static [u16],
    /// Vendor-specific phrases, matched case-insensitively.
    phrases: &'static [&'static str],
}

const WAF_SIGNATURES: &[WafSignature] = &[
    WafSignature {
        provider: WafProvider::Cloudflare,
        statuses: &[403, 429, 503],
        phrases: &[
            "cloudflare",
            "cf-ray",
            "attention required!",
            "checking your browser before accessing",
        ],
    },
    WafSignature {
        provider: WafProvider::Akamai,
        statuses: &[403],
        phrases: &["akamai", "reference #"],
    },
    WafSignature {
        provider: WafProvider::Datadome,
        statuses: &[403, 429],
        phrases: &["datadome", "geo.captcha-delivery.com"],
    },
    WafSignature {
        provider: WafProvider::Perimeterx,
        statuses: &[403, 429],
        phrases: &["perimeterx", "px-captcha", "press & hold"],
    },
    WafSignature {
        provider: WafProvider::Imperva,
        statuses: &[403],
        phrases: &["imperva", "incapsula", "_incapsula_resource"],
    },
];

/// Phrases any hand-rolled block page tends to contain.
const GENERIC_BLOCK_PHRASES: &[&str] = &[
    "access denied",
    "you have been blocked",
    "request blocked",
    "unusual traffic",
    "automated requests",
    "forbidden",
];

/// Max visible-text length for the generic-phrase fallback; long pages that
/// merely mention "forbidden" are not block pages.
const SHORT_TEXT_THRESHOLD: usize = 5000;

fn reason_for_status(status: u16) -> BlockReason {
    if status == 429 {
        BlockReason::RateLimited
    } else {
        BlockReason::AccessDenied
    }
}

fn matched_phrase(
    html_lower: &str,
    text_lower: &str,
    phrases: &'static [&'static str],
) -> Option<&'static str> {
    phrases
        .iter()
        .find(|phrase| html_lower.contains(*phrase) || text_lower.contains(*phrase))
        .copied()
}

fn script_tag_count(html: &str) -> usize {
    html.to_lowercase().matches("<script").count()
}

/// Classify the snapshot for WAF blocks and soft challenges.
///
/// On a blocking status (403/429/503) a vendor phrase hit yields a typed
/// high-confidence verdict; with no vendor claiming the block, the status
/// alone is still a medium-confidence block. On 200, the same vendor phrase
/// sets catch soft-challenge interstitials, then two low-confidence
/// fallbacks: short pages with generic block wording, and near-empty pages
/// that are mostly script tags.
pub fn detect_block(snapshot: &PageSnapshot<'_>) -> BlockVerdict {
    let html_lower = snapshot.html.to_lowercase();
    let text_lower = snapshot.text.to_lowercase();

    if BLOCKING_STATUSES.contains(&snapshot.status) {
        for signature in WAF_SIGNATURES {
            if !signature.statuses.contains(&snapshot.status) {
                continue;
            }
            if let Some(phrase) = matched_phrase(&html_lower, &text_lower, signature.phrases) {
                return BlockVerdict {
                    blocked: true,
                    provider: Some(signature.provider),
                    reason: Some(reason_for_status(snapshot.status)),
                    confidence: Confidence::High,
                    details: Some(format!("matched \"{phrase}\"")),
                };
            }
        }
        return BlockVerdict {
            blocked: true,
            provider: Some(WafProvider::Unknown),
            reason: Some(reason_for_status(snapshot.status)),
            confidence: Confidence::Medium,
            details: Some(format!("blocking status {}", snapshot.status)),
        };
    }

    if snapshot.status == 200 {
        for signature in WAF_SIGNATURES {
            if let Some(phrase) = matched_phrase(&html_lower, &text_lower, signature.phrases) {
                return BlockVerdict {
                    blocked: true,
                    provider: Some(signature.provider),
                    reason: Some(BlockReason::BotChallenge),
                    confidence: Confidence::Medium,
                    details: Some(format!("matched \"{phrase}\" on 200")),
                };
            }
        }
    }

    if snapshot.text.len() < SHORT_TEXT_THRESHOLD {
        if let Some(phrase) = matched_phrase(&html_lower, &text_lower, GENERIC_BLOCK_PHRASES) {
            return BlockVerdict {
                blocked: true,
                provider: Some(WafProvider::Unknown),
                reason: Some(BlockReason::AccessDenied),
                confidence: Confidence::Low,
                details: Some(format!("matched \"{phrase}\"")),
            };
        }
    }

    if snapshot.status == 200 && snapshot.text.len() < 100 && script_tag_count(snapshot.html) > 5 {
        return BlockVerdict {
            blocked: true,
            provider: Some(WafProvider::Unknown),
            reason: Some(BlockReason::BotChallenge),
            confidence: Confidence::Low,
            details: Some("minimal content but many scripts".to_string()),
        };
    }

    BlockVerdict::clean()
}
