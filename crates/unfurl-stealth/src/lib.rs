//! # unfurl-stealth
//!
//! Anti-detection support for the unfurl rendering service. This crate
//! provides the pieces the context broker applies to every browsing context
//! before a page script runs, plus the post-load classifiers the pipeline
//! runs on the rendered page:
//!
//! - **User agents**: a fixed pool of realistic desktop agents with
//!   UA-consistent header generation (client hints for Chromium-family UAs).
//! - **Fingerprint options**: viewport, locale and timezone defaults merged
//!   with per-request overrides.
//! - **Stealth script**: a single idempotent init script masking automation
//!   signals (webdriver flag, plugin shape, WebGL strings, canvas noise,
//!   hardware hints, outer dimensions).
//! - **Detection**: CAPTCHA and WAF-block classifiers over a page snapshot.

pub mod detection;
pub mod fingerprint;
pub mod script;
pub mod user_agent;

pub use detection::{
    detect_block, detect_captcha, BlockReason, BlockVerdict, CaptchaProvider, CaptchaVerdict,
    Confidence, PageSnapshot, WafProvider,
};
pub use fingerprint::{FingerprintOptions, Viewport};
pub use script::{stealth_script, STEALTH_MARKER};
pub use user_agent::{consistent_headers, is_chromium_family, random_desktop_agent};
