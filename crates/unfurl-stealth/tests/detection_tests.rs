//! Fixture-driven detection tests over realistic challenge pages.

use unfurl_stealth::{
    detect_block, detect_captcha, BlockReason, CaptchaProvider, Confidence, PageSnapshot,
    WafProvider,
};

const CLOUDFLARE_INTERSTITIAL: &str = r#"
<!DOCTYPE html>
<html lang="en-US">
<head>
  <title>Just a moment...</title>
  <script src="https://challenges.cloudflare.com/turnstile/v0/api.js" async defer></script>
</head>
<body>
  <div class="main-content">
    <h1>Checking your browser before accessing example.com</h1>
    <div class="cf-turnstile" data-sitekey="0x4AAAAAAA"></div>
    <p>This process is automatic. Your browser will redirect shortly.</p>
    <div class="footer">Ray ID: 85a1b2c3 &middot; Performance &amp; security by Cloudflare</div>
  </div>
</body>
</html>
"#;

const RECAPTCHA_FORM: &str = r#"
<!DOCTYPE html>
<html>
<head><script src="https://www.google.com/recaptcha/api.js" async defer></script></head>
<body>
  <form action="/submit" method="POST">
    <div class="g-recaptcha" data-sitekey="6LeIxAcTAAAAAJcZ"></div>
    <input type="submit" value="Submit">
  </form>
</body>
</html>
"#;

const PERIMETERX_BLOCK: &str = r#"
<!DOCTYPE html>
<html>
<head><title>Access to this page has been denied.</title></head>
<body>
  <div id="px-captcha"></div>
  <p>Please verify you are a human. Press &amp; Hold the button below.</p>
  <script src="https://captcha.px-cdn.net/PXabcdef/captcha.js"></script>
</body>
</html>
"#;

#[test]
fn cloudflare_interstitial_trips_both_classifiers() {
    let snapshot = PageSnapshot {
        html: CLOUDFLARE_INTERSTITIAL,
        text: "Just a moment... Checking your browser before accessing example.com",
        status: 503,
    };

    let captcha = detect_captcha(&snapshot);
    assert!(captcha.detected);
    assert_eq!(captcha.provider, Some(CaptchaProvider::Turnstile));
    assert_eq!(captcha.confidence, Confidence::High);

    let block = detect_block(&snapshot);
    assert!(block.blocked);
    assert_eq!(block.provider, Some(WafProvider::Cloudflare));
    assert_eq!(block.reason, Some(BlockReason::AccessDenied));
    assert_eq!(block.confidence, Confidence::High);
}

#[test]
fn recaptcha_on_ordinary_form_does_not_mark_the_page_blocked() {
    let snapshot = PageSnapshot {
        html: RECAPTCHA_FORM,
        text: "Submit",
        status: 200,
    };

    let captcha = detect_captcha(&snapshot);
    assert!(captcha.detected);
    assert_eq!(captcha.provider, Some(CaptchaProvider::Recaptcha));
    assert_eq!(captcha.selector.as_deref(), Some("iframe[src*=\"recaptcha\"]"));

    // A contact form with a CAPTCHA widget is not a WAF block page.
    let block = detect_block(&snapshot);
    assert!(!block.blocked);
}

#[test]
fn perimeterx_press_and_hold_page() {
    let snapshot = PageSnapshot {
        html: PERIMETERX_BLOCK,
        text: "Access to this page has been denied. Please verify you are a human. Press & Hold the button below.",
        status: 403,
    };

    let block = detect_block(&snapshot);
    assert!(block.blocked);
    assert_eq!(block.provider, Some(WafProvider::Perimeterx));
    assert_eq!(block.reason, Some(BlockReason::AccessDenied));
    assert_eq!(block.confidence, Confidence::High);
}

#[test]
fn classifiers_agree_on_independent_reads_of_one_snapshot() {
    // Both classifiers only read the snapshot; running them in either order
    // (or concurrently, as the pipeline does) must give identical results.
    let snapshot = PageSnapshot {
        html: CLOUDFLARE_INTERSTITIAL,
        text: "Checking your browser before accessing",
        status: 503,
    };

    let first = (detect_captcha(&snapshot), detect_block(&snapshot));
    let second = (detect_captcha(&snapshot), detect_block(&snapshot));
    assert_eq!(first.0.provider, second.0.provider);
    assert_eq!(first.1.provider, second.1.provider);
    assert_eq!(first.1.reason, second.1.reason);
}
