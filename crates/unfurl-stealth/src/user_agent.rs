//! User agent selection and header consistency.
//!
//! The pool holds realistic desktop agents only. Mobile agents are excluded
//! on purpose: a phone UA paired with a 1366x768 viewport and desktop client
//! hints is itself a detection signal.

use rand::seq::SliceRandom;

/// Fixed pool of realistic desktop user agents.
pub const DESKTOP_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36 Edg/122.0.0.0",
];

const FALLBACK_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Pick a user agent uniformly at random from the desktop pool.
pub fn random_desktop_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    DESKTOP_AGENTS.choose(&mut rng).copied().unwrap_or(FALLBACK_AGENT)
}

/// Whether a user agent belongs to the Chromium family (Chrome, Edge,
/// Chromium forks). Client-hint headers are only sent for these.
pub fn is_chromium_family(user_agent: &str) -> bool {
    user_agent.contains("Chrome/") && !user_agent.contains("Firefox/")
}

/// Extract the Chrome major version for `sec-ch-ua` brand lists.
fn chrome_major_version(user_agent: &str) -> Option<&str> {
    let rest = user_agent.split("Chrome/").nth(1)?;
    rest.split('.').next()
}

/// Platform value for `sec-ch-ua-platform`, derived from the UA's OS token.
fn client_hint_platform(user_agent: &str) -> &'static str {
    if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("Mac OS X") || user_agent.contains("Macintosh") {
        "macOS"
    } else {
        "Linux"
    }
}

/// Generate extra HTTP headers consistent with the chosen user agent.
///
/// Every context gets `Accept` and `Accept-Language`; Chromium-family agents
/// additionally get the low-entropy client hints Chrome itself sends, so the
/// header set and the UA never disagree about the browser brand.
pub fn consistent_headers(user_agent: &str, accept_language: &str) -> Vec<(String, String)> {
    let mut headers = vec![
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                .to_string(),
        ),
        ("Accept-Language".to_string(), accept_language.to_string()),
    ];

    if is_chromium_family(user_agent) {
        let major = chrome_major_version(user_agent).unwrap_or("122");
        headers.push((
            "sec-ch-ua".to_string(),
            format!(
                "\"Chromium\";v=\"{major}\", \"Google Chrome\";v=\"{major}\", \"Not(A:Brand\";v=\"24\""
            ),
        ));
        headers.push(("sec-ch-ua-mobile".to_string(), "?0".to_string()));
        headers.push((
            "sec-ch-ua-platform".to_string(),
            format!("\"{}\"", client_hint_platform(user_agent)),
        ));
    }

    headers
}

/// Build an `Accept-Language` value from a BCP 47 locale, e.g.
/// `en-US` -> `en-US,en;q=0.9`.
pub fn accept_language_for(locale: &str) -> String {
    match locale.split(['-', '_']).next() {
        Some(primary) if primary != locale => format!("{locale},{primary};q=0.9"),
        _ => locale.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_is_desktop_only() {
        for agent in DESKTOP_AGENTS {
            assert!(!agent.contains("Mobile"), "mobile agent in pool: {agent}");
            assert!(!agent.contains("iPhone"), "mobile agent in pool: {agent}");
            assert!(!agent.contains("Android"), "mobile agent in pool: {agent}");
        }
    }

    #[test]
    fn random_pick_comes_from_pool() {
        for _ in 0..50 {
            let agent = random_desktop_agent();
            assert!(DESKTOP_AGENTS.contains(&agent));
        }
    }

    #[test]
    fn chromium_family_detection() {
        assert!(is_chromium_family(DESKTOP_AGENTS[0]));
        assert!(!is_chromium_family(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0"
        ));
        assert!(!is_chromium_family(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15"
        ));
    }

    #[test]
    fn client_hints_only_for_chromium() {
        let chrome = consistent_headers(DESKTOP_AGENTS[0], "en-US,en;q=0.9");
        assert!(chrome.iter().any(|(name, _)| name == "sec-ch-ua"));
        assert!(chrome
            .iter()
            .any(|(name, value)| name == "sec-ch-ua" && value.contains("v=\"122\"")));

        let firefox = consistent_headers(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
            "en-US,en;q=0.9",
        );
        assert!(!firefox.iter().any(|(name, _)| name.starts_with("sec-ch-ua")));
        assert!(firefox.iter().any(|(name, _)| name == "Accept"));
    }

    #[test]
    fn platform_hint_matches_ua_os() {
        let mac = consistent_headers(DESKTOP_AGENTS[2], "en-US");
        assert!(mac
            .iter()
            .any(|(name, value)| name == "sec-ch-ua-platform" && value == "\"macOS\""));
    }

    #[test]
    fn accept_language_derivation() {
        assert_eq!(accept_language_for("en-US"), "en-US,en;q=0.9");
        assert_eq!(accept_language_for("de-DE"), "de-DE,de;q=0.9");
        assert_eq!(accept_language_for("en"), "en");
    }
}
