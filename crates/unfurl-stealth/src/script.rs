//! The injected stealth init script.

/// Marker property the script installs on `globalThis`; repeated injection
/// (per frame, per navigation) bails out when it is present.
pub const STEALTH_MARKER: &str = "__ufMasked";

/// The init script applied to every browsing context before any page script
/// runs. Masks the automation signals anti-bot vendors probe first:
/// `navigator.webdriver`, the plugin/mimeType shape, notification permission
/// queries, WebGL vendor strings, canvas pixel data, hardware hints and
/// outer window dimensions.
pub fn stealth_script() -> &'static str {
    include_str!("stealth.js")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_guards_against_double_installation() {
        let script = stealth_script();
        assert!(script.contains(STEALTH_MARKER));
        // The guard must be installed non-enumerably so it is not itself a
        // fingerprint surface.
        assert!(script.contains("enumerable: false"));
        // Guard check precedes the property definition.
        let check = script.find("getOwnPropertyDescriptor").expect("guard check");
        let install = script.find("defineProperty").expect("guard install");
        assert!(check < install);
    }

    #[test]
    fn script_covers_the_masked_surfaces() {
        let script = stealth_script();
        for surface in [
            "webdriver",
            "plugins",
            "mimeTypes",
            "notifications",
            "getParameter",
            "toDataURL",
            "hardwareConcurrency",
            "deviceMemory",
            "connection",
            "outerWidth",
        ] {
            assert!(script.contains(surface), "missing mask for {surface}");
        }
    }
}
