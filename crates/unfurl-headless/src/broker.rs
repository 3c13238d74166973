//! Context broker: turns a validated render request into a fully dressed
//! browsing-context lease.
//!
//! Every context gets, in order: the stealth init script (installed before
//! any site script, in every frame), user-agent / locale / timezone /
//! viewport overrides, UA-consistent extra headers and, when requested,
//! script execution disabled. Proxy settings are applied at context
//! creation.

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetScriptExecutionDisabledParams,
    SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::Page;
use tracing::{debug, warn};

use unfurl_stealth::{consistent_headers, random_desktop_agent, stealth_script, FingerprintOptions};

use crate::error::BrokerError;
use crate::pool::{BrowserPool, Lease, ReservedSlot};
use crate::proxy::ProxySettings;

/// Per-request session configuration the broker applies to a fresh context.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub fingerprint: FingerprintOptions,
    pub proxy: Option<ProxySettings>,
    pub javascript_enabled: bool,
    /// Overrides the pool's queued-acquisition deadline.
    pub acquire_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            fingerprint: FingerprintOptions::default(),
            proxy: None,
            javascript_enabled: true,
            acquire_timeout: None,
        }
    }
}

/// Thin layer over the pool that owns context preparation.
pub struct ContextBroker {
    pool: Arc<BrowserPool>,
}

impl ContextBroker {
    pub fn new(pool: Arc<BrowserPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<BrowserPool> {
        &self.pool
    }

    /// Acquire a slot and build an isolated, fingerprinted context on it.
    ///
    /// The slot reservation is rolled back if any preparation step fails, so
    /// a failed lease never costs capacity.
    pub async fn lease_context(&self, options: &SessionOptions) -> Result<Lease, BrokerError> {
        let slot = self.pool.acquire_slot(options.acquire_timeout).await?;

        match Self::build_context(&slot, options).await {
            Ok((context_id, page)) => Ok(self.pool.complete_lease(slot, context_id, page)),
            Err(e) => {
                self.pool.release_reserved(slot).await;
                Err(e)
            }
        }
    }

    async fn build_context(
        slot: &ReservedSlot,
        options: &SessionOptions,
    ) -> Result<(BrowserContextId, Page), BrokerError> {
        let params = CreateBrowserContextParams {
            dispose_on_detach: Some(true),
            proxy_server: options.proxy.as_ref().map(|p| p.server_url()),
            ..Default::default()
        };
        let created = slot
            .handle
            .execute(params)
            .await
            .map_err(|e| BrokerError::Context(format!("createBrowserContext: {e}")))?;
        let context_id = created.browser_context_id.clone();

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(BrokerError::Context)?;
        let page = match slot.handle.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                Self::dispose_context(slot, context_id).await;
                return Err(BrokerError::Context(format!("createTarget: {e}")));
            }
        };

        if let Err(e) = Self::prepare_page(&page, options).await {
            let _ = page.clone().close().await;
            Self::dispose_context(slot, context_id).await;
            return Err(e);
        }

        Ok((context_id, page))
    }

    async fn dispose_context(slot: &ReservedSlot, context_id: BrowserContextId) {
        match DisposeBrowserContextParams::builder()
            .browser_context_id(context_id)
            .build()
        {
            Ok(params) => {
                if let Err(e) = slot.handle.execute(params).await {
                    debug!(error = %e, "failed to dispose half-built context");
                }
            }
            Err(e) => debug!(error = %e, "invalid dispose params for half-built context"),
        }
    }

    /// Apply stealth injection, fingerprint overrides and headers to a fresh
    /// page, before any navigation.
    async fn prepare_page(page: &Page, options: &SessionOptions) -> Result<(), BrokerError> {
        let fingerprint = &options.fingerprint;
        let user_agent = fingerprint
            .user_agent
            .clone()
            .unwrap_or_else(|| random_desktop_agent().to_string());
        let accept_language = fingerprint.accept_language();

        // The init script must be registered before navigation so it runs
        // ahead of any site script, iframes included.
        page.execute(AddScriptToEvaluateOnNewDocumentParams {
            source: stealth_script().to_string(),
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        })
        .await
        .map_err(|e| BrokerError::Context(format!("stealth injection: {e}")))?;

        page.execute(SetUserAgentOverrideParams {
            user_agent: user_agent.clone(),
            accept_language: Some(accept_language.clone()),
            platform: Some(navigator_platform(&user_agent).to_string()),
            user_agent_metadata: None,
        })
        .await
        .map_err(|e| BrokerError::Context(format!("user agent override: {e}")))?;

        page.execute(SetLocaleOverrideParams {
            locale: Some(fingerprint.locale.clone()),
        })
        .await
        .map_err(|e| BrokerError::Context(format!("locale override: {e}")))?;

        // Invalid timezone ids come from user input; they shape the
        // fingerprint only, so log and continue instead of failing the lease.
        if let Err(e) = page
            .execute(SetTimezoneOverrideParams {
                timezone_id: fingerprint.timezone.clone(),
            })
            .await
        {
            warn!(timezone = %fingerprint.timezone, error = %e, "timezone override rejected");
        }

        let viewport = SetDeviceMetricsOverrideParams::builder()
            .width(fingerprint.viewport.width as i64)
            .height(fingerprint.viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(BrokerError::Context)?;
        page.execute(viewport)
            .await
            .map_err(|e| BrokerError::Context(format!("viewport override: {e}")))?;

        if !options.javascript_enabled {
            page.execute(SetScriptExecutionDisabledParams { value: true })
                .await
                .map_err(|e| BrokerError::Context(format!("disable script execution: {e}")))?;
        }

        let mut header_map = serde_json::Map::new();
        for (name, value) in consistent_headers(&user_agent, &accept_language) {
            header_map.insert(name, serde_json::Value::String(value));
        }
        page.execute(SetExtraHttpHeadersParams {
            headers: Headers::new(serde_json::Value::Object(header_map)),
        })
        .await
        .map_err(|e| BrokerError::Context(format!("extra headers: {e}")))?;

        debug!(
            user_agent = %user_agent,
            locale = %fingerprint.locale,
            javascript = options.javascript_enabled,
            proxied = options.proxy.is_some(),
            "browsing context prepared"
        );
        Ok(())
    }
}

/// `navigator.platform` value consistent with the UA's OS token.
fn navigator_platform(user_agent: &str) -> &'static str {
    if user_agent.contains("Windows") {
        "Win32"
    } else if user_agent.contains("Mac OS X") || user_agent.contains("Macintosh") {
        "MacIntel"
    } else {
        "Linux x86_64"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_defaults_enable_javascript() {
        let options = SessionOptions::default();
        assert!(options.javascript_enabled);
        assert!(options.proxy.is_none());
        assert!(options.acquire_timeout.is_none());
    }

    #[test]
    fn navigator_platform_tracks_ua_os() {
        assert_eq!(
            navigator_platform("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/122.0.0.0"),
            "Win32"
        );
        assert_eq!(
            navigator_platform("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) Chrome/122.0.0.0"),
            "MacIntel"
        );
        assert_eq!(
            navigator_platform("Mozilla/5.0 (X11; Linux x86_64) Chrome/122.0.0.0"),
            "Linux x86_64"
        );
    }
}
