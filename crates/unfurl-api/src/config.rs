//! Environment-driven service configuration.

use std::time::Duration;

use unfurl_headless::PoolConfig;

/// Full service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
    pub pool: PoolConfig,
    pub rate_limit_enabled: bool,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: u32,
    pub log_level: String,
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_enabled: true,
            pool: PoolConfig::default(),
            rate_limit_enabled: true,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max_requests: 30,
            log_level: "info".to_string(),
            environment: "development".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Read configuration from the environment, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let pool_defaults = PoolConfig::default();

        Self {
            host: env_string("HOST", &defaults.host),
            port: env_parse("PORT", defaults.port),
            cors_enabled: env_bool("CORS_ENABLED", defaults.cors_enabled),
            pool: PoolConfig {
                min_browsers: env_parse("POOL_MIN_BROWSERS", pool_defaults.min_browsers),
                max_browsers: env_parse("POOL_MAX_BROWSERS", pool_defaults.max_browsers),
                max_contexts_per_browser: env_parse(
                    "POOL_MAX_CONTEXTS",
                    pool_defaults.max_contexts_per_browser,
                ),
                idle_timeout: Duration::from_millis(env_parse(
                    "BROWSER_IDLE_TIMEOUT",
                    pool_defaults.idle_timeout.as_millis() as u64,
                )),
                health_check_interval: Duration::from_millis(env_parse(
                    "HEALTH_CHECK_INTERVAL",
                    pool_defaults.health_check_interval.as_millis() as u64,
                )),
                acquire_timeout: pool_defaults.acquire_timeout,
            },
            rate_limit_enabled: env_bool("RATE_LIMIT_ENABLED", defaults.rate_limit_enabled),
            rate_limit_window: Duration::from_millis(env_parse(
                "RATE_LIMIT_WINDOW_MS",
                defaults.rate_limit_window.as_millis() as u64,
            )),
            rate_limit_max_requests: env_parse(
                "RATE_LIMIT_MAX_REQUESTS",
                defaults.rate_limit_max_requests,
            ),
            log_level: env_string("LOG_LEVEL", &defaults.log_level),
            environment: env_string("UNFURL_ENV", &defaults.environment),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Raw error messages are only exposed outside production.
    pub fn expose_error_details(&self) -> bool {
        self.environment != "production"
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "false" | "0" | "no" | "off"
        ),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.cors_enabled);
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.rate_limit_max_requests, 30);
        assert!(config.expose_error_details());
    }

    #[test]
    fn production_hides_error_details() {
        let config = ServiceConfig {
            environment: "production".to_string(),
            ..Default::default()
        };
        assert!(!config.expose_error_details());
    }

    #[test]
    fn env_bool_parses_common_falsy_values() {
        // Parsing helpers only; the environment itself is not touched here
        // to keep tests independent of execution order.
        assert!(env_bool("UNFURL_TEST_UNSET_FLAG", true));
        assert!(!env_bool("UNFURL_TEST_UNSET_FLAG_2", false));
    }
}
