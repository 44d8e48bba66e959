//! Configuration structures
//!
//! Every field has a default, so a config file only needs to name what it
//! changes. Durations are stored as milliseconds and exposed as
//! [`Duration`] through accessor methods.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::errors::{GatewayError, Result};

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Staging => "staging",
            Self::Production => "production",
        };
        f.write_str(name)
    }
}

impl FromStr for Environment {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(GatewayError::Config(format!("unknown environment '{other}'"))),
        }
    }
}

/// Where upstream calls go and how they authenticate
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub user_agent: String,
    pub request_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            consumer_key: None,
            consumer_secret: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("consumer_key", &self.consumer_key.as_ref().map(|_| "<redacted>"))
            .field("consumer_secret", &self.consumer_secret.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Per-domain throttle and 429 handling for the request deduplicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeduplicatorConfig {
    pub domain_max_requests: u32,
    pub domain_window_ms: u64,
    pub default_timeout_ms: u64,
    pub default_retry_after_ms: u64,
}

impl Default for DeduplicatorConfig {
    fn default() -> Self {
        Self {
            domain_max_requests: DEFAULT_DOMAIN_MAX_REQUESTS,
            domain_window_ms: DEFAULT_DOMAIN_WINDOW_MS,
            default_timeout_ms: DEFAULT_DEDUP_TIMEOUT_MS,
            default_retry_after_ms: DEFAULT_RETRY_AFTER_MS,
        }
    }
}

impl DeduplicatorConfig {
    pub fn domain_window(&self) -> Duration {
        Duration::from_millis(self.domain_window_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_millis(self.default_retry_after_ms)
    }
}

/// Retry budget and backoff unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay_ms * 2^n`
    pub base_delay_ms: u64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self { max_retries: DEFAULT_MAX_RETRIES, base_delay_ms: DEFAULT_BASE_DELAY_MS }
    }
}

impl RetryOptions {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        let base_delay_ms = u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX);
        Self { max_retries, base_delay_ms }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Quota for one named inbound rate limit policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_ms: u64,
    #[serde(default)]
    pub skip_successful_requests: bool,
}

impl RateLimitSettings {
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self { max_requests, window_ms, skip_successful_requests: false }
    }

    #[must_use]
    pub const fn skip_successful(mut self) -> Self {
        self.skip_successful_requests = true;
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Login attempts
    pub const fn auth() -> Self {
        Self::new(AUTH_MAX_REQUESTS, AUTH_WINDOW_MS).skip_successful()
    }

    /// Catalogue search
    pub const fn search() -> Self {
        Self::new(SEARCH_MAX_REQUESTS, SEARCH_WINDOW_MS)
    }

    /// General API traffic
    pub const fn api() -> Self {
        Self::new(API_MAX_REQUESTS, API_WINDOW_MS)
    }

    /// One-time password requests
    pub const fn otp() -> Self {
        Self::new(OTP_MAX_REQUESTS, OTP_WINDOW_MS)
    }
}

/// Optional overrides for the named inbound policies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitOverrides {
    pub auth: Option<RateLimitSettings>,
    pub search: Option<RateLimitSettings>,
    pub api: Option<RateLimitSettings>,
    pub otp: Option<RateLimitSettings>,
}

impl RateLimitOverrides {
    /// Configured `window_ms` of each override, keyed by its config path
    fn windows(&self) -> Vec<(&'static str, u64)> {
        [
            ("rate_limits.auth.window_ms", &self.auth),
            ("rate_limits.search.window_ms", &self.search),
            ("rate_limits.api.window_ms", &self.api),
            ("rate_limits.otp.window_ms", &self.otp),
        ]
        .into_iter()
        .filter_map(|(name, settings)| settings.as_ref().map(|s| (name, s.window_ms)))
        .collect()
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub upstream: UpstreamConfig,
    pub deduplicator: DeduplicatorConfig,
    pub retry: RetryOptions,
    pub rate_limits: RateLimitOverrides,
    pub sweep_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            upstream: UpstreamConfig::default(),
            deduplicator: DeduplicatorConfig::default(),
            retry: RetryOptions::default(),
            rate_limits: RateLimitOverrides::default(),
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl GatewayConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Reject settings the gateway cannot run with.
    ///
    /// The outbound domain quota must admit at least one request. Inbound
    /// policies may carry a zero quota; their limiter fails closed on it.
    /// Every duration is capped at [`MAX_DURATION_MS`].
    pub fn validate(&self) -> Result<()> {
        let base_url = self.upstream.base_url.trim();
        if base_url.is_empty() {
            return Err(GatewayError::Config("upstream.base_url must not be empty".into()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(GatewayError::Config(format!(
                "upstream.base_url must be an http(s) URL, got '{base_url}'"
            )));
        }
        if self.upstream.consumer_key.is_some() != self.upstream.consumer_secret.is_some() {
            return Err(GatewayError::Config(
                "consumer_key and consumer_secret must be set together".into(),
            ));
        }

        let positive = [
            ("upstream.request_timeout_ms", self.upstream.request_timeout_ms),
            ("deduplicator.domain_window_ms", self.deduplicator.domain_window_ms),
            ("deduplicator.default_timeout_ms", self.deduplicator.default_timeout_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(GatewayError::Config(format!("{name} must be greater than 0")));
            }
        }
        if self.deduplicator.domain_max_requests == 0 {
            return Err(GatewayError::Config(
                "deduplicator.domain_max_requests must be greater than 0".into(),
            ));
        }

        let mut durations = vec![
            ("upstream.request_timeout_ms", self.upstream.request_timeout_ms),
            ("deduplicator.domain_window_ms", self.deduplicator.domain_window_ms),
            ("deduplicator.default_timeout_ms", self.deduplicator.default_timeout_ms),
            ("deduplicator.default_retry_after_ms", self.deduplicator.default_retry_after_ms),
            ("retry.base_delay_ms", self.retry.base_delay_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
        ];
        durations.extend(self.rate_limits.windows());
        for (name, value) in durations {
            if value > MAX_DURATION_MS {
                return Err(GatewayError::Config(format!(
                    "{name} must be at most {MAX_DURATION_MS} ms, got {value}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.deduplicator.domain_max_requests, 5);
        assert_eq!(config.deduplicator.domain_window(), Duration::from_secs(60));
        assert_eq!(config.deduplicator.default_timeout(), Duration::from_secs(10));
        assert_eq!(config.deduplicator.default_retry_after(), Duration::from_secs(10));
        assert_eq!(config.retry, RetryOptions { max_retries: 3, base_delay_ms: 1_000 });
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            environment = "production"

            [upstream]
            base_url = "https://shop.example.com/wp-json/wc/v3"

            [retry]
            max_retries = 5

            [rate_limits.search]
            max_requests = 10
            window_ms = 1000
            "#,
        )
        .unwrap();

        assert!(config.environment.is_production());
        assert_eq!(config.upstream.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.rate_limits.search, Some(RateLimitSettings::new(10, 1_000)));
        assert_eq!(config.rate_limits.auth, None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = GatewayConfig::default();
        config.upstream.base_url = "ftp://nope".into();
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));

        let mut config = GatewayConfig::default();
        config.deduplicator.default_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(GatewayError::Config(msg)) if msg.contains("default_timeout_ms")
        ));

        let mut config = GatewayConfig::default();
        config.upstream.consumer_key = Some("ck_only".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_domain_quota() {
        let mut config = GatewayConfig::default();
        config.deduplicator.domain_max_requests = 0;
        assert!(matches!(
            config.validate(),
            Err(GatewayError::Config(msg)) if msg.contains("domain_max_requests")
        ));

        // Inbound policies fail closed instead
        let mut config = GatewayConfig::default();
        config.rate_limits.otp = Some(RateLimitSettings::new(0, 60_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_caps_durations() {
        let mut config = GatewayConfig::default();
        config.deduplicator.domain_window_ms = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(GatewayError::Config(msg)) if msg.contains("domain_window_ms")
        ));

        let mut config = GatewayConfig::default();
        config.rate_limits.search = Some(RateLimitSettings::new(10, u64::MAX));
        assert!(matches!(
            config.validate(),
            Err(GatewayError::Config(msg)) if msg.contains("rate_limits.search.window_ms")
        ));

        let mut config = GatewayConfig::default();
        config.retry.base_delay_ms = MAX_DURATION_MS + 1;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.upstream.request_timeout_ms = MAX_DURATION_MS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!(" staging ".parse::<Environment>().unwrap(), Environment::Staging);
        assert!("moon".parse::<Environment>().is_err());
        assert_eq!(Environment::Test.to_string(), "test");
    }

    #[test]
    fn test_upstream_debug_redacts_secrets() {
        let upstream = UpstreamConfig {
            consumer_key: Some("ck_live_123".into()),
            consumer_secret: Some("cs_live_456".into()),
            ..UpstreamConfig::default()
        };
        let rendered = format!("{upstream:?}");

        assert!(!rendered.contains("ck_live_123"));
        assert!(!rendered.contains("cs_live_456"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_named_presets() {
        assert_eq!(RateLimitSettings::auth().window(), Duration::from_secs(15 * 60));
        assert!(RateLimitSettings::auth().skip_successful_requests);
        assert_eq!(RateLimitSettings::search().max_requests, 30);
        assert_eq!(RateLimitSettings::api().max_requests, 100);
        assert_eq!(RateLimitSettings::otp().window(), Duration::from_secs(600));
    }
}
