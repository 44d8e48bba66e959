//! Application constants
//!
//! Defaults for every tunable the gateway exposes. Configuration structures
//! fall back to these when a field is omitted.

// Upstream defaults
pub const DEFAULT_BASE_URL: &str = "http://localhost/wp-json/wc/v3";
pub const DEFAULT_USER_AGENT: &str = "shopfront-gateway/0.1";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

// Deduplicator: per-domain throttle and 429 handling
pub const DEFAULT_DOMAIN_MAX_REQUESTS: u32 = 5;
pub const DEFAULT_DOMAIN_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_DEDUP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRY_AFTER_MS: u64 = 10_000;

// Retry executor
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

// Upper bound for every configured duration
pub const MAX_DURATION_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

// Stale limiter entries are swept on this interval
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

// Named inbound rate limit policies
pub const AUTH_MAX_REQUESTS: u32 = 5;
pub const AUTH_WINDOW_MS: u64 = 15 * 60 * 1_000;
pub const SEARCH_MAX_REQUESTS: u32 = 30;
pub const SEARCH_WINDOW_MS: u64 = 60 * 1_000;
pub const API_MAX_REQUESTS: u32 = 100;
pub const API_WINDOW_MS: u64 = 15 * 60 * 1_000;
pub const OTP_MAX_REQUESTS: u32 = 3;
pub const OTP_WINDOW_MS: u64 = 10 * 60 * 1_000;

// Environment variables
pub const ENV_PREFIX: &str = "SHOPFRONT_";
pub const RETRY_AFTER_HEADER: &str = "retry-after";
