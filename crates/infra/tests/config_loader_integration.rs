//! Integration tests for configuration loader
//!
//! Tests loading gateway configuration from the process environment and
//! from files on disk.

use std::io::Write;
use std::path::PathBuf;

use parking_lot::Mutex;
use shopfront_domain::{Environment, GatewayError, RateLimitSettings};
use shopfront_infra::config;
use tempfile::{NamedTempFile, TempDir};

/// Environment variables are process-wide; tests touching them run one at a time.
static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

const VARS: [&str; 5] = [
    "SHOPFRONT_BASE_URL",
    "SHOPFRONT_ENVIRONMENT",
    "SHOPFRONT_DOMAIN_MAX_REQUESTS",
    "SHOPFRONT_CONSUMER_KEY",
    "SHOPFRONT_CONSUMER_SECRET",
];

fn clear_vars() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
fn test_load_from_env_reads_prefixed_variables() {
    let _guard = ENV_LOCK.lock();
    clear_vars();

    std::env::set_var("SHOPFRONT_BASE_URL", "https://shop.example.com/wp-json/wc/v3");
    std::env::set_var("SHOPFRONT_ENVIRONMENT", "prod");
    std::env::set_var("SHOPFRONT_DOMAIN_MAX_REQUESTS", "12");
    std::env::set_var("SHOPFRONT_CONSUMER_KEY", "ck_live");
    std::env::set_var("SHOPFRONT_CONSUMER_SECRET", "cs_live");

    let result = config::load_from_env();
    clear_vars();

    let config = result.expect("environment config should load");
    assert_eq!(config.upstream.base_url, "https://shop.example.com/wp-json/wc/v3");
    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.deduplicator.domain_max_requests, 12);
    assert_eq!(config.upstream.consumer_secret.as_deref(), Some("cs_live"));

    // Secrets never show up in debug output
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("cs_live"));
}

#[test]
fn test_load_from_env_without_base_url_fails() {
    let _guard = ENV_LOCK.lock();
    clear_vars();

    let result = config::load_from_env();
    assert!(matches!(result, Err(GatewayError::Config(_))));
}

#[test]
fn test_load_from_env_rejects_unknown_environment() {
    let _guard = ENV_LOCK.lock();
    clear_vars();

    std::env::set_var("SHOPFRONT_BASE_URL", "https://shop.example.com");
    std::env::set_var("SHOPFRONT_ENVIRONMENT", "qa-cluster-7");

    let result = config::load_from_env();
    clear_vars();

    assert!(matches!(result, Err(GatewayError::Config(_))));
}

/// Validates a full TOML file, rate limit overrides included.
///
/// # Test Steps
/// 1. Write a TOML config into a temp dir
/// 2. Load it by explicit path
/// 3. Check overridden and defaulted fields
#[test]
fn test_load_toml_file_with_overrides() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("shopfront.toml");
    std::fs::write(
        &path,
        r#"
environment = "staging"

[upstream]
base_url = "https://staging.shop.example.com/wp-json/wc/v3"
consumer_key = "ck_stage"
consumer_secret = "cs_stage"
request_timeout_ms = 5000

[retry]
max_retries = 5
base_delay_ms = 200

[rate_limits.search]
max_requests = 10
window_ms = 30000
skip_successful_requests = false
"#,
    )
    .expect("Failed to write config");

    let config = config::load_from_file(Some(path)).expect("TOML config should load");

    assert_eq!(config.environment, Environment::Staging);
    assert_eq!(config.upstream.request_timeout_ms, 5_000);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.rate_limits.search, Some(RateLimitSettings::new(10, 30_000)));
    assert_eq!(config.rate_limits.otp, None);
    assert_eq!(config.deduplicator.domain_max_requests, 5);
}

#[test]
fn test_load_json_file() {
    let mut temp_file = NamedTempFile::with_suffix(".json").expect("Failed to create temp file");
    temp_file
        .write_all(
            br#"{
                "environment": "test",
                "upstream": { "base_url": "http://127.0.0.1:9000" },
                "deduplicator": { "default_retry_after_ms": 250 }
            }"#,
        )
        .expect("Failed to write to temp file");

    let config = config::load_from_file(Some(temp_file.path().to_path_buf()))
        .expect("JSON config should load");

    assert_eq!(config.environment, Environment::Test);
    assert_eq!(config.deduplicator.default_retry_after_ms, 250);
}

#[test]
fn test_file_that_fails_validation_is_rejected() {
    let mut temp_file = NamedTempFile::with_suffix(".toml").expect("Failed to create temp file");
    writeln!(
        temp_file,
        "[upstream]\nbase_url = \"https://shop.example.com\"\nconsumer_key = \"ck_only\""
    )
    .expect("Failed to write to temp file");

    let result = config::load_from_file(Some(temp_file.path().to_path_buf()));
    assert!(matches!(result, Err(GatewayError::Config(msg)) if msg.contains("together")));
}

#[test]
fn test_malformed_json_is_config_error() {
    let mut temp_file = NamedTempFile::with_suffix(".json").expect("Failed to create temp file");
    temp_file.write_all(b"{ not json").expect("Failed to write to temp file");

    let result = config::load_from_file(Some(temp_file.path().to_path_buf()));
    assert!(matches!(result, Err(GatewayError::Config(msg)) if msg.contains("JSON")));
}

#[test]
fn test_missing_explicit_path() {
    let result = config::load_from_file(Some(PathBuf::from("/nonexistent/shopfront.toml")));
    assert!(result.is_err());
}
