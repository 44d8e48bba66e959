//! Configuration loader
//!
//! Loads gateway configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. A `.env` file in the working directory (or a parent) is applied to the
//!    process environment if present
//! 2. If `SHOPFRONT_BASE_URL` is set, configuration comes from environment
//!    variables
//! 3. Otherwise the loader searches for a config file
//! 4. JSON and TOML are both accepted
//!
//! ## Environment Variables
//! - `SHOPFRONT_BASE_URL`: upstream REST root (required for env loading)
//! - `SHOPFRONT_ENVIRONMENT`: `development`, `test`, `staging`, `production`
//! - `SHOPFRONT_CONSUMER_KEY` / `SHOPFRONT_CONSUMER_SECRET`
//! - `SHOPFRONT_USER_AGENT`
//! - `SHOPFRONT_REQUEST_TIMEOUT_MS`
//! - `SHOPFRONT_DOMAIN_MAX_REQUESTS`, `SHOPFRONT_DOMAIN_WINDOW_MS`
//! - `SHOPFRONT_DEDUP_TIMEOUT_MS`, `SHOPFRONT_RETRY_AFTER_MS`
//! - `SHOPFRONT_MAX_RETRIES`, `SHOPFRONT_BASE_DELAY_MS`
//! - `SHOPFRONT_SWEEP_INTERVAL_MS`
//!
//! ## File Locations
//! The loader checks, in order, `shopfront.toml`, `shopfront.json`,
//! `config.toml` and `config.json` in the working directory, its parent and
//! grandparent, then next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use shopfront_domain::constants::ENV_PREFIX;
use shopfront_domain::{Environment, GatewayConfig, GatewayError, Result};

const FILE_NAMES: [&str; 4] = ["shopfront.toml", "shopfront.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `GatewayError::Config` if no source yields a valid configuration.
pub fn load() -> Result<GatewayConfig> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Applied .env file"),
        Err(err) if err.not_found() => {}
        Err(err) => tracing::warn!(error = %err, "Ignoring unreadable .env file"),
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `SHOPFRONT_*` environment variables
///
/// # Errors
/// Returns `GatewayError::Config` if `SHOPFRONT_BASE_URL` is missing or any
/// variable has an invalid value.
pub fn load_from_env() -> Result<GatewayConfig> {
    load_from_vars(|name| std::env::var(name).ok())
}

/// Build configuration from any variable source.
///
/// `lookup` receives full variable names, prefix included.
pub fn load_from_vars<F>(lookup: F) -> Result<GatewayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

    let mut config = GatewayConfig::default();
    config.upstream.base_url = var("BASE_URL").ok_or_else(|| {
        GatewayError::Config(format!("Missing required environment variable: {ENV_PREFIX}BASE_URL"))
    })?;

    if let Some(value) = var("ENVIRONMENT") {
        config.environment = Environment::from_str(&value)?;
    }
    if let Some(value) = var("CONSUMER_KEY") {
        config.upstream.consumer_key = Some(value);
    }
    if let Some(value) = var("CONSUMER_SECRET") {
        config.upstream.consumer_secret = Some(value);
    }
    if let Some(value) = var("USER_AGENT") {
        config.upstream.user_agent = value;
    }

    parse_into(&var, "REQUEST_TIMEOUT_MS", &mut config.upstream.request_timeout_ms)?;
    parse_into(&var, "DOMAIN_MAX_REQUESTS", &mut config.deduplicator.domain_max_requests)?;
    parse_into(&var, "DOMAIN_WINDOW_MS", &mut config.deduplicator.domain_window_ms)?;
    parse_into(&var, "DEDUP_TIMEOUT_MS", &mut config.deduplicator.default_timeout_ms)?;
    parse_into(&var, "RETRY_AFTER_MS", &mut config.deduplicator.default_retry_after_ms)?;
    parse_into(&var, "MAX_RETRIES", &mut config.retry.max_retries)?;
    parse_into(&var, "BASE_DELAY_MS", &mut config.retry.base_delay_ms)?;
    parse_into(&var, "SWEEP_INTERVAL_MS", &mut config.sweep_interval_ms)?;

    validate(&config)?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches the standard locations.
///
/// # Errors
/// Returns `GatewayError::Config` if the file is missing, unreadable,
/// malformed, or fails validation.
pub fn load_from_file(path: Option<PathBuf>) -> Result<GatewayConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(GatewayError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => find_config_path().ok_or_else(|| {
            GatewayError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| GatewayError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    validate(&config)?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`); anything else
/// is treated as JSON.
///
/// # Errors
/// Returns `GatewayError::Config` if parsing fails.
pub fn parse_config(contents: &str, path: &Path) -> Result<GatewayConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| GatewayError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| GatewayError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(GatewayError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Check a parsed configuration before use
///
/// # Errors
/// Returns `GatewayError::Config` describing the first problem found.
pub fn validate(config: &GatewayConfig) -> Result<()> {
    config.validate()?;
    url::Url::parse(&config.upstream.base_url)
        .map_err(|e| GatewayError::Config(format!("Invalid upstream.base_url: {e}")))?;
    Ok(())
}

/// Search the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn find_config_path() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join("..")]);
        }
    }

    roots
        .iter()
        .flat_map(|root| FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn parse_into<T, F>(var: &F, suffix: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var(suffix) {
        *slot = raw.trim().parse().map_err(|e| {
            GatewayError::Config(format!("Invalid value for {ENV_PREFIX}{suffix}: {e}"))
        })?;
    }
    Ok(())
}
