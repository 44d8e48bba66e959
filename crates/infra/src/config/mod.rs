//! Configuration loading
//!
//! Reads [`GatewayConfig`](shopfront_domain::GatewayConfig) from
//! `SHOPFRONT_*` environment variables or a TOML/JSON file.

pub mod loader;

pub use loader::{
    load, load_from_env, load_from_file, load_from_vars, parse_config, find_config_path,
    validate,
};
