//! # Shopfront Infrastructure
//!
//! Impure half of the gateway: everything that performs I/O.
//!
//! This crate contains:
//! - The reqwest-based HTTP transport and response snapshots
//! - Request deduplication with a per-domain throttle
//! - Retrying fetches built on the shared retry executor
//! - Named rate limit policies for inbound storefront traffic
//! - Configuration loading, tracing setup and gateway counters
//!
//! ## Architecture
//! - Builds on the primitives in `shopfront-common`
//! - Speaks the error and config types of `shopfront-domain`
//! - [`Gateway`] wires it all together

pub mod auth;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod http;
pub mod observability;
pub mod rate_limit;

// Re-export commonly used items
pub use auth::UpstreamCredentials;
pub use errors::InfraError;
pub use gateway::Gateway;
pub use http::*;
pub use observability::{init_tracing, GatewayMetrics, GatewayMetricsSnapshot, LogFormat};
pub use rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimitRegistry, RequestContext};
