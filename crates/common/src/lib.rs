//! Modular common utilities shared across Shopfront crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification
//! - `runtime`: async resilience (clock, windowed rate limiter, sweep task,
//!   retry executor)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    retry_with_policy, Clock, MockClock, NamespacedLimiter, RetryConfig, RetryDecision,
    RetryExecutor, RetryOutcome, RetryPolicy, SweepHandle, SweepTask, Sweepable, SystemClock,
    WindowedRateLimiter,
};
