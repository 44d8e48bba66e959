//! Resilience patterns for outbound request handling
//!
//! This module provides **generic, reusable** building blocks:
//! - **Clock**: real and mock time so window arithmetic is testable without
//!   sleeping
//! - **Windowed Rate Limiter**: per-key sliding-window quotas with fail-closed
//!   misconfiguration handling
//! - **Sweep Task**: a start/stop-capable background task that evicts stale
//!   limiter entries
//! - **Retry Logic**: exponential backoff with pluggable retry policies
//!
//! Nothing here knows about HTTP. The infrastructure crate composes these
//! primitives into the request deduplicator and `fetch_with_retry`.

pub mod clock;
pub mod rate_limiter;
pub mod retry;
pub mod sweep;

pub use clock::{Clock, MockClock, SystemClock};
pub use rate_limiter::{NamespacedLimiter, RateLimitEntry, WindowedRateLimiter, MAX_WINDOW};
pub use retry::{
    policies, retry_with_policy, RetryConfig, RetryDecision, RetryExecutor, RetryOutcome,
    RetryPolicy,
};
pub use sweep::{SweepHandle, SweepTask, Sweepable, DEFAULT_SWEEP_INTERVAL};
