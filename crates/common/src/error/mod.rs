//! Common error classification for Shopfront crates
//!
//! Error types across the workspace describe themselves through the
//! [`ErrorClassification`] trait so that retry logic, logging and callers
//! mapping failures onto HTTP responses all read the same signal instead of
//! parsing human-readable messages.
//!
//! ## ErrorSeverity Levels
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Info** | Expected conditions | Resource not found |
//! | **Warning** | Degraded but operational | Upstream rate limiting, transient failures |
//! | **Error** | Failure requiring attention | Network errors, rejected requests, config errors |
//! | **Critical** | System integrity at risk | Internal invariant violations |
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//!
//! use shopfront_common::error::{ErrorClassification, ErrorSeverity};
//!
//! #[derive(Debug)]
//! enum FetchError {
//!     Throttled(Duration),
//!     Rejected(u16),
//! }
//!
//! impl ErrorClassification for FetchError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, Self::Throttled(_))
//!     }
//!
//!     fn severity(&self) -> ErrorSeverity {
//!         match self {
//!             Self::Throttled(_) => ErrorSeverity::Warning,
//!             Self::Rejected(_) => ErrorSeverity::Error,
//!         }
//!     }
//!
//!     fn is_critical(&self) -> bool {
//!         false
//!     }
//!
//!     fn retry_after(&self) -> Option<Duration> {
//!         match self {
//!             Self::Throttled(delay) => Some(*delay),
//!             Self::Rejected(_) => None,
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::time::Duration;

/// Standard interface for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again, such as:
    /// - Network timeouts and connection resets
    /// - Upstream rate limiting
    /// - Upstream server errors
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for monitoring, alerting, and logging decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when a specific delay is recommended (e.g.
    /// from a Retry-After header), `None` otherwise.
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
