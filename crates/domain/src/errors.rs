//! Error types used throughout the gateway

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shopfront_common::error::{ErrorClassification, ErrorSeverity};
use thiserror::Error;

/// Coarse category of a non-2xx upstream status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// 429
    RateLimited,
    /// 401 or 403
    Auth,
    /// 404
    NotFound,
    /// Any other 4xx
    Client,
    /// 5xx
    Server,
    /// Anything else that is not 2xx (1xx, 3xx)
    Other,
}

impl UpstreamErrorKind {
    /// Categorise an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            401 | 403 => Self::Auth,
            404 => Self::NotFound,
            400..=499 => Self::Client,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    /// Whether a retry can plausibly change the outcome
    pub fn is_transient(self) -> bool {
        matches!(self, Self::RateLimited | Self::Server)
    }
}

/// Main error type for the gateway
///
/// Cloneable so one in-flight failure can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum GatewayError {
    /// The upstream answered with a non-2xx status
    #[error("HTTP error! status: {status} {status_text}")]
    Upstream {
        status: u16,
        status_text: String,
        kind: UpstreamErrorKind,
        body: Option<String>,
        retry_after: Option<Duration>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Build an `Upstream` error, deriving the kind from the status
    pub fn upstream(status: u16, status_text: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            status_text: status_text.into(),
            kind: UpstreamErrorKind::from_status(status),
            body: None,
            retry_after: None,
        }
    }

    /// Attach the response body to an `Upstream` error; no-op otherwise
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        if let Self::Upstream { body: slot, .. } = &mut self {
            *slot = Some(body.into());
        }
        self
    }

    /// Attach a server-suggested delay to an `Upstream` error; no-op otherwise
    #[must_use]
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        if let Self::Upstream { retry_after: slot, .. } = &mut self {
            *slot = Some(delay);
        }
        self
    }

    /// Upstream status code, if this error carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Upstream error kind, if this error carries one
    pub fn kind(&self) -> Option<UpstreamErrorKind> {
        match self {
            Self::Upstream { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True when retrying cannot help.
    ///
    /// Every 4xx except 429 stops, and auth failures stop even when the
    /// status was not recorded as a 4xx. Misconfiguration and refused
    /// operations stop too. Everything else, decode failures included, is
    /// treated as transient.
    pub fn should_not_retry(&self) -> bool {
        match self {
            Self::Upstream { status, kind, .. } => {
                let client_error = (400..500).contains(status) && *status != 429;
                let auth_failure = *kind == UpstreamErrorKind::Auth;
                client_error || auth_failure
            }
            Self::Network(_) | Self::Timeout(_) | Self::InvalidRequest(_) | Self::Internal(_) => {
                false
            }
            Self::Config(_) | Self::Forbidden(_) => true,
        }
    }
}

impl ErrorClassification for GatewayError {
    fn is_retryable(&self) -> bool {
        !self.should_not_retry()
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Upstream { kind: UpstreamErrorKind::NotFound, .. } => ErrorSeverity::Info,
            Self::Upstream { kind: UpstreamErrorKind::RateLimited | UpstreamErrorKind::Server, .. }
            | Self::Timeout(_) => ErrorSeverity::Warning,
            Self::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Upstream { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
