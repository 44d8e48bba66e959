//! Conversions from external infrastructure errors into domain errors.

use std::time::Duration;

use reqwest::Error as HttpError;
use serde_json::Error as JsonError;
use shopfront_domain::GatewayError;
use url::ParseError as UrlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub GatewayError);

impl From<InfraError> for GatewayError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<GatewayError> for InfraError {
    fn from(value: GatewayError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoGatewayError {
    fn into_gateway(self) -> GatewayError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → GatewayError */
/* -------------------------------------------------------------------------- */

impl IntoGatewayError for HttpError {
    fn into_gateway(self) -> GatewayError {
        if self.is_timeout() {
            return GatewayError::Network("HTTP request timed out".into());
        }

        if self.is_builder() {
            return GatewayError::InvalidRequest(format!("failed to build HTTP request: {self}"));
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return GatewayError::Network(format!("HTTP connection failure: {self}"));
        }

        if let Some(status) = self.status() {
            return GatewayError::upstream(
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status"),
            );
        }

        if self.is_decode() {
            return GatewayError::Network(format!("failed to decode HTTP response: {self}"));
        }

        GatewayError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_gateway())
    }
}

/// Map a transport failure, reporting timeouts with the deadline that
/// expired.
pub fn transport_error(err: HttpError, timeout: Duration) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(timeout)
    } else {
        InfraError::from(err).into()
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → GatewayError */
/* -------------------------------------------------------------------------- */

impl IntoGatewayError for JsonError {
    fn into_gateway(self) -> GatewayError {
        if self.is_io() {
            GatewayError::Internal(format!("I/O error while handling JSON: {self}"))
        } else {
            GatewayError::InvalidRequest(format!("invalid JSON: {self}"))
        }
    }
}

impl From<JsonError> for InfraError {
    fn from(value: JsonError) -> Self {
        InfraError(value.into_gateway())
    }
}

/* -------------------------------------------------------------------------- */
/* url::ParseError → GatewayError */
/* -------------------------------------------------------------------------- */

impl IntoGatewayError for UrlError {
    fn into_gateway(self) -> GatewayError {
        GatewayError::InvalidRequest(format!("invalid URL: {self}"))
    }
}

impl From<UrlError> for InfraError {
    fn from(value: UrlError) -> Self {
        InfraError(value.into_gateway())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
