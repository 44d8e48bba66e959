//! WooCommerce consumer credentials
//!
//! The REST API accepts HTTP Basic auth with the consumer key as user name
//! and the consumer secret as password.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use shopfront_domain::{GatewayError, UpstreamConfig};

/// Consumer key and secret for the upstream store
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamCredentials {
    consumer_key: String,
    consumer_secret: String,
}

impl UpstreamCredentials {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self { consumer_key: consumer_key.into(), consumer_secret: consumer_secret.into() }
    }

    /// Credentials from configuration, `None` when none are configured
    pub fn from_config(config: &UpstreamConfig) -> Result<Option<Self>, GatewayError> {
        match (&config.consumer_key, &config.consumer_secret) {
            (Some(key), Some(secret)) => Ok(Some(Self::new(key.clone(), secret.clone()))),
            (None, None) => Ok(None),
            _ => Err(GatewayError::Config(
                "consumer_key and consumer_secret must be set together".into(),
            )),
        }
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        let raw = format!("{}:{}", self.consumer_key, self.consumer_secret);
        format!("Basic {}", BASE64.encode(raw))
    }
}

impl fmt::Debug for UpstreamCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamCredentials")
            .field("consumer_key", &"<redacted>")
            .field("consumer_secret", &"<redacted>")
            .finish()
    }
}
