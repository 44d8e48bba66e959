//! Buffered, cloneable view of an upstream response

use std::sync::Arc;
use std::time::Duration;

use reqwest::Response;
use serde::de::DeserializeOwned;
use shopfront_domain::constants::RETRY_AFTER_HEADER;
use shopfront_domain::GatewayError;

use crate::errors::InfraError;

/// Snapshot of an HTTP response
///
/// The body is read eagerly and shared behind an `Arc`, so clones handed to
/// concurrent waiters are cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body: Arc<[u8]>,
    url: String,
}

impl UpstreamResponse {
    /// Build a snapshot directly, mostly for tests and fixtures
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let body: Vec<u8> = body.into();
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            headers: Vec::new(),
            body: Arc::from(body),
            url: String::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    /// Read `response` to the end and keep everything needed later.
    ///
    /// Body read failures come back as the raw transport error so callers
    /// can classify timeouts against their own deadline.
    pub async fn read(response: Response) -> Result<Self, reqwest::Error> {
        let status = response.status();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: Arc::from(body.as_ref()),
            url,
        })
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value for `name`, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        serde_json::from_slice(&self.body).map_err(|err| InfraError::from(err).into())
    }

    /// `Retry-After` as whole seconds; HTTP-date values are not understood
    pub fn retry_after(&self) -> Option<Duration> {
        self.header(RETRY_AFTER_HEADER)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Pass 2xx through, turn anything else into `GatewayError::Upstream`
    pub fn error_for_status(self) -> Result<Self, GatewayError> {
        if self.is_success() {
            return Ok(self);
        }

        let mut error = GatewayError::upstream(self.status, self.status_text.clone());
        if !self.body.is_empty() {
            error = error.with_body(self.text());
        }
        if let Some(delay) = self.retry_after() {
            error = error.with_retry_after(delay);
        }
        Err(error)
    }
}

fn canonical_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or_default()
}
