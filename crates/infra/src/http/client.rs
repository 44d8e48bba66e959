use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as ReqwestClient;
use shopfront_domain::constants::{DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_USER_AGENT};
use shopfront_domain::GatewayError;
use tracing::debug;

use super::{RequestOptions, UpstreamResponse};
use crate::errors::{transport_error, InfraError};

/// Single-attempt HTTP transport.
///
/// Retrying, throttling and coalescing are layered on top by the
/// deduplicator and the retry executor; this type only sends one request and
/// buffers the answer. Clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    timeout: Duration,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, GatewayError> {
        Self::builder().build()
    }

    /// Timeout applied when a request does not carry its own
    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one request and buffer the response, whatever its status.
    pub async fn execute(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<UpstreamResponse, GatewayError> {
        let timeout = options.timeout.unwrap_or(self.timeout);
        let mut builder = self.client.request(options.method.clone(), url).timeout(timeout);

        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        let request = builder.build().map_err(|err| GatewayError::from(InfraError::from(err)))?;
        let method = request.method().clone();
        let target = request.url().clone();
        debug!(%method, url = %target, ?timeout, "sending HTTP request");

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                debug!(%method, url = %target, error = %err, "HTTP request failed");
                return Err(transport_error(err, timeout));
            }
        };

        debug!(%method, url = %target, status = %response.status(), "received HTTP response");
        UpstreamResponse::read(response).await.map_err(|err| {
            debug!(%method, url = %target, error = %err, "Failed to read HTTP response body");
            transport_error(err, timeout)
        })
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Vec<(String, String)>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            default_headers: Vec::new(),
        }
    }
}

impl HttpClientBuilder {
    /// Timeout for requests that do not set their own
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `User-Agent` sent with every request
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Header sent with every request unless the request overrides it
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Build the underlying reqwest client
    pub fn build(self) -> Result<HttpClient, GatewayError> {
        let mut builder = ReqwestClient::builder().no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if !self.default_headers.is_empty() {
            let mut headers = HeaderMap::new();
            for (name, value) in self.default_headers {
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                    GatewayError::Config(format!("invalid header name '{name}': {err}"))
                })?;
                let value = HeaderValue::from_str(&value).map_err(|err| {
                    GatewayError::Config(format!("invalid value for header '{name}': {err}"))
                })?;
                headers.insert(name, value);
            }
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| GatewayError::from(InfraError::from(err)))?;

        Ok(HttpClient { client, timeout: self.timeout })
    }
}
