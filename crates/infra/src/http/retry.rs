//! Retrying HTTP fetch
//!
//! Binds the generic retry executor around a single HTTP call. Any non-2xx
//! answer becomes a [`GatewayError::Upstream`] so the structured policy can
//! classify it by status.

use shopfront_common::resilience::policies::ClassifiedRetry;
use shopfront_common::resilience::{RetryConfig, RetryExecutor};
use shopfront_domain::{GatewayError, RetryOptions};
use tracing::instrument;

use super::{HttpClient, RequestOptions, UpstreamResponse};

/// Executor settings for `options`
pub fn retry_config(options: &RetryOptions) -> RetryConfig {
    RetryConfig::exponential(options.max_retries, options.base_delay())
}

/// Fetch `url`, retrying transient failures with exponential backoff.
///
/// 4xx answers other than 429 are returned after the first attempt. The
/// error from the last attempt is returned unchanged.
#[instrument(
    skip(client, options),
    fields(method = %options.method, max_retries = retry.max_retries)
)]
pub async fn fetch_with_retry(
    client: &HttpClient,
    url: &str,
    options: &RequestOptions,
    retry: &RetryOptions,
) -> Result<UpstreamResponse, GatewayError> {
    RetryExecutor::new(retry_config(retry), ClassifiedRetry)
        .execute(|| async { client.execute(url, options).await?.error_for_status() })
        .await
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fast(max_retries: u32) -> RetryOptions {
        RetryOptions::new(max_retries, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn recovers_from_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let options = RequestOptions::get();
        let response = fetch_with_retry(&client, &server.uri(), &options, &fast(3)).await.unwrap();

        assert_eq!(response.text(), "ok");
    }

    #[tokio::test]
    async fn not_found_is_attempted_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let error = fetch_with_retry(&client, &server.uri(), &RequestOptions::get(), &fast(3))
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(404));
    }

    #[tokio::test]
    async fn auth_failure_is_attempted_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let error = fetch_with_retry(&client, &server.uri(), &RequestOptions::get(), &fast(3))
            .await
            .unwrap_err();

        assert!(error.should_not_retry());
    }

    #[tokio::test]
    async fn always_500_uses_full_budget_and_returns_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(4)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let started = Instant::now();
        let error = fetch_with_retry(&client, &server.uri(), &RequestOptions::get(), &fast(3))
            .await
            .unwrap_err();

        assert_eq!(error, GatewayError::upstream(500, "Internal Server Error").with_body("boom"));
        // 10 + 20 + 40 ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(70));
    }

    #[tokio::test]
    async fn rate_limited_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

        let client = HttpClient::new().unwrap();
        let response =
            fetch_with_retry(&client, &server.uri(), &RequestOptions::get(), &fast(1)).await;

        assert!(response.is_ok());
    }

    #[test]
    fn retry_config_mirrors_options() {
        let config = retry_config(&RetryOptions::default());
        assert_eq!(config, RetryConfig::exponential(3, Duration::from_millis(1_000)));
    }
}
