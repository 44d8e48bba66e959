//! In-flight request coalescing with a per-domain throttle
//!
//! Concurrent callers asking for the same [`RequestKey`] share one network
//! call and all observe its settlement. Each new call:
//!
//! 1. consults the domain limiter for the target host and, when throttled,
//!    sleeps until a slot frees up, then proceeds;
//! 2. sends the request with the caller's timeout or the configured default;
//! 3. on `429 Too Many Requests` waits for `Retry-After` (whole seconds, or
//!    the configured fallback) and sends exactly once more;
//! 4. turns a non-2xx final answer into [`GatewayError::Upstream`].
//!
//! The call runs on its own task. Callers that stop waiting do not cancel
//! it, and the in-flight entry is removed when the task ends however it
//! ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use shopfront_common::resilience::{Clock, SystemClock, WindowedRateLimiter};
use shopfront_domain::{DeduplicatorConfig, GatewayError};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{HttpClient, RequestKey, RequestOptions, UpstreamResponse};
use crate::errors::InfraError;
use crate::observability::GatewayMetrics;

type SharedCall = Shared<BoxFuture<'static, Result<UpstreamResponse, GatewayError>>>;

struct InFlight {
    generation: u64,
    call: SharedCall,
}

struct DedupInner<C: Clock> {
    client: HttpClient,
    limiter: WindowedRateLimiter<C>,
    config: DeduplicatorConfig,
    metrics: Arc<GatewayMetrics>,
    in_flight: Mutex<HashMap<RequestKey, InFlight>>,
    next_generation: AtomicU64,
}

/// Coalesces identical outbound requests
///
/// Clones share the in-flight table.
pub struct RequestDeduplicator<C: Clock = SystemClock> {
    inner: Arc<DedupInner<C>>,
}

impl RequestDeduplicator<SystemClock> {
    /// Deduplicator with its own domain limiter
    pub fn new(client: HttpClient, config: DeduplicatorConfig) -> Self {
        Self::with_limiter(client, WindowedRateLimiter::new(), config, Arc::default())
    }
}

impl<C: Clock> RequestDeduplicator<C> {
    /// Deduplicator throttling through a shared `limiter`
    pub fn with_limiter(
        client: HttpClient,
        limiter: WindowedRateLimiter<C>,
        config: DeduplicatorConfig,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(DedupInner {
                client,
                limiter,
                config,
                metrics,
                in_flight: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Send `options` to `url`, joining an identical call already in flight.
    #[instrument(skip(self, options), fields(method = %options.method))]
    pub async fn deduplicate(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<UpstreamResponse, GatewayError> {
        let key = RequestKey::new(url, &options);

        let call = {
            let mut in_flight = self.inner.in_flight.lock();
            if let Some(existing) = in_flight.get(&key) {
                debug!(%key, "Joining in-flight request");
                self.inner.metrics.record_dedup_hit();
                existing.call.clone()
            } else {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let call = self.spawn_call(key.clone(), generation, url.to_string(), options);
                in_flight.insert(key, InFlight { generation, call: call.clone() });
                call
            }
        };

        call.await
    }

    /// Forget every in-flight entry. Calls already issued keep running.
    pub fn clear(&self) {
        let mut in_flight = self.inner.in_flight.lock();
        let dropped = in_flight.len();
        in_flight.clear();
        debug!(dropped, "Cleared in-flight requests");
    }

    /// Number of keys with a call in flight
    pub fn ongoing_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Domain limiter shared with this deduplicator
    pub fn limiter(&self) -> &WindowedRateLimiter<C> {
        &self.inner.limiter
    }

    /// Throttle, timeout and 429 settings
    pub fn config(&self) -> &DeduplicatorConfig {
        &self.inner.config
    }

    fn spawn_call(
        &self,
        key: RequestKey,
        generation: u64,
        url: String,
        options: RequestOptions,
    ) -> SharedCall {
        let inner = Arc::clone(&self.inner);

        // Runs under the in-flight lock; the task's guard takes the same lock,
        // so removal can never precede insertion.
        let handle = tokio::spawn(async move {
            let _guard = InFlightGuard { inner: Arc::clone(&inner), key, generation };
            inner.perform(&url, options).await
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => Err(GatewayError::Internal(format!("request task failed: {err}"))),
            }
        }
        .boxed()
        .shared()
    }
}

impl<C: Clock> DedupInner<C> {
    async fn perform(
        &self,
        url: &str,
        mut options: RequestOptions,
    ) -> Result<UpstreamResponse, GatewayError> {
        let host = target_host(url)?;
        self.throttle(&host).await?;

        options.timeout = Some(options.timeout.unwrap_or_else(|| self.config.default_timeout()));

        let mut response = self.send(url, &options).await?;
        if response.status() == 429 {
            let wait = response.retry_after().unwrap_or_else(|| self.config.default_retry_after());
            warn!(%host, ?wait, "Upstream rate limited, retrying once");
            self.metrics.record_429_retry();
            tokio::time::sleep(wait).await;
            response = self.send(url, &options).await?;
        }

        response.error_for_status().inspect_err(|err| {
            debug!(%host, error = %err, "Upstream returned non-success status");
            self.metrics.record_failure();
        })
    }

    /// Wait once for the domain window when it is full, then proceed.
    ///
    /// A zero quota or window admits nothing, so the call is refused.
    async fn throttle(&self, host: &str) -> Result<(), GatewayError> {
        let window = self.config.domain_window();
        let max_requests = self.config.domain_max_requests;
        if max_requests == 0 || window.is_zero() {
            warn!(host, max_requests, ?window, "Domain quota admits no requests");
            self.metrics.record_failure();
            return Err(GatewayError::Config(format!(
                "domain quota for {host} admits no requests (max {max_requests} per {window:?})"
            )));
        }

        if self.limiter.is_allowed(host, max_requests, window) {
            return Ok(());
        }

        let wait = self.limiter.time_until_reset(host, window);
        debug!(host, ?wait, "Domain rate limit reached, waiting");
        self.metrics.record_rate_limit_wait();
        tokio::time::sleep(wait).await;
        Ok(())
    }

    async fn send(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<UpstreamResponse, GatewayError> {
        let started = Instant::now();
        let result = self.client.execute(url, options).await;
        self.metrics.record_upstream_call(started.elapsed());

        if let Err(err) = &result {
            if matches!(err, GatewayError::Timeout(_)) {
                self.metrics.record_timeout();
            }
            self.metrics.record_failure();
        }
        result
    }
}

/// Removes its own generation's entry when the call task ends
struct InFlightGuard<C: Clock> {
    inner: Arc<DedupInner<C>>,
    key: RequestKey,
    generation: u64,
}

impl<C: Clock> Drop for InFlightGuard<C> {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock();
        if in_flight.get(&self.key).is_some_and(|entry| entry.generation == self.generation) {
            in_flight.remove(&self.key);
        }
    }
}

fn target_host(url: &str) -> Result<String, GatewayError> {
    let parsed = Url::parse(url).map_err(|err| GatewayError::from(InfraError::from(err)))?;
    parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| GatewayError::InvalidRequest(format!("URL has no host: {url}")))
}

impl<C: Clock> Clone for RequestDeduplicator<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Clock> std::fmt::Debug for RequestDeduplicator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDeduplicator")
            .field("config", &self.inner.config)
            .field("ongoing", &self.ongoing_count())
            .finish()
    }
}
