//! Retry with exponential backoff and pluggable retry policies
//!
//! [`RetryExecutor`] runs an async operation up to `max_retries + 1` times.
//! After each failure a [`RetryPolicy`] classifies the error; retryable
//! failures wait for the backoff delay and try again, everything else
//! propagates. The caller always gets the operation's own error back, never
//! a wrapper.
//!
//! Per call the executor moves through
//! `Attempting(n) -> Succeeded` or
//! `Attempting(n) -> Classifying -> Failed | Waiting(delay) -> Attempting(n+1)`.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, instrument, warn};

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Decide what to do after `error` on the zero-based `attempt`
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation after the backoff delay
    Retry,
    /// Don't retry the operation
    Stop,
}

/// Retry budget and exponential backoff schedule
///
/// The delay before retry `n` (zero-based) is `base_delay * 2^n`, without
/// jitter, saturating instead of overflowing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(1_000))
    }
}

impl RetryConfig {
    /// Exponential backoff with the given retry budget and base delay
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the retry following zero-based `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Result of a retry execution plus what it took to get there
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final value or the last error, unchanged
    pub result: Result<T, E>,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Each delay slept between attempts, in order
    pub delays: Vec<Duration>,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }

    /// Sum of all delays slept
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// The main retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// Execute an operation with retry logic
    #[instrument(skip(self, operation), fields(max_retries = self.config.max_retries))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation with retry logic and report attempts and delays.
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut delays = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            debug!("Executing operation (attempt {}/{})", attempt + 1, max_attempts);

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Operation succeeded after {} retries", attempt);
                    }
                    return RetryOutcome { result: Ok(value), attempts: attempt + 1, delays };
                }
                Err(error) => error,
            };

            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!("Retry policy determined not to retry: {:?}", error);
                    return RetryOutcome { result: Err(error), attempts: attempt + 1, delays };
                }
                _ if attempt + 1 >= max_attempts => {
                    warn!(
                        "All retry attempts exhausted after {} tries, last error: {:?}",
                        attempt + 1,
                        error
                    );
                    return RetryOutcome { result: Err(error), attempts: attempt + 1, delays };
                }
                RetryDecision::Retry => self.config.calculate_delay(attempt),
            };

            warn!("Operation failed (attempt {}), retrying after {:?}", attempt + 1, delay);
            tokio::time::sleep(delay).await;
            delays.push(delay);
            attempt += 1;
        }
    }
}

/// Convenience function to create a retry executor and execute an operation
pub async fn retry_with_policy<F, Fut, T, E, P>(
    config: RetryConfig,
    policy: P,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: RetryPolicy<E>,
    E: fmt::Debug,
{
    RetryExecutor::new(config, policy).execute(operation).await
}

/// Policies that classify gateway failures
pub mod policies {
    use super::*;
    use crate::error::ErrorClassification;

    const STATUS_MARKER: &str = "HTTP error! status: ";

    /// Retries whatever the error classifies as retryable.
    ///
    /// Suggested delays from [`ErrorClassification::retry_after`] are ignored
    /// so the backoff schedule stays exact.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ClassifiedRetry;

    impl<E: ErrorClassification> RetryPolicy<E> for ClassifiedRetry {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if error.is_retryable() {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }

    /// Classifies opaque errors by their rendered message.
    ///
    /// Useful when the error type carries nothing but text, e.g. `anyhow`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct StatusMessageRetry;

    impl<E: fmt::Display> RetryPolicy<E> for StatusMessageRetry {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if should_not_retry_message(&error.to_string()) {
                RetryDecision::Stop
            } else {
                RetryDecision::Retry
            }
        }
    }

    /// True when `message` describes a client error that retrying cannot fix.
    ///
    /// `"HTTP error! status: 4NN"` stops for every 4xx except 429, and any
    /// mention of 401 or 403 stops regardless of format.
    pub fn should_not_retry_message(message: &str) -> bool {
        let status_is_client_error = message.match_indices(STATUS_MARKER).any(|(idx, _)| {
            let code: String = message[idx + STATUS_MARKER.len()..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            code.len() == 3 && code.starts_with('4') && code != "429"
        });

        status_is_client_error || message.contains("401") || message.contains("403")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::policies::*;
    use super::*;
    use crate::error::{ErrorClassification, ErrorSeverity};

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl ErrorClassification for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }

        fn severity(&self) -> ErrorSeverity {
            ErrorSeverity::Warning
        }

        fn is_critical(&self) -> bool {
            false
        }

        fn retry_after(&self) -> Option<Duration> {
            Some(Duration::from_secs(30))
        }
    }

    /// Exponential backoff doubles from the base delay and saturates.
    #[test]
    fn test_exponential_delays() {
        let config = RetryConfig::default();

        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.calculate_delay(0), Duration::from_millis(1_000));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(2_000));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(4_000));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(8_000));

        assert!(config.calculate_delay(200) >= config.calculate_delay(31));
        assert_eq!(RetryConfig::exponential(u32::MAX, Duration::ZERO).max_attempts(), u32::MAX);
    }

    /// Verifies the documented schedule:
    /// - three retries after the first failure
    /// - delays of 1 s, 2 s and 4 s
    /// - the last error returned unchanged
    #[tokio::test(start_paused = true)]
    async fn test_exhausts_with_exponential_schedule() {
        let executor = RetryExecutor::new(RetryConfig::default(), ClassifiedRetry);
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = executor
            .execute_with_outcome(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError::Transient)
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(
            outcome.delays,
            vec![
                Duration::from_millis(1_000),
                Duration::from_millis(2_000),
                Duration::from_millis(4_000)
            ]
        );
        assert_eq!(outcome.total_delay(), Duration::from_millis(7_000));
        assert_eq!(outcome.result, Err(TestError::Transient));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_propagates_without_delay() {
        let executor = RetryExecutor::new(RetryConfig::default(), ClassifiedRetry);
        let started = tokio::time::Instant::now();

        let outcome =
            executor.execute_with_outcome(|| async { Err::<(), _>(TestError::Fatal) }).await;

        assert_eq!(outcome.attempts, 1);
        assert!(outcome.delays.is_empty());
        assert_eq!(outcome.result, Err(TestError::Fatal));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = retry_with_policy(RetryConfig::default(), ClassifiedRetry, || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_runs_once() {
        let config = RetryConfig::exponential(0, Duration::from_millis(1_000));
        let outcome = RetryExecutor::new(config, ClassifiedRetry)
            .execute_with_outcome(|| async { Err::<(), _>(TestError::Transient) })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert!(outcome.delays.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_policy_sees_attempt_index() {
        struct FirstRetryOnly(Arc<parking_lot::Mutex<Vec<u32>>>);

        impl RetryPolicy<TestError> for FirstRetryOnly {
            fn should_retry(&self, _error: &TestError, attempt: u32) -> RetryDecision {
                self.0.lock().push(attempt);
                if attempt < 1 {
                    RetryDecision::Retry
                } else {
                    RetryDecision::Stop
                }
            }
        }

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let outcome = RetryExecutor::new(RetryConfig::default(), FirstRetryOnly(Arc::clone(&seen)))
            .execute_with_outcome(|| async { Err::<(), _>(TestError::Transient) })
            .await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.delays, vec![Duration::from_millis(1_000)]);
        assert_eq!(*seen.lock(), vec![0, 1]);
    }

    #[test]
    fn test_status_message_classification() {
        assert!(should_not_retry_message("HTTP error! status: 404"));
        assert!(should_not_retry_message("HTTP error! status: 400 Bad Request"));
        assert!(should_not_retry_message("request rejected with 401"));
        assert!(should_not_retry_message("upstream said 403 forbidden"));

        assert!(!should_not_retry_message("HTTP error! status: 429"));
        assert!(!should_not_retry_message("HTTP error! status: 500"));
        assert!(!should_not_retry_message("HTTP error! status: 503"));
        assert!(!should_not_retry_message("connection reset by peer"));
    }

    #[test]
    fn test_status_message_policy_uses_display() {
        let policy = StatusMessageRetry;

        assert_eq!(
            policy.should_retry(&"HTTP error! status: 418".to_string(), 0),
            RetryDecision::Stop
        );
        assert_eq!(policy.should_retry(&"timed out".to_string(), 0), RetryDecision::Retry);
    }
}
