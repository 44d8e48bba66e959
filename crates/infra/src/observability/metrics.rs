//! Gateway counters
//!
//! Plain atomic counters, no locking. Durations are stored in microseconds
//! and reported in milliseconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Counters for the outbound request path
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    upstream_calls: AtomicU64,
    dedup_hits: AtomicU64,
    rate_limit_waits: AtomicU64,
    upstream_429_retries: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    total_call_time_micros: AtomicU64,
}

/// Point-in-time copy of [`GatewayMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GatewayMetricsSnapshot {
    pub upstream_calls: u64,
    pub dedup_hits: u64,
    pub rate_limit_waits: u64,
    pub upstream_429_retries: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub total_call_time_ms: u64,
    pub avg_call_time_ms: f64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// One request reached the network and took `elapsed`
    pub fn record_upstream_call(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

        // SeqCst keeps total and count consistent for the average
        self.total_call_time_micros.fetch_add(micros, Ordering::SeqCst);
        self.upstream_calls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_dedup_hit(&self) {
        self.dedup_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_wait(&self) {
        self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_429_retry(&self) {
        self.upstream_429_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GatewayMetricsSnapshot {
        let total_micros = self.total_call_time_micros.load(Ordering::SeqCst);
        let calls = self.upstream_calls.load(Ordering::SeqCst);
        let avg_call_time_ms =
            if calls == 0 { 0.0 } else { (total_micros as f64 / calls as f64) / 1_000.0 };

        GatewayMetricsSnapshot {
            upstream_calls: calls,
            dedup_hits: self.dedup_hits.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
            upstream_429_retries: self.upstream_429_retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            total_call_time_ms: total_micros / 1_000,
            avg_call_time_ms,
        }
    }
}
