//! Sliding-window rate limiting keyed by caller-supplied identity
//!
//! Each key remembers the instants of the requests it was granted inside the
//! trailing window. A new request is admitted while fewer than `max_requests`
//! instants remain after pruning. Window boundaries are inclusive of `now`
//! and exclusive of `now - window`: a timestamp exactly `window` old no
//! longer counts.
//!
//! Misconfiguration (`max_requests == 0` or a zero window) denies traffic
//! instead of panicking, so a bad setting fails closed. Windows longer than
//! [`MAX_WINDOW`] are clamped to it.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//!
//! use shopfront_common::resilience::WindowedRateLimiter;
//!
//! let limiter = WindowedRateLimiter::new();
//! let window = Duration::from_secs(60);
//!
//! assert!(limiter.is_allowed("203.0.113.7", 2, window));
//! assert!(limiter.is_allowed("203.0.113.7", 2, window));
//! assert!(!limiter.is_allowed("203.0.113.7", 2, window));
//! assert!(limiter.time_until_reset("203.0.113.7", window) > Duration::ZERO);
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::sweep::Sweepable;
use super::{Clock, SystemClock};

/// Longest window the limiter tracks
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Per-key bookkeeping for the sliding window
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    /// Granted request instants, oldest first
    pub request_timestamps: VecDeque<Instant>,
    /// Instant after which the entry is stale and gets replaced
    pub window_reset_at: Instant,
}

impl RateLimitEntry {
    fn new(now: Instant, window: Duration) -> Self {
        Self { request_timestamps: VecDeque::new(), window_reset_at: now + window }
    }

    /// Drop every timestamp that is `window` old or older
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.request_timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.request_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn active_count(&self, now: Instant, window: Duration) -> usize {
        self.request_timestamps
            .iter()
            .filter(|ts| now.saturating_duration_since(**ts) < window)
            .count()
    }
}

/// Sliding-window rate limiter
///
/// Clones share state, so one limiter can be handed to the sweep task and to
/// every call site that needs it.
pub struct WindowedRateLimiter<C: Clock = SystemClock> {
    entries: Arc<Mutex<HashMap<String, RateLimitEntry>>>,
    clock: Arc<C>,
}

impl WindowedRateLimiter<SystemClock> {
    /// Create a limiter reading the system clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for WindowedRateLimiter<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> WindowedRateLimiter<C> {
    /// Create a limiter with a custom clock
    pub fn with_clock(clock: C) -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), clock: Arc::new(clock) }
    }

    /// Check whether `key` may make another request and record it if so.
    ///
    /// Pruning, the quota check and recording happen under one lock, so two
    /// concurrent callers can never both take the last slot.
    pub fn is_allowed(&self, key: &str, max_requests: u32, window: Duration) -> bool {
        if max_requests == 0 || window.is_zero() {
            debug!(key, max_requests, ?window, "Rate limit misconfigured, denying request");
            return false;
        }
        let window = window.min(MAX_WINDOW);

        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let entry =
            entries.entry(key.to_string()).or_insert_with(|| RateLimitEntry::new(now, window));
        if entry.window_reset_at <= now {
            *entry = RateLimitEntry::new(now, window);
        }
        entry.prune(now, window);

        if entry.request_timestamps.len() < usize::try_from(max_requests).unwrap_or(usize::MAX) {
            entry.request_timestamps.push_back(now);
            entry.window_reset_at = now + window;
            trace!(key, count = entry.request_timestamps.len(), max_requests, "Request admitted");
            true
        } else {
            debug!(key, max_requests, ?window, "Rate limit exceeded");
            false
        }
    }

    /// Time until the oldest recorded request leaves the window.
    ///
    /// Returns `Duration::ZERO` when the key is unknown or holds no requests.
    pub fn time_until_reset(&self, key: &str, window: Duration) -> Duration {
        let window = window.min(MAX_WINDOW);
        let now = self.clock.now();
        let entries = self.entries.lock();

        entries
            .get(key)
            .and_then(|entry| {
                entry
                    .request_timestamps
                    .iter()
                    .find(|ts| now.saturating_duration_since(**ts) < window)
                    .copied()
            })
            .map(|oldest| (oldest + window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Requests still available to `key` in the current window, without
    /// recording anything.
    pub fn remaining(&self, key: &str, max_requests: u32, window: Duration) -> u32 {
        if max_requests == 0 || window.is_zero() {
            return 0;
        }
        let window = window.min(MAX_WINDOW);

        let now = self.clock.now();
        let entries = self.entries.lock();
        let used = entries.get(key).map_or(0, |entry| entry.active_count(now, window));

        max_requests.saturating_sub(u32::try_from(used).unwrap_or(u32::MAX))
    }

    /// Give back the most recently recorded request for `key`.
    ///
    /// Returns `false` when there was nothing to release.
    pub fn release(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let released = entries.get_mut(key).and_then(|entry| entry.request_timestamps.pop_back());

        if released.is_some() {
            trace!(key, "Released recorded request");
        }
        released.is_some()
    }

    /// Remove entries whose window has fully elapsed.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();

        entries.retain(|_, entry| entry.window_reset_at > now);

        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Swept expired rate limit entries");
        }
        removed
    }

    /// Drop all rate limit state.
    ///
    /// Intended for development resets; callers gate it on the environment.
    pub fn clear_all(&self) {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "Cleared all rate limit entries");
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.entries.lock().len()
    }

    /// Snapshot of the entry for `key`, if any
    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.lock().get(key).cloned()
    }
}

impl<C: Clock> Clone for WindowedRateLimiter<C> {
    fn clone(&self) -> Self {
        Self { entries: Arc::clone(&self.entries), clock: Arc::clone(&self.clock) }
    }
}

impl<C: Clock> fmt::Debug for WindowedRateLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowedRateLimiter").field("tracked_keys", &self.tracked_keys()).finish()
    }
}

impl<C: Clock> Sweepable for WindowedRateLimiter<C> {
    fn sweep_expired(&self) -> usize {
        WindowedRateLimiter::sweep_expired(self)
    }
}

/// A limiter view that folds a namespace prefix into every key
///
/// Two namespaces backed by the same limiter never share counters:
/// `auth:203.0.113.7` and `search:203.0.113.7` are different keys.
#[derive(Clone)]
pub struct NamespacedLimiter<C: Clock = SystemClock> {
    namespace: String,
    limiter: WindowedRateLimiter<C>,
}

impl<C: Clock> NamespacedLimiter<C> {
    /// Wrap `limiter` so every key is prefixed with `namespace`
    pub fn new(namespace: impl Into<String>, limiter: WindowedRateLimiter<C>) -> Self {
        Self { namespace: namespace.into(), limiter }
    }

    /// Namespace prefix
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Underlying shared limiter
    pub fn limiter(&self) -> &WindowedRateLimiter<C> {
        &self.limiter
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// See [`WindowedRateLimiter::is_allowed`]
    pub fn is_allowed(&self, key: &str, max_requests: u32, window: Duration) -> bool {
        self.limiter.is_allowed(&self.scoped(key), max_requests, window)
    }

    /// See [`WindowedRateLimiter::time_until_reset`]
    pub fn time_until_reset(&self, key: &str, window: Duration) -> Duration {
        self.limiter.time_until_reset(&self.scoped(key), window)
    }

    /// See [`WindowedRateLimiter::remaining`]
    pub fn remaining(&self, key: &str, max_requests: u32, window: Duration) -> u32 {
        self.limiter.remaining(&self.scoped(key), max_requests, window)
    }

    /// See [`WindowedRateLimiter::release`]
    pub fn release(&self, key: &str) -> bool {
        self.limiter.release(&self.scoped(key))
    }
}

impl<C: Clock> fmt::Debug for NamespacedLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespacedLimiter").field("namespace", &self.namespace).finish()
    }
}
