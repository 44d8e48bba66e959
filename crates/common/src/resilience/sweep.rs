//! Periodic eviction of stale rate limit state
//!
//! A [`SweepTask`] calls [`Sweepable::sweep_expired`] on a fixed interval
//! until its [`SweepHandle`] is stopped or dropped. The first sweep happens
//! one full interval after start.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interval used when callers do not configure one
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// State that can drop its own expired entries
pub trait Sweepable: Send + Sync + 'static {
    /// Remove expired entries, returning how many were removed
    fn sweep_expired(&self) -> usize;
}

impl<S: Sweepable + ?Sized> Sweepable for Arc<S> {
    fn sweep_expired(&self) -> usize {
        (**self).sweep_expired()
    }
}

impl Sweepable for Vec<Arc<dyn Sweepable>> {
    fn sweep_expired(&self) -> usize {
        self.iter().map(|target| target.sweep_expired()).sum()
    }
}

/// Spawns the background sweep loop
#[derive(Debug)]
pub struct SweepTask;

impl SweepTask {
    /// Start sweeping `target` every `interval`.
    ///
    /// Must be called from within a tokio runtime. A zero interval falls back
    /// to [`DEFAULT_SWEEP_INTERVAL`].
    pub fn start<S: Sweepable>(target: S, interval: Duration) -> SweepHandle {
        let interval = if interval.is_zero() {
            warn!("Zero sweep interval requested, using default");
            DEFAULT_SWEEP_INTERVAL
        } else {
            interval
        };

        let cancellation = CancellationToken::new();
        let cancel = cancellation.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Sweep task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = target.sweep_expired();
                        debug!(removed, "Sweep tick");
                    }
                }
            }
        });

        info!(?interval, "Sweep task started");
        SweepHandle { cancellation, handle: Some(handle) }
    }
}

/// Owner of a running sweep task
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct SweepHandle {
    cancellation: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Ask the task to stop. Idempotent.
    pub fn stop(&self) {
        if !self.cancellation.is_cancelled() {
            self.cancellation.cancel();
            info!("Sweep task stopped");
        }
    }

    /// Returns true while the task has not been stopped and has not exited
    pub fn is_running(&self) -> bool {
        !self.cancellation.is_cancelled()
            && self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(error = ?err, "Sweep task ended abnormally");
            }
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}
