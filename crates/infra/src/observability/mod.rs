//! Logging setup and gateway counters
//!
//! Library code only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_tracing`] once; later calls are ignored.

pub mod metrics;

pub use metrics::{GatewayMetrics, GatewayMetricsSnapshot};
use tracing_subscriber::EnvFilter;

/// Output format for [`init_tracing`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install a global fmt subscriber filtered by `filter`.
///
/// `RUST_LOG` wins over `filter` when set. Returns `false` when a subscriber
/// was already installed.
pub fn init_tracing(filter: &str, format: LogFormat) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false);

    let installed = match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };

    if installed {
        tracing::debug!(filter, ?format, "Tracing initialised");
    }
    installed
}
