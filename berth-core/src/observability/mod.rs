//! Observability infrastructure: tracing and metrics.
//!
//! Logging goes through `tracing`; counters go through the `metrics` facade and
//! are no-ops until the embedding application installs a recorder.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Initialize logging.
///
/// `RUST_LOG` wins when set; otherwise `level` (a level or a full filter
/// directive such as `berth_core=debug`) is used. Output goes to stderr so
/// command output on stdout stays clean.
///
/// Calling this twice is harmless: the second call reports an error and leaves
/// the first subscriber in place.
pub fn init(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .try_init()?;

    metrics::register_core_metrics();
    Ok(())
}
