//! Process-wide log/tracing setup.
//!
//! Library code logs through both the `log` facade and `tracing`; `LogTracer`
//! forwards `log` records into the tracing subscriber so both end up in the
//! same output.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Installs the global subscriber. Calling it again is harmless: later calls
/// leave the first subscriber in place and return `false`.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.json {
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_target(true));
        tracing::subscriber::set_global_default(subscriber).is_ok()
    } else {
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true));
        tracing::subscriber::set_global_default(subscriber).is_ok()
    };

    if installed {
        if let Err(e) = tracing_log::LogTracer::init() {
            tracing::warn!("log records will not be forwarded: {}", e);
        }
    }

    installed
}
