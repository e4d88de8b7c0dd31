//! Global logging setup.
//!
//! Spans and events from `tracing` and records from the `log` facade end up
//! in the same formatter. `RUST_LOG` overrides the configured level.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::BulkconvError;

fn parse_level(level: &str) -> Result<LevelFilter, BulkconvError> {
    level
        .trim()
        .parse::<LevelFilter>()
        .map_err(|e| BulkconvError::Telemetry(format!("invalid log level '{}': {}", level, e)))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(logging: &LoggingConfig) -> Result<(), BulkconvError> {
    let level = parse_level(&logging.level)?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = if logging.json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer().compact().with_target(true).boxed()
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        BulkconvError::Telemetry(format!("failed to install tracing subscriber: {}", e))
    })?;

    tracing_log::LogTracer::init()
        .map_err(|e| BulkconvError::Telemetry(format!("failed to bridge log records: {}", e)))
}
