use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigError, LogFormat, LogLevel};

/// Filter for the subscriber. `RUST_LOG` wins over the configured level.
fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber writing to stdout.
///
/// `Json` emits one flattened object per event for log shippers, `Text`
/// emits colored multi-line records for a terminal. Fails if a global
/// subscriber is already set.
pub fn init_logging(level: LogLevel, format: LogFormat) -> Result<(), ConfigError> {
    let registry = tracing_subscriber::registry().with(env_filter(level));

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(false),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().pretty().with_target(true).with_ansi(true))
            .try_init(),
    }
    .map_err(|e| ConfigError::Logging(e.to_string()))
}

/// Root span entered for the lifetime of the agent.
pub fn service_span(name: &'static str, version: &'static str) -> Span {
    tracing::info_span!("service", name, version)
}
