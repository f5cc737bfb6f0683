//! Process-wide log output.
//!
//! The engine emits `tracing` events and the storage layer uses `log`
//! macros; [`init`] installs one subscriber for both.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("A global tracing subscriber is already installed: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("A global logger is already installed: {0}")]
    Logger(#[from] log::SetLoggerError),
}

/// Installs the human-readable subscriber.
pub fn init() -> Result<(), LoggingError> {
    init_with(LogFormat::Pretty)
}

/// Installs a subscriber writing to stderr in `format`, filtered by
/// `RUST_LOG` (default [`DEFAULT_FILTER`]), and routes `log` records into it.
pub fn init_with(format: LogFormat) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(env_filter());

    match format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr).with_target(true)),
        )?,
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr).json()),
        )?,
    }

    tracing_log::LogTracer::init()?;
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
