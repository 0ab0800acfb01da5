//! Tracing subscriber installation.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{subscriber::SetGlobalDefaultError, Subscriber};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, ServerConfig};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),

    /// Another subscriber was already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on the first call; later calls are no-ops.
///
/// `RUST_LOG` takes precedence over `server.log_level` when set.
pub fn init(config: &ServerConfig) -> Result<(), TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| ())
}

fn filter(config: &ServerConfig) -> Result<EnvFilter, TelemetryError> {
    let parsed = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(&config.log_level),
    };
    parsed.map_err(|error| TelemetryError::Filter(error.to_string()))
}

fn install_subscriber(config: &ServerConfig) -> Result<(), TelemetryError> {
    let filter = filter(config)?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Text => Box::new(builder.finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
