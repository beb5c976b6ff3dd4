//! Process-wide logging setup.
//!
//! Library code logs through the `log` macros and `tracing` spans; this
//! module installs one subscriber that receives both.

use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted for the filter directive.
pub const LOG_ENV_VAR: &str = "IMAGERIE_LOG";

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("A log bridge is already installed: {0}")]
    LogBridge(#[from] log::SetLoggerError),

    #[error("A global subscriber is already installed: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the global subscriber.
///
/// `directive` wins over `IMAGERIE_LOG`, which wins over `info`. Calling
/// this twice returns an error rather than replacing the first subscriber.
pub fn init_logging(directive: Option<&str>, format: LogFormat) -> Result<(), TelemetryError> {
    let directive = directive
        .map(str::to_string)
        .or_else(|| std::env::var(LOG_ENV_VAR).ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());

    let filter = EnvFilter::try_new(&directive).map_err(|e| TelemetryError::Filter {
        directive: directive.clone(),
        source: e,
    })?;

    tracing_log::LogTracer::init()?;

    let (text, json) = match format {
        LogFormat::Text => (Some(fmt::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_current_span(true))),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json);
    tracing::subscriber::set_global_default(subscriber)?;

    log::debug!("Logging initialized with filter '{}'", directive);
    Ok(())
}
