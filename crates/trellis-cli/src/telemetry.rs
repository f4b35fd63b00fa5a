//! Tracing initialisation for binaries embedding the administration
//! commands.
//!
//! The subscriber is process-global, so installation happens at most once
//! per host. The configured filter is still validated on every call: a bad
//! `log_filter` in a freshly edited configuration file is reported even
//! when another component already installed telemetry.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::UtcTime;

use trellis_config::{Config, LogFormat};

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Proof that telemetry is live, carrying the installed output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// The output format the process-global subscriber was installed with.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured `log_filter` expression does not parse.
    #[error("invalid log filter '{expression}': {reason}")]
    Filter {
        /// The rejected filter expression.
        expression: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// The process-global subscriber could not be installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Validates the configured filter and installs the process-global
/// subscriber on first use.
///
/// Later calls are idempotent: the filter is re-validated, the already
/// installed subscriber is left alone, and the returned handle reports the
/// format the subscriber was originally installed with.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when `log_filter` does not parse and
/// [`TelemetryError::Subscriber`] when the subscriber cannot be installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    let format = INSTALLED
        .get_or_try_init(|| install(filter, config.log_format()).map(|()| config.log_format()))?;
    Ok(TelemetryHandle { format: *format })
}

fn parse_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(expression).map_err(|parse_error| TelemetryError::Filter {
        expression: expression.to_owned(),
        reason: parse_error.to_string(),
    })
}

fn install(filter: EnvFilter, format: LogFormat) -> Result<(), SetGlobalDefaultError> {
    let base = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        // Colour only on interactive terminals; log sinks get plain text.
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());
    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(base.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(base.compact().finish()),
    };
    tracing::subscriber::set_global_default(subscriber)
}
