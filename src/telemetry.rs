//! Tracing setup for applications embedding the scheduler.
//!
//! Builds a subscriber with a console layer and, when a log directory is
//! configured, a daily-rotated file layer written through a non-blocking
//! worker.

use std::path::Path;

use cadence_config::{Config, ConfigError, ConfigValidator, LoggingConfig};
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid logging configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to create log file appender: {0}")]
    Appender(#[from] InitError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// flushes the file writer on drop and must be kept alive for as long as
/// file logging is wanted; it is `None` when no directory is configured.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>, TelemetryError> {
    validate(config)?;
    let filter = env_filter(&config.level)?;

    let (file_writer, guard) = match &config.directory {
        Some(dir) => {
            let (writer, guard) = file_writer(dir, config)?;
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let console = if config.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(true).boxed()
    };
    let file = file_writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|_| TelemetryError::AlreadyInitialized)?;

    Ok(guard)
}

fn validate(config: &LoggingConfig) -> Result<(), ConfigError> {
    let config = Config {
        logging: config.clone(),
        ..Config::default()
    };
    ConfigValidator::validate(&config).into_result()
}

fn env_filter(level: &str) -> Result<EnvFilter, ParseError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level.to_ascii_lowercase()),
    }
}

fn file_writer(
    dir: &Path,
    config: &LoggingConfig,
) -> Result<(NonBlocking, WorkerGuard), TelemetryError> {
    std::fs::create_dir_all(dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(config.file_prefix.as_str())
        .filename_suffix("log")
        .max_log_files(config.max_files)
        .build(dir)?;

    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
