//! Configuration schema definitions.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduling engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pause taken by a job's loop after a stop or kill has been honoured,
    /// before it releases its token and (for a kill) removes the job.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_shutdown_grace_ms() -> u64 {
    500
}

impl SchedulerConfig {
    /// Grace pause as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Configuration with no exit pause.
    pub fn immediate() -> Self {
        Self {
            shutdown_grace_ms: 0,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit console logs as JSON instead of text.
    #[serde(default)]
    pub json: bool,

    /// Directory for rolling log files (None = console only).
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Log file name prefix.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Number of rotated log files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file_prefix() -> String {
    "cadence".to_string()
}

fn default_max_files() -> usize {
    7
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            directory: None,
            file_prefix: default_file_prefix(),
            max_files: default_max_files(),
        }
    }
}
