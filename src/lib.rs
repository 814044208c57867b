//! # Cadence
//!
//! In-process periodic job scheduler.
//!
//! This crate ties the workspace together: it re-exports the scheduler and
//! configuration APIs and provides [`telemetry::init_tracing`] for
//! applications that want the standard logging setup.
//!
//! ```rust,no_run
//! use cadence::{JobPool, Task};
//! use chrono::TimeDelta;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = cadence::load_config(std::path::Path::new("cadence.toml"))?;
//! let _guard = cadence::telemetry::init_tracing(&config.logging)?;
//!
//! let pool = JobPool::with_config(config.scheduler);
//! pool.add(
//!     Task::builder("report")
//!         .period(TimeDelta::minutes(1))
//!         .max_run_time(TimeDelta::seconds(30))
//!         .work(|_token| async { /* ... */ })
//!         .build()?,
//! )?;
//! pool.start_all()?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

pub mod telemetry;

pub use cadence_config::{
    Config, ConfigError, ConfigLoader, ConfigValidator, LoggingConfig, SchedulerConfig,
};
pub use cadence_scheduler::{
    CancellationToken, Conflict, JobPool, JobSnapshot, JobStatus, SchedulerError,
    SchedulerResult, Signal, Task, TaskBuilder, TaskError, Work, WorkFuture,
};
pub use telemetry::{TelemetryError, init_tracing};

/// Load a configuration file and validate it.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = ConfigLoader::load(path)?;
    ConfigValidator::validate(&config).into_result()?;
    Ok(config)
}
