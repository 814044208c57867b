//! # Cadence Scheduler
//!
//! In-process periodic job scheduling.
//!
//! ## Features
//!
//! - Named jobs built from a [`Task`]: period, max run time, initial delay
//!   and an async work callback
//! - One scheduling loop per running job, on the Tokio runtime
//! - Per-invocation time budget enforced through cooperative cancellation
//! - Graceful stop (drain the in-flight invocation) and forced kill
//!   (cancel it and remove the job)
//!
//! ## Example
//!
//! ```rust,no_run
//! use cadence_scheduler::{JobPool, Task};
//! use chrono::TimeDelta;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = JobPool::new();
//! let task = Task::builder("heartbeat")
//!     .period(TimeDelta::seconds(2))
//!     .max_run_time(TimeDelta::seconds(1))
//!     .work(|_token| async { println!("beat") })
//!     .build()?;
//!
//! pool.add(task)?;
//! pool.start("heartbeat")?;
//! tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//! pool.stop("heartbeat")?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod job;
mod pool;

pub mod error;
pub mod status;
pub mod task;

pub use error::{Conflict, SchedulerError, SchedulerResult, TaskError};
pub use job::JobSnapshot;
pub use pool::JobPool;
pub use status::{JobStatus, Signal};
pub use task::{Task, TaskBuilder, Work, WorkFuture};
pub use tokio_util::sync::CancellationToken;
