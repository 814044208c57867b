//! Error types for the scheduler.

use std::fmt;

use chrono::TimeDelta;
use thiserror::Error;

use crate::status::{JobStatus, Signal};

/// Task validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Task names are job handles and cannot be empty.
    #[error("task name cannot be empty")]
    EmptyName,

    /// A duration field was negative.
    #[error("{field} cannot be negative (got {value})")]
    NegativeDuration {
        field: &'static str,
        value: TimeDelta,
    },

    /// No work callback was provided.
    #[error("task {name} has no work callback")]
    MissingWork { name: String },

    /// No max run time was provided.
    #[error("task {name} has no max run time")]
    MissingMaxRunTime { name: String },
}

/// Why an operation is illegal for a job right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// The job's current status forbids the operation.
    Status(JobStatus),
    /// A stop or kill is already in progress.
    Pending(Signal),
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::Status(status) => write!(f, "job is {status}"),
            Conflict::Pending(signal) => write!(f, "{signal} already requested"),
        }
    }
}

/// Errors returned by job pool operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid task definition.
    #[error("invalid task: {0}")]
    Validation(#[from] TaskError),

    /// A live job already uses the name.
    #[error("job already exists: {0}")]
    DuplicateName(String),

    /// No job with the given name.
    #[error("job not found: {0}")]
    NotFound(String),

    /// The operation is illegal for the job's current state.
    #[error("cannot {operation} job {name}: {conflict}")]
    InvalidState {
        name: String,
        operation: &'static str,
        conflict: Conflict,
    },

    /// A job can only be started from within a Tokio runtime.
    #[error("cannot start job {0}: no Tokio runtime is running")]
    NoRuntime(String),
}

impl SchedulerError {
    pub(crate) fn invalid_state(name: &str, operation: &'static str, conflict: Conflict) -> Self {
        SchedulerError::InvalidState {
            name: name.to_string(),
            operation,
            conflict,
        }
    }
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_duration_display() {
        let err = TaskError::NegativeDuration {
            field: "period",
            value: TimeDelta::seconds(-3),
        };
        let display = err.to_string();
        assert!(display.contains("period"));
        assert!(display.contains("negative"));
    }

    #[test]
    fn test_validation_from_task_error() {
        let err = SchedulerError::from(TaskError::EmptyName);
        assert!(matches!(err, SchedulerError::Validation(TaskError::EmptyName)));
        assert!(err.to_string().starts_with("invalid task"));
    }

    #[test]
    fn test_invalid_state_display() {
        let err = SchedulerError::invalid_state("p", "stop", Conflict::Status(JobStatus::Created));
        assert_eq!(err.to_string(), "cannot stop job p: job is created");

        let err = SchedulerError::invalid_state("p", "kill", Conflict::Pending(Signal::Stop));
        assert_eq!(err.to_string(), "cannot kill job p: stop already requested");
    }

    #[test]
    fn test_no_runtime_display() {
        let err = SchedulerError::NoRuntime("p".to_string());
        assert_eq!(err.to_string(), "cannot start job p: no Tokio runtime is running");
    }

    #[test]
    fn test_not_found_display() {
        let err = SchedulerError::NotFound("missing".to_string());
        assert!(err.to_string().contains("missing"));
    }
}
