//! Job status and control signals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Registered, never started.
    #[default]
    Created,
    /// An invocation is in flight (or the initial delay is running).
    RunningPending,
    /// Between invocations; the previous one finished within its budget.
    RunningDone,
    /// A graceful stop was honoured.
    Stopped,
    /// An invocation exceeded its maximum run time.
    Expired,
    /// Forced termination was requested; the job is being removed.
    Killed,
}

impl JobStatus {
    /// Whether a scheduling loop owns the job.
    pub fn is_running(self) -> bool {
        match self {
            JobStatus::RunningPending | JobStatus::RunningDone => true,
            JobStatus::Created | JobStatus::Stopped | JobStatus::Expired | JobStatus::Killed => {
                false
            }
        }
    }

    /// Whether the status ends a run.
    pub fn is_terminal(self) -> bool {
        match self {
            JobStatus::Stopped | JobStatus::Expired | JobStatus::Killed => true,
            JobStatus::Created | JobStatus::RunningPending | JobStatus::RunningDone => false,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;

        match (self, next) {
            // start (a killed job is on its way out of the pool)
            (Created | Stopped | Expired, RunningPending) => true,
            (Killed, RunningPending) => false,
            // tick
            (RunningPending, RunningDone) | (RunningDone, RunningPending) => true,
            // stop, expiry, kill
            (RunningPending | RunningDone, Stopped | Expired | Killed) => true,
            (RunningPending, RunningPending) | (RunningDone, RunningDone) => false,
            (Created | Stopped | Expired | Killed, RunningDone | Stopped | Expired | Killed) => {
                false
            }
            (_, Created) => false,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::RunningPending => "running (invocation pending)",
            JobStatus::RunningDone => "running (invocation done)",
            JobStatus::Stopped => "stopped",
            JobStatus::Expired => "expired",
            JobStatus::Killed => "killed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control request recorded against a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Drain the in-flight invocation, then stop.
    Stop,
    /// Cancel the in-flight invocation and remove the job.
    Kill,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Stop => f.write_str("stop"),
            Signal::Kill => f.write_str("kill"),
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
