//! Job records: a task plus its runtime state under the job's own lock.
//!
//! Every transition made by the pool (start, stop, kill, task replacement)
//! and by the scheduling loop (invocation start, completion, settle) goes
//! through this module, under [`Job::lock`]. Loop-side transitions carry the
//! run number they belong to, so a loop can never write into a later run.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Conflict, SchedulerError, SchedulerResult};
use crate::status::{JobStatus, Signal};
use crate::task::{Task, Work};

/// Mutable part of a job.
#[derive(Debug)]
pub(crate) struct JobState {
    pub(crate) task: Task,
    pub(crate) status: JobStatus,
    /// Stop or kill requested against the current run.
    pub(crate) signal: Option<Signal>,
    /// Job token of the current run.
    pub(crate) token: Option<CancellationToken>,
    /// Child token of the in-flight invocation.
    pub(crate) active: Option<CancellationToken>,
    pub(crate) run: u64,
    pub(crate) invocations: u64,
    pub(crate) completions: u64,
    pub(crate) last_started_at: Option<DateTime<Utc>>,
    /// Set once the job has been deleted from the pool.
    pub(crate) retired: bool,
}

impl JobState {
    fn ensure_live(&self, name: &str) -> SchedulerResult<()> {
        if self.retired {
            return Err(SchedulerError::NotFound(name.to_string()));
        }
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// A registered job.
#[derive(Debug)]
pub(crate) struct Job {
    state: Mutex<JobState>,
}

/// What the loop needs to launch one invocation.
pub(crate) struct Invocation {
    pub(crate) number: u64,
    pub(crate) work: Work,
    pub(crate) period: Duration,
    pub(crate) max_run_time: Duration,
    pub(crate) child: CancellationToken,
}

impl Job {
    pub(crate) fn new(task: Task) -> Self {
        Self {
            state: Mutex::new(JobState {
                task,
                status: JobStatus::Created,
                signal: None,
                token: None,
                active: None,
                run: 0,
                invocations: 0,
                completions: 0,
                last_started_at: None,
                retired: false,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock()
    }

    pub(crate) fn status(&self) -> JobStatus {
        self.lock().status
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        let state = self.lock();
        JobSnapshot {
            name: state.task.name().to_string(),
            status: state.status,
            pending: state.signal,
            period: state.task.period(),
            max_run_time: state.task.max_run_time(),
            delay: state.task.delay(),
            work: state.task.work().label().to_string(),
            run: state.run,
            invocations: state.invocations,
            completions: state.completions,
            last_started_at: state.last_started_at,
        }
    }

    /// Replace the task of a job that is not running.
    pub(crate) fn replace_task(&self, name: &str, task: Task) -> SchedulerResult<()> {
        let mut state = self.lock();
        state.ensure_live(name)?;
        if state.status.is_running() {
            return Err(SchedulerError::invalid_state(
                name,
                "change the task of",
                Conflict::Status(state.status),
            ));
        }
        state.task = task;
        Ok(())
    }

    /// Mark a job that is not running as deleted.
    ///
    /// A retired job can no longer be started, signalled or changed, so a
    /// handle obtained before the deletion cannot revive it.
    pub(crate) fn retire(&self, name: &str) -> SchedulerResult<()> {
        let mut state = self.lock();
        state.ensure_live(name)?;
        if state.status.is_running() {
            return Err(SchedulerError::invalid_state(
                name,
                "delete",
                Conflict::Status(state.status),
            ));
        }
        state.retired = true;
        Ok(())
    }

    /// Open a new run: fresh job token, status `RunningPending`.
    pub(crate) fn begin_run(&self, name: &str) -> SchedulerResult<(CancellationToken, u64)> {
        let mut state = self.lock();
        state.ensure_live(name)?;
        if !state.transition(JobStatus::RunningPending) {
            return Err(SchedulerError::invalid_state(
                name,
                "start",
                Conflict::Status(state.status),
            ));
        }

        let token = CancellationToken::new();
        state.run += 1;
        state.signal = None;
        state.active = None;
        state.token = Some(token.clone());
        Ok((token, state.run))
    }

    /// Record a stop or kill request and cancel the job token.
    ///
    /// A kill is reflected in the status right away and cancels the in-flight
    /// invocation; a stop only shows once the loop has drained it.
    pub(crate) fn request(&self, name: &str, signal: Signal) -> SchedulerResult<()> {
        let operation = match signal {
            Signal::Stop => "stop",
            Signal::Kill => "kill",
        };

        let mut state = self.lock();
        state.ensure_live(name)?;
        if !state.status.is_running() {
            return Err(SchedulerError::invalid_state(
                name,
                operation,
                Conflict::Status(state.status),
            ));
        }
        if let Some(pending) = state.signal {
            return Err(SchedulerError::invalid_state(
                name,
                operation,
                Conflict::Pending(pending),
            ));
        }

        state.signal = Some(signal);
        if signal == Signal::Kill {
            state.transition(JobStatus::Killed);
            if let Some(child) = &state.active {
                child.cancel();
            }
        }
        if let Some(token) = &state.token {
            token.cancel();
        }
        Ok(())
    }

    /// Signal recorded against `run`, if any.
    pub(crate) fn pending_signal(&self, run: u64) -> Option<Signal> {
        let state = self.lock();
        if state.run == run { state.signal } else { None }
    }

    /// Start the next invocation of `run`.
    ///
    /// Returns `None` when the run has been superseded, a signal is pending
    /// or the run already ended.
    pub(crate) fn begin_invocation(&self, run: u64) -> Option<Invocation> {
        let mut state = self.lock();
        if state.run != run || state.signal.is_some() {
            return None;
        }

        match state.status {
            JobStatus::RunningPending => {}
            JobStatus::RunningDone => state.status = JobStatus::RunningPending,
            JobStatus::Created | JobStatus::Stopped | JobStatus::Expired | JobStatus::Killed => {
                return None;
            }
        }

        let child = CancellationToken::new();
        state.active = Some(child.clone());
        state.invocations += 1;
        state.last_started_at = Some(Utc::now());

        Some(Invocation {
            number: state.invocations,
            work: state.task.work().clone(),
            period: state.task.period(),
            max_run_time: state.task.max_run_time(),
            child,
        })
    }

    /// Record that the in-flight invocation of `run` completed in time.
    pub(crate) fn complete_invocation(&self, run: u64) {
        let mut state = self.lock();
        if state.run != run {
            return;
        }
        state.completions += 1;
        state.active = None;
        if state.status == JobStatus::RunningPending {
            state.transition(JobStatus::RunningDone);
        }
    }

    /// End `run` with `target`, returning the status the run ended with.
    ///
    /// A kill already recorded against the run always wins.
    pub(crate) fn settle(&self, run: u64, target: JobStatus) -> JobStatus {
        let mut state = self.lock();
        if state.run != run {
            return target;
        }
        state.active = None;
        state.signal = None;
        if state.status != JobStatus::Killed {
            state.transition(target);
        }
        state.status
    }
}

/// Read-only view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub name: String,
    pub status: JobStatus,
    /// Stop or kill requested but not yet honoured.
    pub pending: Option<Signal>,
    pub period: Duration,
    pub max_run_time: Duration,
    pub delay: Duration,
    /// Callback identity.
    pub work: String,
    /// Number of times the job has been started.
    pub run: u64,
    /// Invocations launched over the job's lifetime.
    pub invocations: u64,
    /// Invocations that finished within their time budget.
    pub completions: u64,
    pub last_started_at: Option<DateTime<Utc>>,
}

impl fmt::Display for JobSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job: {}; status: {}", self.name, self.status)?;
        if let Some(signal) = self.pending {
            write!(f, " ({signal} requested)")?;
        }
        write!(
            f,
            "; period: {:?}; max run time: {:?}; delay: {:?}; work: {}",
            self.period, self.max_run_time, self.delay, self.work
        )
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
