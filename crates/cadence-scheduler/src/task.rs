//! Task descriptors: a name, three durations and a work callback.
//!
//! Durations enter the API as [`chrono::TimeDelta`] so that negative values
//! are representable and can be rejected with [`TaskError::NegativeDuration`].
//! Once validated they are stored as [`std::time::Duration`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Type-erased future returned by a work callback.
pub type WorkFuture = BoxFuture<'static, ()>;

/// A work callback.
///
/// Each invocation receives its own [`CancellationToken`]. The engine cancels
/// it to abort the invocation (expiry, kill); the invocation is considered
/// complete once its future resolves, at which point the token is cancelled
/// on its behalf. Work may also cancel the token itself to report completion
/// early.
#[derive(Clone)]
pub struct Work {
    call: Arc<dyn Fn(CancellationToken) -> WorkFuture + Send + Sync>,
    label: &'static str,
}

impl Work {
    /// Wrap an async callback.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            call: Arc::new(move |token| f(token).boxed()),
            label: std::any::type_name::<F>(),
        }
    }

    /// Callback identity used in job descriptions.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn call(&self, token: CancellationToken) -> WorkFuture {
        (self.call)(token)
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Work").field(&self.label).finish()
    }
}

/// A validated task descriptor.
#[derive(Debug, Clone)]
pub struct Task {
    name: String,
    period: Duration,
    max_run_time: Duration,
    delay: Duration,
    work: Work,
}

fn non_negative(field: &'static str, value: TimeDelta) -> Result<Duration, TaskError> {
    value
        .to_std()
        .map_err(|_| TaskError::NegativeDuration { field, value })
}

fn valid_name(name: String) -> Result<String, TaskError> {
    if name.trim().is_empty() {
        return Err(TaskError::EmptyName);
    }
    Ok(name)
}

impl Task {
    /// Create a task, rejecting an empty name or any negative duration.
    pub fn create(
        name: impl Into<String>,
        period: TimeDelta,
        max_run_time: TimeDelta,
        delay: TimeDelta,
        work: Work,
    ) -> Result<Self, TaskError> {
        Ok(Self {
            name: valid_name(name.into())?,
            period: non_negative("period", period)?,
            max_run_time: non_negative("max_run_time", max_run_time)?,
            delay: non_negative("delay", delay)?,
            work,
        })
    }

    /// Start building a task.
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interval between successive invocation starts.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time budget of a single invocation.
    pub fn max_run_time(&self) -> Duration {
        self.max_run_time
    }

    /// Wait between start and the first invocation.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn work(&self) -> &Work {
        &self.work
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), TaskError> {
        self.name = valid_name(name.into())?;
        Ok(())
    }

    pub fn set_period(&mut self, period: TimeDelta) -> Result<(), TaskError> {
        self.period = non_negative("period", period)?;
        Ok(())
    }

    pub fn set_max_run_time(&mut self, max_run_time: TimeDelta) -> Result<(), TaskError> {
        self.max_run_time = non_negative("max_run_time", max_run_time)?;
        Ok(())
    }

    pub fn set_delay(&mut self, delay: TimeDelta) -> Result<(), TaskError> {
        self.delay = non_negative("delay", delay)?;
        Ok(())
    }

    pub fn set_work(&mut self, work: Work) {
        self.work = work;
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name: {}; period: {:?}; max run time: {:?}; delay: {:?}; work: {}",
            self.name,
            self.period,
            self.max_run_time,
            self.delay,
            self.work.label()
        )
    }
}

/// Builder for [`Task`].
///
/// Period and delay default to zero. The max run time and the work callback
/// have no default: a task built without them is rejected with
/// [`TaskError::MissingMaxRunTime`] or [`TaskError::MissingWork`].
#[derive(Debug)]
pub struct TaskBuilder {
    name: String,
    period: TimeDelta,
    max_run_time: Option<TimeDelta>,
    delay: TimeDelta,
    work: Option<Work>,
}

impl TaskBuilder {
    /// Create a new task builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            period: TimeDelta::zero(),
            max_run_time: None,
            delay: TimeDelta::zero(),
            work: None,
        }
    }

    pub fn period(mut self, period: TimeDelta) -> Self {
        self.period = period;
        self
    }

    pub fn max_run_time(mut self, max_run_time: TimeDelta) -> Self {
        self.max_run_time = Some(max_run_time);
        self
    }

    pub fn delay(mut self, delay: TimeDelta) -> Self {
        self.delay = delay;
        self
    }

    /// Set the work callback from an async closure.
    pub fn work<F, Fut>(self, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.with_work(Work::new(f))
    }

    /// Set an already wrapped work callback.
    pub fn with_work(mut self, work: Work) -> Self {
        self.work = Some(work);
        self
    }

    /// Validate and build the task.
    pub fn build(self) -> Result<Task, TaskError> {
        let name = valid_name(self.name)?;
        let max_run_time = self
            .max_run_time
            .ok_or_else(|| TaskError::MissingMaxRunTime { name: name.clone() })?;
        let work = self.work.ok_or_else(|| TaskError::MissingWork { name: name.clone() })?;
        Task::create(name, self.period, max_run_time, self.delay, work)
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
