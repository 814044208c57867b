//! The job pool: registry of named jobs and the control surface over them.
//!
//! Membership lives behind one pool-wide `RwLock`; each job carries its own
//! lock for status and task. Per-job operations clone the job out of the
//! registry and release the pool lock before locking the job, so work on one
//! job never waits on another. Only `change_task` holds both, pool lock
//! first, because the status check and the re-keying must be atomic.
//! Scheduling loops never hold the job lock while taking the pool lock.

use std::sync::Arc;

use cadence_config::SchedulerConfig;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::engine::{self, RunContext};
use crate::error::{SchedulerError, SchedulerResult};
use crate::job::{Job, JobSnapshot};
use crate::status::{JobStatus, Signal};
use crate::task::Task;

#[derive(Debug)]
struct Slot {
    name: String,
    job: Arc<Job>,
}

/// Shared pool state, also reachable (weakly) from scheduling loops.
#[derive(Debug)]
pub(crate) struct PoolInner {
    slots: RwLock<Vec<Slot>>,
    config: SchedulerConfig,
}

impl PoolInner {
    /// Remove `job` if it is still registered, matching by identity.
    ///
    /// A job deleted and re-added under the same name is a different job and
    /// is left alone.
    pub(crate) fn remove_job(&self, job: &Arc<Job>) -> bool {
        let mut slots = self.slots.write();
        match slots.iter().position(|slot| Arc::ptr_eq(&slot.job, job)) {
            Some(index) => {
                slots.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Registry of named jobs.
///
/// Cloning is cheap and yields a handle to the same pool.
#[derive(Debug, Clone)]
pub struct JobPool {
    inner: Arc<PoolInner>,
}

impl Default for JobPool {
    fn default() -> Self {
        Self::new()
    }
}

impl JobPool {
    /// Create an empty pool with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create an empty pool.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                slots: RwLock::new(Vec::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    fn job(&self, name: &str) -> SchedulerResult<Arc<Job>> {
        self.inner
            .slots
            .read()
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| slot.job.clone())
            .ok_or_else(|| SchedulerError::NotFound(name.to_string()))
    }

    fn jobs(&self) -> Vec<Arc<Job>> {
        self.inner
            .slots
            .read()
            .iter()
            .map(|slot| slot.job.clone())
            .collect()
    }

    /// Register a task as a new job in the `Created` state.
    ///
    /// Returns the job's name, which is its handle in every other operation.
    pub fn add(&self, task: Task) -> SchedulerResult<String> {
        let name = task.name().to_string();
        let mut slots = self.inner.slots.write();
        if slots.iter().any(|slot| slot.name == name) {
            return Err(SchedulerError::DuplicateName(name));
        }
        slots.push(Slot {
            name: name.clone(),
            job: Arc::new(Job::new(task)),
        });
        info!(job = %name, "job added");
        Ok(name)
    }

    /// Replace the task of a job that is not running.
    ///
    /// The job keeps its status. If the new task has a different name the
    /// job is renamed, provided no other job uses that name.
    pub fn change_task(&self, name: &str, task: Task) -> SchedulerResult<()> {
        let new_name = task.name().to_string();
        let mut slots = self.inner.slots.write();
        let index = slots
            .iter()
            .position(|slot| slot.name == name)
            .ok_or_else(|| SchedulerError::NotFound(name.to_string()))?;
        if new_name != name && slots.iter().any(|slot| slot.name == new_name) {
            return Err(SchedulerError::DuplicateName(new_name));
        }

        slots[index].job.replace_task(name, task)?;
        slots[index].name = new_name.clone();
        info!(job = %name, renamed = %new_name, "job task changed");
        Ok(())
    }

    /// Start a job: it moves to `RunningPending` and a scheduling loop is
    /// spawned for it.
    ///
    /// Must be called from within a Tokio runtime; otherwise it fails with
    /// [`SchedulerError::NoRuntime`] and the job is left untouched.
    pub fn start(&self, name: &str) -> SchedulerResult<()> {
        let handle =
            Handle::try_current().map_err(|_| SchedulerError::NoRuntime(name.to_string()))?;
        let job = self.job(name)?;
        let (token, run) = job.begin_run(name)?;

        engine::spawn(
            &handle,
            RunContext {
                name: name.to_string(),
                job,
                pool: Arc::downgrade(&self.inner),
                token,
                run,
                grace: self.inner.config.shutdown_grace(),
            },
        );
        info!(job = %name, run, "job started");
        Ok(())
    }

    /// Ask a running job to stop after its in-flight invocation.
    ///
    /// The job reports `Stopped` once the loop has drained.
    pub fn stop(&self, name: &str) -> SchedulerResult<()> {
        self.job(name)?.request(name, Signal::Stop)?;
        info!(job = %name, "job stop requested");
        Ok(())
    }

    /// Kill a running job: it is `Killed` at once, its in-flight invocation
    /// is cancelled and the job is removed from the pool when its loop exits.
    pub fn kill(&self, name: &str) -> SchedulerResult<()> {
        self.job(name)?.request(name, Signal::Kill)?;
        info!(job = %name, "job kill requested");
        Ok(())
    }

    /// Remove a job that is not running.
    ///
    /// The job is retired under its own lock first, so a concurrent start
    /// that already looked it up fails instead of running a job the pool no
    /// longer holds.
    pub fn delete(&self, name: &str) -> SchedulerResult<()> {
        let job = self.job(name)?;
        job.retire(name)?;
        self.inner.remove_job(&job);
        info!(job = %name, "job deleted");
        Ok(())
    }

    /// Start every job, stopping at the first failure.
    pub fn start_all(&self) -> SchedulerResult<()> {
        self.for_each(|name| self.start(name))
    }

    /// Stop every job, stopping at the first failure.
    pub fn stop_all(&self) -> SchedulerResult<()> {
        self.for_each(|name| self.stop(name))
    }

    /// Kill every job, stopping at the first failure.
    pub fn kill_all(&self) -> SchedulerResult<()> {
        self.for_each(|name| self.kill(name))
    }

    fn for_each(&self, op: impl Fn(&str) -> SchedulerResult<()>) -> SchedulerResult<()> {
        let names = self.names();
        debug!(jobs = names.len(), "applying operation to all jobs");
        for name in &names {
            op(name)?;
        }
        Ok(())
    }

    /// Current status of a job.
    pub fn status(&self, name: &str) -> SchedulerResult<JobStatus> {
        Ok(self.job(name)?.status())
    }

    /// Snapshot of a job.
    pub fn lookup(&self, name: &str) -> SchedulerResult<JobSnapshot> {
        Ok(self.job(name)?.snapshot())
    }

    /// Snapshots of all jobs, in registration order.
    pub fn list(&self) -> Vec<JobSnapshot> {
        self.jobs().iter().map(|job| job.snapshot()).collect()
    }

    /// Names of all jobs, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .slots
            .read()
            .iter()
            .map(|slot| slot.name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.slots.read().iter().any(|slot| slot.name == name)
    }

    pub fn len(&self) -> usize {
        self.inner.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.read().is_empty()
    }

    /// One-line description of a job.
    pub fn describe(&self, name: &str) -> SchedulerResult<String> {
        self.lookup(name).map(|snapshot| snapshot.to_string())
    }

    /// One line per job, in registration order.
    pub fn describe_all(&self) -> Vec<String> {
        self.list().iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
