//! Per-job scheduling loop.
//!
//! One loop runs per started run of a job. It waits out the initial delay,
//! then launches one invocation per tick and races it against its time
//! budget and the job token:
//!
//! ```text
//! delay ──> invoke ──> (done | expired | signalled) ──> wait for tick ──> invoke ...
//! ```
//!
//! Each invocation gets a fresh child token. The loop cancels it to abort
//! the invocation (expiry, kill); a drop guard cancels it when the work
//! future resolves, which is how completion is observed. The child token is
//! not derived from the job token, so a stop lets the in-flight invocation
//! finish.

use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::time::{Instant, Sleep, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, info_span, warn};

use crate::job::{Invocation, Job};
use crate::pool::PoolInner;
use crate::status::{JobStatus, Signal};

/// Everything a scheduling loop owns for one run.
pub(crate) struct RunContext {
    pub(crate) name: String,
    pub(crate) job: Arc<Job>,
    pub(crate) pool: Weak<PoolInner>,
    pub(crate) token: CancellationToken,
    pub(crate) run: u64,
    /// Pause after a stop or kill before the loop releases the job.
    pub(crate) grace: Duration,
}

/// Spawn the scheduling loop for a run on `handle`.
pub(crate) fn spawn(handle: &Handle, ctx: RunContext) {
    let span = info_span!("job", job = %ctx.name, run = ctx.run);
    debug!(job = %ctx.name, run = ctx.run, "Spawning scheduling loop");
    handle.spawn(run(ctx).instrument(span));
}

/// Drive a run to its end and clean up after it.
pub(crate) async fn run(ctx: RunContext) -> JobStatus {
    let status = ctx.drive().await;
    info!(%status, "scheduling loop finished");

    if matches!(status, JobStatus::Stopped | JobStatus::Killed) && !ctx.grace.is_zero() {
        sleep(ctx.grace).await;
    }
    ctx.token.cancel();

    if status == JobStatus::Killed {
        ctx.remove_killed();
    }
    status
}

impl RunContext {
    async fn drive(&self) -> JobStatus {
        let delay = self.job.lock().task.delay();
        if !delay.is_zero() {
            debug!(?delay, "waiting before first invocation");
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => return self.on_signal(None).await,
            _ = sleep(delay) => {}
        }

        loop {
            let Some(invocation) = self.job.begin_invocation(self.run) else {
                return self.on_signal(None).await;
            };

            let next_start = Instant::now() + invocation.period;
            let expiry = sleep(invocation.max_run_time);
            tokio::pin!(expiry);
            let child = invocation.child.clone();
            launch(invocation);

            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    return self.on_signal(Some((&child, expiry.as_mut()))).await;
                }
                _ = child.cancelled() => {
                    self.job.complete_invocation(self.run);
                    debug!("invocation finished");
                }
                _ = &mut expiry => return self.expire(&child),
            }

            tokio::select! {
                biased;
                _ = self.token.cancelled() => return self.on_signal(None).await,
                _ = sleep_until(next_start) => {}
            }
        }
    }

    /// React to a cancelled job token.
    ///
    /// `in_flight` carries the child token and expiry timer of an invocation
    /// that has not finished yet.
    async fn on_signal(&self, in_flight: Option<(&CancellationToken, Pin<&mut Sleep>)>) -> JobStatus {
        match self.job.pending_signal(self.run) {
            Some(Signal::Kill) => {
                if let Some((child, _)) = in_flight {
                    child.cancel();
                }
                info!("job killed");
                self.job.settle(self.run, JobStatus::Killed)
            }
            Some(Signal::Stop) | None => {
                if let Some((child, expiry)) = in_flight {
                    debug!("waiting for in-flight invocation before stopping");
                    tokio::select! {
                        biased;
                        _ = child.cancelled() => self.job.complete_invocation(self.run),
                        _ = expiry => return self.expire(child),
                    }
                }
                info!("job stopped");
                self.job.settle(self.run, JobStatus::Stopped)
            }
        }
    }

    fn expire(&self, child: &CancellationToken) -> JobStatus {
        child.cancel();
        let status = self.job.settle(self.run, JobStatus::Expired);
        if status == JobStatus::Expired {
            warn!("invocation exceeded its max run time");
        }
        status
    }

    fn remove_killed(&self) {
        match self.pool.upgrade() {
            Some(pool) if pool.remove_job(&self.job) => info!("killed job removed"),
            Some(_) => debug!("killed job was already removed"),
            None => debug!("pool dropped before killed job was removed"),
        }
    }
}

/// Run one invocation on its own task.
fn launch(invocation: Invocation) {
    let Invocation {
        number,
        work,
        child,
        ..
    } = invocation;
    let span = debug_span!("invocation", invocation = number, work = work.label());

    tokio::spawn(
        async move {
            let _completion = child.clone().drop_guard();
            let outcome = AssertUnwindSafe(async move { work.call(child).await })
                .catch_unwind()
                .await;
            if outcome.is_err() {
                warn!("work callback panicked");
            }
        }
        .instrument(span),
    );
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
