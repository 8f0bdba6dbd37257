//! Awaiting asynchronous control plane jobs.
//!
//! Lifecycle operations hand an already-submitted [`AsyncJob`] to the
//! [`JobPoller`], which polls until the control plane reports a terminal
//! status, the job timeout elapses, or the caller cancels. Polling is safe to
//! repeat after a local crash because the job is tracked server side.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::control_plane::{
    ControlPlane, JobKind, JobRef, JobRequest, JobStatus, JobSubmission, TransportError,
};
use crate::model::ObservedInstance;
use crate::reader::observe;
use crate::retry::RetryPolicy;
use crate::types::{JobId, RemoteId};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Terminal result of an [`AsyncJob`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobResult {
    /// The job finished; carries the instance when the job returned one.
    Success(Option<ObservedInstance>),
    /// The control plane rejected the job.
    Failure(String),
    /// The job did not finish within the timeout.
    Timeout,
}

/// One in-flight remote operation.
#[derive(Clone, Debug)]
pub struct AsyncJob {
    job: JobRef,
    submitted_at: Instant,
    poll_interval: Duration,
}

impl AsyncJob {
    /// Tracks a job submitted just now.
    #[must_use]
    pub fn new(job: JobRef, poll_interval: Duration) -> Self {
        Self {
            job,
            submitted_at: Instant::now(),
            poll_interval,
        }
    }

    /// Reference returned by the control plane.
    #[must_use]
    pub const fn job_ref(&self) -> &JobRef {
        &self.job
    }

    /// Job identifier.
    #[must_use]
    pub const fn id(&self) -> &JobId {
        &self.job.id
    }

    /// Kind of job.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        self.job.kind
    }

    fn resolve(self, result: JobResult) -> Result<Option<ObservedInstance>, JobError> {
        let waited = self.submitted_at.elapsed();
        info!(
            job_id = %self.job.id,
            kind = %self.job.kind,
            ?waited,
            outcome = ?result,
            "job resolved"
        );
        match result {
            JobResult::Success(instance) => Ok(instance),
            JobResult::Failure(reason) => Err(JobError::Failed {
                job_id: self.job.id,
                kind: self.job.kind,
                reason,
            }),
            JobResult::Timeout => Err(JobError::Timeout {
                job_id: self.job.id,
                kind: self.job.kind,
                resource_id: self.job.resource_id,
                waited,
            }),
        }
    }
}

/// Errors raised while awaiting a job.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum JobError {
    /// The job never reached a terminal state; its remote effect is unknown.
    #[error("{kind} job {job_id} did not finish after {waited:?}")]
    Timeout {
        /// Job identifier.
        job_id: JobId,
        /// Kind of job.
        kind: JobKind,
        /// Instance the job acts on, when known.
        resource_id: Option<RemoteId>,
        /// Time spent waiting.
        waited: Duration,
    },
    /// The control plane reported the job as failed.
    #[error("{kind} job {job_id} failed: {reason}")]
    Failed {
        /// Job identifier.
        job_id: JobId,
        /// Kind of job.
        kind: JobKind,
        /// Reason reported by the control plane, verbatim.
        reason: String,
    },
    /// Polling kept failing at the transport level.
    #[error("failed to poll {kind} job {job_id}: {source}")]
    Transport {
        /// Job identifier.
        job_id: JobId,
        /// Kind of job.
        kind: JobKind,
        /// Last transport failure.
        #[source]
        source: TransportError,
    },
    /// The caller stopped waiting. The remote job was not cancelled.
    #[error("stopped waiting for {kind} job {job_id}")]
    Cancelled {
        /// Job identifier.
        job_id: JobId,
        /// Kind of job.
        kind: JobKind,
    },
}

/// Submits jobs and awaits their completion.
#[derive(Clone, Copy, Debug)]
pub struct JobPoller {
    poll_interval: Duration,
    timeout: Duration,
    retry: RetryPolicy,
}

impl JobPoller {
    /// Creates a poller.
    #[must_use]
    pub const fn new(poll_interval: Duration, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            poll_interval,
            timeout,
            retry,
        }
    }

    /// Interval between polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Submits `request` under a fresh idempotency token. Transport failures
    /// are retried with the same token, so a control plane that honours it
    /// never runs the request twice.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] that ended the attempt, including
    /// explicit rejections by the control plane.
    pub async fn submit<C>(&self, plane: &C, request: JobRequest) -> Result<AsyncJob, TransportError>
    where
        C: ControlPlane + ?Sized,
    {
        let submission = JobSubmission::new(request);
        let job = self
            .retry
            .run("submit_job", || plane.submit_job(&submission))
            .await?;
        info!(
            job_id = %job.id,
            kind = %job.kind,
            token = %submission.token,
            "job submitted"
        );
        Ok(AsyncJob::new(job, self.poll_interval))
    }

    /// Polls `job` until it resolves.
    ///
    /// Transport retries run inside the same race as the poll interval, so
    /// neither a retry backoff nor a slow poll outlives the deadline or a
    /// cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Failed`] when the control plane rejects the job,
    /// [`JobError::Timeout`] when it stays pending past the timeout,
    /// [`JobError::Transport`] when polling keeps failing, and
    /// [`JobError::Cancelled`] when `cancel` fires.
    pub async fn await_job<C>(
        &self,
        plane: &C,
        job: AsyncJob,
        cancel: &CancelSignal,
    ) -> Result<Option<ObservedInstance>, JobError>
    where
        C: ControlPlane + ?Sized,
    {
        let deadline = job.submitted_at + self.timeout;
        let mut polls: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(&job));
            }
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled(&job)),
                () = sleep_until(deadline) => None,
                status = self.retry.run("poll_job", || plane.poll_job(&job.job)) => Some(status),
            };
            let Some(polled) = polled else {
                return job.resolve(JobResult::Timeout);
            };
            let status = polled.map_err(|source| JobError::Transport {
                job_id: job.job.id.clone(),
                kind: job.job.kind,
                source,
            })?;
            polls += 1;
            match status {
                JobStatus::Pending => {}
                JobStatus::Succeeded(record) => {
                    return job.resolve(JobResult::Success(record.map(observe)));
                }
                JobStatus::Failed(reason) => return job.resolve(JobResult::Failure(reason)),
            }

            let now = Instant::now();
            if now >= deadline {
                return job.resolve(JobResult::Timeout);
            }
            let wait = job.poll_interval.min(deadline - now);
            debug!(job_id = %job.job.id, polls, ?wait, "job pending");
            tokio::select! {
                () = cancel.cancelled() => return Err(cancelled(&job)),
                () = sleep(wait) => {}
            }
        }
    }
}

impl Default for JobPoller {
    fn default() -> Self {
        Self::new(
            DEFAULT_POLL_INTERVAL,
            DEFAULT_JOB_TIMEOUT,
            RetryPolicy::default(),
        )
    }
}

fn cancelled(job: &AsyncJob) -> JobError {
    info!(job_id = %job.job.id, kind = %job.job.kind, "stopped waiting for job");
    JobError::Cancelled {
        job_id: job.job.id.clone(),
        kind: job.job.kind,
    }
}
