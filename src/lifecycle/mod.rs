//! Typed lifecycle operations built on the job poller.
//!
//! Every operation first compares the instance it was handed against its
//! target and returns without submitting anything when they already agree.
//! That self-check is what lets a failed reconciliation pass be re-run
//! without re-applying the steps that succeeded.

mod create;
mod destroy;
mod error;
mod network;
mod power;
mod update;

use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::control_plane::{ControlPlane, JobKind, JobRequest, ReferenceKind};
use crate::differ::Operation;
use crate::model::ObservedInstance;
use crate::poller::JobPoller;
use crate::reader::SnapshotReader;
use crate::types::JobId;

pub use error::OperationError;

/// Progress of one [`OperationRun`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    /// Not yet submitted.
    Pending,
    /// Submitted and being awaited.
    Submitted,
    /// Finished, or found already converged.
    Succeeded,
    /// Rejected, timed out, or abandoned.
    Failed,
}

/// Record of a single operation moving through
/// `Pending -> Submitted -> Succeeded | Failed`.
#[derive(Clone, Debug)]
pub struct OperationRun {
    kind: JobKind,
    state: RunState,
    job_id: Option<JobId>,
    observed: Option<ObservedInstance>,
}

impl OperationRun {
    /// Starts a pending run.
    #[must_use]
    pub const fn new(kind: JobKind) -> Self {
        Self {
            kind,
            state: RunState::Pending,
            job_id: None,
            observed: None,
        }
    }

    fn unchanged(kind: JobKind, current: &ObservedInstance) -> Self {
        debug!(operation = %kind, remote_id = %current.id, "already converged");
        let mut run = Self::new(kind);
        run.succeeded(Some(current.clone()));
        run
    }

    /// Operation kind.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        self.kind
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Job submitted for this run, if any.
    #[must_use]
    pub const fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    /// Returns whether a job was submitted. Self-checked no-ops submit none.
    #[must_use]
    pub const fn was_submitted(&self) -> bool {
        self.job_id.is_some()
    }

    /// Instance state derived from the job result.
    #[must_use]
    pub const fn observed(&self) -> Option<&ObservedInstance> {
        self.observed.as_ref()
    }

    /// Consumes the run, returning the derived instance state.
    #[must_use]
    pub fn into_observed(self) -> Option<ObservedInstance> {
        self.observed
    }

    /// Consumes the run, returning the instance it produced.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::MissingInstance`] for runs that leave no
    /// instance behind, such as a destroy.
    pub fn into_instance(self) -> Result<ObservedInstance, OperationError> {
        let operation = self.kind;
        self.observed
            .ok_or(OperationError::MissingInstance { operation })
    }

    fn submitted(&mut self, job_id: JobId) {
        self.job_id = Some(job_id);
        self.transition(RunState::Submitted);
    }

    fn succeeded(&mut self, observed: Option<ObservedInstance>) {
        self.observed = observed;
        self.transition(RunState::Succeeded);
    }

    fn failed(&mut self) {
        self.transition(RunState::Failed);
    }

    fn transition(&mut self, next: RunState) {
        debug!(operation = %self.kind, from = ?self.state, to = ?next, "operation state changed");
        self.state = next;
    }
}

/// Executes lifecycle operations against one control plane.
pub struct Lifecycle<'a, C: ?Sized> {
    plane: &'a C,
    poller: JobPoller,
    reader: SnapshotReader,
    cancel: &'a CancelSignal,
}

impl<'a, C> Lifecycle<'a, C>
where
    C: ControlPlane + ?Sized,
{
    /// Creates a lifecycle executor.
    #[must_use]
    pub const fn new(
        plane: &'a C,
        poller: JobPoller,
        reader: SnapshotReader,
        cancel: &'a CancelSignal,
    ) -> Self {
        Self {
            plane,
            poller,
            reader,
            cancel,
        }
    }

    /// Executes one planned operation.
    ///
    /// `current` is the latest known instance; every operation except
    /// [`Operation::Create`] requires one.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] describing why the operation did not
    /// complete.
    pub async fn execute(
        &self,
        operation: &Operation,
        current: Option<&ObservedInstance>,
    ) -> Result<OperationRun, OperationError> {
        let existing = || require(operation, current);
        match operation {
            Operation::Create(desired) => self.create(desired).await,
            Operation::Stop => self.stop(existing()?).await,
            Operation::Start => self.start(existing()?).await,
            Operation::Rename { name, display_name } => {
                self.rename(existing()?, name, display_name).await
            }
            Operation::Resize { service_tier } => self.resize(existing()?, service_tier).await,
            Operation::AttachNetwork { network } => {
                self.attach_network(existing()?, network).await
            }
            Operation::AssignIp { address } => self.assign_ip(existing()?, *address).await,
            Operation::Destroy { expunge } => self.destroy(existing()?, *expunge).await,
        }
    }

    /// Resolves a sibling resource to its identifier.
    async fn resolve(
        &self,
        operation: JobKind,
        kind: ReferenceKind,
        name: &str,
        zone_id: Option<&str>,
    ) -> Result<String, OperationError> {
        let found = self
            .plane
            .find_reference(kind, name, zone_id)
            .await
            .map_err(|source| OperationError::Transport { operation, source })?;
        found.ok_or_else(|| OperationError::InvalidReference {
            kind,
            name: name.to_owned(),
        })
    }

    /// Submits `request`, awaits it, and derives the resulting instance
    /// state from the job payload. A job that returns no payload is followed
    /// by a read unless it removed the instance.
    async fn run_job(&self, request: JobRequest) -> Result<OperationRun, OperationError> {
        let kind = request.kind();
        let target = request.target().cloned();
        let mut run = OperationRun::new(kind);

        let job = match self.poller.submit(self.plane, request).await {
            Ok(job) => job,
            Err(source) => {
                run.failed();
                return Err(OperationError::from_submit(kind, source));
            }
        };
        run.submitted(job.id().clone());
        let remote_id = job.job_ref().resource_id.clone().or(target);

        let payload = match self.poller.await_job(self.plane, job, self.cancel).await {
            Ok(payload) => payload,
            Err(err) => {
                run.failed();
                return Err(err.into());
            }
        };

        if kind == JobKind::Destroy {
            run.succeeded(None);
            return Ok(run);
        }
        let observed = match (payload, remote_id) {
            (Some(instance), _) => instance,
            (None, Some(remote_id)) => {
                let Some(instance) = self.reader.read(self.plane, &remote_id).await? else {
                    run.failed();
                    return Err(OperationError::Vanished {
                        operation: kind,
                        remote_id,
                    });
                };
                instance
            }
            (None, None) => {
                run.failed();
                return Err(OperationError::Rejected {
                    operation: kind,
                    job_id: run.job_id().cloned(),
                    reason: String::from("job finished without naming an instance"),
                });
            }
        };
        info!(
            operation = %kind,
            remote_id = %observed.id,
            state = %observed.state,
            "operation succeeded"
        );
        run.succeeded(Some(observed));
        Ok(run)
    }
}

fn require<'c>(
    operation: &Operation,
    current: Option<&'c ObservedInstance>,
) -> Result<&'c ObservedInstance, OperationError> {
    current.ok_or(OperationError::MissingInstance {
        operation: operation.kind(),
    })
}

#[cfg(test)]
mod tests;
