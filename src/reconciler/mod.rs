//! Reconciliation entry points.
//!
//! [`Reconciler::reconcile`] reads the instance, plans with the differ, and
//! executes the plan one operation at a time, stopping at the first failure.
//! [`Reconciler::destroy`] bypasses the differ and tears the instance down.
//! Neither keeps state between calls: a failed pass is resumed by calling
//! again with the same inputs.

mod error;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::control_plane::{ControlPlane, JobKind};
use crate::differ::{self, ActionPlan};
use crate::lifecycle::{Lifecycle, OperationError, OperationRun};
use crate::model::{DesiredSpec, ObservedInstance};
use crate::poller::JobPoller;
use crate::reader::SnapshotReader;
use crate::retry::RetryPolicy;
use crate::types::RemoteId;

pub use error::{ErrorKind, PlanStep, ReconcileError};

/// Timing and retry settings for a [`Reconciler`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReconcileSettings {
    /// Interval between job polls.
    pub poll_interval: Duration,
    /// How long a single job may stay pending.
    pub job_timeout: Duration,
    /// Retry budget for transport failures.
    pub retry: RetryPolicy,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            job_timeout: Duration::from_secs(600),
            retry: RetryPolicy::default(),
        }
    }
}

/// Converges instances onto their desired spec.
pub struct Reconciler<C: ?Sized> {
    plane: Arc<C>,
    poller: JobPoller,
    reader: SnapshotReader,
    cancel: CancelSignal,
}

impl<C> Reconciler<C>
where
    C: ControlPlane + ?Sized,
{
    /// Creates a reconciler over a shared control plane handle.
    #[must_use]
    pub fn new(plane: Arc<C>, settings: ReconcileSettings) -> Self {
        Self {
            plane,
            poller: JobPoller::new(settings.poll_interval, settings.job_timeout, settings.retry),
            reader: SnapshotReader::new(settings.retry),
            cancel: CancelSignal::never(),
        }
    }

    /// Aborts job polling when `signal` fires. Remote jobs keep running.
    #[must_use]
    pub fn with_cancellation(mut self, signal: CancelSignal) -> Self {
        self.cancel = signal;
        self
    }

    fn lifecycle(&self) -> Lifecycle<'_, C> {
        Lifecycle::new(&*self.plane, self.poller, self.reader, &self.cancel)
    }

    /// Reads the current state of `remote_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Read`] when the control plane stays
    /// unreachable.
    pub async fn read(
        &self,
        remote_id: &RemoteId,
    ) -> Result<Option<ObservedInstance>, ReconcileError> {
        self.reader
            .read(&*self.plane, remote_id)
            .await
            .map_err(|source| ReconcileError::Read {
                source,
                last_known: None,
            })
    }

    /// Computes the plan `reconcile` would execute, without executing it.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidSpec`] for an invalid spec and
    /// [`ReconcileError::Read`] when the current state cannot be read.
    pub async fn plan(
        &self,
        desired: &DesiredSpec,
        existing: Option<&RemoteId>,
    ) -> Result<(ActionPlan, Option<ObservedInstance>), ReconcileError> {
        desired.validate()?;
        let current = match existing {
            Some(remote_id) => {
                let observed = self.read(remote_id).await?;
                if observed.is_none() {
                    info!(%remote_id, "instance no longer exists; planning creation");
                }
                observed
            }
            None => None,
        };
        let plan = differ::plan(desired, current.as_ref());
        for warning in plan.warnings() {
            warn!(name = %desired.name, "{warning}");
        }
        Ok((plan, current))
    }

    /// Converges the instance identified by `existing` onto `desired`,
    /// creating it when `existing` is absent or no longer exists.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::RequiresReplacement`] without submitting any
    /// job when the change cannot be applied in place, and
    /// [`ReconcileError::Step`] naming the failed step when an operation
    /// fails. Steps before the failed one stay applied.
    pub async fn reconcile(
        &self,
        desired: &DesiredSpec,
        existing: Option<&RemoteId>,
    ) -> Result<ObservedInstance, ReconcileError> {
        let (plan, current) = self.plan(desired, existing).await?;
        if plan.requires_replacement()
            && let Some(instance) = current
        {
            return Err(ReconcileError::RequiresReplacement {
                reasons: plan.unsupported().to_vec(),
                last_known: Box::new(instance),
            });
        }
        info!(name = %desired.name, %plan, "reconciling instance");

        let last = match current {
            Some(instance) => self.execute(&plan, instance).await?,
            None => self.create(desired).await?,
        };

        let reread = self
            .reader
            .read(&*self.plane, &last.id)
            .await
            .map_err(|source| ReconcileError::Read {
                source,
                last_known: Some(Box::new(last.clone())),
            })?;
        let Some(fresh) = reread else {
            debug!(remote_id = %last.id, "re-read missed; returning last job payload");
            return Ok(last);
        };
        if !differ::plan(desired, Some(&fresh)).is_empty() {
            warn!(remote_id = %fresh.id, "control plane has not caught up with the plan yet");
        }
        Ok(fresh)
    }

    /// Destroys `remote_id`, stopping it first when it is running. An
    /// instance that no longer exists counts as destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Read`] when the instance cannot be read and
    /// [`ReconcileError::Step`] when stopping or destroying fails.
    pub async fn destroy(&self, remote_id: &RemoteId, expunge: bool) -> Result<(), ReconcileError> {
        let Some(current) = self.read(remote_id).await? else {
            info!(%remote_id, "instance already absent");
            return Ok(());
        };
        let plan = differ::teardown(&current, expunge);
        info!(%remote_id, expunge, %plan, "destroying instance");
        self.execute(&plan, current).await?;
        Ok(())
    }

    /// Deploys a new instance as the single step of a creation plan.
    async fn create(&self, desired: &DesiredSpec) -> Result<ObservedInstance, ReconcileError> {
        let step = PlanStep {
            index: 1,
            total: 1,
            operation: JobKind::Create,
        };
        debug!(%step, "executing step");
        let outcome = self
            .lifecycle()
            .create(desired)
            .await
            .and_then(OperationRun::into_instance);
        match outcome {
            Ok(instance) => Ok(instance),
            Err(source) => {
                let last_known = self.recover(&source).await;
                Err(Self::stopped(step, source, last_known))
            }
        }
    }

    /// Runs plan operations against an existing instance in order, threading
    /// each result into the next step. Returns the last known instance.
    async fn execute(
        &self,
        plan: &ActionPlan,
        mut current: ObservedInstance,
    ) -> Result<ObservedInstance, ReconcileError> {
        let lifecycle = self.lifecycle();
        let total = plan.operations().len();
        for (position, operation) in plan.operations().iter().enumerate() {
            let step = PlanStep {
                index: position + 1,
                total,
                operation: operation.kind(),
            };
            debug!(%step, "executing step");
            match lifecycle.execute(operation, Some(&current)).await {
                Ok(run) => {
                    if let Some(observed) = run.into_observed() {
                        current = observed;
                    }
                }
                Err(source) => return Err(Self::stopped(step, source, Some(current))),
            }
        }
        Ok(current)
    }

    fn stopped(
        step: PlanStep,
        source: OperationError,
        last_known: Option<ObservedInstance>,
    ) -> ReconcileError {
        warn!(%step, error = %source, "plan stopped");
        ReconcileError::Step {
            step,
            source,
            last_known: last_known.map(Box::new),
        }
    }

    /// Best-effort read of an instance a failed create left behind, so the
    /// caller learns its identifier.
    async fn recover(&self, failure: &OperationError) -> Option<ObservedInstance> {
        let remote_id = failure.remote_id()?;
        self.reader
            .read(&*self.plane, remote_id)
            .await
            .ok()
            .flatten()
    }
}
