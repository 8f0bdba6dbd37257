//! Power operations.

use crate::control_plane::{ControlPlane, JobKind, JobRequest};
use crate::model::{InstanceState, ObservedInstance};

use super::{Lifecycle, OperationError, OperationRun};

impl<C> Lifecycle<'_, C>
where
    C: ControlPlane + ?Sized,
{
    /// Powers the instance on unless it is already running.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] when the start job does not succeed.
    pub async fn start(&self, current: &ObservedInstance) -> Result<OperationRun, OperationError> {
        if current.is_running() {
            return Ok(OperationRun::unchanged(JobKind::Start, current));
        }
        self.run_job(JobRequest::Start {
            id: current.id.clone(),
        })
        .await
    }

    /// Powers the instance off unless it is already stopped.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] when the stop job does not succeed.
    pub async fn stop(&self, current: &ObservedInstance) -> Result<OperationRun, OperationError> {
        if current.state == InstanceState::Stopped {
            return Ok(OperationRun::unchanged(JobKind::Stop, current));
        }
        self.run_job(JobRequest::Stop {
            id: current.id.clone(),
        })
        .await
    }
}
