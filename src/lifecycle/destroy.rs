//! Instance removal.

use crate::control_plane::{ControlPlane, JobKind, JobRequest};
use crate::model::{InstanceState, ObservedInstance};

use super::{Lifecycle, OperationError, OperationRun};

impl<C> Lifecycle<'_, C>
where
    C: ControlPlane + ?Sized,
{
    /// Destroys the instance. With `expunge` the control plane purges it
    /// immediately; otherwise it is soft-deleted and stays recoverable.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] when the destroy job does not succeed.
    pub async fn destroy(
        &self,
        current: &ObservedInstance,
        expunge: bool,
    ) -> Result<OperationRun, OperationError> {
        if !expunge && current.state == InstanceState::Expunging {
            let mut run = OperationRun::unchanged(JobKind::Destroy, current);
            run.observed = None;
            return Ok(run);
        }
        self.run_job(JobRequest::Destroy {
            id: current.id.clone(),
            expunge,
        })
        .await
    }
}
