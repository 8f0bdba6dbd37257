//! Network attachment.

use crate::control_plane::{ControlPlane, JobKind, JobRequest, ReferenceKind};
use crate::model::ObservedInstance;

use super::{Lifecycle, OperationError, OperationRun};

impl<C> Lifecycle<'_, C>
where
    C: ControlPlane + ?Sized,
{
    /// Adds a NIC on `network` unless the default NIC is already on it.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidReference`] when the network does not
    /// exist in the instance's zone, and [`OperationError`] when the attach
    /// job does not succeed.
    pub async fn attach_network(
        &self,
        current: &ObservedInstance,
        network: &str,
    ) -> Result<OperationRun, OperationError> {
        if current
            .network
            .as_ref()
            .is_some_and(|attached| attached.matches(network))
        {
            return Ok(OperationRun::unchanged(JobKind::AttachNetwork, current));
        }
        let network_id = self
            .resolve(
                JobKind::AttachNetwork,
                ReferenceKind::Network,
                network,
                Some(current.zone.id.as_str()),
            )
            .await?;
        self.run_job(JobRequest::AttachNetwork {
            id: current.id.clone(),
            network_id,
        })
        .await
    }
}
