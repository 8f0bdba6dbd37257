//! In-place attribute updates: rename, resize, and IP assignment.
//!
//! The control plane rejects a resize, a host rename, or an IP change on a
//! running instance. These operations do not stop the instance themselves;
//! the plan brackets them with `Stop` and `Start`.

use std::net::IpAddr;

use crate::control_plane::{ControlPlane, JobKind, JobRequest, ReferenceKind};
use crate::model::ObservedInstance;

use super::{Lifecycle, OperationError, OperationRun};

impl<C> Lifecycle<'_, C>
where
    C: ControlPlane + ?Sized,
{
    /// Sets the host and display names together.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] when the rename job does not succeed.
    pub async fn rename(
        &self,
        current: &ObservedInstance,
        name: &str,
        display_name: &str,
    ) -> Result<OperationRun, OperationError> {
        if current.has_name(name) && current.display_name == display_name {
            return Ok(OperationRun::unchanged(JobKind::Rename, current));
        }
        self.run_job(JobRequest::Rename {
            id: current.id.clone(),
            name: name.to_owned(),
            display_name: display_name.to_owned(),
        })
        .await
    }

    /// Moves the instance to another service tier.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidReference`] when the tier does not
    /// exist in the instance's zone, and [`OperationError`] when the resize
    /// job does not succeed.
    pub async fn resize(
        &self,
        current: &ObservedInstance,
        service_tier: &str,
    ) -> Result<OperationRun, OperationError> {
        if current.service_tier.matches(service_tier) {
            return Ok(OperationRun::unchanged(JobKind::Resize, current));
        }
        let service_tier_id = self
            .resolve(
                JobKind::Resize,
                ReferenceKind::ServiceTier,
                service_tier,
                Some(current.zone.id.as_str()),
            )
            .await?;
        self.run_job(JobRequest::Resize {
            id: current.id.clone(),
            service_tier_id,
        })
        .await
    }

    /// Sets the address of the default NIC.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] when the assignment job does not succeed.
    pub async fn assign_ip(
        &self,
        current: &ObservedInstance,
        address: IpAddr,
    ) -> Result<OperationRun, OperationError> {
        if current.ip_address == Some(address) {
            return Ok(OperationRun::unchanged(JobKind::AssignIp, current));
        }
        self.run_job(JobRequest::AssignIp {
            id: current.id.clone(),
            address: address.to_string(),
        })
        .await
    }
}
