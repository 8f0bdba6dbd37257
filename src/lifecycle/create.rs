//! Instance creation.
//!
//! Every reference in the desired spec is resolved before anything is
//! submitted, so a misspelt template or tier fails fast instead of producing
//! a doomed deploy job. Templates and networks are resolved within the zone.

use crate::control_plane::{ControlPlane, DeployParams, JobKind, JobRequest, ReferenceKind};
use crate::model::DesiredSpec;

use super::{Lifecycle, OperationError, OperationRun};

impl<C> Lifecycle<'_, C>
where
    C: ControlPlane + ?Sized,
{
    /// Deploys a new instance from `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidReference`] when the zone, template,
    /// service tier, network, or project does not exist, and the usual job
    /// errors once the deploy job has been submitted.
    pub async fn create(&self, desired: &DesiredSpec) -> Result<OperationRun, OperationError> {
        let params = self.deploy_params(desired).await?;
        self.run_job(JobRequest::Deploy(Box::new(params))).await
    }

    async fn deploy_params(&self, desired: &DesiredSpec) -> Result<DeployParams, OperationError> {
        let op = JobKind::Create;
        let zone_id = self
            .resolve(op, ReferenceKind::Zone, &desired.zone, None)
            .await?;
        let zone = Some(zone_id.as_str());
        let template_id = self
            .resolve(op, ReferenceKind::Template, &desired.template, zone)
            .await?;
        let service_tier_id = self
            .resolve(op, ReferenceKind::ServiceTier, &desired.service_tier, zone)
            .await?;
        let mut network_ids = Vec::new();
        if let Some(network) = desired.network.as_deref() {
            network_ids.push(
                self.resolve(op, ReferenceKind::Network, network, zone)
                    .await?,
            );
        }
        let project_id = match desired.project.as_deref() {
            Some(project) => Some(
                self.resolve(op, ReferenceKind::Project, project, None)
                    .await?,
            ),
            None => None,
        };

        Ok(DeployParams {
            name: desired.name.clone(),
            display_name: desired.display_name.clone(),
            service_tier_id,
            template_id,
            zone_id,
            network_ids,
            ip_address: desired.ip_address.map(|address| address.to_string()),
            keypair: desired.keypair.clone(),
            project_id,
            user_data: desired.user_data.clone(),
        })
    }
}
