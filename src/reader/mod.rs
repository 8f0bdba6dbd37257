//! Instance snapshot reader.
//!
//! Maps raw control plane records into [`ObservedInstance`] values. An
//! unknown identifier is reported as `None`, which is how callers learn an
//! instance was removed out-of-band; transport failures stay errors.

use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::control_plane::{ControlPlane, RawInstanceRecord, RawNic, ResourceFilter, TransportError};
use crate::model::{InstanceState, NamedRef, ObservedInstance};
use crate::retry::RetryPolicy;
use crate::types::RemoteId;

/// Errors raised while reading instance state.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReadError {
    /// Raised when the control plane stays unreachable after retries.
    #[error("failed to read instance {remote_id}: {source}")]
    Transport {
        /// Instance being read, or the lookup description.
        remote_id: String,
        /// Last transport failure.
        #[source]
        source: TransportError,
    },
}

/// Reads instance snapshots through a control plane.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnapshotReader {
    retry: RetryPolicy,
}

impl SnapshotReader {
    /// Creates a reader with the given retry budget.
    #[must_use]
    pub const fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Reads the current state of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Transport`] when the control plane cannot be
    /// reached within the retry budget.
    pub async fn read<C>(
        &self,
        plane: &C,
        id: &RemoteId,
    ) -> Result<Option<ObservedInstance>, ReadError>
    where
        C: ControlPlane + ?Sized,
    {
        let record = self
            .retry
            .run("get_resource", || plane.get_resource(id))
            .await
            .map_err(|source| ReadError::Transport {
                remote_id: id.to_string(),
                source,
            })?;
        if record.is_none() {
            debug!(remote_id = %id, "instance unknown to control plane");
        }
        Ok(record.map(observe))
    }

    /// Looks an instance up by host name within a zone.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Transport`] when listing fails within the retry
    /// budget.
    pub async fn find_by_name<C>(
        &self,
        plane: &C,
        name: &str,
        zone_id: Option<&str>,
    ) -> Result<Option<ObservedInstance>, ReadError>
    where
        C: ControlPlane + ?Sized,
    {
        let filter = ResourceFilter {
            name: Some(name.to_owned()),
            zone_id: zone_id.map(str::to_owned),
            project_id: None,
        };
        let records = self
            .retry
            .run("list_resources", || plane.list_resources(&filter))
            .await
            .map_err(|source| ReadError::Transport {
                remote_id: format!("name={name}"),
                source,
            })?;
        Ok(records
            .into_iter()
            .find(|record| record.name.eq_ignore_ascii_case(name))
            .map(observe))
    }
}

/// Maps a raw record into the entity model.
#[must_use]
pub fn observe(record: RawInstanceRecord) -> ObservedInstance {
    let nic = default_nic(&record.nic);
    let ip_address = nic
        .and_then(|nic| nic.ip_address.as_deref())
        .and_then(|raw| IpAddr::from_str(raw).ok());
    let network = nic.and_then(|nic| named(nic.network_id.clone(), nic.network_name.clone()));
    let project = named(record.project_id, record.project);
    let display_name = record
        .display_name
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| record.name.clone());

    ObservedInstance {
        id: RemoteId::from(record.id),
        name: record.name,
        display_name,
        service_tier: NamedRef::new(record.service_offering_id, record.service_offering_name),
        template: NamedRef::new(record.template_id, record.template_name),
        zone: NamedRef::new(record.zone_id, record.zone_name),
        state: InstanceState::from_remote(&record.state),
        ip_address,
        network,
        keypair: record.keypair.filter(|value| !value.is_empty()),
        project,
    }
}

/// Pairs an optional identifier with its optional name, falling back to
/// whichever of the two is present.
fn named(id: Option<String>, name: Option<String>) -> Option<NamedRef> {
    let id = id.filter(|value| !value.is_empty());
    let name = name.filter(|value| !value.is_empty());
    match (id, name) {
        (Some(id), Some(name)) => Some(NamedRef::new(id, name)),
        (Some(only), None) | (None, Some(only)) => Some(NamedRef::new(only.clone(), only)),
        (None, None) => None,
    }
}

fn default_nic(nics: &[RawNic]) -> Option<&RawNic> {
    nics.iter().find(|nic| nic.is_default).or_else(|| nics.first())
}

#[cfg(test)]
mod tests;
