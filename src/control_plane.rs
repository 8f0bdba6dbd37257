//! Capability contract for the remote control plane.
//!
//! The reconciler never talks HTTP itself. It drives a [`ControlPlane`]
//! handle that submits asynchronous jobs, polls them, and reads instance
//! records. Implementations must be safe to share between concurrent
//! reconciliations.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{JobId, RemoteId};

/// Future returned by control plane operations.
pub type PlaneFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Kind of remote job.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum JobKind {
    /// Deploy a new instance.
    Create,
    /// Power an instance on.
    Start,
    /// Power an instance off.
    Stop,
    /// Change the service tier.
    Resize,
    /// Change the host and display names.
    Rename,
    /// Change the IP address on the default NIC.
    AssignIp,
    /// Add a NIC on a network.
    AttachNetwork,
    /// Soft-delete or purge an instance.
    Destroy,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Resize => "resize",
            Self::Rename => "rename",
            Self::AssignIp => "assign-ip",
            Self::AttachNetwork => "attach-network",
            Self::Destroy => "destroy",
        };
        f.write_str(label)
    }
}

/// Parameters for deploying an instance. References are already resolved to
/// control plane identifiers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeployParams {
    /// Host name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Service tier identifier.
    pub service_tier_id: String,
    /// Template identifier.
    pub template_id: String,
    /// Zone identifier.
    pub zone_id: String,
    /// Network identifiers; empty when the zone default applies.
    pub network_ids: Vec<String>,
    /// Static IP address on the first network.
    pub ip_address: Option<String>,
    /// Key pair name.
    pub keypair: Option<String>,
    /// Project identifier.
    pub project_id: Option<String>,
    /// Raw user-data payload; transports encode it as required.
    pub user_data: Option<String>,
}

/// A typed job request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobRequest {
    /// Deploy a new instance.
    Deploy(Box<DeployParams>),
    /// Power on.
    Start {
        /// Target instance.
        id: RemoteId,
    },
    /// Power off.
    Stop {
        /// Target instance.
        id: RemoteId,
    },
    /// Change the service tier.
    Resize {
        /// Target instance.
        id: RemoteId,
        /// Resolved service tier identifier.
        service_tier_id: String,
    },
    /// Change names.
    Rename {
        /// Target instance.
        id: RemoteId,
        /// New host name.
        name: String,
        /// New display name.
        display_name: String,
    },
    /// Change the IP on the default NIC.
    AssignIp {
        /// Target instance.
        id: RemoteId,
        /// Requested address.
        address: String,
    },
    /// Add a NIC on a network.
    AttachNetwork {
        /// Target instance.
        id: RemoteId,
        /// Network identifier.
        network_id: String,
    },
    /// Delete the instance.
    Destroy {
        /// Target instance.
        id: RemoteId,
        /// Purge immediately rather than soft-delete.
        expunge: bool,
    },
}

impl JobRequest {
    /// Returns the job kind this request submits.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        match self {
            Self::Deploy(_) => JobKind::Create,
            Self::Start { .. } => JobKind::Start,
            Self::Stop { .. } => JobKind::Stop,
            Self::Resize { .. } => JobKind::Resize,
            Self::Rename { .. } => JobKind::Rename,
            Self::AssignIp { .. } => JobKind::AssignIp,
            Self::AttachNetwork { .. } => JobKind::AttachNetwork,
            Self::Destroy { .. } => JobKind::Destroy,
        }
    }

    /// Returns the targeted instance, if the request names one.
    #[must_use]
    pub const fn target(&self) -> Option<&RemoteId> {
        match self {
            Self::Deploy(_) => None,
            Self::Start { id }
            | Self::Stop { id }
            | Self::Resize { id, .. }
            | Self::Rename { id, .. }
            | Self::AssignIp { id, .. }
            | Self::AttachNetwork { id, .. }
            | Self::Destroy { id, .. } => Some(id),
        }
    }
}

/// A job request paired with the idempotency token of its logical
/// submission. Retries of the same submission reuse the token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobSubmission {
    /// Token identifying one logical request.
    pub token: Uuid,
    /// The request itself.
    pub request: JobRequest,
}

impl JobSubmission {
    /// Wraps a request with a fresh token.
    #[must_use]
    pub fn new(request: JobRequest) -> Self {
        Self {
            token: Uuid::new_v4(),
            request,
        }
    }
}

/// Reference to a submitted job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobRef {
    /// Job identifier tracked by the control plane.
    pub id: JobId,
    /// Kind of job.
    pub kind: JobKind,
    /// Instance the job acts on. Deploy jobs learn it at submission.
    pub resource_id: Option<RemoteId>,
}

/// Status reported when polling a job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobStatus {
    /// Still running.
    Pending,
    /// Finished; carries the instance record when the job returns one.
    Succeeded(Option<RawInstanceRecord>),
    /// Rejected by the control plane with its reason.
    Failed(String),
}

/// NIC entry of a raw instance record.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct RawNic {
    /// NIC identifier.
    pub id: String,
    /// Network the NIC is plugged into.
    #[serde(rename = "networkid", default)]
    pub network_id: Option<String>,
    /// Name of that network.
    #[serde(rename = "networkname", default)]
    pub network_name: Option<String>,
    /// Address assigned on the NIC.
    #[serde(rename = "ipaddress", default)]
    pub ip_address: Option<String>,
    /// Whether this is the default NIC.
    #[serde(rename = "isdefault", default)]
    pub is_default: bool,
}

/// Instance record in the control plane's own vocabulary.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct RawInstanceRecord {
    /// Instance identifier.
    pub id: String,
    /// Host name.
    #[serde(default)]
    pub name: String,
    /// Display name.
    #[serde(rename = "displayname", default)]
    pub display_name: Option<String>,
    /// Service offering identifier.
    #[serde(rename = "serviceofferingid", default)]
    pub service_offering_id: String,
    /// Service offering name.
    #[serde(rename = "serviceofferingname", default)]
    pub service_offering_name: String,
    /// Template identifier.
    #[serde(rename = "templateid", default)]
    pub template_id: String,
    /// Template name.
    #[serde(rename = "templatename", default)]
    pub template_name: String,
    /// Zone identifier.
    #[serde(rename = "zoneid", default)]
    pub zone_id: String,
    /// Zone name.
    #[serde(rename = "zonename", default)]
    pub zone_name: String,
    /// Raw state label such as `Running`.
    #[serde(default)]
    pub state: String,
    /// Attached NICs.
    #[serde(default)]
    pub nic: Vec<RawNic>,
    /// Key pair name.
    #[serde(default)]
    pub keypair: Option<String>,
    /// Project identifier.
    #[serde(rename = "projectid", default)]
    pub project_id: Option<String>,
    /// Project name.
    #[serde(default)]
    pub project: Option<String>,
}

/// Filter for listing instances.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResourceFilter {
    /// Exact host name.
    pub name: Option<String>,
    /// Zone identifier.
    pub zone_id: Option<String>,
    /// Project identifier.
    pub project_id: Option<String>,
}

/// Kinds of sibling resources an instance refers to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReferenceKind {
    /// Availability zone.
    Zone,
    /// Boot template.
    Template,
    /// Service tier (offering).
    ServiceTier,
    /// Network.
    Network,
    /// Project.
    Project,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Zone => "zone",
            Self::Template => "template",
            Self::ServiceTier => "service tier",
            Self::Network => "network",
            Self::Project => "project",
        };
        f.write_str(label)
    }
}

/// Errors raised by the transport beneath a [`ControlPlane`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// The control plane could not be reached.
    #[error("control plane unreachable: {message}")]
    Unavailable {
        /// Error reported by the HTTP client.
        message: String,
    },
    /// The control plane answered with an error status.
    #[error("control plane returned {code}: {message}")]
    Api {
        /// HTTP or API error code.
        code: u16,
        /// Error text returned by the control plane.
        message: String,
    },
    /// The response could not be decoded.
    #[error("failed to decode control plane response: {message}")]
    Decode {
        /// Decoder error message.
        message: String,
    },
}

impl TransportError {
    /// Returns whether a retry may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Api { code, .. } => *code >= 500,
            Self::Decode { .. } => false,
        }
    }

    /// Returns whether the control plane explicitly rejected the request.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Api { code, .. } if *code < 500)
    }
}

/// Minimal interface implemented by control plane clients.
pub trait ControlPlane: Send + Sync {
    /// Submits a job and returns its reference without waiting for it.
    ///
    /// Implementations must treat repeated submissions carrying the same
    /// token as one logical request.
    fn submit_job<'a>(&'a self, submission: &'a JobSubmission) -> PlaneFuture<'a, JobRef>;

    /// Reports the current status of a job.
    fn poll_job<'a>(&'a self, job: &'a JobRef) -> PlaneFuture<'a, JobStatus>;

    /// Fetches an instance record, or `None` when the identifier is unknown.
    fn get_resource<'a>(&'a self, id: &'a RemoteId)
    -> PlaneFuture<'a, Option<RawInstanceRecord>>;

    /// Lists instance records matching a filter.
    fn list_resources<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> PlaneFuture<'a, Vec<RawInstanceRecord>>;

    /// Resolves a sibling resource by name or identifier, returning its
    /// identifier when it exists.
    fn find_reference<'a>(
        &'a self,
        kind: ReferenceKind,
        name: &'a str,
        zone_id: Option<&'a str>,
    ) -> PlaneFuture<'a, Option<String>>;
}
