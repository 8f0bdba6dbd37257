//! Entity model shared by the differ, lifecycle operations, and reconciler.
//!
//! [`DesiredSpec`] is the caller's declaration; [`ObservedInstance`] is what
//! the control plane last reported. Both are plain values owned by a single
//! reconciliation pass.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::types::RemoteId;

/// How the instance's network attachment is chosen at creation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NetworkPolicy {
    /// The caller must name the network explicitly.
    #[default]
    Explicit,
    /// The control plane attaches the zone's default network when none is
    /// named.
    ZoneDefault,
}

/// Declared desired state for a single instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DesiredSpec {
    /// Host name of the instance.
    pub name: String,
    /// Human readable label shown by the control plane.
    pub display_name: String,
    /// Service tier (offering) name or identifier.
    pub service_tier: String,
    /// Template name or identifier used to boot the instance.
    pub template: String,
    /// Network name or identifier the instance attaches to.
    pub network: Option<String>,
    /// Whether a missing network is acceptable.
    pub network_policy: NetworkPolicy,
    /// Zone name or identifier.
    pub zone: String,
    /// Static IP address to assign on the instance's network.
    pub ip_address: Option<IpAddr>,
    /// SSH key pair name registered with the control plane.
    pub keypair: Option<String>,
    /// Project scope for the instance.
    pub project: Option<String>,
    /// User-data payload handed to the instance at first boot.
    pub user_data: Option<String>,
    /// Purge the instance immediately on destroy rather than soft-deleting.
    pub expunge: bool,
}

impl DesiredSpec {
    /// Starts a builder for a [`DesiredSpec`].
    #[must_use]
    pub fn builder() -> DesiredSpecBuilder {
        DesiredSpecBuilder::default()
    }

    /// Validates required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingField`] when a required field is empty,
    /// including the network when [`NetworkPolicy::Explicit`] applies.
    pub fn validate(&self) -> Result<(), ModelError> {
        let required = [
            ("name", self.name.as_str()),
            ("display_name", self.display_name.as_str()),
            ("service_tier", self.service_tier.as_str()),
            ("template", self.template.as_str()),
            ("zone", self.zone.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(ModelError::MissingField((*field).to_owned()));
        }
        let has_network = self.network.as_deref().is_some_and(|net| !net.is_empty());
        if !has_network && self.network_policy == NetworkPolicy::Explicit {
            return Err(ModelError::MissingField(String::from("network")));
        }
        Ok(())
    }
}

/// Builder for [`DesiredSpec`] that trims inputs and validates on build.
#[derive(Clone, Debug, Default)]
pub struct DesiredSpecBuilder {
    name: String,
    display_name: Option<String>,
    service_tier: String,
    template: String,
    network: Option<String>,
    network_policy: NetworkPolicy,
    zone: String,
    ip_address: Option<String>,
    keypair: Option<String>,
    project: Option<String>,
    user_data: Option<String>,
    expunge: bool,
}

impl DesiredSpecBuilder {
    /// Sets the host name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the display name. Defaults to the host name.
    #[must_use]
    pub fn display_name(mut self, value: impl Into<String>) -> Self {
        self.display_name = Some(value.into());
        self
    }

    /// Sets the service tier.
    #[must_use]
    pub fn service_tier(mut self, value: impl Into<String>) -> Self {
        self.service_tier = value.into();
        self
    }

    /// Sets the template.
    #[must_use]
    pub fn template(mut self, value: impl Into<String>) -> Self {
        self.template = value.into();
        self
    }

    /// Sets the network name or identifier.
    #[must_use]
    pub fn network(mut self, value: impl Into<String>) -> Self {
        self.network = Some(value.into());
        self
    }

    /// Sets how a missing network is handled.
    #[must_use]
    pub const fn network_policy(mut self, policy: NetworkPolicy) -> Self {
        self.network_policy = policy;
        self
    }

    /// Sets the zone.
    #[must_use]
    pub fn zone(mut self, value: impl Into<String>) -> Self {
        self.zone = value.into();
        self
    }

    /// Requests a static IP address.
    #[must_use]
    pub fn ip_address(mut self, value: impl Into<String>) -> Self {
        self.ip_address = Some(value.into());
        self
    }

    /// Sets the key pair name.
    #[must_use]
    pub fn keypair(mut self, value: impl Into<String>) -> Self {
        self.keypair = Some(value.into());
        self
    }

    /// Sets the project scope.
    #[must_use]
    pub fn project(mut self, value: impl Into<String>) -> Self {
        self.project = Some(value.into());
        self
    }

    /// Sets the user-data payload.
    #[must_use]
    pub fn user_data(mut self, value: impl Into<String>) -> Self {
        self.user_data = Some(value.into());
        self
    }

    /// Sets the expunge-on-destroy flag.
    #[must_use]
    pub const fn expunge(mut self, value: bool) -> Self {
        self.expunge = value;
        self
    }

    /// Builds and validates the [`DesiredSpec`].
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingField`] when a required field is empty
    /// and [`ModelError::InvalidIpAddress`] when the static IP does not parse.
    pub fn build(self) -> Result<DesiredSpec, ModelError> {
        let name = self.name.trim().to_owned();
        let display_name = self
            .display_name
            .map_or_else(|| name.clone(), |value| value.trim().to_owned());
        let ip_address = self
            .ip_address
            .map(|raw| {
                let trimmed = raw.trim();
                IpAddr::from_str(trimmed)
                    .map_err(|_| ModelError::InvalidIpAddress(trimmed.to_owned()))
            })
            .transpose()?;
        let spec = DesiredSpec {
            name,
            display_name,
            service_tier: self.service_tier.trim().to_owned(),
            template: self.template.trim().to_owned(),
            network: non_empty(self.network),
            network_policy: self.network_policy,
            zone: self.zone.trim().to_owned(),
            ip_address,
            keypair: non_empty(self.keypair),
            project: non_empty(self.project),
            user_data: self.user_data,
            expunge: self.expunge,
        };
        spec.validate()?;
        Ok(spec)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Run state reported by the control plane.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum InstanceState {
    /// Being created, started, stopped, or migrated.
    Provisioning,
    /// Powered on.
    Running,
    /// Powered off.
    Stopped,
    /// Soft-deleted or being purged.
    Expunging,
    /// The control plane reports a failure.
    Error,
    /// Any state this crate does not recognise.
    Unknown,
}

impl InstanceState {
    /// Maps a CloudStack virtual machine state string.
    #[must_use]
    pub fn from_remote(value: &str) -> Self {
        match value {
            "Running" => Self::Running,
            "Stopped" => Self::Stopped,
            "Creating" | "Starting" | "Stopping" | "Migrating" => Self::Provisioning,
            "Destroyed" | "Expunging" => Self::Expunging,
            "Error" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Expunging => "expunging",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// A remote reference that carries both its identifier and its name.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct NamedRef {
    /// Control plane identifier.
    pub id: String,
    /// Human readable name.
    pub name: String,
}

impl NamedRef {
    /// Creates a reference from an identifier and a name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Returns whether `wanted` names this reference by identifier or name.
    #[must_use]
    pub fn matches(&self, wanted: &str) -> bool {
        self.id == wanted || self.name == wanted
    }
}

/// Snapshot of an instance as reported by the control plane.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ObservedInstance {
    /// Stable remote identifier.
    pub id: RemoteId,
    /// Host name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Service tier in effect.
    pub service_tier: NamedRef,
    /// Template the instance booted from.
    pub template: NamedRef,
    /// Zone hosting the instance.
    pub zone: NamedRef,
    /// Current run state.
    pub state: InstanceState,
    /// IP address on the default network.
    pub ip_address: Option<IpAddr>,
    /// Network the default NIC is attached to.
    pub network: Option<NamedRef>,
    /// Key pair installed at creation.
    pub keypair: Option<String>,
    /// Project scope.
    pub project: Option<NamedRef>,
}

impl ObservedInstance {
    /// Returns whether the instance is powered on.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }

    /// Compares host names the way the control plane does, ignoring ASCII
    /// case.
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Errors raised while building model values.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ModelError {
    /// Raised when a required field is missing or empty.
    #[error("missing or empty field: {0}")]
    MissingField(String),
    /// Raised when the static IP address cannot be parsed.
    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),
}
