//! Attribute differ: desired spec versus observed instance.
//!
//! The differ is pure. It compares attributes one by one and emits an
//! [`ActionPlan`] whose operations are always ordered
//! `[Stop?, Rename?, Resize?, AttachNetwork?, AssignIp?, Start?]`. Steps the
//! control plane rejects on a running instance are bracketed by `Stop` and
//! `Start`, so the instance ends in the run state it started in.

use std::fmt;
use std::net::IpAddr;

use crate::control_plane::JobKind;
use crate::model::{DesiredSpec, InstanceState, ObservedInstance};

/// A single lifecycle step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    /// Deploy a new instance from the desired spec.
    Create(Box<DesiredSpec>),
    /// Power off.
    Stop,
    /// Change host and display names together.
    Rename {
        /// Target host name.
        name: String,
        /// Target display name.
        display_name: String,
    },
    /// Change the service tier.
    Resize {
        /// Target service tier name or identifier.
        service_tier: String,
    },
    /// Attach the instance to a network it has no NIC on.
    AttachNetwork {
        /// Network name or identifier.
        network: String,
    },
    /// Set the IP address on the default NIC.
    AssignIp {
        /// Requested address.
        address: IpAddr,
    },
    /// Power on.
    Start,
    /// Delete the instance.
    Destroy {
        /// Purge immediately rather than soft-delete.
        expunge: bool,
    },
}

impl Operation {
    /// Job kind submitted for this operation.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        match self {
            Self::Create(_) => JobKind::Create,
            Self::Stop => JobKind::Stop,
            Self::Rename { .. } => JobKind::Rename,
            Self::Resize { .. } => JobKind::Resize,
            Self::AttachNetwork { .. } => JobKind::AttachNetwork,
            Self::AssignIp { .. } => JobKind::AssignIp,
            Self::Start => JobKind::Start,
            Self::Destroy { .. } => JobKind::Destroy,
        }
    }
}

/// A creation-time attribute that differs from the desired value. These are
/// reported, never acted on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Inconsistency {
    /// Attribute name.
    pub attribute: &'static str,
    /// Desired value.
    pub desired: String,
    /// Observed value.
    pub observed: String,
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is fixed at creation (desired '{}', observed '{}')",
            self.attribute, self.desired, self.observed
        )
    }
}

/// Ordered operations for one reconciliation pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ActionPlan {
    operations: Vec<Operation>,
    unsupported: Vec<String>,
    warnings: Vec<Inconsistency>,
}

impl ActionPlan {
    /// Operations in execution order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Job kinds in execution order.
    #[must_use]
    pub fn kinds(&self) -> Vec<JobKind> {
        self.operations.iter().map(Operation::kind).collect()
    }

    /// Returns whether nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.unsupported.is_empty()
    }

    /// Reasons an in-place update is impossible.
    #[must_use]
    pub fn unsupported(&self) -> &[String] {
        &self.unsupported
    }

    /// Returns whether the instance must be destroyed and re-created.
    #[must_use]
    pub fn requires_replacement(&self) -> bool {
        !self.unsupported.is_empty()
    }

    /// Creation-time attributes that drifted.
    #[must_use]
    pub fn warnings(&self) -> &[Inconsistency] {
        &self.warnings
    }
}

impl fmt::Display for ActionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requires_replacement() {
            return write!(f, "replace ({})", self.unsupported.join("; "));
        }
        if self.operations.is_empty() {
            return f.write_str("no changes");
        }
        let steps = self
            .operations
            .iter()
            .map(|op| op.kind().to_string())
            .collect::<Vec<_>>();
        f.write_str(&steps.join(" -> "))
    }
}

/// Computes the plan converging `observed` onto `desired`.
#[must_use]
pub fn plan(desired: &DesiredSpec, observed: Option<&ObservedInstance>) -> ActionPlan {
    let Some(current) = observed else {
        return ActionPlan {
            operations: vec![Operation::Create(Box::new(desired.clone()))],
            ..ActionPlan::default()
        };
    };

    let mut plan = ActionPlan {
        warnings: creation_time_drift(desired, current),
        ..ActionPlan::default()
    };

    if current.state == InstanceState::Expunging {
        plan.unsupported
            .push(String::from("instance is being destroyed"));
        return plan;
    }
    if !current.template.matches(&desired.template) {
        plan.unsupported
            .push(String::from("template change requires replacement"));
    }
    let attach = match (desired.network.as_deref(), current.network.as_ref()) {
        (Some(wanted), Some(attached)) if !attached.matches(wanted) => {
            plan.unsupported
                .push(String::from("network change requires replacement"));
            None
        }
        (Some(wanted), None) => Some(wanted.to_owned()),
        _ => None,
    };
    if plan.requires_replacement() {
        return plan;
    }

    let host_rename = !current.has_name(&desired.name);
    let rename = host_rename || current.display_name != desired.display_name;
    let resize = !current.service_tier.matches(&desired.service_tier);
    let assign_ip = desired
        .ip_address
        .filter(|wanted| current.ip_address != Some(*wanted));
    let needs_stop = current.is_running() && (host_rename || resize || assign_ip.is_some());

    if needs_stop {
        plan.operations.push(Operation::Stop);
    }
    if rename {
        plan.operations.push(Operation::Rename {
            name: desired.name.clone(),
            display_name: desired.display_name.clone(),
        });
    }
    if resize {
        plan.operations.push(Operation::Resize {
            service_tier: desired.service_tier.clone(),
        });
    }
    if let Some(network) = attach {
        plan.operations.push(Operation::AttachNetwork { network });
    }
    if let Some(address) = assign_ip {
        plan.operations.push(Operation::AssignIp { address });
    }
    if needs_stop {
        plan.operations.push(Operation::Start);
    }
    plan
}

/// Plan for tearing an instance down: `[Stop?, Destroy]`.
#[must_use]
pub fn teardown(observed: &ObservedInstance, expunge: bool) -> ActionPlan {
    let mut operations = Vec::with_capacity(2);
    if observed.is_running() {
        operations.push(Operation::Stop);
    }
    operations.push(Operation::Destroy { expunge });
    ActionPlan {
        operations,
        ..ActionPlan::default()
    }
}

fn creation_time_drift(desired: &DesiredSpec, current: &ObservedInstance) -> Vec<Inconsistency> {
    let mut warnings = Vec::new();
    if !current.zone.matches(&desired.zone) {
        warnings.push(Inconsistency {
            attribute: "zone",
            desired: desired.zone.clone(),
            observed: current.zone.name.clone(),
        });
    }
    let project_matches = match (desired.project.as_deref(), current.project.as_ref()) {
        (Some(wanted), Some(actual)) => actual.matches(wanted),
        (None, None) => true,
        _ => false,
    };
    if !project_matches {
        warnings.push(Inconsistency {
            attribute: "project",
            desired: desired.project.clone().unwrap_or_default(),
            observed: current
                .project
                .as_ref()
                .map(|project| project.name.clone())
                .unwrap_or_default(),
        });
    }
    if desired.keypair != current.keypair {
        warnings.push(Inconsistency {
            attribute: "keypair",
            desired: desired.keypair.clone().unwrap_or_default(),
            observed: current.keypair.clone().unwrap_or_default(),
        });
    }
    warnings
}
