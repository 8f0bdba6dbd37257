//! Translation of job requests into CloudStack API commands.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::control_plane::{JobRequest, ReferenceKind, TransportError};

/// Whether CloudStack answers a command with a job or with the result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Mode {
    Async,
    Sync,
}

/// A command name with its query parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct Command {
    pub(super) name: &'static str,
    pub(super) mode: Mode,
    pub(super) params: Vec<(&'static str, String)>,
}

impl Command {
    const fn new(name: &'static str, mode: Mode) -> Self {
        Self {
            name,
            mode,
            params: Vec::new(),
        }
    }

    fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    fn optional(self, key: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(present) => self.param(key, present),
            None => self,
        }
    }
}

/// Builds the command for `request`. IP assignment targets a NIC, so the
/// caller passes the instance's default NIC identifier.
pub(super) fn for_request(
    request: &JobRequest,
    default_nic: Option<&str>,
) -> Result<Command, TransportError> {
    let command = match request {
        JobRequest::Deploy(params) => {
            let user_data = params
                .user_data
                .as_deref()
                .map(|raw| STANDARD.encode(raw.as_bytes()));
            let networks = (!params.network_ids.is_empty()).then(|| params.network_ids.join(","));
            Command::new("deployVirtualMachine", Mode::Async)
                .param("name", &params.name)
                .param("displayname", &params.display_name)
                .param("serviceofferingid", &params.service_tier_id)
                .param("templateid", &params.template_id)
                .param("zoneid", &params.zone_id)
                .optional("networkids", networks.as_deref())
                .optional("ipaddress", params.ip_address.as_deref())
                .optional("keypair", params.keypair.as_deref())
                .optional("projectid", params.project_id.as_deref())
                .optional("userdata", user_data.as_deref())
        }
        JobRequest::Start { id } => {
            Command::new("startVirtualMachine", Mode::Async).param("id", id.as_str())
        }
        JobRequest::Stop { id } => {
            Command::new("stopVirtualMachine", Mode::Async).param("id", id.as_str())
        }
        JobRequest::Resize {
            id,
            service_tier_id,
        } => Command::new("changeServiceForVirtualMachine", Mode::Sync)
            .param("id", id.as_str())
            .param("serviceofferingid", service_tier_id),
        JobRequest::Rename {
            id,
            name,
            display_name,
        } => Command::new("updateVirtualMachine", Mode::Sync)
            .param("id", id.as_str())
            .param("name", name)
            .param("displayname", display_name),
        JobRequest::AssignIp { id, address } => {
            let Some(nic) = default_nic else {
                return Err(TransportError::Api {
                    code: 431,
                    message: format!("instance {id} has no default NIC"),
                });
            };
            Command::new("updateVmNicIp", Mode::Async)
                .param("nicid", nic)
                .param("ipaddress", address)
        }
        JobRequest::AttachNetwork { id, network_id } => {
            Command::new("addNicToVirtualMachine", Mode::Async)
                .param("virtualmachineid", id.as_str())
                .param("networkid", network_id)
        }
        JobRequest::Destroy { id, expunge } => Command::new("destroyVirtualMachine", Mode::Async)
            .param("id", id.as_str())
            .param("expunge", expunge.to_string()),
    };
    Ok(command)
}

/// Builds the lookup for a sibling resource. Values that parse as UUIDs are
/// looked up by identifier, everything else by name.
pub(super) fn for_reference(
    kind: ReferenceKind,
    value: &str,
    zone_id: Option<&str>,
) -> (Command, &'static str) {
    let (name, key) = match kind {
        ReferenceKind::Zone => ("listZones", "zone"),
        ReferenceKind::Template => ("listTemplates", "template"),
        ReferenceKind::ServiceTier => ("listServiceOfferings", "serviceoffering"),
        ReferenceKind::Network => ("listNetworks", "network"),
        ReferenceKind::Project => ("listProjects", "project"),
    };
    let by = if uuid::Uuid::parse_str(value).is_ok() {
        "id"
    } else {
        "name"
    };
    let mut command = Command::new(name, Mode::Sync).param(by, value);
    match kind {
        ReferenceKind::Template => {
            command = command
                .param("templatefilter", "executable")
                .optional("zoneid", zone_id);
        }
        ReferenceKind::Network => {
            command = command.param("listall", "true").optional("zoneid", zone_id);
        }
        ReferenceKind::Project => command = command.param("listall", "true"),
        ReferenceKind::Zone | ReferenceKind::ServiceTier => {}
    }
    (command, key)
}
