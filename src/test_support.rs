//! Test support utilities shared across unit and integration tests.
//!
//! [`FakeControlPlane`] is an in-memory control plane that behaves like a
//! CloudStack simulator: jobs apply their effect when submitted and report
//! success after a configurable number of polls. It enforces the same
//! ordering rule the real control plane does: resizing, renaming the host,
//! or changing the IP of a running instance is rejected.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::control_plane::{
    ControlPlane, DeployParams, JobKind, JobRef, JobRequest, JobStatus, JobSubmission,
    PlaneFuture, RawInstanceRecord, RawNic, ReferenceKind, ResourceFilter, TransportError,
};
use crate::types::{JobId, RemoteId};

/// Zone name seeded by [`FakeControlPlane::simulator`].
pub const SIMULATOR_ZONE: &str = "Sandbox-simulator";
/// Template name seeded by [`FakeControlPlane::simulator`].
pub const SIMULATOR_TEMPLATE: &str = "CentOS 5.6 (64-bit) no GUI (Simulator)";
/// Small service tier seeded by [`FakeControlPlane::simulator`].
pub const SMALL_INSTANCE: &str = "Small Instance";
/// Medium service tier seeded by [`FakeControlPlane::simulator`].
pub const MEDIUM_INSTANCE: &str = "Medium Instance";
/// Network identifier seeded by [`FakeControlPlane::simulator`].
pub const SIMULATOR_NETWORK: &str = "net-1";
/// Name of [`SIMULATOR_NETWORK`].
pub const SIMULATOR_NETWORK_NAME: &str = "terraform-network";
/// Second network identifier seeded by [`FakeControlPlane::simulator`].
pub const SIMULATOR_OTHER_NETWORK: &str = "net-2";
/// Project name seeded by [`FakeControlPlane::simulator`].
pub const SIMULATOR_PROJECT: &str = "terraform";

/// Builds a running simulator instance on the small tier with one default
/// NIC on [`SIMULATOR_NETWORK`].
#[must_use]
pub fn running_record(id: &str, name: &str) -> RawInstanceRecord {
    RawInstanceRecord {
        id: id.to_owned(),
        name: name.to_owned(),
        display_name: Some(name.to_owned()),
        service_offering_id: String::from("so-small"),
        service_offering_name: String::from(SMALL_INSTANCE),
        template_id: String::from("tmpl-1"),
        template_name: String::from(SIMULATOR_TEMPLATE),
        zone_id: String::from("zone-1"),
        zone_name: String::from(SIMULATOR_ZONE),
        state: String::from("Running"),
        nic: vec![RawNic {
            id: format!("nic-{id}"),
            network_id: Some(String::from(SIMULATOR_NETWORK)),
            network_name: Some(String::from(SIMULATOR_NETWORK_NAME)),
            ip_address: Some(String::from("10.1.1.50")),
            is_default: true,
        }],
        keypair: None,
        project_id: None,
        project: None,
    }
}

/// Which control plane call a scripted transport failure applies to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FaultPoint {
    /// `submit_job`.
    Submit,
    /// `poll_job`.
    Poll,
    /// `get_resource`.
    Get,
}

#[derive(Clone, Debug)]
struct FakeJob {
    target: Option<String>,
    remaining_polls: u32,
    stalled: bool,
    outcome: FakeOutcome,
}

#[derive(Clone, Debug)]
enum FakeOutcome {
    Instance,
    Gone,
    Failed(String),
}

#[derive(Debug, Default)]
struct FakeState {
    instances: BTreeMap<String, RawInstanceRecord>,
    references: Vec<(ReferenceKind, String, String)>,
    jobs: HashMap<String, FakeJob>,
    tokens: HashMap<Uuid, JobRef>,
    submissions: Vec<JobSubmission>,
    job_failures: HashMap<JobKind, String>,
    stalled_kinds: Vec<JobKind>,
    faults: HashMap<FaultPoint, u32>,
    fault_calls: HashMap<FaultPoint, u32>,
    pending_polls: u32,
    polls: u32,
    next_id: u32,
    fold_names: bool,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn take_fault(&mut self, point: FaultPoint) -> Result<(), TransportError> {
        *self.fault_calls.entry(point).or_default() += 1;
        let Some(remaining) = self.faults.get_mut(&point) else {
            return Ok(());
        };
        if *remaining == 0 {
            return Ok(());
        }
        *remaining -= 1;
        Err(TransportError::Unavailable {
            message: format!("scripted {point:?} failure"),
        })
    }

    fn reference_name(&self, kind: ReferenceKind, id: &str) -> String {
        self.references
            .iter()
            .find(|(ref_kind, ref_id, _)| *ref_kind == kind && ref_id == id)
            .map_or_else(|| id.to_owned(), |(_, _, name)| name.clone())
    }

    fn allocate_ip(&mut self) -> String {
        self.next_id += 1;
        format!("10.1.1.{}", 10 + self.next_id)
    }

    fn deploy(&mut self, params: &DeployParams) -> String {
        let id = self.next_id("vm");
        let ip_address = params
            .ip_address
            .clone()
            .unwrap_or_else(|| self.allocate_ip());
        let network_id = params
            .network_ids
            .first()
            .cloned()
            .unwrap_or_else(|| String::from("net-default"));
        let name = if self.fold_names {
            params.name.to_ascii_lowercase()
        } else {
            params.name.clone()
        };
        let record = RawInstanceRecord {
            id: id.clone(),
            name,
            display_name: Some(params.display_name.clone()),
            service_offering_id: params.service_tier_id.clone(),
            service_offering_name: self
                .reference_name(ReferenceKind::ServiceTier, &params.service_tier_id),
            template_id: params.template_id.clone(),
            template_name: self.reference_name(ReferenceKind::Template, &params.template_id),
            zone_id: params.zone_id.clone(),
            zone_name: self.reference_name(ReferenceKind::Zone, &params.zone_id),
            state: String::from("Running"),
            nic: vec![RawNic {
                id: self.next_id("nic"),
                network_name: Some(self.reference_name(ReferenceKind::Network, &network_id)),
                network_id: Some(network_id),
                ip_address: Some(ip_address),
                is_default: true,
            }],
            keypair: params.keypair.clone(),
            project_id: params.project_id.clone(),
            project: params
                .project_id
                .as_deref()
                .map(|project| self.reference_name(ReferenceKind::Project, project)),
        };
        self.instances.insert(id.clone(), record);
        id
    }

    fn apply(&mut self, request: &JobRequest) -> Result<FakeOutcome, TransportError> {
        if let JobRequest::Deploy(_) = request {
            return Ok(FakeOutcome::Instance);
        }
        let Some(id) = request.target() else {
            return Ok(FakeOutcome::Instance);
        };
        if let JobRequest::Destroy { expunge: true, .. } = request {
            if self.instances.remove(id.as_str()).is_none() {
                return Err(TransportError::Api {
                    code: 431,
                    message: format!("Unable to find virtual machine {id}"),
                });
            }
            return Ok(FakeOutcome::Gone);
        }
        let fold = self.fold_names;
        let mut allocated = None;
        if let JobRequest::AttachNetwork { network_id, .. } = request {
            allocated = Some((
                self.next_id("nic"),
                self.allocate_ip(),
                self.reference_name(ReferenceKind::Network, network_id),
            ));
        }
        let service_tier_name = match request {
            JobRequest::Resize {
                service_tier_id, ..
            } => Some(self.reference_name(ReferenceKind::ServiceTier, service_tier_id)),
            _ => None,
        };
        let Some(record) = self.instances.get_mut(id.as_str()) else {
            return Err(TransportError::Api {
                code: 431,
                message: format!("Unable to find virtual machine {id}"),
            });
        };
        let running = record.state == "Running";
        let outcome = match request {
            JobRequest::Deploy(_) => FakeOutcome::Instance,
            JobRequest::Start { .. } => {
                record.state = String::from("Running");
                FakeOutcome::Instance
            }
            JobRequest::Stop { .. } => {
                record.state = String::from("Stopped");
                FakeOutcome::Instance
            }
            JobRequest::Resize {
                service_tier_id, ..
            } => {
                if running {
                    return Ok(FakeOutcome::Failed(String::from(
                        "Unable to change service offering of a running virtual machine",
                    )));
                }
                record.service_offering_id.clone_from(service_tier_id);
                record.service_offering_name = service_tier_name.unwrap_or_default();
                FakeOutcome::Instance
            }
            JobRequest::Rename {
                name, display_name, ..
            } => {
                if running && !record.name.eq_ignore_ascii_case(name) {
                    return Ok(FakeOutcome::Failed(String::from(
                        "Virtual machine must be stopped to change its name",
                    )));
                }
                record.name = if fold {
                    name.to_ascii_lowercase()
                } else {
                    name.clone()
                };
                record.display_name = Some(display_name.clone());
                FakeOutcome::Instance
            }
            JobRequest::AssignIp { address, .. } => {
                if running {
                    return Ok(FakeOutcome::Failed(String::from(
                        "Virtual machine must be stopped to change its IP address",
                    )));
                }
                if let Some(nic) = record.nic.iter_mut().find(|nic| nic.is_default) {
                    nic.ip_address = Some(address.clone());
                }
                FakeOutcome::Instance
            }
            JobRequest::AttachNetwork { network_id, .. } => {
                let (nic_id, ip, network_name) = allocated.unwrap_or_default();
                let is_default = record.nic.is_empty();
                record.nic.push(RawNic {
                    id: nic_id,
                    network_id: Some(network_id.clone()),
                    network_name: Some(network_name),
                    ip_address: Some(ip),
                    is_default,
                });
                FakeOutcome::Instance
            }
            JobRequest::Destroy { .. } => {
                record.state = String::from("Destroyed");
                FakeOutcome::Gone
            }
        };
        Ok(outcome)
    }
}

/// In-memory [`ControlPlane`] for tests.
#[derive(Clone, Debug, Default)]
pub struct FakeControlPlane {
    state: Arc<Mutex<FakeState>>,
}

impl FakeControlPlane {
    /// Creates an empty control plane with no references.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a control plane seeded with the simulator's zone, template,
    /// service tiers, networks, and project.
    #[must_use]
    pub fn simulator() -> Self {
        let plane = Self::new();
        plane.add_reference(ReferenceKind::Zone, "zone-1", SIMULATOR_ZONE);
        plane.add_reference(ReferenceKind::Template, "tmpl-1", SIMULATOR_TEMPLATE);
        plane.add_reference(ReferenceKind::ServiceTier, "so-small", SMALL_INSTANCE);
        plane.add_reference(ReferenceKind::ServiceTier, "so-medium", MEDIUM_INSTANCE);
        plane.add_reference(ReferenceKind::Network, SIMULATOR_NETWORK, SIMULATOR_NETWORK_NAME);
        plane.add_reference(ReferenceKind::Network, SIMULATOR_OTHER_NETWORK, "other-network");
        plane.add_reference(ReferenceKind::Project, "proj-1", SIMULATOR_PROJECT);
        plane
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a sibling resource that [`ControlPlane::find_reference`]
    /// resolves.
    pub fn add_reference(&self, kind: ReferenceKind, id: &str, name: &str) {
        self.lock()
            .references
            .push((kind, id.to_owned(), name.to_owned()));
    }

    /// Stores an instance record directly, bypassing jobs.
    pub fn insert_instance(&self, record: RawInstanceRecord) {
        self.lock().instances.insert(record.id.clone(), record);
    }

    /// Returns the stored record for `id`.
    #[must_use]
    pub fn instance(&self, id: &str) -> Option<RawInstanceRecord> {
        self.lock().instances.get(id).cloned()
    }

    /// Number of stored instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.lock().instances.len()
    }

    /// Deletes an instance out-of-band.
    pub fn remove_instance(&self, id: &str) {
        self.lock().instances.remove(id);
    }

    /// Mutates a stored instance out-of-band to simulate drift.
    pub fn update_instance(&self, id: &str, update: impl FnOnce(&mut RawInstanceRecord)) {
        if let Some(record) = self.lock().instances.get_mut(id) {
            update(record);
        }
    }

    /// Makes the next job of `kind` fail with `reason` without effect.
    pub fn fail_next_job(&self, kind: JobKind, reason: &str) {
        self.lock().job_failures.insert(kind, reason.to_owned());
    }

    /// Makes every job of `kind` stay pending forever.
    pub fn stall_jobs(&self, kind: JobKind) {
        let mut state = self.lock();
        if !state.stalled_kinds.contains(&kind) {
            state.stalled_kinds.push(kind);
        }
    }

    /// Makes the next `count` calls at `point` fail with a transport error.
    pub fn fail_transport(&self, point: FaultPoint, count: u32) {
        self.lock().faults.insert(point, count);
    }

    /// Number of polls a job reports `Pending` before completing.
    pub fn set_pending_polls(&self, polls: u32) {
        self.lock().pending_polls = polls;
    }

    /// Makes the control plane store host names in lower case.
    pub fn fold_names_to_lowercase(&self) {
        self.lock().fold_names = true;
    }

    /// All submissions received, in order, including idempotent repeats.
    #[must_use]
    pub fn submissions(&self) -> Vec<JobSubmission> {
        self.lock().submissions.clone()
    }

    /// Kinds of all distinct logical submissions, in order.
    #[must_use]
    pub fn submitted_kinds(&self) -> Vec<JobKind> {
        let state = self.lock();
        let mut seen = HashSet::new();
        state
            .submissions
            .iter()
            .filter(|submission| seen.insert(submission.token))
            .map(|submission| submission.request.kind())
            .collect()
    }

    /// Forgets recorded submissions.
    pub fn clear_submissions(&self) {
        self.lock().submissions.clear();
    }

    /// Number of `poll_job` calls served.
    #[must_use]
    pub fn poll_count(&self) -> u32 {
        self.lock().polls
    }

    /// Number of calls made at `point`, including failed ones.
    #[must_use]
    pub fn call_count(&self, point: FaultPoint) -> u32 {
        self.lock().fault_calls.get(&point).copied().unwrap_or_default()
    }

    fn submit(&self, submission: &JobSubmission) -> Result<JobRef, TransportError> {
        let mut state = self.lock();
        state.submissions.push(submission.clone());
        state.take_fault(FaultPoint::Submit)?;
        if let Some(existing) = state.tokens.get(&submission.token) {
            return Ok(existing.clone());
        }

        let request = &submission.request;
        let kind = request.kind();
        let outcome = if let Some(reason) = state.job_failures.remove(&kind) {
            FakeOutcome::Failed(reason)
        } else {
            state.apply(request)?
        };
        let target = match request {
            JobRequest::Deploy(params) if !matches!(outcome, FakeOutcome::Failed(_)) => {
                Some(state.deploy(params))
            }
            JobRequest::Deploy(_) => None,
            other => other.target().map(ToString::to_string),
        };

        let job_id = state.next_id("job");
        let job = FakeJob {
            target: target.clone(),
            remaining_polls: state.pending_polls,
            stalled: state.stalled_kinds.contains(&kind),
            outcome,
        };
        state.jobs.insert(job_id.clone(), job);
        let job_ref = JobRef {
            id: JobId::from(job_id),
            kind,
            resource_id: target.map(RemoteId::from),
        };
        state.tokens.insert(submission.token, job_ref.clone());
        Ok(job_ref)
    }

    fn poll(&self, job: &JobRef) -> Result<JobStatus, TransportError> {
        let mut state = self.lock();
        state.polls += 1;
        state.take_fault(FaultPoint::Poll)?;
        let Some(entry) = state.jobs.get_mut(job.id.as_str()) else {
            return Err(TransportError::Api {
                code: 431,
                message: format!("Unable to find job {}", job.id),
            });
        };
        if entry.stalled {
            return Ok(JobStatus::Pending);
        }
        if entry.remaining_polls > 0 {
            entry.remaining_polls -= 1;
            return Ok(JobStatus::Pending);
        }
        let finished = entry.clone();
        Ok(match finished.outcome {
            FakeOutcome::Failed(reason) => JobStatus::Failed(reason),
            FakeOutcome::Gone => JobStatus::Succeeded(None),
            FakeOutcome::Instance => JobStatus::Succeeded(
                finished
                    .target
                    .and_then(|target| state.instances.get(&target).cloned()),
            ),
        })
    }
}

impl ControlPlane for FakeControlPlane {
    fn submit_job<'a>(&'a self, submission: &'a JobSubmission) -> PlaneFuture<'a, JobRef> {
        Box::pin(async move { self.submit(submission) })
    }

    fn poll_job<'a>(&'a self, job: &'a JobRef) -> PlaneFuture<'a, JobStatus> {
        Box::pin(async move { self.poll(job) })
    }

    fn get_resource<'a>(
        &'a self,
        id: &'a RemoteId,
    ) -> PlaneFuture<'a, Option<RawInstanceRecord>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.take_fault(FaultPoint::Get)?;
            Ok(state.instances.get(id.as_str()).cloned())
        })
    }

    fn list_resources<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> PlaneFuture<'a, Vec<RawInstanceRecord>> {
        Box::pin(async move {
            let state = self.lock();
            Ok(state
                .instances
                .values()
                .filter(|record| {
                    filter
                        .name
                        .as_deref()
                        .is_none_or(|name| record.name.eq_ignore_ascii_case(name))
                })
                .filter(|record| {
                    filter
                        .zone_id
                        .as_deref()
                        .is_none_or(|zone| record.zone_id == zone)
                })
                .cloned()
                .collect())
        })
    }

    fn find_reference<'a>(
        &'a self,
        kind: ReferenceKind,
        name: &'a str,
        _zone_id: Option<&'a str>,
    ) -> PlaneFuture<'a, Option<String>> {
        Box::pin(async move {
            let state = self.lock();
            Ok(state
                .references
                .iter()
                .find(|(ref_kind, id, ref_name)| {
                    *ref_kind == kind && (id == name || ref_name == name)
                })
                .map(|(_, id, _)| id.clone()))
        })
    }
}
