//! CloudStack implementation of the control plane contract.
//!
//! Requests go to the unsigned integration API as
//! `GET <api_url>?command=<name>&response=json`. Commands CloudStack runs
//! synchronously (`updateVirtualMachine`, `changeServiceForVirtualMachine`)
//! are completed during submission and recorded as already-finished jobs so
//! callers await every operation the same way.

mod commands;
mod error;
mod wire;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::config::StratusConfig;
use crate::control_plane::{
    ControlPlane, JobRef, JobRequest, JobStatus, JobSubmission, PlaneFuture, RawInstanceRecord,
    ReferenceKind, ResourceFilter, TransportError,
};
use crate::types::{JobId, RemoteId};
use commands::{Command, Mode};
use wire::{AsyncAccepted, AsyncJobResult, NamedEntry, VirtualMachineList, VirtualMachineReply};

pub use error::CloudStackError;

const SYNC_JOB_PREFIX: &str = "sync-";
/// Error code CloudStack returns for parameters naming unknown entities.
const PARAM_ERROR: u16 = 431;
/// Submissions remembered for idempotent retries.
const ACCEPTED_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(255);

/// Control plane client speaking the CloudStack JSON API.
#[derive(Debug)]
pub struct CloudStackClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    accepted: Mutex<LruCache<Uuid, JobRef>>,
    completed: Mutex<HashMap<String, JobStatus>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CloudStackClient {
    /// Constructs a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CloudStackError::Config`] when the configuration fails
    /// validation and [`CloudStackError::Client`] when the HTTP client cannot
    /// be built.
    pub fn new(config: &StratusConfig) -> Result<Self, CloudStackError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|err| CloudStackError::Client {
                message: err.to_string(),
            })?;
        Ok(Self {
            http,
            api_url: config.api_url.trim().to_owned(),
            api_key: config.api_key.clone(),
            accepted: Mutex::new(LruCache::new(ACCEPTED_CAPACITY)),
            completed: Mutex::new(HashMap::new()),
        })
    }

    async fn call(&self, command: &Command) -> Result<Value, TransportError> {
        debug!(command = command.name, "calling CloudStack API");
        let mut request = self
            .http
            .get(&self.api_url)
            .query(&[("command", command.name), ("response", "json")])
            .query(&command.params);
        if let Some(key) = self.api_key.as_deref() {
            request = request.query(&[("apikey", key)]);
        }
        let response = request.send().await.map_err(|err| unavailable(&err))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|err| unavailable(&err))?;
        wire::unwrap_envelope(command.name, status, &body)
    }

    async fn list_virtual_machines(
        &self,
        command: Command,
    ) -> Result<Vec<RawInstanceRecord>, TransportError> {
        let inner = self.call(&command).await?;
        let list: VirtualMachineList = wire::decode(command.name, inner)?;
        Ok(list.virtualmachine)
    }

    async fn fetch(&self, id: &RemoteId) -> Result<Option<RawInstanceRecord>, TransportError> {
        let base = Command {
            name: "listVirtualMachines",
            mode: Mode::Sync,
            params: vec![("id", id.to_string()), ("listall", String::from("true"))],
        };
        let mut scoped = base.clone();
        scoped.params.push(("projectid", String::from("-1")));

        // Project-owned instances are only listed with `projectid=-1`.
        for command in [base, scoped] {
            match self.list_virtual_machines(command).await {
                Ok(records) => {
                    if let Some(record) = records.into_iter().next() {
                        return Ok(Some(record));
                    }
                }
                Err(TransportError::Api { code, .. }) if code == PARAM_ERROR => {}
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    async fn default_nic(&self, id: &RemoteId) -> Result<Option<String>, TransportError> {
        let record = self.fetch(id).await?;
        Ok(record.and_then(|vm| {
            vm.nic
                .iter()
                .find(|nic| nic.is_default)
                .or_else(|| vm.nic.first())
                .map(|nic| nic.id.clone())
        }))
    }

    async fn submit(&self, submission: &JobSubmission) -> Result<JobRef, TransportError> {
        let cached = lock(&self.accepted).get(&submission.token).cloned();
        if let Some(existing) = cached {
            return Ok(existing);
        }

        let request = &submission.request;
        let nic = match request {
            JobRequest::AssignIp { id, .. } => self.default_nic(id).await?,
            _ => None,
        };
        let command = commands::for_request(request, nic.as_deref())?;
        let inner = self.call(&command).await?;
        let target = request.target().cloned();

        let job = match command.mode {
            Mode::Async => {
                let accepted: AsyncAccepted = wire::decode(command.name, inner)?;
                JobRef {
                    id: JobId::from(accepted.jobid),
                    kind: request.kind(),
                    resource_id: accepted.id.map(RemoteId::from).or(target),
                }
            }
            Mode::Sync => {
                let reply: VirtualMachineReply = wire::decode(command.name, inner)?;
                let id = JobId::from(format!("{SYNC_JOB_PREFIX}{}", submission.token));
                lock(&self.completed).insert(
                    id.to_string(),
                    JobStatus::Succeeded(Some(reply.virtualmachine)),
                );
                JobRef {
                    id,
                    kind: request.kind(),
                    resource_id: target,
                }
            }
        };
        lock(&self.accepted).put(submission.token, job.clone());
        Ok(job)
    }

    async fn poll(&self, job: &JobRef) -> Result<JobStatus, TransportError> {
        if job.id.as_str().starts_with(SYNC_JOB_PREFIX) {
            // Terminal statuses are handed out once; the poller stops there.
            let status = lock(&self.completed).remove(job.id.as_str());
            return status.ok_or_else(|| TransportError::Api {
                code: PARAM_ERROR,
                message: format!("unknown job {}", job.id),
            });
        }
        let command = Command {
            name: "queryAsyncJobResult",
            mode: Mode::Sync,
            params: vec![("jobid", job.id.to_string())],
        };
        let inner = self.call(&command).await?;
        let result: AsyncJobResult = wire::decode(command.name, inner)?;
        wire::job_status(result)
    }

    async fn lookup(
        &self,
        kind: ReferenceKind,
        value: &str,
        zone_id: Option<&str>,
    ) -> Result<Option<String>, TransportError> {
        let (command, key) = commands::for_reference(kind, value, zone_id);
        let inner = match self.call(&command).await {
            Ok(inner) => inner,
            Err(TransportError::Api { code, .. }) if code == PARAM_ERROR => return Ok(None),
            Err(err) => return Err(err),
        };
        let entries: Vec<NamedEntry> = wire::decode_list(command.name, key, inner)?;
        Ok(entries
            .into_iter()
            .find(|entry| entry.id == value || entry.name == value)
            .map(|entry| entry.id))
    }
}

fn unavailable(err: &reqwest::Error) -> TransportError {
    TransportError::Unavailable {
        message: err.to_string(),
    }
}

impl ControlPlane for CloudStackClient {
    fn submit_job<'a>(&'a self, submission: &'a JobSubmission) -> PlaneFuture<'a, JobRef> {
        Box::pin(self.submit(submission))
    }

    fn poll_job<'a>(&'a self, job: &'a JobRef) -> PlaneFuture<'a, JobStatus> {
        Box::pin(self.poll(job))
    }

    fn get_resource<'a>(
        &'a self,
        id: &'a RemoteId,
    ) -> PlaneFuture<'a, Option<RawInstanceRecord>> {
        Box::pin(self.fetch(id))
    }

    fn list_resources<'a>(
        &'a self,
        filter: &'a ResourceFilter,
    ) -> PlaneFuture<'a, Vec<RawInstanceRecord>> {
        Box::pin(async move {
            let mut command = Command {
                name: "listVirtualMachines",
                mode: Mode::Sync,
                params: vec![("listall", String::from("true"))],
            };
            let filters = [
                ("name", filter.name.as_ref()),
                ("zoneid", filter.zone_id.as_ref()),
                ("projectid", filter.project_id.as_ref()),
            ];
            for (key, value) in filters {
                if let Some(present) = value {
                    command.params.push((key, present.clone()));
                }
            }
            self.list_virtual_machines(command).await
        })
    }

    fn find_reference<'a>(
        &'a self,
        kind: ReferenceKind,
        name: &'a str,
        zone_id: Option<&'a str>,
    ) -> PlaneFuture<'a, Option<String>> {
        Box::pin(self.lookup(kind, name, zone_id))
    }
}
