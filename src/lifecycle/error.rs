//! Error types for lifecycle operations.

use std::time::Duration;

use thiserror::Error;

use crate::control_plane::{JobKind, ReferenceKind, TransportError};
use crate::poller::JobError;
use crate::reader::ReadError;
use crate::types::{JobId, RemoteId};

/// Errors raised by a single lifecycle operation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OperationError {
    /// Raised before submission when a referenced resource does not exist.
    #[error("{kind} '{name}' does not exist")]
    InvalidReference {
        /// Kind of reference that failed to resolve.
        kind: ReferenceKind,
        /// Name or identifier given by the caller.
        name: String,
    },
    /// Raised when the control plane refuses or fails the job.
    #[error("{operation} rejected by the control plane: {reason}")]
    Rejected {
        /// Operation that was rejected.
        operation: JobKind,
        /// Job identifier, when the job was accepted before failing.
        job_id: Option<JobId>,
        /// Reason reported by the control plane, verbatim.
        reason: String,
    },
    /// Raised when the job never finished; its remote effect is unknown.
    #[error("{operation} job {job_id} did not finish after {waited:?}")]
    Timeout {
        /// Operation that timed out.
        operation: JobKind,
        /// Job identifier.
        job_id: JobId,
        /// Instance the job acts on, when known.
        remote_id: Option<RemoteId>,
        /// Time spent waiting.
        waited: Duration,
    },
    /// Raised when the control plane stays unreachable after retries.
    #[error("{operation} failed at the transport layer: {source}")]
    Transport {
        /// Operation being attempted.
        operation: JobKind,
        /// Last transport failure.
        #[source]
        source: TransportError,
    },
    /// Raised when the caller stopped waiting for the job.
    #[error("stopped waiting for {operation} job {job_id}")]
    Cancelled {
        /// Operation being awaited.
        operation: JobKind,
        /// Job identifier; the job keeps running remotely.
        job_id: JobId,
    },
    /// Raised when re-reading the instance after a job that returned no
    /// payload fails.
    #[error(transparent)]
    Read(#[from] ReadError),
    /// Raised when the instance disappears while an operation runs.
    #[error("instance {remote_id} disappeared during {operation}")]
    Vanished {
        /// Operation being applied.
        operation: JobKind,
        /// Instance that vanished.
        remote_id: RemoteId,
    },
    /// Raised when an operation that acts on an instance has none to act on.
    #[error("{operation} requires an existing instance")]
    MissingInstance {
        /// Operation requested.
        operation: JobKind,
    },
}

impl OperationError {
    pub(super) fn from_submit(operation: JobKind, source: TransportError) -> Self {
        match source {
            TransportError::Api { code, message } if code < 500 => Self::Rejected {
                operation,
                job_id: None,
                reason: message,
            },
            other => Self::Transport {
                operation,
                source: other,
            },
        }
    }

    /// Instance the failed operation targeted, when known.
    #[must_use]
    pub const fn remote_id(&self) -> Option<&RemoteId> {
        match self {
            Self::Timeout { remote_id, .. } => remote_id.as_ref(),
            Self::Vanished { remote_id, .. } => Some(remote_id),
            _ => None,
        }
    }
}

impl From<JobError> for OperationError {
    fn from(value: JobError) -> Self {
        match value {
            JobError::Timeout {
                job_id,
                kind,
                resource_id,
                waited,
            } => Self::Timeout {
                operation: kind,
                job_id,
                remote_id: resource_id,
                waited,
            },
            JobError::Failed {
                job_id,
                kind,
                reason,
            } => Self::Rejected {
                operation: kind,
                job_id: Some(job_id),
                reason,
            },
            JobError::Transport { kind, source, .. } => Self::Transport {
                operation: kind,
                source,
            },
            JobError::Cancelled { job_id, kind } => Self::Cancelled {
                operation: kind,
                job_id,
            },
        }
    }
}
