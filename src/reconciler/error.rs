//! Error types surfaced by the reconciler.

use std::fmt;

use thiserror::Error;

use crate::control_plane::JobKind;
use crate::lifecycle::OperationError;
use crate::model::{ModelError, ObservedInstance};
use crate::reader::ReadError;

/// Coarse classification of a [`ReconcileError`], telling the caller what to
/// do next.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The desired spec is incomplete. Fix the input.
    InvalidSpec,
    /// A named template, zone, tier, network, or project does not exist.
    InvalidReference,
    /// The change cannot be applied in place. Destroy and re-create.
    RequiresReplacement,
    /// The control plane stayed unreachable after retries.
    Transport,
    /// The control plane rejected an operation.
    JobFailed,
    /// A job's outcome is unknown. Re-reconcile rather than retry blindly.
    Timeout,
    /// The caller stopped waiting.
    Cancelled,
}

/// Position of a failed step within its plan.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlanStep {
    /// One-based position in the plan.
    pub index: usize,
    /// Number of operations in the plan.
    pub total: usize,
    /// Operation at this position.
    pub operation: JobKind,
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.index, self.total, self.operation)
    }
}

/// Errors returned by [`crate::Reconciler`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReconcileError {
    /// Raised when the desired spec fails validation.
    #[error("invalid desired spec: {0}")]
    InvalidSpec(#[from] ModelError),
    /// Raised when the plan contains changes that cannot be applied in place.
    /// No job has been submitted.
    #[error("in-place update impossible: {}", .reasons.join("; "))]
    RequiresReplacement {
        /// Why each change needs a replacement.
        reasons: Vec<String>,
        /// Instance as currently observed.
        last_known: Box<ObservedInstance>,
    },
    /// Raised when reading instance state fails.
    #[error("failed to read instance state: {source}")]
    Read {
        /// Underlying read failure.
        #[source]
        source: ReadError,
        /// Last state observed before the failure.
        last_known: Option<Box<ObservedInstance>>,
    },
    /// Raised when a plan step fails. Steps before it have been applied.
    #[error("step {step} failed: {source}")]
    Step {
        /// Step that failed.
        step: PlanStep,
        /// Underlying operation failure.
        #[source]
        source: OperationError,
        /// Last state observed before the failure.
        last_known: Option<Box<ObservedInstance>>,
    },
}

impl ReconcileError {
    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSpec(_) => ErrorKind::InvalidSpec,
            Self::RequiresReplacement { .. } => ErrorKind::RequiresReplacement,
            Self::Read { .. } => ErrorKind::Transport,
            Self::Step { source, .. } => match source {
                OperationError::InvalidReference { .. } => ErrorKind::InvalidReference,
                OperationError::Rejected { .. }
                | OperationError::Vanished { .. }
                | OperationError::MissingInstance { .. } => ErrorKind::JobFailed,
                OperationError::Timeout { .. } => ErrorKind::Timeout,
                OperationError::Transport { .. } | OperationError::Read(_) => {
                    ErrorKind::Transport
                }
                OperationError::Cancelled { .. } => ErrorKind::Cancelled,
            },
        }
    }

    /// Plan step that failed, if the failure happened while executing.
    #[must_use]
    pub const fn step(&self) -> Option<&PlanStep> {
        match self {
            Self::Step { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Last instance state known when the failure happened.
    #[must_use]
    pub fn last_known(&self) -> Option<&ObservedInstance> {
        match self {
            Self::InvalidSpec(_) => None,
            Self::RequiresReplacement { last_known, .. } => Some(&**last_known),
            Self::Read { last_known, .. } | Self::Step { last_known, .. } => last_known.as_deref(),
        }
    }
}
