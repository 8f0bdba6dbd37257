//! Declarative reconciliation for CloudStack virtual machines.
//!
//! A caller declares a [`DesiredSpec`]; the [`Reconciler`] reads the current
//! instance, computes an ordered plan of lifecycle operations, and executes
//! it through a [`ControlPlane`], awaiting each asynchronous job before the
//! next one starts. [`CloudStackClient`] implements the control plane over
//! the CloudStack JSON API.

pub mod cancel;
pub mod cloudstack;
pub mod config;
pub mod control_plane;
pub mod differ;
pub mod lifecycle;
pub mod model;
pub mod poller;
pub mod reader;
pub mod reconciler;
pub mod retry;
pub mod test_support;
pub mod types;
pub mod user_data;

pub use cancel::{CancelHandle, CancelSignal, cancellation};
pub use cloudstack::{CloudStackClient, CloudStackError};
pub use config::{ConfigError, StratusConfig};
pub use control_plane::{ControlPlane, JobKind, TransportError};
pub use differ::{ActionPlan, Inconsistency, Operation};
pub use lifecycle::{OperationError, OperationRun, RunState};
pub use model::{
    DesiredSpec, DesiredSpecBuilder, InstanceState, ModelError, NamedRef, NetworkPolicy,
    ObservedInstance,
};
pub use poller::{JobError, JobPoller};
pub use reader::{ReadError, SnapshotReader};
pub use reconciler::{ErrorKind, PlanStep, ReconcileError, ReconcileSettings, Reconciler};
pub use retry::RetryPolicy;
pub use types::{JobId, RemoteId};
pub use user_data::{UserDataError, resolve_user_data};
