//! Shared fixtures for reconcile BDD scenarios.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rstest::fixture;
use stratus::test_support::{
    FakeControlPlane, SIMULATOR_NETWORK, SIMULATOR_TEMPLATE, SIMULATOR_ZONE,
};
use stratus::{
    DesiredSpec, DesiredSpecBuilder, ErrorKind, ModelError, ObservedInstance, ReconcileError,
    ReconcileSettings, Reconciler, RemoteId, RetryPolicy,
};

/// Failed reconcile or destroy, reduced to what the steps assert on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReconcileFailure {
    pub kind: ErrorKind,
    pub step: Option<String>,
    pub message: String,
}

impl From<&ReconcileError> for ReconcileFailure {
    fn from(err: &ReconcileError) -> Self {
        Self {
            kind: err.kind(),
            step: err.step().map(ToString::to_string),
            message: err.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ReconcileOutcome {
    Converged(ObservedInstance),
    Failed(ReconcileFailure),
}

#[derive(Clone, Debug)]
pub enum DestroyOutcome {
    Destroyed,
    Failed(ReconcileFailure),
}

/// State carried between the steps of one scenario.
#[derive(Debug, Default)]
pub struct ScenarioState {
    pub builder: DesiredSpecBuilder,
    pub remote_id: Option<RemoteId>,
    pub outcome: Option<ReconcileOutcome>,
    pub destroyed: Option<DestroyOutcome>,
}

/// Scenario context. Clones share the control plane and scenario state.
#[derive(Clone, Debug)]
pub struct ReconcileContext {
    pub plane: Arc<FakeControlPlane>,
    state: Arc<Mutex<ScenarioState>>,
}

impl ReconcileContext {
    pub fn state(&self) -> MutexGuard<'_, ScenarioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reconciler(&self) -> Reconciler<FakeControlPlane> {
        Reconciler::new(Arc::clone(&self.plane), settings())
    }

    pub fn update_builder(&self, update: impl FnOnce(DesiredSpecBuilder) -> DesiredSpecBuilder) {
        let mut state = self.state();
        let current = std::mem::take(&mut state.builder);
        state.builder = update(current);
    }

    pub fn desired(&self) -> Result<DesiredSpec, ModelError> {
        self.state().builder.clone().build()
    }

    pub fn remote_id(&self) -> Option<RemoteId> {
        self.state().remote_id.clone()
    }

    /// Records a reconcile result, remembering the instance identifier for
    /// later passes.
    pub fn record(&self, result: Result<ObservedInstance, ReconcileError>) {
        let mut state = self.state();
        let outcome = match result {
            Ok(instance) => {
                state.remote_id = Some(instance.id.clone());
                ReconcileOutcome::Converged(instance)
            }
            Err(err) => ReconcileOutcome::Failed(ReconcileFailure::from(&err)),
        };
        state.outcome = Some(outcome);
    }

    pub fn record_destroy(&self, result: Result<(), ReconcileError>) {
        let outcome = match result {
            Ok(()) => DestroyOutcome::Destroyed,
            Err(err) => DestroyOutcome::Failed(ReconcileFailure::from(&err)),
        };
        self.state().destroyed = Some(outcome);
    }
}

/// Starts a desired spec on the simulator's zone, template, and network.
pub fn base_builder(name: &str, tier: &str) -> DesiredSpecBuilder {
    DesiredSpec::builder()
        .name(name)
        .service_tier(tier)
        .template(SIMULATOR_TEMPLATE)
        .zone(SIMULATOR_ZONE)
        .network(SIMULATOR_NETWORK)
}

fn settings() -> ReconcileSettings {
    ReconcileSettings {
        poll_interval: Duration::from_millis(1),
        job_timeout: Duration::from_millis(500),
        retry: RetryPolicy::new(2, Duration::from_millis(1)),
    }
}

#[fixture]
pub fn reconcile_context() -> ReconcileContext {
    ReconcileContext {
        plane: Arc::new(FakeControlPlane::simulator()),
        state: Arc::new(Mutex::new(ScenarioState::default())),
    }
}
