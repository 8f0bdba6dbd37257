//! BDD step definitions for reconcile and destroy behaviour.

use rstest_bdd_macros::{given, then, when};
use stratus::JobKind;
use tokio::runtime::Runtime;

use super::test_helpers::{DestroyOutcome, ReconcileContext, ReconcileOutcome, base_builder};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("scenario setup failed: {0}")]
    Setup(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Setup(err.to_string()))
}

fn reconcile_once(context: &ReconcileContext) -> Result<(), StepError> {
    let desired = context
        .desired()
        .map_err(|err| StepError::Setup(err.to_string()))?;
    let existing = context.remote_id();
    let reconciler = context.reconciler();
    let result = runtime()?.block_on(reconciler.reconcile(&desired, existing.as_ref()));
    context.record(result);
    Ok(())
}

fn destroy_once(context: &ReconcileContext, expunge: bool) -> Result<(), StepError> {
    let remote_id = context
        .remote_id()
        .ok_or_else(|| StepError::Setup(String::from("no instance to destroy")))?;
    let reconciler = context.reconciler();
    let result = runtime()?.block_on(reconciler.destroy(&remote_id, expunge));
    context.record_destroy(result);
    Ok(())
}

fn assert_eq_field(field: &str, expected: &str, actual: &str) -> Result<(), StepError> {
    if expected == actual {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {field} '{expected}', got '{actual}'"
        )))
    }
}

fn with_instance<T>(
    context: &ReconcileContext,
    check: impl FnOnce(&stratus::ObservedInstance) -> Result<T, StepError>,
) -> Result<T, StepError> {
    let state = context.state();
    match state.outcome.as_ref() {
        Some(ReconcileOutcome::Converged(instance)) => check(instance),
        Some(ReconcileOutcome::Failed(failure)) => Err(StepError::Assertion(format!(
            "expected an instance, reconcile failed: {}",
            failure.message
        ))),
        None => Err(StepError::Assertion(String::from("reconcile never ran"))),
    }
}

#[given("a simulator control plane")]
fn simulator(reconcile_context: ReconcileContext) -> ReconcileContext {
    reconcile_context
}

#[given("a desired instance \"{name}\" on tier \"{tier}\"")]
fn desired_instance(reconcile_context: ReconcileContext, name: String, tier: String) -> ReconcileContext {
    reconcile_context.update_builder(|_| base_builder(&name, &tier));
    reconcile_context
}

#[given("the desired instance uses fixed IP \"{ip}\"")]
fn fixed_ip(reconcile_context: ReconcileContext, ip: String) -> ReconcileContext {
    reconcile_context.update_builder(|builder| builder.ip_address(ip));
    reconcile_context
}

#[given("the desired instance uses key pair \"{keypair}\"")]
fn key_pair(reconcile_context: ReconcileContext, keypair: String) -> ReconcileContext {
    reconcile_context.update_builder(|builder| builder.keypair(keypair));
    reconcile_context
}

#[given("the desired instance belongs to project \"{project}\"")]
fn project(reconcile_context: ReconcileContext, project: String) -> ReconcileContext {
    reconcile_context.update_builder(|builder| builder.project(project));
    reconcile_context
}

#[given("the desired instance uses network \"{network}\"")]
fn uses_network(reconcile_context: ReconcileContext, network: String) -> ReconcileContext {
    reconcile_context.update_builder(|builder| builder.network(network));
    reconcile_context
}

#[given("the desired instance uses template \"{template}\"")]
fn template(reconcile_context: ReconcileContext, template: String) -> ReconcileContext {
    reconcile_context.update_builder(|builder| builder.template(template));
    reconcile_context
}

#[given("the instance was created earlier")]
fn created_earlier(reconcile_context: ReconcileContext) -> Result<ReconcileContext, StepError> {
    reconcile_once(&reconcile_context)?;
    let state = reconcile_context.state();
    if let Some(ReconcileOutcome::Failed(failure)) = state.outcome.as_ref() {
        return Err(StepError::Setup(format!(
            "initial create failed: {}",
            failure.message
        )));
    }
    drop(state);
    reconcile_context.plane.clear_submissions();
    Ok(reconcile_context)
}

#[given("the instance is deleted out of band")]
fn deleted_out_of_band(reconcile_context: ReconcileContext) -> Result<ReconcileContext, StepError> {
    let remote_id = reconcile_context
        .remote_id()
        .ok_or_else(|| StepError::Setup(String::from("no instance to delete")))?;
    reconcile_context.plane.remove_instance(remote_id.as_str());
    Ok(reconcile_context)
}

#[given("the next resize job fails with \"{reason}\"")]
fn resize_fails(reconcile_context: ReconcileContext, reason: String) -> ReconcileContext {
    reconcile_context.plane.fail_next_job(JobKind::Resize, &reason);
    reconcile_context
}

#[given("an instance id \"{id}\" that does not exist")]
fn absent_instance(reconcile_context: ReconcileContext, id: String) -> ReconcileContext {
    reconcile_context.state().remote_id = Some(stratus::RemoteId::from(id));
    reconcile_context
}

#[when("I change the desired instance to \"{name}\" on tier \"{tier}\"")]
fn change_instance(reconcile_context: ReconcileContext, name: String, tier: String) -> ReconcileContext {
    reconcile_context.update_builder(|builder| builder.name(name).service_tier(tier));
    reconcile_context
}

#[when("I move the desired instance to network \"{network}\"")]
fn move_network(reconcile_context: ReconcileContext, network: String) -> ReconcileContext {
    reconcile_context.update_builder(|builder| builder.network(network));
    reconcile_context
}

#[when("I reconcile the instance")]
fn reconcile(reconcile_context: ReconcileContext) -> Result<ReconcileContext, StepError> {
    reconcile_once(&reconcile_context)?;
    Ok(reconcile_context)
}

#[when("I destroy the instance with expunge")]
fn destroy_expunge(reconcile_context: ReconcileContext) -> Result<ReconcileContext, StepError> {
    destroy_once(&reconcile_context, true)?;
    Ok(reconcile_context)
}

#[when("I destroy the instance without expunge")]
fn destroy_soft(reconcile_context: ReconcileContext) -> Result<ReconcileContext, StepError> {
    destroy_once(&reconcile_context, false)?;
    Ok(reconcile_context)
}

#[then("the reconcile succeeds")]
fn reconcile_succeeds(reconcile_context: &ReconcileContext) -> Result<(), StepError> {
    with_instance(reconcile_context, |_| Ok(()))
}

#[then("the instance is named \"{name}\"")]
fn instance_named(reconcile_context: &ReconcileContext, name: String) -> Result<(), StepError> {
    with_instance(reconcile_context, |instance| {
        assert_eq_field("name", &name, &instance.name)
    })
}

#[then("the instance runs on tier \"{tier}\"")]
fn instance_tier(reconcile_context: &ReconcileContext, tier: String) -> Result<(), StepError> {
    with_instance(reconcile_context, |instance| {
        assert_eq_field("service tier", &tier, &instance.service_tier.name)
    })
}

#[then("the instance is \"{state}\"")]
fn instance_state(reconcile_context: &ReconcileContext, state: String) -> Result<(), StepError> {
    with_instance(reconcile_context, |instance| {
        assert_eq_field("state", &state, &instance.state.to_string())
    })
}

#[then("the instance has IP \"{ip}\"")]
fn instance_ip(reconcile_context: &ReconcileContext, ip: String) -> Result<(), StepError> {
    with_instance(reconcile_context, |instance| {
        let actual = instance
            .ip_address
            .map(|address| address.to_string())
            .unwrap_or_default();
        assert_eq_field("IP address", &ip, &actual)
    })
}

#[then("the instance has key pair \"{keypair}\"")]
fn instance_keypair(reconcile_context: &ReconcileContext, keypair: String) -> Result<(), StepError> {
    with_instance(reconcile_context, |instance| {
        assert_eq_field("key pair", &keypair, instance.keypair.as_deref().unwrap_or_default())
    })
}

#[then("the instance belongs to project \"{project}\"")]
fn instance_project(reconcile_context: &ReconcileContext, project: String) -> Result<(), StepError> {
    with_instance(reconcile_context, |instance| {
        let actual = instance
            .project
            .as_ref()
            .map(|named| named.name.as_str())
            .unwrap_or_default();
        assert_eq_field("project", &project, actual)
    })
}

#[then("the reconcile fails with kind \"{kind}\"")]
fn reconcile_fails(reconcile_context: &ReconcileContext, kind: String) -> Result<(), StepError> {
    let state = reconcile_context.state();
    match state.outcome.as_ref() {
        Some(ReconcileOutcome::Failed(failure)) => {
            assert_eq_field("error kind", &kind, &format!("{:?}", failure.kind))
        }
        Some(ReconcileOutcome::Converged(instance)) => Err(StepError::Assertion(format!(
            "expected failure, reconciled {}",
            instance.id
        ))),
        None => Err(StepError::Assertion(String::from("reconcile never ran"))),
    }
}

#[then("the failed step is \"{step}\"")]
fn failed_step(reconcile_context: &ReconcileContext, step: String) -> Result<(), StepError> {
    let state = reconcile_context.state();
    let actual = match state.outcome.as_ref() {
        Some(ReconcileOutcome::Failed(failure)) => failure.step.clone().unwrap_or_default(),
        _ => String::new(),
    };
    assert_eq_field("failed step", &step, &actual)
}

#[then("the submitted operations are \"{operations}\"")]
fn submitted_operations(
    reconcile_context: &ReconcileContext,
    operations: String,
) -> Result<(), StepError> {
    let actual = reconcile_context
        .plane
        .submitted_kinds()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    assert_eq_field("operations", &operations, &actual)
}

#[then("no jobs were submitted")]
fn no_jobs(reconcile_context: &ReconcileContext) -> Result<(), StepError> {
    let submitted = reconcile_context.plane.submissions();
    if submitted.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no submissions, got {}",
            submitted.len()
        )))
    }
}

#[then("the destroy succeeds")]
fn destroy_succeeds(reconcile_context: &ReconcileContext) -> Result<(), StepError> {
    match reconcile_context.state().destroyed.as_ref() {
        Some(DestroyOutcome::Destroyed) => Ok(()),
        Some(DestroyOutcome::Failed(failure)) => Err(StepError::Assertion(format!(
            "destroy failed: {}",
            failure.message
        ))),
        None => Err(StepError::Assertion(String::from("destroy never ran"))),
    }
}

#[then("the control plane holds no instances")]
fn no_instances(reconcile_context: &ReconcileContext) -> Result<(), StepError> {
    let count = reconcile_context.plane.instance_count();
    if count == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("{count} instances remain")))
    }
}

#[then("the instance record is in state \"{state}\"")]
fn record_state(reconcile_context: &ReconcileContext, state: String) -> Result<(), StepError> {
    let remote_id = reconcile_context
        .remote_id()
        .ok_or_else(|| StepError::Assertion(String::from("no instance recorded")))?;
    let record = reconcile_context
        .plane
        .instance(remote_id.as_str())
        .ok_or_else(|| StepError::Assertion(format!("instance {remote_id} is gone")))?;
    assert_eq_field("record state", &state, &record.state)
}
