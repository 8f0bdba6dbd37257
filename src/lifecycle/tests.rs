//! Unit tests for lifecycle operations.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::control_plane::DeployParams;
use crate::model::DesiredSpec;
use crate::reader::observe;
use crate::retry::RetryPolicy;
use crate::test_support::{
    FakeControlPlane, MEDIUM_INSTANCE, SIMULATOR_NETWORK, SIMULATOR_NETWORK_NAME,
    SIMULATOR_PROJECT, SIMULATOR_TEMPLATE, SIMULATOR_ZONE, SMALL_INSTANCE, running_record,
};

struct Harness {
    plane: FakeControlPlane,
    poller: JobPoller,
    reader: SnapshotReader,
    cancel: CancelSignal,
}

impl Harness {
    fn lifecycle(&self) -> Lifecycle<'_, FakeControlPlane> {
        Lifecycle::new(&self.plane, self.poller, self.reader, &self.cancel)
    }

    fn seed(&self, state: &str) -> ObservedInstance {
        let mut record = running_record("vm-1", "terraform-test");
        record.state = state.to_owned();
        self.plane.insert_instance(record.clone());
        observe(record)
    }
}

#[fixture]
fn harness() -> Harness {
    let retry = RetryPolicy::new(2, Duration::from_millis(1));
    Harness {
        plane: FakeControlPlane::simulator(),
        poller: JobPoller::new(Duration::from_millis(1), Duration::from_millis(500), retry),
        reader: SnapshotReader::new(retry),
        cancel: CancelSignal::never(),
    }
}

fn desired() -> DesiredSpec {
    DesiredSpec::builder()
        .name("terraform-test")
        .display_name("terraform-test")
        .service_tier(SMALL_INSTANCE)
        .template(SIMULATOR_TEMPLATE)
        .network(SIMULATOR_NETWORK)
        .zone(SIMULATOR_ZONE)
        .user_data("foobar\nthis is a multiline\ntext\n")
        .expunge(true)
        .build()
        .expect("valid spec")
}

fn deploy_params(plane: &FakeControlPlane) -> Option<DeployParams> {
    plane
        .submissions()
        .into_iter()
        .find_map(|submission| match submission.request {
            JobRequest::Deploy(params) => Some(*params),
            _ => None,
        })
}

#[rstest]
#[tokio::test]
async fn create_submits_resolved_identifiers(harness: Harness) {
    let run = harness
        .lifecycle()
        .create(&desired())
        .await
        .expect("create should succeed");

    assert_eq!(run.state(), RunState::Succeeded);
    assert!(run.was_submitted());
    let observed = run.into_observed().expect("create returns the instance");
    assert_eq!(observed.name, "terraform-test");
    assert_eq!(observed.template.name, SIMULATOR_TEMPLATE);

    let params = deploy_params(&harness.plane).expect("deploy submitted");
    assert_eq!(params.zone_id, "zone-1");
    assert_eq!(params.template_id, "tmpl-1");
    assert_eq!(params.service_tier_id, "so-small");
    assert_eq!(params.network_ids, vec![String::from(SIMULATOR_NETWORK)]);
    assert_eq!(
        params.user_data.as_deref(),
        Some("foobar\nthis is a multiline\ntext\n")
    );
}

#[rstest]
#[tokio::test]
async fn create_passes_fixed_ip_keypair_and_project(harness: Harness) {
    let desired = DesiredSpec {
        ip_address: "10.1.1.123".parse().ok(),
        keypair: Some(String::from("terraform-test-keypair")),
        project: Some(String::from(SIMULATOR_PROJECT)),
        ..desired()
    };

    let observed = harness
        .lifecycle()
        .create(&desired)
        .await
        .expect("create should succeed")
        .into_observed()
        .expect("create returns the instance");

    assert_eq!(observed.ip_address, "10.1.1.123".parse().ok());
    assert_eq!(observed.keypair.as_deref(), Some("terraform-test-keypair"));
    assert_eq!(
        observed.project.map(|project| project.name).as_deref(),
        Some(SIMULATOR_PROJECT)
    );
    let params = deploy_params(&harness.plane).expect("deploy submitted");
    assert_eq!(params.project_id.as_deref(), Some("proj-1"));
}

#[rstest]
#[case::zone(DesiredSpec { zone: String::from("nowhere"), ..desired() }, ReferenceKind::Zone)]
#[case::template(DesiredSpec { template: String::from("Plan 9"), ..desired() }, ReferenceKind::Template)]
#[case::tier(DesiredSpec { service_tier: String::from("Huge"), ..desired() }, ReferenceKind::ServiceTier)]
#[case::network(DesiredSpec { network: Some(String::from("net-9")), ..desired() }, ReferenceKind::Network)]
#[case::project(DesiredSpec { project: Some(String::from("other")), ..desired() }, ReferenceKind::Project)]
#[tokio::test]
async fn create_fails_fast_on_unknown_references(
    harness: Harness,
    #[case] desired: DesiredSpec,
    #[case] expected: ReferenceKind,
) {
    let err = harness
        .lifecycle()
        .create(&desired)
        .await
        .expect_err("unknown reference should fail");

    assert!(
        matches!(err, OperationError::InvalidReference { kind, .. } if kind == expected),
        "unexpected error: {err:?}"
    );
    assert!(harness.plane.submissions().is_empty());
}

#[rstest]
#[tokio::test]
async fn stop_on_stopped_instance_submits_nothing(harness: Harness) {
    let current = harness.seed("Stopped");

    let run = harness
        .lifecycle()
        .stop(&current)
        .await
        .expect("stop should succeed");

    assert_eq!(run.state(), RunState::Succeeded);
    assert!(!run.was_submitted());
    assert!(harness.plane.submissions().is_empty());
}

#[rstest]
#[tokio::test]
async fn start_on_running_instance_submits_nothing(harness: Harness) {
    let current = harness.seed("Running");

    let run = harness
        .lifecycle()
        .start(&current)
        .await
        .expect("start should succeed");

    assert!(!run.was_submitted());
}

#[rstest]
#[tokio::test]
async fn rename_ignores_host_name_case(harness: Harness) {
    let current = harness.seed("Running");

    let run = harness
        .lifecycle()
        .rename(&current, "Terraform-Test", "terraform-test")
        .await
        .expect("rename should succeed");

    assert!(!run.was_submitted());
}

#[rstest]
#[tokio::test]
async fn rename_derives_state_from_the_job_payload(harness: Harness) {
    harness.plane.fold_names_to_lowercase();
    let current = harness.seed("Stopped");

    let observed = harness
        .lifecycle()
        .rename(&current, "Terraform-Updated", "Terraform Updated")
        .await
        .expect("rename should succeed")
        .into_observed()
        .expect("rename returns the instance");

    assert_eq!(observed.name, "terraform-updated");
    assert_eq!(observed.display_name, "Terraform Updated");
}

#[rstest]
#[tokio::test]
async fn resize_of_running_instance_is_rejected_verbatim(harness: Harness) {
    let current = harness.seed("Running");

    let err = harness
        .lifecycle()
        .resize(&current, MEDIUM_INSTANCE)
        .await
        .expect_err("running resize is rejected");

    let OperationError::Rejected { reason, job_id, .. } = err else {
        panic!("expected rejection, got {err:?}");
    };
    assert_eq!(
        reason,
        "Unable to change service offering of a running virtual machine"
    );
    assert!(job_id.is_some());
}

#[rstest]
#[tokio::test]
async fn resize_of_stopped_instance_changes_tier(harness: Harness) {
    let current = harness.seed("Stopped");

    let observed = harness
        .lifecycle()
        .resize(&current, MEDIUM_INSTANCE)
        .await
        .expect("resize should succeed")
        .into_observed()
        .expect("resize returns the instance");

    assert_eq!(observed.service_tier.name, MEDIUM_INSTANCE);
    assert_eq!(observed.service_tier.id, "so-medium");
}

#[rstest]
#[tokio::test]
async fn resize_to_unknown_tier_fails_before_submitting(harness: Harness) {
    let current = harness.seed("Stopped");

    let err = harness
        .lifecycle()
        .resize(&current, "Gigantic Instance")
        .await
        .expect_err("unknown tier should fail");

    assert!(matches!(
        err,
        OperationError::InvalidReference {
            kind: ReferenceKind::ServiceTier,
            ..
        }
    ));
    assert!(harness.plane.submissions().is_empty());
}

#[rstest]
#[tokio::test]
async fn assign_ip_updates_default_nic(harness: Harness) {
    let current = harness.seed("Stopped");
    let address = "10.1.1.123".parse().expect("valid address");

    let observed = harness
        .lifecycle()
        .assign_ip(&current, address)
        .await
        .expect("assignment should succeed")
        .into_observed()
        .expect("assignment returns the instance");

    assert_eq!(observed.ip_address, Some(address));
}

#[rstest]
#[case::by_id(SIMULATOR_NETWORK)]
#[case::by_name(SIMULATOR_NETWORK_NAME)]
#[tokio::test]
async fn attach_network_skips_the_attached_network(harness: Harness, #[case] network: &str) {
    let current = harness.seed("Running");

    let run = harness
        .lifecycle()
        .attach_network(&current, network)
        .await
        .expect("self-check should succeed");

    assert!(!run.was_submitted());
    assert!(harness.plane.submissions().is_empty());
}

#[rstest]
#[tokio::test]
async fn attach_network_adds_a_nic(harness: Harness) {
    let mut record = running_record("vm-1", "terraform-test");
    record.nic.clear();
    harness.plane.insert_instance(record.clone());

    let observed = harness
        .lifecycle()
        .attach_network(&observe(record), SIMULATOR_NETWORK)
        .await
        .expect("attach should succeed")
        .into_observed()
        .expect("attach returns the instance");

    assert_eq!(
        observed.network.map(|network| network.id).as_deref(),
        Some(SIMULATOR_NETWORK)
    );
    assert!(observed.ip_address.is_some());
}

#[rstest]
#[case::expunge(true, None)]
#[case::soft_delete(false, Some("Destroyed"))]
#[tokio::test]
async fn destroy_honours_expunge(
    harness: Harness,
    #[case] expunge: bool,
    #[case] remaining_state: Option<&str>,
) {
    let current = harness.seed("Stopped");

    let run = harness
        .lifecycle()
        .destroy(&current, expunge)
        .await
        .expect("destroy should succeed");

    assert!(run.observed().is_none());
    assert_eq!(
        harness.plane.instance("vm-1").map(|record| record.state),
        remaining_state.map(str::to_owned)
    );
}

#[rstest]
#[tokio::test]
async fn operations_on_missing_instance_are_refused(harness: Harness) {
    let err = harness
        .lifecycle()
        .execute(&Operation::Stop, None)
        .await
        .expect_err("stop needs an instance");

    assert_eq!(
        err,
        OperationError::MissingInstance {
            operation: JobKind::Stop
        }
    );
}

#[rstest]
#[tokio::test]
async fn instance_removed_mid_job_is_reported_as_vanished(harness: Harness) {
    let current = harness.seed("Running");
    harness.plane.set_pending_polls(50);

    let lifecycle = harness.lifecycle();
    let stop = lifecycle.stop(&current);
    let remove = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        harness.plane.remove_instance("vm-1");
    };
    let (result, ()) = tokio::join!(stop, remove);

    assert!(
        matches!(result, Err(OperationError::Vanished { .. })),
        "unexpected result: {result:?}"
    );
}
