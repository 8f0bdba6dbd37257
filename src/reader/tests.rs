//! Unit tests for the snapshot reader.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::test_support::{FakeControlPlane, FaultPoint, SMALL_INSTANCE, running_record};

#[fixture]
fn reader() -> SnapshotReader {
    SnapshotReader::new(RetryPolicy::new(3, Duration::from_millis(1)))
}

#[rstest]
#[tokio::test]
async fn read_returns_none_for_unknown_instance(reader: SnapshotReader) {
    let plane = FakeControlPlane::simulator();

    let observed = reader
        .read(&plane, &RemoteId::from("vm-gone"))
        .await
        .expect("read should succeed");

    assert!(observed.is_none());
}

#[rstest]
#[tokio::test]
async fn read_retries_transient_failures(reader: SnapshotReader) {
    let plane = FakeControlPlane::simulator();
    plane.insert_instance(running_record("vm-1", "terraform-test"));
    plane.fail_transport(FaultPoint::Get, 2);

    let observed = reader
        .read(&plane, &RemoteId::from("vm-1"))
        .await
        .expect("read should succeed after retries")
        .expect("instance exists");

    assert_eq!(observed.name, "terraform-test");
    assert_eq!(plane.call_count(FaultPoint::Get), 3);
}

#[rstest]
#[tokio::test]
async fn read_reports_exhausted_retries(reader: SnapshotReader) {
    let plane = FakeControlPlane::simulator();
    plane.insert_instance(running_record("vm-1", "terraform-test"));
    plane.fail_transport(FaultPoint::Get, 5);

    let err = reader
        .read(&plane, &RemoteId::from("vm-1"))
        .await
        .expect_err("read should give up");

    let ReadError::Transport { remote_id, source } = err;
    assert_eq!(remote_id, "vm-1");
    assert!(source.is_retryable());
}

#[rstest]
#[tokio::test]
async fn find_by_name_ignores_case(reader: SnapshotReader) {
    let plane = FakeControlPlane::simulator();
    plane.insert_instance(running_record("vm-1", "terraform-test"));

    let observed = reader
        .find_by_name(&plane, "Terraform-Test", Some("zone-1"))
        .await
        .expect("lookup should succeed");

    assert_eq!(observed.map(|instance| instance.id), Some(RemoteId::from("vm-1")));
}

#[test]
fn observe_maps_record_fields() {
    let observed = observe(running_record("vm-1", "terraform-test"));

    assert_eq!(observed.id.as_str(), "vm-1");
    assert_eq!(observed.display_name, "terraform-test");
    assert_eq!(observed.service_tier.name, SMALL_INSTANCE);
    assert_eq!(observed.state, InstanceState::Running);
    assert_eq!(observed.ip_address, "10.1.1.50".parse().ok());
    assert_eq!(
        observed.network,
        Some(NamedRef::new("net-1", "terraform-network"))
    );
}

#[rstest]
#[case::both(Some("proj-1"), Some("terraform"), Some(NamedRef::new("proj-1", "terraform")))]
#[case::name_only(None, Some("terraform"), Some(NamedRef::new("terraform", "terraform")))]
#[case::blank(Some(""), Some(""), None)]
fn observe_pairs_project_id_and_name(
    #[case] project_id: Option<&str>,
    #[case] project: Option<&str>,
    #[case] expected: Option<NamedRef>,
) {
    let mut record = running_record("vm-1", "terraform-test");
    record.project_id = project_id.map(str::to_owned);
    record.project = project.map(str::to_owned);

    assert_eq!(observe(record).project, expected);
}

#[test]
fn observe_prefers_the_default_nic() {
    let mut record = running_record("vm-1", "terraform-test");
    record.nic.insert(
        0,
        RawNic {
            id: String::from("nic-extra"),
            network_id: Some(String::from("net-2")),
            network_name: None,
            ip_address: Some(String::from("10.2.0.5")),
            is_default: false,
        },
    );

    let observed = observe(record);

    assert_eq!(observed.network.map(|net| net.id).as_deref(), Some("net-1"));
    assert_eq!(observed.ip_address, "10.1.1.50".parse().ok());
}

#[rstest]
#[case::missing(None)]
#[case::blank(Some(String::new()))]
fn observe_falls_back_to_host_name_for_display_name(#[case] display_name: Option<String>) {
    let mut record = running_record("vm-1", "terraform-test");
    record.display_name = display_name;
    record.keypair = Some(String::new());

    let observed = observe(record);

    assert_eq!(observed.display_name, "terraform-test");
    assert!(observed.keypair.is_none());
}

#[test]
fn observe_tolerates_missing_nics() {
    let mut record = running_record("vm-1", "terraform-test");
    record.nic.clear();
    record.state = String::from("Stopping");

    let observed = observe(record);

    assert!(observed.network.is_none());
    assert!(observed.ip_address.is_none());
    assert_eq!(observed.state, InstanceState::Provisioning);
}
