//! BDD scenarios for reconciling and destroying instances.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ReconcileContext, reconcile_context};

#[scenario(path = "tests/features/reconcile.feature", name = "Create an instance that does not exist yet")]
fn scenario_create_absent(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/reconcile.feature", name = "Rename and resize a running instance")]
fn scenario_rename_and_resize(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/reconcile.feature", name = "Reconciling an unchanged instance submits nothing")]
fn scenario_unchanged_is_noop(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/reconcile.feature", name = "A network given by name stays converged")]
fn scenario_network_by_name_is_noop(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/reconcile.feature", name = "Moving an instance to another network requires replacement")]
fn scenario_network_change_requires_replacement(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/reconcile.feature", name = "A failed resize is resumed by the next pass")]
fn scenario_resume_after_failed_resize(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/reconcile.feature", name = "Create an instance with a fixed address, key pair, and project")]
fn scenario_fixed_ip_keypair_project(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/reconcile.feature", name = "An unknown template is reported before anything is submitted")]
fn scenario_unknown_template(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/reconcile.feature", name = "An instance deleted out of band is recreated")]
fn scenario_recreate_vanished(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/destroy.feature", name = "Expunging a running instance stops it first")]
fn scenario_destroy_expunge(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/destroy.feature", name = "A soft destroy leaves a destroyed record behind")]
fn scenario_destroy_soft(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/destroy.feature", name = "Destroying an instance that is already gone succeeds")]
fn scenario_destroy_absent(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}
