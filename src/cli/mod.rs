//! Command-line interface definitions for the `stratus` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `stratus` binary.
#[derive(Debug, Parser)]
#[command(
    name = "stratus",
    about = "Converge CloudStack virtual machines onto a declared state",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create or update an instance until it matches the given attributes.
    #[command(
        name = "reconcile",
        about = "Create or update an instance to match the given attributes"
    )]
    Reconcile(ReconcileCommand),
    /// Print the operations a reconcile would submit, without running them.
    #[command(name = "plan", about = "Show the operations a reconcile would run")]
    Plan(ReconcileCommand),
    /// Stop and delete an instance.
    #[command(name = "destroy", about = "Stop and delete an instance")]
    Destroy(DestroyCommand),
    /// Print the current state of an instance as JSON.
    #[command(name = "show", about = "Print the current state of an instance")]
    Show(ShowCommand),
}

/// Arguments shared by `stratus reconcile` and `stratus plan`.
#[derive(Debug, Args)]
pub(crate) struct ReconcileCommand {
    /// Remote identifier of an instance created by an earlier run.
    ///
    /// When omitted, or when the instance no longer exists, a new instance
    /// is deployed.
    #[arg(long, value_name = "ID")]
    pub(crate) id: Option<String>,
    #[command(flatten)]
    pub(crate) instance: InstanceArgs,
}

/// Desired attributes of an instance.
#[derive(Debug, Args)]
pub(crate) struct InstanceArgs {
    /// Host name. Changing it stops the instance while it is renamed.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: String,
    /// Display name; defaults to the host name.
    #[arg(long, value_name = "LABEL")]
    pub(crate) display_name: Option<String>,
    /// Service offering name or identifier.
    #[arg(long, value_name = "OFFERING")]
    pub(crate) service_tier: String,
    /// Template name or identifier. Changing it requires a new instance.
    #[arg(long, value_name = "TEMPLATE")]
    pub(crate) template: String,
    /// Zone name or identifier.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: String,
    /// Network name or identifier.
    #[arg(long, value_name = "NETWORK")]
    pub(crate) network: Option<String>,
    /// Let the zone pick its default network when `--network` is omitted.
    #[arg(long)]
    pub(crate) zone_default_network: bool,
    /// Static IP address on the instance's network.
    #[arg(long, value_name = "ADDRESS")]
    pub(crate) ip_address: Option<String>,
    /// SSH key pair installed at creation.
    #[arg(long, value_name = "KEYPAIR")]
    pub(crate) keypair: Option<String>,
    /// Project that owns the instance.
    #[arg(long, value_name = "PROJECT")]
    pub(crate) project: Option<String>,
    /// User-data passed to the instance at first boot.
    #[arg(long, value_name = "USER_DATA", conflicts_with = "user_data_file")]
    pub(crate) user_data: Option<String>,
    /// Read user-data from a local file.
    #[arg(long, value_name = "PATH", conflicts_with = "user_data")]
    pub(crate) user_data_file: Option<String>,
}

/// Arguments for the `stratus destroy` subcommand.
#[derive(Debug, Args)]
pub(crate) struct DestroyCommand {
    /// Remote identifier of the instance.
    #[arg(value_name = "ID")]
    pub(crate) id: String,
    /// Purge the instance immediately instead of soft-deleting it.
    #[arg(long)]
    pub(crate) expunge: bool,
}

/// Arguments for the `stratus show` subcommand.
#[derive(Debug, Args)]
pub(crate) struct ShowCommand {
    /// Remote identifier of the instance.
    #[arg(value_name = "ID")]
    pub(crate) id: String,
}
