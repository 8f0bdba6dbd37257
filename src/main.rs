//! Binary entry point for the `stratus` CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use stratus::user_data::fingerprint;
use stratus::{
    CloudStackClient, DesiredSpec, NetworkPolicy, ObservedInstance, ReconcileError, Reconciler,
    RemoteId, StratusConfig, cancellation, resolve_user_data,
};

use cli::{Cli, DestroyCommand, InstanceArgs, ReconcileCommand, ShowCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid instance attributes: {0}")]
    Input(String),
    #[error("instance {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("failed to write output: {0}")]
    Output(String),
}

/// Converged instance as printed by `stratus reconcile`.
#[derive(Debug, Serialize)]
struct Converged<'a> {
    #[serde(flatten)]
    instance: &'a ObservedInstance,
    /// SHA-1 of the user-data sent at creation; the payload is never echoed.
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<String>,
}

impl<'a> Converged<'a> {
    fn new(instance: &'a ObservedInstance, desired: &DesiredSpec) -> Self {
        Self {
            instance,
            user_data: desired.user_data.as_deref().map(fingerprint),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli, io::stdout()).await {
        Ok(()) => 0,
        Err(err) => {
            write_error(io::stderr(), &err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli, out: impl Write) -> Result<(), CliError> {
    match cli {
        Cli::Reconcile(args) => reconcile(args, out).await,
        Cli::Plan(args) => plan(args, out).await,
        Cli::Destroy(args) => destroy(args, out).await,
        Cli::Show(args) => show(args, out).await,
    }
}

async fn reconcile(args: ReconcileCommand, out: impl Write) -> Result<(), CliError> {
    let desired = desired_spec(&args.instance)?;
    let existing = args.id.map(RemoteId::from);
    let reconciler = connect()?;
    let instance = reconciler.reconcile(&desired, existing.as_ref()).await?;
    write_json(out, &Converged::new(&instance, &desired))
}

async fn plan(args: ReconcileCommand, mut out: impl Write) -> Result<(), CliError> {
    let desired = desired_spec(&args.instance)?;
    let existing = args.id.map(RemoteId::from);
    let reconciler = connect()?;
    let (action_plan, _) = reconciler.plan(&desired, existing.as_ref()).await?;
    writeln!(out, "{action_plan}").map_err(|err| output_error(&err))?;
    for warning in action_plan.warnings() {
        writeln!(out, "warning: {warning}").map_err(|err| output_error(&err))?;
    }
    Ok(())
}

async fn destroy(args: DestroyCommand, mut out: impl Write) -> Result<(), CliError> {
    let remote_id = RemoteId::from(args.id);
    let reconciler = connect()?;
    reconciler.destroy(&remote_id, args.expunge).await?;
    writeln!(out, "destroyed {remote_id}").map_err(|err| output_error(&err))
}

async fn show(args: ShowCommand, out: impl Write) -> Result<(), CliError> {
    let remote_id = RemoteId::from(args.id);
    let reconciler = connect()?;
    let instance = reconciler
        .read(&remote_id)
        .await?
        .ok_or_else(|| CliError::NotFound(remote_id.to_string()))?;
    write_json(out, &instance)
}

fn connect() -> Result<Reconciler<CloudStackClient>, CliError> {
    let config =
        StratusConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let client = CloudStackClient::new(&config).map_err(|err| CliError::Config(err.to_string()))?;

    let (handle, signal) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; remote jobs keep running");
            handle.cancel();
        }
    });

    Ok(Reconciler::new(Arc::new(client), config.settings()).with_cancellation(signal))
}

fn desired_spec(args: &InstanceArgs) -> Result<DesiredSpec, CliError> {
    let user_data = resolve_user_data(args.user_data.as_deref(), args.user_data_file.as_deref())
        .map_err(|err| CliError::Input(err.to_string()))?;
    let policy = if args.zone_default_network {
        NetworkPolicy::ZoneDefault
    } else {
        NetworkPolicy::Explicit
    };

    let mut builder = DesiredSpec::builder()
        .name(&args.name)
        .service_tier(&args.service_tier)
        .template(&args.template)
        .zone(&args.zone)
        .network_policy(policy);
    if let Some(value) = &args.display_name {
        builder = builder.display_name(value);
    }
    if let Some(value) = &args.network {
        builder = builder.network(value);
    }
    if let Some(value) = &args.ip_address {
        builder = builder.ip_address(value);
    }
    if let Some(value) = &args.keypair {
        builder = builder.keypair(value);
    }
    if let Some(value) = &args.project {
        builder = builder.project(value);
    }
    if let Some(value) = user_data {
        builder = builder.user_data(value);
    }
    builder
        .build()
        .map_err(|err| CliError::Input(err.to_string()))
}

fn write_json(mut out: impl Write, value: &impl Serialize) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut out, value)
        .map_err(|err| CliError::Output(err.to_string()))?;
    writeln!(out).map_err(|err| output_error(&err))
}

fn output_error(err: &io::Error) -> CliError {
    CliError::Output(err.to_string())
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
    if let CliError::Reconcile(source) = err {
        writeln!(target, "error kind: {:?}", source.kind()).ok();
        if let Some(instance) = source.last_known() {
            writeln!(
                target,
                "last known instance: {} ({}, {})",
                instance.id, instance.name, instance.state
            )
            .ok();
        }
    }
}
