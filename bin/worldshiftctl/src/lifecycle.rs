//! ---
//! ws_section: "05-operator-interface"
//! ws_subsection: "binary"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Operator CLI driving update sessions and lifecycle commands."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use worldshift_cluster::UpdatePlan;
use worldshift_common::config::AppConfig;

use crate::output::emit;
use crate::{wiring, OutputFormat};

#[derive(Debug, Args)]
pub struct StopArgs {
    /// Stop even while players are online.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Args)]
pub struct RestartArgs {
    /// Stop even while players are online, and restart if the upgrade fails.
    #[arg(long)]
    force: bool,

    /// Upgrade the release with the configured values before restarting.
    #[arg(long)]
    upgrade: bool,
}

#[derive(Debug, Serialize)]
struct BackupOutcome {
    instance: String,
    backed_up: bool,
}

pub async fn start(config: &AppConfig, format: OutputFormat) -> Result<ExitCode> {
    let outcome = wiring::lifecycle(config)?.start().await?;
    emit(&outcome, format)?;
    Ok(ExitCode::SUCCESS)
}

pub async fn stop(config: &AppConfig, args: StopArgs, format: OutputFormat) -> Result<ExitCode> {
    let outcome = wiring::lifecycle(config)?.stop(args.force).await?;
    emit(&outcome, format)?;
    Ok(ExitCode::SUCCESS)
}

pub async fn restart(config: &AppConfig, args: RestartArgs, format: OutputFormat) -> Result<ExitCode> {
    let runner = wiring::lifecycle(config)?;
    let values = args.upgrade.then(|| {
        let plan = UpdatePlan::from_config(config);
        plan.release_values(1)
    });
    let outcome = runner.restart(values.as_ref(), args.force).await?;
    emit(&outcome, format)?;
    Ok(ExitCode::SUCCESS)
}

pub async fn status(config: &AppConfig, format: OutputFormat) -> Result<ExitCode> {
    let report = wiring::lifecycle(config)?.status().await?;
    emit(&report, format)?;
    Ok(ExitCode::SUCCESS)
}

pub async fn backup(config: &AppConfig, format: OutputFormat) -> Result<ExitCode> {
    wiring::lifecycle(config)?.backup().await?;
    let instance = format!("{}-0", config.workload.name);
    emit(
        &BackupOutcome {
            instance,
            backed_up: true,
        },
        format,
    )?;
    Ok(ExitCode::SUCCESS)
}
