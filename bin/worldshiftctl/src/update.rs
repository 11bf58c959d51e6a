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
use tracing::warn;
use worldshift_cluster::UpdatePlan;
use worldshift_common::config::{AppConfig, StrategyKind};
use worldshift_core::{preview, UpdateMetrics};

use crate::output::emit;
use crate::{wiring, OutputFormat};

/// Flags shared by `update` and `plan` that override the configured plan.
#[derive(Debug, Args)]
pub struct PlanOverrides {
    /// Update strategy (plain, rolling, proxy, world-sync, combined).
    #[arg(long)]
    strategy: Option<StrategyKind>,

    /// Replica count to leave running once the update completes.
    #[arg(long, value_name = "N")]
    replicas: Option<u32>,

    /// Extra release value, repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, String)>,
}

impl PlanOverrides {
    fn resolve(&self, config: &AppConfig) -> (StrategyKind, UpdatePlan) {
        let strategy = self.strategy.unwrap_or(config.strategy);
        let mut plan = UpdatePlan::from_config(config);
        if let Some(replicas) = self.replicas {
            plan.replica_count = replicas;
        }
        for (key, value) in &self.overrides {
            plan = plan.with_override(key.clone(), value.clone());
        }
        (strategy, plan)
    }
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    plan: PlanOverrides,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    plan: PlanOverrides,

    /// Assume this many running replicas instead of asking the cluster.
    #[arg(long, value_name = "N")]
    current: Option<u32>,
}

pub async fn run(config: &AppConfig, args: UpdateArgs, format: OutputFormat) -> Result<ExitCode> {
    let (strategy, plan) = args.plan.resolve(config);
    let metrics = wiring::metrics()?;
    let orchestrator = wiring::orchestrator(config, strategy, metrics.clone())?;
    let report = orchestrator.run(plan).await?;
    emit(&report, format)?;
    write_metrics(config, &metrics);
    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub async fn plan(config: &AppConfig, args: PlanArgs, format: OutputFormat) -> Result<ExitCode> {
    let (strategy, plan) = args.plan.resolve(config);
    let current = match args.current {
        Some(current) => current,
        None => wiring::replica_controller(config).get_replica_count().await?,
    };
    emit(&preview(strategy, &plan, current), format)?;
    Ok(ExitCode::SUCCESS)
}

fn write_metrics(config: &AppConfig, metrics: &UpdateMetrics) {
    if let Some(path) = &config.metrics.textfile {
        if let Err(err) = metrics.write_textfile(path) {
            warn!(path = %path.display(), error = %err, "failed to write metrics textfile");
        }
    }
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}
