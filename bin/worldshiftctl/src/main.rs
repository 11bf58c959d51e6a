//! ---
//! ws_section: "05-operator-interface"
//! ws_subsection: "binary"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Operator CLI driving update sessions and lifecycle commands."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use worldshift_common::config::{AppConfig, LoadedAppConfig};
use worldshift_common::logging::init_tracing;

mod lifecycle;
mod output;
mod sync;
mod update;
mod wiring;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Zero-downtime update orchestration for game-server workloads",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to WORLDSHIFT_CONFIG, then ./worldshift.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Format for command results written to stdout.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Yaml)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run an update session against the workload.
    Update(update::UpdateArgs),
    /// Show the states and steps an update would run, without touching the cluster.
    Plan(update::PlanArgs),
    /// Scale the workload to one instance and wait until it is ready.
    Start,
    /// Warn players, save the world and scale the workload to zero.
    Stop(lifecycle::StopArgs),
    /// Optionally upgrade the release, then stop and start the workload.
    Restart(lifecycle::RestartArgs),
    /// Report replica count, instance readiness and online players.
    Status,
    /// Copy instance-0's world into the backup location.
    Backup,
    /// In-instance world sync between the live and backup directories.
    Sync(sync::SyncArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let loaded = load_config(cli.config.as_ref())?;
    init_tracing("worldshiftctl", &loaded.config.logging)?;
    if let Some(source) = &loaded.source {
        tracing::debug!(config = %source.display(), "configuration loaded");
    }
    let config = loaded.config;
    let format = cli.output;

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Update(args) => runtime.block_on(update::run(&config, args, format)),
        Commands::Plan(args) => runtime.block_on(update::plan(&config, args, format)),
        Commands::Start => runtime.block_on(lifecycle::start(&config, format)),
        Commands::Stop(args) => runtime.block_on(lifecycle::stop(&config, args, format)),
        Commands::Restart(args) => runtime.block_on(lifecycle::restart(&config, args, format)),
        Commands::Status => runtime.block_on(lifecycle::status(&config, format)),
        Commands::Backup => runtime.block_on(lifecycle::backup(&config, format)),
        Commands::Sync(args) => runtime.block_on(sync::run(args, format)),
    }
}

fn load_config(explicit: Option<&PathBuf>) -> Result<LoadedAppConfig> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("worldshift.toml"));
    candidates.push(PathBuf::from("/etc/worldshift/worldshift.toml"));
    AppConfig::load(&candidates)
}
