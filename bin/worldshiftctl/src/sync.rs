//! ---
//! ws_section: "05-operator-interface"
//! ws_subsection: "binary"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Operator CLI driving update sessions and lifecycle commands."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! In-instance entry point for `kubectl exec … worldshiftctl sync <direction>`.
//!
//! Exit status 0 means the destination now mirrors the source; anything else is a
//! sync failure to the caller.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use worldshift_sync::{SyncDirection, SyncSummary, WorldMirror};

use crate::output::emit;
use crate::OutputFormat;

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// to-backup or from-backup.
    direction: SyncDirection,

    /// Live world directory of this instance.
    #[arg(long, value_name = "DIR", env = "WORLDSHIFT_LIVE_DIR")]
    live: PathBuf,

    /// Backup world directory shared by the instances.
    #[arg(long, value_name = "DIR", env = "WORLDSHIFT_BACKUP_DIR")]
    backup: PathBuf,
}

#[derive(Debug, Serialize)]
struct SyncReport {
    direction: SyncDirection,
    #[serde(flatten)]
    summary: SyncSummary,
}

pub async fn run(args: SyncArgs, format: OutputFormat) -> Result<ExitCode> {
    let summary = WorldMirror::new(args.live, args.backup)
        .sync(args.direction)
        .await?;
    emit(
        &SyncReport {
            direction: args.direction,
            summary,
        },
        format,
    )?;
    Ok(ExitCode::SUCCESS)
}
