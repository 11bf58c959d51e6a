//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Control-plane and deployment-tool adapters."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` did not finish within {limit:?}")]
    TimedOut { command: String, limit: Duration },
}

/// Captured result of an external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub command: String,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run an external tool with a hard deadline.
///
/// The child is killed when the returned future is dropped, so callers racing this
/// against an outer deadline never leak processes.
pub async fn run_tool(
    program: &str,
    args: &[String],
    limit: Duration,
) -> Result<ToolOutput, ToolError> {
    let command = format!("{} {}", program, args.join(" "));
    debug!(%command, "executing");
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ToolError::Spawn {
            program: program.to_owned(),
            source,
        })?;

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ToolError::Spawn {
            program: program.to_owned(),
            source,
        })?,
        Err(_) => return Err(ToolError::TimedOut { command, limit }),
    };

    let result = ToolOutput {
        command,
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    if !result.stdout.trim().is_empty() {
        debug!(command = %result.command, stdout = %result.stdout.trim(), "tool stdout");
    }
    if !result.stderr.trim().is_empty() {
        debug!(command = %result.command, stderr = %result.stderr.trim(), "tool stderr");
    }
    Ok(result)
}
