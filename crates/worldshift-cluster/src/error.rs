//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Control-plane and deployment-tool adapters."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::time::Duration;

use thiserror::Error;

use crate::command::ToolError;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("workload {0} not found")]
    NotFound(String),
    #[error("control plane rejected `{command}`: {stderr}")]
    Rejected { command: String, stderr: String },
    #[error("{instance} not ready after {waited:?}")]
    Timeout { instance: String, waited: Duration },
    #[error("unexpected control plane output: {0}")]
    Parse(String),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl ClusterError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClusterError::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("release {release} rejected: {stderr}")]
    Rejected { release: String, stderr: String },
    #[error(transparent)]
    Tool(#[from] ToolError),
}
