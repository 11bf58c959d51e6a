//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Control-plane and deployment-tool adapters."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Cluster-facing collaborators of the update orchestrator: the replica
//! controller (scale, readiness, recreate, log tailing) and the configuration
//! publisher, each as an async trait with a command-line backed adapter.

mod command;
mod error;
mod plan;
mod publisher;
mod replica;
mod types;

pub use command::{run_tool, ToolError, ToolOutput};
pub use error::{ClusterError, PublishError};
pub use plan::{PlanTimeouts, ReleaseValues, UpdatePlan};
pub use publisher::{escape_set_value, resolve_chart_path, ConfigPublisher, HelmPublisher};
pub use replica::{KubectlReplicaController, ReplicaController};
pub use types::{InstanceId, InstanceReadiness, WorkloadRef};
