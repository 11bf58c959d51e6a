//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Update orchestration state machine and lifecycle operations."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Update orchestration for single-writer game-server workloads.

pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
pub mod readiness;
pub mod registry;
pub mod session;
pub mod strategy;

pub use error::{FailureReason, MigrationError, SessionInProgress};
pub use lifecycle::{
    LifecycleError, LifecycleRunner, LifecycleSettings, StartOutcome, StatusReport, StopOutcome,
};
pub use metrics::{SharedRegistry, UpdateMetrics};
pub use orchestrator::{BuildError, OrchestratorBuilder, ProxyRoute, UpdateOrchestrator};
pub use policy::{PostRollbackPolicy, RetryPolicy};
pub use readiness::{HealthEndpoint, LogMarker, NoConfirmation, ReadinessConfirmation};
pub use registry::{SessionGuard, SessionRegistry};
pub use session::{
    MigrationSession, MigrationState, RollbackPoint, SessionReport, Step, TraceEntry,
    TraceOutcome, WorldLocation,
};
pub use strategy::{preview, PlanPreview};
