//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Update orchestration state machine and lifecycle operations."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use worldshift_cluster::{ClusterError, PublishError};
use worldshift_proxy::ProxyError;
use worldshift_sync::SyncError;

/// Failure class recorded in a `Failed` terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    ControlPlane,
    Timeout,
    TimeoutExceeded,
    Publish,
    SyncFailure,
    ConcurrentSync,
    ProxyUnavailable,
    SessionInProgress,
    Invariant,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ControlPlane => "ControlPlaneError",
            FailureReason::Timeout => "TimeoutError",
            FailureReason::TimeoutExceeded => "TimeoutExceeded",
            FailureReason::Publish => "PublishError",
            FailureReason::SyncFailure => "SyncFailure",
            FailureReason::ConcurrentSync => "ConcurrentSyncError",
            FailureReason::ProxyUnavailable => "ProxyUnavailable",
            FailureReason::SessionInProgress => "SessionInProgress",
            FailureReason::Invariant => "InvariantViolation",
        }
    }
}

/// Raised when a second session targets a workload that already has one running.
#[derive(Debug, Clone, Error)]
#[error("an update session for {workload} is already in progress")]
pub struct SessionInProgress {
    pub workload: String,
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("control plane error: {0}")]
    ControlPlane(#[source] ClusterError),
    #[error("{instance} not ready within {waited:?}")]
    Timeout { instance: String, waited: Duration },
    #[error("session deadline exceeded during {step}")]
    TimeoutExceeded { step: String },
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Sync(SyncError),
    #[error(transparent)]
    ConcurrentSync(SyncError),
    #[error(transparent)]
    ProxyUnavailable(#[from] ProxyError),
    #[error(transparent)]
    SessionInProgress(#[from] SessionInProgress),
    #[error("zero-downtime strategies require exactly one running replica, found {found}")]
    UnsupportedReplicaCount { found: u32 },
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl MigrationError {
    pub fn reason(&self) -> FailureReason {
        match self {
            MigrationError::ControlPlane(_) | MigrationError::UnsupportedReplicaCount { .. } => {
                FailureReason::ControlPlane
            }
            MigrationError::Timeout { .. } => FailureReason::Timeout,
            MigrationError::TimeoutExceeded { .. } => FailureReason::TimeoutExceeded,
            MigrationError::Publish(_) => FailureReason::Publish,
            MigrationError::Sync(_) => FailureReason::SyncFailure,
            MigrationError::ConcurrentSync(_) => FailureReason::ConcurrentSync,
            MigrationError::ProxyUnavailable(_) => FailureReason::ProxyUnavailable,
            MigrationError::SessionInProgress(_) => FailureReason::SessionInProgress,
            MigrationError::Invariant(_) => FailureReason::Invariant,
        }
    }
}

impl From<ClusterError> for MigrationError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Timeout { instance, waited } => {
                MigrationError::Timeout { instance, waited }
            }
            other => MigrationError::ControlPlane(other),
        }
    }
}

impl From<SyncError> for MigrationError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Concurrent { .. } => MigrationError::ConcurrentSync(err),
            SyncError::Failure { .. } => MigrationError::Sync(err),
        }
    }
}
