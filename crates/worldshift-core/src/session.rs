//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Update orchestration state machine and lifecycle operations."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Migration session value.
//!
//! A [`MigrationSession`] is owned by exactly one run. It is handed to each state
//! transition by value and handed back, carrying the instance table, the location of the
//! authoritative world snapshot, the rollback marker and the status trace.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;
use worldshift_cluster::{InstanceId, InstanceReadiness, UpdatePlan, WorkloadRef};
use worldshift_common::config::StrategyKind;

use crate::error::{FailureReason, MigrationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationState {
    Idle,
    Publishing,
    ScalingUp,
    PromotingStandby,
    Notifying,
    Redirecting,
    RestartingPrimary,
    Restoring,
    RedirectingBack,
    ScalingDown,
    Succeeded,
    RolledBack,
    Failed(FailureReason),
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::Idle => "Idle",
            MigrationState::Publishing => "Publishing",
            MigrationState::ScalingUp => "ScalingUp",
            MigrationState::PromotingStandby => "PromotingStandby",
            MigrationState::Notifying => "Notifying",
            MigrationState::Redirecting => "Redirecting",
            MigrationState::RestartingPrimary => "RestartingPrimary",
            MigrationState::Restoring => "Restoring",
            MigrationState::RedirectingBack => "RedirectingBack",
            MigrationState::ScalingDown => "ScalingDown",
            MigrationState::Succeeded => "Succeeded",
            MigrationState::RolledBack => "RolledBack",
            MigrationState::Failed(_) => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationState::Succeeded | MigrationState::RolledBack | MigrationState::Failed(_)
        )
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::Failed(reason) => write!(f, "Failed({})", reason.as_str()),
            other => f.write_str(other.as_str()),
        }
    }
}

/// One collaborator call made by the orchestrator. Ordinals refer to `<workload>-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "step", content = "arg")]
pub enum Step {
    GetReplicaCount,
    Publish(u32),
    SetReplicaCount(u32),
    WaitReady(u32),
    ConfirmReadiness(u32),
    SyncToBackup(u32),
    SyncFromBackup(u32),
    Notify,
    RedirectAll(u32),
    DeleteInstance(u32),
    Settle,
}

impl Step {
    /// Metric label for the step family.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::GetReplicaCount => "get_replica_count",
            Step::Publish(_) => "publish",
            Step::SetReplicaCount(_) => "set_replica_count",
            Step::WaitReady(_) => "wait_ready",
            Step::ConfirmReadiness(_) => "confirm_readiness",
            Step::SyncToBackup(_) => "sync_to_backup",
            Step::SyncFromBackup(_) => "sync_from_backup",
            Step::Notify => "notify",
            Step::RedirectAll(_) => "redirect_all",
            Step::DeleteInstance(_) => "delete_instance",
            Step::Settle => "settle",
        }
    }

    /// World-sync and redirect steps move the session past the rollback point.
    pub fn crosses_rollback_point(&self) -> bool {
        matches!(
            self,
            Step::SyncToBackup(_) | Step::SyncFromBackup(_) | Step::RedirectAll(_)
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::GetReplicaCount => f.write_str("GetReplicaCount"),
            Step::Publish(count) => write!(f, "Publish(replicaCount={count})"),
            Step::SetReplicaCount(count) => write!(f, "SetReplicaCount({count})"),
            Step::WaitReady(ordinal) => write!(f, "WaitReady(instance-{ordinal})"),
            Step::ConfirmReadiness(ordinal) => write!(f, "ConfirmReadiness(instance-{ordinal})"),
            Step::SyncToBackup(ordinal) => write!(f, "SyncToBackup(instance-{ordinal})"),
            Step::SyncFromBackup(ordinal) => write!(f, "SyncFromBackup(instance-{ordinal})"),
            Step::Notify => f.write_str("Notify"),
            Step::RedirectAll(ordinal) => write!(f, "RedirectAll(instance-{ordinal})"),
            Step::DeleteInstance(ordinal) => write!(f, "DeleteInstance(instance-{ordinal})"),
            Step::Settle => f.write_str("Settle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Standby,
    Candidate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInstance {
    pub id: InstanceId,
    pub readiness: InstanceReadiness,
    pub role: Role,
}

/// Where the authoritative world snapshot lives, from the orchestrator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "location", content = "ordinal")]
pub enum WorldLocation {
    Instance(u32),
    Backup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "point")]
pub enum RollbackPoint {
    /// Reverting the replica count alone is still safe.
    Open,
    Crossed { state: MigrationState, step: Step },
}

impl RollbackPoint {
    pub fn is_open(&self) -> bool {
        matches!(self, RollbackPoint::Open)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceOutcome {
    Entered,
    Success,
    Degraded,
    Fault,
}

/// One line of the human-readable status trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    pub state: MigrationState,
    pub step: Option<Step>,
    pub outcome: TraceOutcome,
    pub detail: String,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.at.format("%H:%M:%S"), self.state)?;
        if let Some(step) = &self.step {
            write!(f, " {step}")?;
        }
        let outcome = match self.outcome {
            TraceOutcome::Entered => "entered",
            TraceOutcome::Success => "ok",
            TraceOutcome::Degraded => "degraded",
            TraceOutcome::Fault => "FAILED",
        };
        write!(f, " {outcome}")?;
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MigrationSession {
    pub id: Uuid,
    pub workload: WorkloadRef,
    pub plan: UpdatePlan,
    pub original_count: u32,
    pub strategy: StrategyKind,
    pub state: MigrationState,
    pub deadline: Instant,
    pub rollback: RollbackPoint,
    pub last_successful: MigrationState,
    pub instances: Vec<ReplicaInstance>,
    pub world: WorldLocation,
    pub trace: Vec<TraceEntry>,
}

impl MigrationSession {
    pub fn new(workload: WorkloadRef, plan: UpdatePlan, strategy: StrategyKind) -> Self {
        let deadline = Instant::now() + plan.timeouts.session;
        let primary = ReplicaInstance {
            id: workload.instance(0),
            readiness: InstanceReadiness::Ready,
            role: Role::Primary,
        };
        Self {
            id: Uuid::new_v4(),
            workload,
            plan,
            original_count: 0,
            strategy,
            state: MigrationState::Idle,
            deadline,
            rollback: RollbackPoint::Open,
            last_successful: MigrationState::Idle,
            instances: vec![primary],
            world: WorldLocation::Instance(0),
            trace: Vec::new(),
        }
    }

    /// Move to `state`, recording the transition in the trace.
    pub fn enter(mut self, state: MigrationState) -> Self {
        self.state = state;
        self.record(None, TraceOutcome::Entered, String::new());
        self
    }

    pub fn record(&mut self, step: Option<Step>, outcome: TraceOutcome, detail: impl Into<String>) {
        self.trace.push(TraceEntry {
            at: Utc::now(),
            state: self.state,
            step,
            outcome,
            detail: detail.into(),
        });
    }

    pub fn mark_state_complete(&mut self) {
        self.last_successful = self.state;
    }

    /// Mark the rollback point as crossed by `step`; only the first crossing is kept.
    pub fn cross_rollback_point(&mut self, step: Step) {
        if self.rollback.is_open() {
            self.rollback = RollbackPoint::Crossed {
                state: self.state,
                step,
            };
        }
    }

    pub fn instance_id(&self, ordinal: u32) -> InstanceId {
        self.workload.instance(ordinal)
    }

    pub fn instance(&self, ordinal: u32) -> Option<&ReplicaInstance> {
        self.instances.iter().find(|instance| instance.id.ordinal == ordinal)
    }

    pub fn set_readiness(&mut self, ordinal: u32, readiness: InstanceReadiness) {
        match self.instances.iter_mut().find(|i| i.id.ordinal == ordinal) {
            Some(instance) => instance.readiness = readiness,
            None => {
                let id = self.workload.instance(ordinal);
                self.instances.push(ReplicaInstance {
                    id,
                    readiness,
                    role: Role::Candidate,
                });
            }
        }
    }

    pub fn set_role(&mut self, ordinal: u32, role: Role) {
        if let Some(instance) = self.instances.iter_mut().find(|i| i.id.ordinal == ordinal) {
            instance.role = role;
        }
    }

    /// Drop instances above `count - 1` from the table after a scale-down.
    pub fn retain_up_to(&mut self, count: u32) {
        self.instances.retain(|instance| instance.id.ordinal < count);
    }

    /// Check that a world snapshot can be taken from `ordinal`.
    pub fn check_world_at(&self, ordinal: u32) -> Result<(), MigrationError> {
        match self.world {
            WorldLocation::Instance(current) if current == ordinal => Ok(()),
            other => Err(MigrationError::Invariant(format!(
                "SyncToBackup(instance-{ordinal}) requested while the world snapshot is at {other:?}"
            ))),
        }
    }

    /// Check that the backup holds the snapshot before restoring it to an instance.
    pub fn check_world_in_backup(&self, ordinal: u32) -> Result<(), MigrationError> {
        match self.world {
            WorldLocation::Backup => Ok(()),
            other => Err(MigrationError::Invariant(format!(
                "SyncFromBackup(instance-{ordinal}) requested while the world snapshot is at {other:?}"
            ))),
        }
    }

    /// Close the session into its report.
    pub fn into_report(self) -> SessionReport {
        SessionReport {
            session_id: self.id,
            workload: self.workload,
            strategy: self.strategy,
            terminal: self.state,
            exit_code: exit_code_for(&self.state),
            last_successful: self.last_successful,
            rollback: self.rollback,
            original_count: self.original_count,
            error: None,
            trace: self.trace,
        }
    }
}

fn exit_code_for(state: &MigrationState) -> i32 {
    match state {
        MigrationState::Succeeded => 0,
        _ => 1,
    }
}

/// Outcome of a finished session, as surfaced to the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub workload: WorkloadRef,
    pub strategy: StrategyKind,
    pub terminal: MigrationState,
    pub exit_code: i32,
    pub last_successful: MigrationState,
    pub rollback: RollbackPoint,
    pub original_count: u32,
    pub error: Option<String>,
    pub trace: Vec<TraceEntry>,
}

impl SessionReport {
    pub fn succeeded(&self) -> bool {
        self.terminal == MigrationState::Succeeded
    }

    /// Trace steps that completed successfully, in order.
    pub fn completed_steps(&self) -> impl Iterator<Item = Step> + '_ {
        self.trace
            .iter()
            .filter(|entry| entry.outcome == TraceOutcome::Success)
            .filter_map(|entry| entry.step)
    }

    /// States entered, in order.
    pub fn states(&self) -> Vec<MigrationState> {
        self.trace
            .iter()
            .filter(|entry| entry.outcome == TraceOutcome::Entered)
            .map(|entry| entry.state)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> MigrationSession {
        MigrationSession::new(
            WorkloadRef::new("mc", "default"),
            UpdatePlan::new(1),
            StrategyKind::WorldSync,
        )
    }

    #[tokio::test]
    async fn rollback_point_keeps_first_crossing() {
        let mut session = session().enter(MigrationState::PromotingStandby);
        session.cross_rollback_point(Step::SyncToBackup(0));
        session.state = MigrationState::Restoring;
        session.cross_rollback_point(Step::SyncToBackup(1));
        assert_eq!(
            session.rollback,
            RollbackPoint::Crossed {
                state: MigrationState::PromotingStandby,
                step: Step::SyncToBackup(0)
            }
        );
    }

    #[tokio::test]
    async fn world_location_guards_sync_order() {
        let mut session = session();
        assert!(session.check_world_at(0).is_ok());
        assert!(session.check_world_in_backup(1).is_err());
        session.world = WorldLocation::Backup;
        assert!(session.check_world_at(0).is_err());
        assert!(session.check_world_in_backup(1).is_ok());
    }

    #[tokio::test]
    async fn only_success_exits_zero() {
        let report = session().enter(MigrationState::RolledBack).into_report();
        assert_eq!(report.exit_code, 1);
        let report = session().enter(MigrationState::Succeeded).into_report();
        assert_eq!(report.exit_code, 0);
        assert_eq!(
            report.states(),
            vec![MigrationState::Succeeded],
            "trace records each entered state"
        );
    }

    #[test]
    fn failed_state_renders_reason() {
        let state = MigrationState::Failed(FailureReason::SyncFailure);
        assert_eq!(state.to_string(), "Failed(SyncFailure)");
        assert_eq!(Step::RedirectAll(1).to_string(), "RedirectAll(instance-1)");
    }
}
