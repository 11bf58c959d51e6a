//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Update orchestration state machine and lifecycle operations."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Strategy tables: which states a strategy enters and which steps each state runs.
//!
//! The orchestrator executes exactly what these functions return, so the `plan`
//! preview and a live run cannot disagree.

use serde::Serialize;
use worldshift_cluster::UpdatePlan;
use worldshift_common::config::StrategyKind;

use crate::session::{MigrationState, Step};

const STANDBY: u32 = 1;
const PRIMARY: u32 = 0;

/// Strategy actually run: with nothing live there is nothing to drain.
pub fn effective_strategy(configured: StrategyKind, original_count: u32) -> StrategyKind {
    if original_count == 0 {
        StrategyKind::Plain
    } else {
        configured
    }
}

pub fn next_state(strategy: StrategyKind, current: MigrationState) -> Option<MigrationState> {
    use MigrationState::*;
    let next = match current {
        Idle => Publishing,
        Publishing if strategy == StrategyKind::Plain => Succeeded,
        Publishing => ScalingUp,
        ScalingUp => PromotingStandby,
        PromotingStandby if strategy.uses_proxy() => Notifying,
        PromotingStandby => RestartingPrimary,
        Notifying => Redirecting,
        Redirecting => RestartingPrimary,
        RestartingPrimary => Restoring,
        Restoring if strategy.uses_proxy() => RedirectingBack,
        Restoring => ScalingDown,
        RedirectingBack => ScalingDown,
        ScalingDown => Succeeded,
        Succeeded | RolledBack | Failed(_) => return None,
    };
    Some(next)
}

/// Non-terminal states entered by a successful run, in order.
pub fn state_sequence(strategy: StrategyKind) -> Vec<MigrationState> {
    let mut states = Vec::new();
    let mut current = MigrationState::Idle;
    while let Some(next) = next_state(strategy, current) {
        states.push(next);
        current = next;
    }
    states
}

/// Steps run while in `state`.
///
/// `original_count` is the replica count observed at session start.
pub fn steps_for(
    strategy: StrategyKind,
    state: MigrationState,
    plan: &UpdatePlan,
    original_count: u32,
) -> Vec<Step> {
    let sync = strategy.uses_world_sync();
    match state {
        MigrationState::Publishing if strategy == StrategyKind::Plain => {
            vec![Step::Publish(plan.replica_count)]
        }
        MigrationState::Publishing => vec![Step::Publish(original_count)],
        MigrationState::ScalingUp => vec![
            Step::SetReplicaCount(STANDBY + 1),
            Step::WaitReady(STANDBY),
            Step::ConfirmReadiness(STANDBY),
        ],
        MigrationState::PromotingStandby if sync => {
            vec![Step::SyncToBackup(PRIMARY), Step::SyncFromBackup(STANDBY)]
        }
        MigrationState::Notifying => vec![Step::Notify],
        MigrationState::Redirecting => vec![Step::RedirectAll(STANDBY)],
        MigrationState::RestartingPrimary => vec![
            Step::DeleteInstance(PRIMARY),
            Step::WaitReady(PRIMARY),
            Step::ConfirmReadiness(PRIMARY),
        ],
        MigrationState::Restoring if sync => {
            vec![Step::SyncToBackup(STANDBY), Step::SyncFromBackup(PRIMARY)]
        }
        MigrationState::RedirectingBack => vec![Step::RedirectAll(PRIMARY)],
        MigrationState::ScalingDown => {
            vec![Step::SetReplicaCount(plan.replica_count), Step::Settle]
        }
        _ => Vec::new(),
    }
}

/// Preview of a run, rendered by `worldshiftctl plan`.
#[derive(Debug, Clone, Serialize)]
pub struct PlanPreview {
    pub strategy: StrategyKind,
    pub original_count: u32,
    pub target_count: u32,
    pub states: Vec<PlannedState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedState {
    pub state: MigrationState,
    pub steps: Vec<String>,
}

pub fn preview(strategy: StrategyKind, plan: &UpdatePlan, original_count: u32) -> PlanPreview {
    let strategy = effective_strategy(strategy, original_count);
    let states = state_sequence(strategy)
        .into_iter()
        .map(|state| PlannedState {
            state,
            steps: steps_for(strategy, state, plan, original_count)
                .iter()
                .map(ToString::to_string)
                .collect(),
        })
        .collect();
    PlanPreview {
        strategy,
        original_count,
        target_count: plan.replica_count,
        states,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MigrationState::*;

    #[test]
    fn bracketed_states_only_for_proxy_strategies() {
        assert_eq!(
            state_sequence(StrategyKind::WorldSync),
            vec![
                Publishing,
                ScalingUp,
                PromotingStandby,
                RestartingPrimary,
                Restoring,
                ScalingDown,
                Succeeded
            ]
        );
        assert_eq!(
            state_sequence(StrategyKind::Combined),
            vec![
                Publishing,
                ScalingUp,
                PromotingStandby,
                Notifying,
                Redirecting,
                RestartingPrimary,
                Restoring,
                RedirectingBack,
                ScalingDown,
                Succeeded
            ]
        );
        assert_eq!(state_sequence(StrategyKind::Plain), vec![Publishing, Succeeded]);
    }

    #[test]
    fn no_live_instance_degrades_to_plain() {
        assert_eq!(
            effective_strategy(StrategyKind::Combined, 0),
            StrategyKind::Plain
        );
        assert_eq!(
            effective_strategy(StrategyKind::Rolling, 1),
            StrategyKind::Rolling
        );
    }

    #[test]
    fn backup_always_precedes_delete_of_the_primary() {
        for strategy in [StrategyKind::WorldSync, StrategyKind::Combined] {
            let plan = UpdatePlan::new(1);
            let steps: Vec<Step> = state_sequence(strategy)
                .into_iter()
                .flat_map(|state| steps_for(strategy, state, &plan, 1))
                .collect();
            let backup = steps
                .iter()
                .position(|step| *step == Step::SyncToBackup(0))
                .unwrap();
            let restore_standby = steps
                .iter()
                .position(|step| *step == Step::SyncFromBackup(1))
                .unwrap();
            let delete = steps
                .iter()
                .position(|step| *step == Step::DeleteInstance(0))
                .unwrap();
            assert!(backup < restore_standby && restore_standby < delete);
            if let Some(redirect) = steps.iter().position(|s| *s == Step::RedirectAll(1)) {
                assert!(restore_standby < redirect);
            }
        }
    }

    #[test]
    fn preview_lists_rendered_steps() {
        let preview = preview(StrategyKind::Rolling, &UpdatePlan::new(1), 1);
        assert_eq!(preview.strategy, StrategyKind::Rolling);
        assert_eq!(preview.states[0].steps, vec!["Publish(replicaCount=1)"]);
        assert_eq!(
            preview.states[1].steps,
            vec![
                "SetReplicaCount(2)",
                "WaitReady(instance-1)",
                "ConfirmReadiness(instance-1)"
            ]
        );
    }
}
