//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Update orchestration state machine and lifecycle operations."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Update orchestrator.
//!
//! One run drives one [`MigrationSession`] through the states selected by the strategy,
//! executing the steps listed by [`crate::strategy::steps_for`] strictly in order. Every
//! collaborator call is bounded by the session deadline. A readiness timeout before the
//! rollback point scales back to the original count and ends `RolledBack`; every other
//! fatal failure ends `Failed` with the session's last successful state preserved.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::time::{sleep, timeout_at, Instant};
use worldshift_cluster::{ConfigPublisher, InstanceReadiness, ReplicaController, UpdatePlan};
use worldshift_common::config::StrategyKind;
use worldshift_logging::{log_session_event, ws_info, ws_warn, LogContext, SessionEventOutcome};
use worldshift_proxy::ProxyController;
use worldshift_sync::WorldSyncAgent;

use crate::error::MigrationError;
use crate::metrics::UpdateMetrics;
use crate::policy::{PostRollbackPolicy, RetryPolicy};
use crate::readiness::{NoConfirmation, ReadinessConfirmation};
use crate::registry::SessionRegistry;
use crate::session::{
    MigrationSession, MigrationState, Role, RollbackPoint, SessionReport, Step, TraceOutcome,
    WorldLocation,
};
use crate::strategy::{effective_strategy, next_state, steps_for};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("strategy {0} requires a proxy controller")]
    MissingProxy(StrategyKind),
    #[error("strategy {0} requires a world sync agent")]
    MissingWorldSync(StrategyKind),
    #[error("proxy backends must name an alias for instance-0 and instance-1")]
    MissingBackendAlias,
}

/// Proxy controller plus the backend alias registered for each instance ordinal.
#[derive(Clone)]
pub struct ProxyRoute {
    pub controller: Arc<dyn ProxyController>,
    pub backends: Vec<String>,
    pub notify_message: String,
}

impl ProxyRoute {
    fn alias(&self, ordinal: u32) -> Option<&str> {
        self.backends.get(ordinal as usize).map(String::as_str)
    }
}

pub struct OrchestratorBuilder {
    strategy: StrategyKind,
    replicas: Arc<dyn ReplicaController>,
    publisher: Arc<dyn ConfigPublisher>,
    world_sync: Option<Arc<dyn WorldSyncAgent>>,
    proxy: Option<ProxyRoute>,
    readiness: Arc<dyn ReadinessConfirmation>,
    policy: PostRollbackPolicy,
    registry: SessionRegistry,
    metrics: Option<UpdateMetrics>,
}

impl OrchestratorBuilder {
    pub fn new(
        strategy: StrategyKind,
        replicas: Arc<dyn ReplicaController>,
        publisher: Arc<dyn ConfigPublisher>,
    ) -> Self {
        Self {
            strategy,
            replicas,
            publisher,
            world_sync: None,
            proxy: None,
            readiness: Arc::new(NoConfirmation),
            policy: PostRollbackPolicy::default(),
            registry: SessionRegistry::global(),
            metrics: None,
        }
    }

    pub fn world_sync(mut self, agent: Arc<dyn WorldSyncAgent>) -> Self {
        self.world_sync = Some(agent);
        self
    }

    pub fn proxy(
        mut self,
        controller: Arc<dyn ProxyController>,
        backends: Vec<String>,
        notify_message: impl Into<String>,
    ) -> Self {
        self.proxy = Some(ProxyRoute {
            controller,
            backends,
            notify_message: notify_message.into(),
        });
        self
    }

    pub fn readiness(mut self, readiness: Arc<dyn ReadinessConfirmation>) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn policy(mut self, policy: PostRollbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn metrics(mut self, metrics: UpdateMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<UpdateOrchestrator, BuildError> {
        if self.strategy.uses_proxy() {
            let route = self
                .proxy
                .as_ref()
                .ok_or(BuildError::MissingProxy(self.strategy))?;
            if route.backends.len() < 2 {
                return Err(BuildError::MissingBackendAlias);
            }
        }
        if self.strategy.uses_world_sync() && self.world_sync.is_none() {
            return Err(BuildError::MissingWorldSync(self.strategy));
        }
        Ok(UpdateOrchestrator {
            strategy: self.strategy,
            replicas: self.replicas,
            publisher: self.publisher,
            world_sync: self.world_sync,
            proxy: self.proxy,
            readiness: self.readiness,
            policy: self.policy,
            registry: self.registry,
            metrics: self.metrics,
        })
    }
}

pub struct UpdateOrchestrator {
    strategy: StrategyKind,
    replicas: Arc<dyn ReplicaController>,
    publisher: Arc<dyn ConfigPublisher>,
    world_sync: Option<Arc<dyn WorldSyncAgent>>,
    proxy: Option<ProxyRoute>,
    readiness: Arc<dyn ReadinessConfirmation>,
    policy: PostRollbackPolicy,
    registry: SessionRegistry,
    metrics: Option<UpdateMetrics>,
}

/// A transition that stopped the session, handing the session back with the cause.
struct Halted {
    session: MigrationSession,
    error: MigrationError,
}

impl UpdateOrchestrator {
    pub fn builder(
        strategy: StrategyKind,
        replicas: Arc<dyn ReplicaController>,
        publisher: Arc<dyn ConfigPublisher>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(strategy, replicas, publisher)
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// Run one update session to a terminal state.
    ///
    /// Only [`MigrationError::SessionInProgress`] is returned as an error; every other
    /// failure is reported through the terminal state of the returned report.
    pub async fn run(&self, plan: UpdatePlan) -> Result<SessionReport, MigrationError> {
        let workload = self.replicas.workload().clone();
        let _guard = self.registry.begin(&workload)?;

        let session = MigrationSession::new(workload, plan, self.strategy);
        let session_id = session.id.to_string();
        ws_info!(
            context = LogContext::new()
                .with_workload(&session.workload.name)
                .with_session(&session_id),
            "update session started with strategy {}",
            self.strategy
        );

        let (session, error) = self.drive(session).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_session(session.strategy.as_str(), &session.state);
        }
        let mut report = session.into_report();
        report.error = error.map(|err| err.to_string());
        Ok(report)
    }

    async fn drive(&self, mut session: MigrationSession) -> (MigrationSession, Option<MigrationError>) {
        let original = match self.execute_step(&mut session, Step::GetReplicaCount).await {
            Ok(()) => session.original_count,
            Err(error) => return self.conclude_failure(session, error).await,
        };
        session.strategy = effective_strategy(self.strategy, original);
        if session.strategy != self.strategy {
            let detail = format!("no running replica; using {} strategy", session.strategy);
            self.trace(&mut session, None, TraceOutcome::Degraded, detail);
        }
        if session.strategy.scales_out() && original != 1 {
            let error = MigrationError::UnsupportedReplicaCount { found: original };
            return self.conclude_failure(session, error).await;
        }
        session.mark_state_complete();

        while let Some(next) = next_state(session.strategy, session.state) {
            session = session.enter(next);
            self.trace_entered(&session);
            if next.is_terminal() {
                break;
            }
            session = match self.execute_state(session).await {
                Ok(session) => session,
                Err(Halted { session, error }) => return self.conclude_failure(session, error).await,
            };
        }
        (session, None)
    }

    async fn execute_state(&self, mut session: MigrationSession) -> Result<MigrationSession, Halted> {
        let steps = steps_for(
            session.strategy,
            session.state,
            &session.plan,
            session.original_count,
        );
        for step in steps {
            if let Err(error) = self.execute_with_policy(&mut session, step).await {
                return Err(Halted { session, error });
            }
        }
        match session.state {
            MigrationState::PromotingStandby => {
                session.set_role(1, Role::Primary);
                session.set_role(0, Role::Candidate);
            }
            MigrationState::Restoring => {
                session.set_role(0, Role::Primary);
                session.set_role(1, Role::Standby);
            }
            _ => {}
        }
        session.mark_state_complete();
        Ok(session)
    }

    /// Run `step`, retrying world-sync failures while restoring when the policy allows.
    async fn execute_with_policy(
        &self,
        session: &mut MigrationSession,
        step: Step,
    ) -> Result<(), MigrationError> {
        let retry = match self.policy {
            PostRollbackPolicy::RetryRestore(retry) if session.state == MigrationState::Restoring => {
                Some(retry)
            }
            _ => None,
        };
        let Some(retry) = retry else {
            return self.execute_step(session, step).await;
        };

        let mut rng = RetryPolicy::rng();
        let mut attempt = 1;
        loop {
            match self.execute_step(session, step).await {
                Ok(()) => return Ok(()),
                Err(err @ (MigrationError::Sync(_) | MigrationError::ConcurrentSync(_)))
                    if attempt < retry.max_attempts =>
                {
                    attempt += 1;
                    let delay = retry.backoff_delay(attempt, &mut rng);
                    self.trace(
                        session,
                        Some(step),
                        TraceOutcome::Degraded,
                        format!("{err}; retrying in {delay:?} (attempt {attempt}/{})", retry.max_attempts),
                    );
                    self.bounded(session, step, async {
                        sleep(delay).await;
                        Ok::<(), MigrationError>(())
                    })
                    .await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_step(
        &self,
        session: &mut MigrationSession,
        step: Step,
    ) -> Result<(), MigrationError> {
        let started = Instant::now();
        if step.crosses_rollback_point() {
            session.cross_rollback_point(step);
        }
        let result = self.perform(session, step).await;
        if let Some(metrics) = &self.metrics {
            metrics.observe_step(&step, started.elapsed());
        }
        match result {
            Ok(StepOutcome::Done(detail)) => {
                self.trace(session, Some(step), TraceOutcome::Success, detail);
                Ok(())
            }
            Ok(StepOutcome::Degraded(detail)) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_degraded(&step);
                }
                self.trace(session, Some(step), TraceOutcome::Degraded, detail);
                Ok(())
            }
            Err(error) => {
                self.trace(session, Some(step), TraceOutcome::Fault, error.to_string());
                Err(error)
            }
        }
    }

    async fn perform(
        &self,
        session: &mut MigrationSession,
        step: Step,
    ) -> Result<StepOutcome, MigrationError> {
        match step {
            Step::GetReplicaCount => {
                let count = self
                    .bounded(session, step, self.replicas.get_replica_count())
                    .await?;
                session.original_count = count;
                Ok(StepOutcome::Done(format!("original replica count {count}")))
            }
            Step::Publish(count) => {
                let values = session.plan.release_values(count);
                self.bounded(session, step, self.publisher.publish(&values))
                    .await?;
                Ok(StepOutcome::Done(format!(
                    "published {} override(s)",
                    values.pairs().len()
                )))
            }
            Step::SetReplicaCount(count) => {
                self.bounded(session, step, self.replicas.set_replica_count(count))
                    .await?;
                session.retain_up_to(count);
                for ordinal in 0..count {
                    if session.instance(ordinal).is_none() {
                        session.set_readiness(ordinal, InstanceReadiness::Pending);
                    }
                }
                Ok(StepOutcome::Done(String::new()))
            }
            Step::WaitReady(ordinal) => {
                let limit = if session.state == MigrationState::ScalingUp {
                    session.plan.timeouts.first_scale_up
                } else {
                    session.plan.timeouts.restart
                };
                let instance = session.instance_id(ordinal);
                self.bounded(session, step, self.replicas.wait_ready(&instance, limit))
                    .await?;
                session.set_readiness(ordinal, InstanceReadiness::Ready);
                Ok(StepOutcome::Done(format!("{instance} ready")))
            }
            Step::ConfirmReadiness(ordinal) => {
                let instance = session.instance_id(ordinal);
                let confirmed = self
                    .bounded(session, step, async {
                        Ok::<bool, MigrationError>(
                            self.readiness.confirm(self.replicas.as_ref(), &instance).await,
                        )
                    })
                    .await?;
                if confirmed {
                    Ok(StepOutcome::Done(format!("confirmed by {}", self.readiness.name())))
                } else {
                    Ok(StepOutcome::Degraded(format!(
                        "{instance} unconfirmed by {}; proceeding with caution",
                        self.readiness.name()
                    )))
                }
            }
            Step::SyncToBackup(ordinal) => {
                session.check_world_at(ordinal)?;
                let agent = self.world_sync_agent()?;
                let instance = session.instance_id(ordinal);
                self.bounded(session, step, agent.sync_to_backup(&instance))
                    .await?;
                session.world = WorldLocation::Backup;
                Ok(StepOutcome::Done(String::new()))
            }
            Step::SyncFromBackup(ordinal) => {
                session.check_world_in_backup(ordinal)?;
                let agent = self.world_sync_agent()?;
                let instance = session.instance_id(ordinal);
                self.bounded(session, step, agent.sync_from_backup(&instance))
                    .await?;
                session.world = WorldLocation::Instance(ordinal);
                Ok(StepOutcome::Done(String::new()))
            }
            Step::Notify => {
                let route = self.proxy_route()?;
                let result = self
                    .bounded(session, step, route.controller.notify(&route.notify_message))
                    .await;
                proxy_outcome(result, "players notified".to_owned())
            }
            Step::RedirectAll(ordinal) => {
                if session.strategy.uses_world_sync() && session.world != WorldLocation::Instance(ordinal) {
                    return Err(MigrationError::Invariant(format!(
                        "instance-{ordinal} would receive traffic before its world was restored"
                    )));
                }
                let route = self.proxy_route()?;
                let alias = route.alias(ordinal).ok_or_else(|| {
                    MigrationError::Invariant(format!("no proxy backend alias for instance-{ordinal}"))
                })?;
                let result = self
                    .bounded(session, step, route.controller.redirect_all(alias))
                    .await;
                proxy_outcome(result, format!("players sent to backend {alias}"))
            }
            Step::DeleteInstance(ordinal) => {
                if session.strategy.uses_world_sync() && session.world == WorldLocation::Instance(ordinal) {
                    return Err(MigrationError::Invariant(format!(
                        "instance-{ordinal} still holds the only world snapshot"
                    )));
                }
                let instance = session.instance_id(ordinal);
                self.bounded(session, step, self.replicas.delete_instance(&instance))
                    .await?;
                session.set_readiness(ordinal, InstanceReadiness::Terminating);
                Ok(StepOutcome::Done(String::new()))
            }
            Step::Settle => {
                let settle = session.plan.timeouts.settle;
                self.bounded(session, step, async {
                    sleep(settle).await;
                    Ok::<(), MigrationError>(())
                })
                .await?;
                Ok(StepOutcome::Done(format!("settled for {settle:?}")))
            }
        }
    }

    /// Bound `fut` by the session deadline.
    async fn bounded<T, E, F>(
        &self,
        session: &MigrationSession,
        step: Step,
        fut: F,
    ) -> Result<T, MigrationError>
    where
        F: Future<Output = Result<T, E>>,
        MigrationError: From<E>,
    {
        match timeout_at(session.deadline, fut).await {
            Ok(result) => result.map_err(MigrationError::from),
            Err(_) => Err(MigrationError::TimeoutExceeded {
                step: step.to_string(),
            }),
        }
    }

    /// Decide the terminal state after `error` stopped the session.
    async fn conclude_failure(
        &self,
        mut session: MigrationSession,
        error: MigrationError,
    ) -> (MigrationSession, Option<MigrationError>) {
        let rollback_allowed =
            matches!(error, MigrationError::Timeout { .. }) && session.rollback.is_open();
        let terminal = if rollback_allowed {
            let original = session.original_count;
            ws_warn!(
                context = LogContext::new().with_workload(&session.workload.name),
                "readiness timed out before the rollback point; restoring {} replica(s)",
                original
            );
            match self.execute_step(&mut session, Step::SetReplicaCount(original)).await {
                Ok(()) => MigrationState::RolledBack,
                Err(rollback_error) => MigrationState::Failed(rollback_error.reason()),
            }
        } else {
            MigrationState::Failed(error.reason())
        };

        session = session.enter(terminal);
        self.trace_entered(&session);
        let detail = match &session.rollback {
            RollbackPoint::Open => error.to_string(),
            RollbackPoint::Crossed { state, step } => format!(
                "{error}; last successful state {}; rollback point crossed at {step} in {state}",
                session.last_successful
            ),
        };
        self.trace(&mut session, None, TraceOutcome::Fault, detail);
        (session, Some(error))
    }

    fn world_sync_agent(&self) -> Result<&Arc<dyn WorldSyncAgent>, MigrationError> {
        self.world_sync
            .as_ref()
            .ok_or_else(|| MigrationError::Invariant("world sync step without an agent".into()))
    }

    fn proxy_route(&self) -> Result<&ProxyRoute, MigrationError> {
        self.proxy
            .as_ref()
            .ok_or_else(|| MigrationError::Invariant("proxy step without a controller".into()))
    }

    fn trace_entered(&self, session: &MigrationSession) {
        let session_id = session.id.to_string();
        let context = LogContext::new()
            .with_workload(&session.workload.name)
            .with_session(&session_id)
            .with_state(session.state.as_str());
        let outcome = match session.state {
            MigrationState::Failed(_) => SessionEventOutcome::Fault,
            MigrationState::RolledBack => SessionEventOutcome::Degraded,
            _ => SessionEventOutcome::Success,
        };
        log_session_event(
            Some(&context),
            "session.state",
            &format!("entered {}", session.state),
            outcome,
        );
    }

    fn trace(
        &self,
        session: &mut MigrationSession,
        step: Option<Step>,
        outcome: TraceOutcome,
        detail: String,
    ) {
        let session_id = session.id.to_string();
        let instance = step.and_then(step_ordinal).map(|o| session.instance_id(o).to_string());
        let mut context = LogContext::new()
            .with_workload(&session.workload.name)
            .with_session(&session_id)
            .with_state(session.state.as_str());
        if let Some(instance) = &instance {
            context = context.with_instance(instance);
        }
        let message = match &step {
            Some(step) if detail.is_empty() => step.to_string(),
            Some(step) => format!("{step}: {detail}"),
            None => detail.clone(),
        };
        let level = match outcome {
            TraceOutcome::Entered | TraceOutcome::Success => SessionEventOutcome::Success,
            TraceOutcome::Degraded => SessionEventOutcome::Degraded,
            TraceOutcome::Fault => SessionEventOutcome::Fault,
        };
        log_session_event(Some(&context), "session.step", &message, level);
        session.record(step, outcome, detail);
    }
}

enum StepOutcome {
    Done(String),
    Degraded(String),
}

/// Proxy failures never stop the session.
fn proxy_outcome(
    result: Result<(), MigrationError>,
    detail: String,
) -> Result<StepOutcome, MigrationError> {
    match result {
        Ok(()) => Ok(StepOutcome::Done(detail)),
        Err(MigrationError::ProxyUnavailable(err)) => Ok(StepOutcome::Degraded(format!(
            "{err}; continuing without the proxy"
        ))),
        Err(other) => Err(other),
    }
}

fn step_ordinal(step: Step) -> Option<u32> {
    match step {
        Step::WaitReady(o)
        | Step::ConfirmReadiness(o)
        | Step::SyncToBackup(o)
        | Step::SyncFromBackup(o)
        | Step::RedirectAll(o)
        | Step::DeleteInstance(o) => Some(o),
        _ => None,
    }
}
