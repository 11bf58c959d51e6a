//! ---
//! ws_section: "05-operator-interface"
//! ws_subsection: "binary"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Operator CLI driving update sessions and lifecycle commands."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Builds the cluster-facing collaborators from configuration.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use prometheus::Registry;
use worldshift_cluster::{
    resolve_chart_path, ConfigPublisher, HelmPublisher, KubectlReplicaController,
    ReplicaController, WorkloadRef,
};
use worldshift_common::config::{AppConfig, StrategyKind};
use worldshift_core::readiness;
use worldshift_core::{
    LifecycleRunner, LifecycleSettings, PostRollbackPolicy, SessionRegistry, UpdateMetrics,
    UpdateOrchestrator,
};
use worldshift_proxy::{GameConsole, RconProxyController, ServerConsole};
use worldshift_sync::{ExecSyncAgent, WorldSyncAgent};

pub fn replica_controller(config: &AppConfig) -> Arc<dyn ReplicaController> {
    Arc::new(
        KubectlReplicaController::new(
            config.workload.kubectl.clone(),
            WorkloadRef::from_config(&config.workload),
        )
        .with_command_timeout(config.timeouts.command),
    )
}

pub fn publisher(config: &AppConfig) -> Result<Arc<dyn ConfigPublisher>> {
    let base = std::env::current_dir().context("unable to resolve working directory")?;
    let chart = resolve_chart_path(&config.workload.chart_path, &base);
    Ok(Arc::new(
        HelmPublisher::new(
            config.workload.helm.clone(),
            config.release(),
            chart,
            config.workload.namespace.clone(),
        )
        .with_timeout(config.timeouts.command),
    ))
}

pub fn world_sync(config: &AppConfig) -> Arc<dyn WorldSyncAgent> {
    Arc::new(ExecSyncAgent::new(
        config.workload.kubectl.clone(),
        config.workload.namespace.clone(),
        &config.sync,
    ))
}

pub fn console(config: &AppConfig) -> Option<Arc<dyn GameConsole>> {
    config
        .console
        .as_ref()
        .map(|console| Arc::new(ServerConsole::from_config(console)) as Arc<dyn GameConsole>)
}

pub fn registry(config: &AppConfig) -> SessionRegistry {
    match &config.policy.lock_dir {
        Some(dir) => SessionRegistry::global().with_lock_dir(dir.clone()),
        None => SessionRegistry::global(),
    }
}

pub fn metrics() -> Result<UpdateMetrics> {
    UpdateMetrics::new(Arc::new(Registry::new()))
}

pub fn orchestrator(
    config: &AppConfig,
    strategy: StrategyKind,
    metrics: UpdateMetrics,
) -> Result<UpdateOrchestrator> {
    let mut builder = UpdateOrchestrator::builder(strategy, replica_controller(config), publisher(config)?)
        .readiness(readiness::from_config(&config.readiness)?)
        .policy(PostRollbackPolicy::from_config(&config.policy))
        .registry(registry(config))
        .metrics(metrics);
    if strategy.uses_world_sync() {
        builder = builder.world_sync(world_sync(config));
    }
    if strategy.uses_proxy() {
        let proxy = config
            .proxy
            .as_ref()
            .ok_or_else(|| anyhow!("strategy '{strategy}' requires a [proxy] section"))?;
        builder = builder.proxy(
            Arc::new(RconProxyController::from_config(proxy)),
            proxy.backends.clone(),
            proxy.notify_message.clone(),
        );
    }
    Ok(builder.build()?)
}

pub fn lifecycle(config: &AppConfig) -> Result<LifecycleRunner> {
    let mut runner = LifecycleRunner::new(
        replica_controller(config),
        LifecycleSettings::from_config(config),
    )
    .with_publisher(publisher(config)?)
    .with_world_sync(world_sync(config))
    .with_readiness(readiness::from_config(&config.readiness)?)
    .with_registry(registry(config));
    if let Some(console) = console(config) {
        runner = runner.with_console(console);
    }
    Ok(runner)
}
