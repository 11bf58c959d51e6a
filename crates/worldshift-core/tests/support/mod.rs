//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "tests"
//! ws_type: "source"
//! ws_scope: "test"
//! ws_description: "Recording collaborators shared by the orchestration test suites."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::sleep;
use worldshift_cluster::{
    ClusterError, ConfigPublisher, InstanceId, InstanceReadiness, PublishError, ReleaseValues,
    ReplicaController, WorkloadRef,
};
use worldshift_common::config::StrategyKind;
use worldshift_core::{OrchestratorBuilder, SessionRegistry, UpdateOrchestrator};
use worldshift_proxy::{GameConsole, PlayerList, ProxyController, ProxyError, RconError};
use worldshift_sync::{SyncError, WorldSyncAgent};

pub const WORKLOAD: &str = "mc";
pub const NAMESPACE: &str = "games";

/// Ordered record of every collaborator call, shared by all fakes of one test.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.0.lock().iter().position(|c| c == call)
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().iter().filter(|c| *c == call).count()
    }

    pub fn contains(&self, call: &str) -> bool {
        self.position(call).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitBehavior {
    Ready,
    /// Report a readiness timeout once the requested limit has elapsed.
    Timeout,
    /// Never answer.
    Hang,
}

pub struct FakeCluster {
    workload: WorkloadRef,
    log: CallLog,
    replicas: Mutex<u32>,
    waits: Mutex<HashMap<u32, WaitBehavior>>,
    marker_found: Mutex<bool>,
}

impl FakeCluster {
    pub fn new(log: CallLog, replicas: u32) -> Self {
        Self {
            workload: WorkloadRef::new(WORKLOAD, NAMESPACE),
            log,
            replicas: Mutex::new(replicas),
            waits: Mutex::new(HashMap::new()),
            marker_found: Mutex::new(true),
        }
    }

    pub fn wait_for(&self, ordinal: u32, behavior: WaitBehavior) {
        self.waits.lock().insert(ordinal, behavior);
    }

    pub fn without_marker(&self) {
        *self.marker_found.lock() = false;
    }

    pub fn replica_count(&self) -> u32 {
        *self.replicas.lock()
    }
}

#[async_trait]
impl ReplicaController for FakeCluster {
    fn workload(&self) -> &WorkloadRef {
        &self.workload
    }

    async fn get_replica_count(&self) -> Result<u32, ClusterError> {
        self.log.push("get_replica_count");
        Ok(self.replica_count())
    }

    async fn set_replica_count(&self, replicas: u32) -> Result<(), ClusterError> {
        self.log.push(format!("set_replica_count({replicas})"));
        *self.replicas.lock() = replicas;
        Ok(())
    }

    async fn wait_ready(&self, instance: &InstanceId, limit: Duration) -> Result<(), ClusterError> {
        self.log.push(format!("wait_ready({instance})"));
        let behavior = self
            .waits
            .lock()
            .get(&instance.ordinal)
            .copied()
            .unwrap_or(WaitBehavior::Ready);
        match behavior {
            WaitBehavior::Ready => Ok(()),
            WaitBehavior::Timeout => {
                sleep(limit).await;
                Err(ClusterError::Timeout {
                    instance: instance.to_string(),
                    waited: limit,
                })
            }
            WaitBehavior::Hang => std::future::pending().await,
        }
    }

    async fn delete_instance(&self, instance: &InstanceId) -> Result<(), ClusterError> {
        self.log.push(format!("delete_instance({instance})"));
        Ok(())
    }

    async fn tail_for_marker(
        &self,
        instance: &InstanceId,
        _marker: &str,
        _poll_interval: Duration,
        _max_attempts: u32,
    ) -> bool {
        self.log.push(format!("tail_for_marker({instance})"));
        *self.marker_found.lock()
    }

    async fn instance_readiness(
        &self,
        instance: &InstanceId,
    ) -> Result<InstanceReadiness, ClusterError> {
        if instance.ordinal < self.replica_count() {
            Ok(InstanceReadiness::Ready)
        } else {
            Ok(InstanceReadiness::Gone)
        }
    }
}

pub struct FakePublisher {
    log: CallLog,
    rejecting: Mutex<bool>,
    published: Mutex<Vec<ReleaseValues>>,
}

impl FakePublisher {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            rejecting: Mutex::new(false),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn reject(&self) {
        *self.rejecting.lock() = true;
    }

    pub fn published(&self) -> Vec<ReleaseValues> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl ConfigPublisher for FakePublisher {
    async fn publish(&self, values: &ReleaseValues) -> Result<(), PublishError> {
        self.log
            .push(format!("publish(replicaCount={})", values.replica_count));
        if *self.rejecting.lock() {
            return Err(PublishError::Rejected {
                release: WORKLOAD.to_owned(),
                stderr: "UPGRADE FAILED: template error".to_owned(),
            });
        }
        self.published.lock().push(values.clone());
        Ok(())
    }
}

pub struct FakeSync {
    log: CallLog,
    /// Remaining failures per call, keyed like the call log entry.
    failures: Mutex<HashMap<String, usize>>,
}

impl FakeSync {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail(&self, call: &str, times: usize) {
        self.failures.lock().insert(call.to_owned(), times);
    }

    fn attempt(&self, call: String, instance: &InstanceId) -> Result<(), SyncError> {
        self.log.push(call.clone());
        let mut failures = self.failures.lock();
        match failures.get_mut(&call) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(SyncError::failure(instance, "rsync exited with status 23"))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl WorldSyncAgent for FakeSync {
    async fn sync_to_backup(&self, source: &InstanceId) -> Result<(), SyncError> {
        self.attempt(format!("sync_to_backup({source})"), source)
    }

    async fn sync_from_backup(&self, target: &InstanceId) -> Result<(), SyncError> {
        self.attempt(format!("sync_from_backup({target})"), target)
    }
}

pub struct FakeProxy {
    log: CallLog,
    unavailable: Mutex<bool>,
}

impl FakeProxy {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            unavailable: Mutex::new(false),
        }
    }

    pub fn go_down(&self) {
        *self.unavailable.lock() = true;
    }

    fn answer(&self) -> Result<(), ProxyError> {
        if *self.unavailable.lock() {
            Err(ProxyError::Unavailable("connection refused".to_owned()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProxyController for FakeProxy {
    async fn notify(&self, _message: &str) -> Result<(), ProxyError> {
        self.log.push("notify");
        self.answer()
    }

    async fn redirect_all(&self, alias: &str) -> Result<(), ProxyError> {
        self.log.push(format!("redirect_all({alias})"));
        self.answer()
    }
}

pub struct FakeConsole {
    log: CallLog,
    online: Mutex<Vec<String>>,
}

impl FakeConsole {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            online: Mutex::new(Vec::new()),
        }
    }

    pub fn join(&self, player: &str) {
        self.online.lock().push(player.to_owned());
    }
}

#[async_trait]
impl GameConsole for FakeConsole {
    async fn save_world(&self) -> Result<(), RconError> {
        self.log.push("save_world");
        Ok(())
    }

    async fn broadcast(&self, message: &str) -> Result<(), RconError> {
        self.log.push(format!("broadcast({message})"));
        Ok(())
    }

    async fn online_players(&self) -> Result<Option<PlayerList>, RconError> {
        let names = self.online.lock().clone();
        Ok(Some(PlayerList {
            online: names.len() as u32,
            max: Some(20),
            names,
        }))
    }
}

/// One set of fakes sharing a call log and an isolated session registry.
pub struct Harness {
    pub log: CallLog,
    pub cluster: Arc<FakeCluster>,
    pub publisher: Arc<FakePublisher>,
    pub sync: Arc<FakeSync>,
    pub proxy: Arc<FakeProxy>,
    pub console: Arc<FakeConsole>,
    pub registry: SessionRegistry,
}

impl Harness {
    pub fn new(replicas: u32) -> Self {
        let log = CallLog::default();
        Self {
            cluster: Arc::new(FakeCluster::new(log.clone(), replicas)),
            publisher: Arc::new(FakePublisher::new(log.clone())),
            sync: Arc::new(FakeSync::new(log.clone())),
            proxy: Arc::new(FakeProxy::new(log.clone())),
            console: Arc::new(FakeConsole::new(log.clone())),
            registry: SessionRegistry::new(),
            log,
        }
    }

    pub fn builder(&self, strategy: StrategyKind) -> OrchestratorBuilder {
        UpdateOrchestrator::builder(strategy, self.cluster.clone(), self.publisher.clone())
            .world_sync(self.sync.clone())
            .proxy(
                self.proxy.clone(),
                vec![format!("{WORKLOAD}-0"), format!("{WORKLOAD}-1")],
                "Server update in progress",
            )
            .registry(self.registry.clone())
    }

    pub fn orchestrator(&self, strategy: StrategyKind) -> UpdateOrchestrator {
        self.builder(strategy).build().expect("all collaborators supplied")
    }

    pub fn workload(&self) -> WorkloadRef {
        WorkloadRef::new(WORKLOAD, NAMESPACE)
    }
}
