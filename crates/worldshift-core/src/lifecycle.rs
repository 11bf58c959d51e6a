//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Update orchestration state machine and lifecycle operations."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Operator lifecycle commands: start, stop, restart, status and backup.
//!
//! Each command holds the workload's session guard, so a lifecycle command never overlaps
//! an update session for the same workload.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use worldshift_cluster::{
    ClusterError, ConfigPublisher, InstanceReadiness, PublishError, ReleaseValues,
    ReplicaController,
};
use worldshift_common::config::AppConfig;
use worldshift_proxy::{GameConsole, PlayerList};
use worldshift_sync::{SyncError, WorldSyncAgent};

use crate::error::SessionInProgress;
use crate::readiness::{NoConfirmation, ReadinessConfirmation};
use crate::registry::SessionRegistry;

/// Pause between `save-all flush` and the scale-down.
const SAVE_FLUSH_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("{online} player(s) online ({}); pass --force to stop anyway", .names.join(", "))]
    PlayersOnline { online: u32, names: Vec<String> },
    #[error(transparent)]
    SessionInProgress(#[from] SessionInProgress),
    #[error("no world sync agent configured")]
    MissingWorldSync,
    #[error("no configuration publisher configured")]
    MissingPublisher,
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Seconds before shutdown at which players are warned, descending.
    pub countdown: Vec<u64>,
    pub backup_on_stop: bool,
    pub ready_timeout: Duration,
    pub settle: Duration,
    pub restart_pause: Duration,
}

impl LifecycleSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let mut countdown = config.lifecycle.countdown.clone();
        countdown.sort_unstable_by(|a, b| b.cmp(a));
        countdown.dedup();
        Self {
            countdown,
            backup_on_stop: config.lifecycle.backup_on_stop,
            ready_timeout: config.timeouts.first_scale_up,
            settle: config.timeouts.settle,
            restart_pause: config.lifecycle.restart_pause,
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub already_running: bool,
    pub confirmed: bool,
    pub players: Option<PlayerList>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub already_stopped: bool,
    pub backed_up: bool,
    pub saved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub instance: String,
    pub readiness: InstanceReadiness,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub workload: String,
    pub replica_count: u32,
    pub instances: Vec<InstanceStatus>,
    pub players: Option<PlayerList>,
}

impl StatusReport {
    pub fn running(&self) -> bool {
        self.replica_count > 0
            && self
                .instances
                .first()
                .map(|instance| instance.readiness == InstanceReadiness::Ready)
                .unwrap_or(false)
    }
}

pub struct LifecycleRunner {
    replicas: Arc<dyn ReplicaController>,
    publisher: Option<Arc<dyn ConfigPublisher>>,
    console: Option<Arc<dyn GameConsole>>,
    world_sync: Option<Arc<dyn WorldSyncAgent>>,
    readiness: Arc<dyn ReadinessConfirmation>,
    registry: SessionRegistry,
    settings: LifecycleSettings,
}

impl LifecycleRunner {
    pub fn new(replicas: Arc<dyn ReplicaController>, settings: LifecycleSettings) -> Self {
        Self {
            replicas,
            publisher: None,
            console: None,
            world_sync: None,
            readiness: Arc::new(NoConfirmation),
            registry: SessionRegistry::global(),
            settings,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ConfigPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_console(mut self, console: Arc<dyn GameConsole>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn with_world_sync(mut self, agent: Arc<dyn WorldSyncAgent>) -> Self {
        self.world_sync = Some(agent);
        self
    }

    pub fn with_readiness(mut self, readiness: Arc<dyn ReadinessConfirmation>) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub async fn start(&self) -> Result<StartOutcome, LifecycleError> {
        let _guard = self.registry.begin(self.replicas.workload())?;
        self.start_unguarded().await
    }

    /// Stop the workload; refuses while players are online unless `force` is set.
    pub async fn stop(&self, force: bool) -> Result<StopOutcome, LifecycleError> {
        let _guard = self.registry.begin(self.replicas.workload())?;
        self.stop_unguarded(force).await
    }

    /// Optionally publish `values`, then stop and start under a single guard.
    pub async fn restart(
        &self,
        values: Option<&ReleaseValues>,
        force: bool,
    ) -> Result<StartOutcome, LifecycleError> {
        let _guard = self.registry.begin(self.replicas.workload())?;
        if let Some(values) = values {
            let publisher = self
                .publisher
                .as_ref()
                .ok_or(LifecycleError::MissingPublisher)?;
            match publisher.publish(values).await {
                Ok(()) => info!(workload = %self.replicas.workload(), "release upgraded before restart"),
                Err(err) if force => {
                    warn!(workload = %self.replicas.workload(), error = %err, "release upgrade failed; restarting anyway")
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.stop_unguarded(force).await?;
        debug!(pause = ?self.settings.restart_pause, "pausing before start");
        sleep(self.settings.restart_pause).await;
        self.start_unguarded().await
    }

    pub async fn status(&self) -> Result<StatusReport, LifecycleError> {
        let _guard = self.registry.begin(self.replicas.workload())?;
        let workload = self.replicas.workload();
        let replica_count = self.replicas.get_replica_count().await?;
        let mut instances = Vec::new();
        for ordinal in 0..replica_count {
            let instance = workload.instance(ordinal);
            let readiness = self.replicas.instance_readiness(&instance).await?;
            instances.push(InstanceStatus {
                instance: instance.to_string(),
                readiness,
            });
        }
        let players = if replica_count > 0 {
            self.players().await
        } else {
            None
        };
        Ok(StatusReport {
            workload: workload.to_string(),
            replica_count,
            instances,
            players,
        })
    }

    /// Snapshot instance-0's world into the backup store.
    pub async fn backup(&self) -> Result<(), LifecycleError> {
        let _guard = self.registry.begin(self.replicas.workload())?;
        self.backup_unguarded().await
    }

    async fn start_unguarded(&self) -> Result<StartOutcome, LifecycleError> {
        let workload = self.replicas.workload();
        let primary = workload.instance(0);
        let count = self.replicas.get_replica_count().await?;
        if count > 0 && self.replicas.instance_readiness(&primary).await? == InstanceReadiness::Ready {
            info!(%workload, "already running");
            return Ok(StartOutcome {
                already_running: true,
                confirmed: true,
                players: self.players().await,
            });
        }

        if count == 0 {
            self.replicas.set_replica_count(1).await?;
        }
        self.replicas
            .wait_ready(&primary, self.settings.ready_timeout)
            .await?;
        let confirmed = self.readiness.confirm(self.replicas.as_ref(), &primary).await;
        if !confirmed {
            warn!(instance = %primary, confirmation = self.readiness.name(), "started but readiness unconfirmed");
        }
        info!(%workload, "started");
        Ok(StartOutcome {
            already_running: false,
            confirmed,
            players: self.players().await,
        })
    }

    async fn stop_unguarded(&self, force: bool) -> Result<StopOutcome, LifecycleError> {
        let workload = self.replicas.workload();
        if self.replicas.get_replica_count().await? == 0 {
            info!(%workload, "already stopped");
            return Ok(StopOutcome {
                already_stopped: true,
                backed_up: false,
                saved: false,
            });
        }

        if let Some(players) = self.players().await {
            if players.online > 0 {
                warn!(%workload, online = players.online, names = ?players.names, "players online");
                if !force {
                    return Err(LifecycleError::PlayersOnline {
                        online: players.online,
                        names: players.names,
                    });
                }
            }
        }

        let mut backed_up = false;
        let countdown = &self.settings.countdown;
        for (index, seconds) in countdown.iter().enumerate() {
            self.announce(&format!("Server shutting down in {seconds} seconds!"))
                .await;
            if index == 0 && self.settings.backup_on_stop {
                backed_up = self.backup_unguarded().await.is_ok();
            }
            let next = countdown.get(index + 1).copied().unwrap_or(0);
            sleep(Duration::from_secs(seconds.saturating_sub(next))).await;
        }
        if countdown.is_empty() && self.settings.backup_on_stop {
            backed_up = self.backup_unguarded().await.is_ok();
        }

        let saved = self.save().await;
        sleep(SAVE_FLUSH_PAUSE).await;
        self.replicas.set_replica_count(0).await?;
        sleep(self.settings.settle).await;
        info!(%workload, backed_up, saved, "stopped");
        Ok(StopOutcome {
            already_stopped: false,
            backed_up,
            saved,
        })
    }

    async fn backup_unguarded(&self) -> Result<(), LifecycleError> {
        let agent = self
            .world_sync
            .as_ref()
            .ok_or(LifecycleError::MissingWorldSync)?;
        let primary = self.replicas.workload().instance(0);
        self.save().await;
        match agent.sync_to_backup(&primary).await {
            Ok(()) => {
                info!(instance = %primary, "world backed up");
                Ok(())
            }
            Err(err) => {
                warn!(instance = %primary, error = %err, "world backup failed");
                Err(err.into())
            }
        }
    }

    async fn players(&self) -> Option<PlayerList> {
        let console = self.console.as_ref()?;
        match console.online_players().await {
            Ok(players) => players,
            Err(err) => {
                warn!(error = %err, "player list unavailable");
                None
            }
        }
    }

    async fn announce(&self, message: &str) {
        if let Some(console) = &self.console {
            if let Err(err) = console.broadcast(message).await {
                warn!(error = %err, "broadcast failed");
            }
        }
    }

    async fn save(&self) -> bool {
        let Some(console) = &self.console else {
            return false;
        };
        match console.save_world().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "world save failed");
                false
            }
        }
    }
}
