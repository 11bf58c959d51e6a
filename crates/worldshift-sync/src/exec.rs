//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "World snapshot synchronisation between instances and the backup."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};
use worldshift_cluster::{run_tool, InstanceId, ToolError};
use worldshift_common::config::SyncConfig;

use crate::agent::{SyncDirection, SyncError, WorldSyncAgent};

/// Runs the in-instance sync command inside the instance via `kubectl exec`.
///
/// The command receives the direction (`to-backup` or `from-backup`) as its last argument;
/// exit status zero is success.
#[derive(Debug, Clone)]
pub struct ExecSyncAgent {
    kubectl: String,
    namespace: String,
    container: Option<String>,
    command: Vec<String>,
    timeout: Duration,
    active: Arc<Mutex<HashSet<InstanceId>>>,
}

impl ExecSyncAgent {
    pub fn new(kubectl: impl Into<String>, namespace: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            kubectl: kubectl.into(),
            namespace: namespace.into(),
            container: config.container.clone(),
            command: config.command.clone(),
            timeout: config.timeout,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn exec_args(&self, instance: &InstanceId, direction: SyncDirection) -> Vec<String> {
        let mut args = vec![
            "exec".to_owned(),
            instance.to_string(),
            "-n".to_owned(),
            self.namespace.clone(),
        ];
        if let Some(container) = &self.container {
            args.push("-c".to_owned());
            args.push(container.clone());
        }
        args.push("--".to_owned());
        args.extend(self.command.iter().cloned());
        args.push(direction.as_str().to_owned());
        args
    }

    async fn run(&self, instance: &InstanceId, direction: SyncDirection) -> Result<(), SyncError> {
        let _guard = ActiveSync::enter(&self.active, instance)?;
        let args = self.exec_args(instance, direction);
        let output = run_tool(&self.kubectl, &args, self.timeout)
            .await
            .map_err(|err| match err {
                ToolError::TimedOut { limit, .. } => {
                    SyncError::failure(instance, format!("sync did not finish within {limit:?}"))
                }
                other => SyncError::failure(instance, other.to_string()),
            })?;
        if !output.success() {
            warn!(%instance, direction = %direction, code = ?output.code, "in-instance sync failed");
            let reason = match output.stderr.trim() {
                "" => format!("sync exited with {:?}", output.code),
                stderr => stderr.to_owned(),
            };
            return Err(SyncError::failure(instance, reason));
        }
        info!(%instance, direction = %direction, "in-instance sync complete");
        Ok(())
    }
}

#[async_trait]
impl WorldSyncAgent for ExecSyncAgent {
    async fn sync_to_backup(&self, source: &InstanceId) -> Result<(), SyncError> {
        self.run(source, SyncDirection::ToBackup).await
    }

    async fn sync_from_backup(&self, target: &InstanceId) -> Result<(), SyncError> {
        self.run(target, SyncDirection::FromBackup).await
    }
}

struct ActiveSync<'a> {
    active: &'a Mutex<HashSet<InstanceId>>,
    instance: InstanceId,
}

impl<'a> ActiveSync<'a> {
    fn enter(active: &'a Mutex<HashSet<InstanceId>>, instance: &InstanceId) -> Result<Self, SyncError> {
        if !active.lock().insert(instance.clone()) {
            return Err(SyncError::Concurrent {
                instance: instance.to_string(),
            });
        }
        Ok(Self {
            active,
            instance: instance.clone(),
        })
    }
}

impl Drop for ActiveSync<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldshift_cluster::WorkloadRef;

    fn agent(container: Option<&str>) -> ExecSyncAgent {
        let config = SyncConfig {
            container: container.map(str::to_owned),
            ..SyncConfig::default()
        };
        ExecSyncAgent::new("kubectl", "games", &config)
    }

    #[test]
    fn exec_arguments_end_with_direction() {
        let instance = WorkloadRef::new("mc", "games").instance(1);
        let args = agent(Some("server")).exec_args(&instance, SyncDirection::FromBackup);
        assert_eq!(
            args,
            vec![
                "exec",
                "mc-1",
                "-n",
                "games",
                "-c",
                "server",
                "--",
                "worldshiftctl",
                "sync",
                "from-backup"
            ]
        );
    }

    #[test]
    fn second_entry_for_same_instance_is_concurrent() {
        let agent = agent(None);
        let workload = WorkloadRef::new("mc", "games");
        let first = ActiveSync::enter(&agent.active, &workload.instance(0)).unwrap();
        assert!(matches!(
            ActiveSync::enter(&agent.active, &workload.instance(0)),
            Err(SyncError::Concurrent { .. })
        ));
        let other = ActiveSync::enter(&agent.active, &workload.instance(1));
        assert!(other.is_ok());
        drop(first);
        assert!(ActiveSync::enter(&agent.active, &workload.instance(0)).is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let config = SyncConfig::default();
        let agent = ExecSyncAgent::new("false", "games", &config);
        let err = agent
            .sync_to_backup(&WorkloadRef::new("mc", "games").instance(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Failure { .. }));
    }
}
