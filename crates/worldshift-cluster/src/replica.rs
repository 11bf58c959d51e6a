//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Control-plane and deployment-tool adapters."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::command::{run_tool, ToolOutput};
use crate::error::ClusterError;
use crate::types::{InstanceId, InstanceReadiness, WorkloadRef};

const DEFAULT_READY_POLL: Duration = Duration::from_secs(5);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const LOG_TAIL_LINES: u32 = 200;
const READINESS_JSONPATH: &str =
    r#"jsonpath={.metadata.deletionTimestamp}{"|"}{.status.conditions[?(@.type=="Ready")].status}"#;

/// Control-plane operations the orchestrator needs on the replicated workload.
#[async_trait]
pub trait ReplicaController: Send + Sync {
    fn workload(&self) -> &WorkloadRef;

    async fn get_replica_count(&self) -> Result<u32, ClusterError>;

    async fn set_replica_count(&self, replicas: u32) -> Result<(), ClusterError>;

    /// Block until the instance reports ready or `limit` elapses.
    async fn wait_ready(&self, instance: &InstanceId, limit: Duration) -> Result<(), ClusterError>;

    /// Delete an instance so the controller recreates it from the current template.
    async fn delete_instance(&self, instance: &InstanceId) -> Result<(), ClusterError>;

    /// Poll instance logs for `marker`; false once `max_attempts` polls miss.
    async fn tail_for_marker(
        &self,
        instance: &InstanceId,
        marker: &str,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> bool;

    async fn instance_readiness(
        &self,
        instance: &InstanceId,
    ) -> Result<InstanceReadiness, ClusterError>;
}

/// [`ReplicaController`] backed by the `kubectl` CLI against a StatefulSet.
#[derive(Debug, Clone)]
pub struct KubectlReplicaController {
    program: String,
    global_args: Vec<String>,
    workload: WorkloadRef,
    command_timeout: Duration,
    ready_poll: Duration,
}

impl KubectlReplicaController {
    pub fn new(program: impl Into<String>, workload: WorkloadRef) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
            workload,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            ready_poll: DEFAULT_READY_POLL,
        }
    }

    /// Arguments placed before every subcommand, e.g. `--context prod`.
    pub fn with_global_args(mut self, args: Vec<String>) -> Self {
        self.global_args = args;
        self
    }

    pub fn with_command_timeout(mut self, limit: Duration) -> Self {
        self.command_timeout = limit;
        self
    }

    pub fn with_ready_poll(mut self, interval: Duration) -> Self {
        self.ready_poll = interval;
        self
    }

    fn args<I, S>(&self, rest: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = self.global_args.clone();
        args.extend(rest.into_iter().map(Into::into));
        args.push("-n".to_owned());
        args.push(self.workload.namespace.clone());
        args
    }

    async fn kubectl(&self, args: Vec<String>) -> Result<ToolOutput, ClusterError> {
        Ok(run_tool(&self.program, &args, self.command_timeout).await?)
    }

    /// Pods currently belonging to the workload, as `(name, phase)` pairs.
    pub async fn list_pods(&self) -> Result<Vec<(String, String)>, ClusterError> {
        let selector = format!("app.kubernetes.io/instance={}", self.workload.name);
        let output = self
            .kubectl(self.args([
                "get".to_owned(),
                "pods".to_owned(),
                "-l".to_owned(),
                selector,
                "-o".to_owned(),
                r#"jsonpath={range .items[*]}{.metadata.name}{" "}{.status.phase}{"\n"}{end}"#
                    .to_owned(),
            ]))
            .await?;
        if !output.success() {
            return Err(classify_failure(&output, &self.workload.to_string()));
        }
        Ok(parse_pod_listing(&output.stdout))
    }
}

#[async_trait]
impl ReplicaController for KubectlReplicaController {
    fn workload(&self) -> &WorkloadRef {
        &self.workload
    }

    async fn get_replica_count(&self) -> Result<u32, ClusterError> {
        let output = self
            .kubectl(self.args([
                "get",
                "statefulset",
                self.workload.name.as_str(),
                "-o",
                "jsonpath={.spec.replicas}",
            ]))
            .await?;
        if !output.success() {
            return Err(classify_failure(&output, &self.workload.to_string()));
        }
        parse_replica_count(&output.stdout)
    }

    async fn set_replica_count(&self, replicas: u32) -> Result<(), ClusterError> {
        let output = self
            .kubectl(self.args([
                "scale".to_owned(),
                "statefulset".to_owned(),
                self.workload.name.clone(),
                format!("--replicas={replicas}"),
            ]))
            .await?;
        if !output.success() {
            return Err(classify_failure(&output, &self.workload.to_string()));
        }
        info!(workload = %self.workload, replicas, "replica count set");
        Ok(())
    }

    async fn wait_ready(&self, instance: &InstanceId, limit: Duration) -> Result<(), ClusterError> {
        let poll = async {
            loop {
                match self.instance_readiness(instance).await {
                    Ok(InstanceReadiness::Ready) => return,
                    Ok(state) => debug!(%instance, state = state.as_str(), "waiting for readiness"),
                    Err(err) => warn!(%instance, error = %err, "readiness probe failed"),
                }
                sleep(self.ready_poll).await;
            }
        };
        timeout(limit, poll)
            .await
            .map_err(|_| ClusterError::Timeout {
                instance: instance.to_string(),
                waited: limit,
            })
    }

    async fn delete_instance(&self, instance: &InstanceId) -> Result<(), ClusterError> {
        let output = self
            .kubectl(self.args([
                "delete".to_owned(),
                "pod".to_owned(),
                instance.to_string(),
                "--wait=false".to_owned(),
            ]))
            .await?;
        if !output.success() {
            return Err(classify_failure(&output, &instance.to_string()));
        }
        info!(%instance, "instance deleted for recreation");
        Ok(())
    }

    async fn tail_for_marker(
        &self,
        instance: &InstanceId,
        marker: &str,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> bool {
        for attempt in 1..=max_attempts {
            let args = self.args([
                "logs".to_owned(),
                instance.to_string(),
                format!("--tail={LOG_TAIL_LINES}"),
            ]);
            match self.kubectl(args).await {
                Ok(output) if output.success() && output.stdout.contains(marker) => {
                    info!(%instance, attempt, marker, "readiness marker observed");
                    return true;
                }
                Ok(_) => debug!(%instance, attempt, max_attempts, "marker not yet present"),
                Err(err) => debug!(%instance, attempt, error = %err, "log tail failed"),
            }
            if attempt < max_attempts {
                sleep(poll_interval).await;
            }
        }
        warn!(%instance, max_attempts, marker, "readiness marker never observed");
        false
    }

    async fn instance_readiness(
        &self,
        instance: &InstanceId,
    ) -> Result<InstanceReadiness, ClusterError> {
        let output = self
            .kubectl(self.args([
                "get".to_owned(),
                "pod".to_owned(),
                instance.to_string(),
                "-o".to_owned(),
                READINESS_JSONPATH.to_owned(),
            ]))
            .await?;
        if !output.success() {
            return match classify_failure(&output, &instance.to_string()) {
                ClusterError::NotFound(_) => Ok(InstanceReadiness::Gone),
                other => Err(other),
            };
        }
        Ok(parse_pod_readiness(&output.stdout))
    }
}

fn classify_failure(output: &ToolOutput, subject: &str) -> ClusterError {
    let stderr = output.stderr.trim();
    if stderr.contains("NotFound") || stderr.contains("not found") {
        ClusterError::NotFound(subject.to_owned())
    } else {
        ClusterError::Rejected {
            command: output.command.clone(),
            stderr: stderr.to_owned(),
        }
    }
}

fn parse_replica_count(stdout: &str) -> Result<u32, ClusterError> {
    let trimmed = stdout.trim().trim_matches('\'');
    trimmed
        .parse::<u32>()
        .map_err(|_| ClusterError::Parse(format!("replica count `{trimmed}`")))
}

fn parse_pod_readiness(stdout: &str) -> InstanceReadiness {
    let trimmed = stdout.trim().trim_matches('\'');
    let (deletion, ready) = trimmed.split_once('|').unwrap_or(("", trimmed));
    if !deletion.trim().is_empty() {
        InstanceReadiness::Terminating
    } else if ready.trim() == "True" {
        InstanceReadiness::Ready
    } else {
        InstanceReadiness::Pending
    }
}

fn parse_pod_listing(stdout: &str) -> Vec<(String, String)> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let phase = parts.next().unwrap_or("Unknown");
            Some((name.to_owned(), phase.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn output(code: i32, stdout: &str, stderr: &str) -> ToolOutput {
        ToolOutput {
            command: "kubectl get statefulset".to_owned(),
            code: Some(code),
            stdout: stdout.to_owned(),
            stderr: stderr.to_owned(),
        }
    }

    #[test]
    fn replica_count_parses_plain_and_quoted_output() {
        assert_eq!(parse_replica_count("2\n").unwrap(), 2);
        assert_eq!(parse_replica_count("'1'").unwrap(), 1);
        assert!(matches!(
            parse_replica_count(""),
            Err(ClusterError::Parse(_))
        ));
    }

    #[test]
    fn readiness_distinguishes_terminating_pods() {
        assert_eq!(parse_pod_readiness("|True"), InstanceReadiness::Ready);
        assert_eq!(parse_pod_readiness("|False"), InstanceReadiness::Pending);
        assert_eq!(parse_pod_readiness("|"), InstanceReadiness::Pending);
        assert_eq!(
            parse_pod_readiness("2024-05-01T10:00:00Z|True"),
            InstanceReadiness::Terminating
        );
    }

    #[test]
    fn not_found_is_classified_separately() {
        let missing = output(
            1,
            "",
            "Error from server (NotFound): statefulsets.apps \"mc\" not found",
        );
        assert!(matches!(
            classify_failure(&missing, "default/mc"),
            ClusterError::NotFound(_)
        ));
        let forbidden = output(1, "", "Error from server (Forbidden): nope");
        assert!(matches!(
            classify_failure(&forbidden, "default/mc"),
            ClusterError::Rejected { .. }
        ));
    }

    #[test]
    fn pod_listing_is_split_per_line() {
        let pods = parse_pod_listing("mc-0 Running\nmc-1 Pending\n\n");
        assert_eq!(
            pods,
            vec![
                ("mc-0".to_owned(), "Running".to_owned()),
                ("mc-1".to_owned(), "Pending".to_owned())
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scripted_kubectl_reports_and_records_calls() {
        let dir = tempdir().unwrap();
        let calls = dir.path().join("calls.log");
        let script = dir.path().join("kubectl.sh");
        fs::write(
            &script,
            format!(
                "echo \"$@\" >> {}\nif [ \"$1\" = get ]; then echo 1; fi\n",
                calls.display()
            ),
        )
        .unwrap();

        let controller = KubectlReplicaController::new(
            "sh",
            WorkloadRef::new("minecraft-server", "games"),
        )
        .with_global_args(vec![script.display().to_string()]);

        assert_eq!(controller.get_replica_count().await.unwrap(), 1);
        controller.set_replica_count(2).await.unwrap();

        let recorded = fs::read_to_string(&calls).unwrap();
        let lines: Vec<&str> = recorded.lines().collect();
        assert_eq!(
            lines[0],
            "get statefulset minecraft-server -o jsonpath={.spec.replicas} -n games"
        );
        assert_eq!(
            lines[1],
            "scale statefulset minecraft-server --replicas=2 -n games"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_pod_reads_as_gone() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("kubectl.sh");
        fs::write(
            &script,
            "echo 'Error from server (NotFound): pods \"mc-1\" not found' >&2\nexit 1\n",
        )
        .unwrap();
        let workload = WorkloadRef::new("mc", "default");
        let controller = KubectlReplicaController::new("sh", workload.clone())
            .with_global_args(vec![script.display().to_string()]);
        let readiness = controller
            .instance_readiness(&workload.instance(1))
            .await
            .unwrap();
        assert_eq!(readiness, InstanceReadiness::Gone);
    }
}
