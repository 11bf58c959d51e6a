//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Control-plane and deployment-tool adapters."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::command::run_tool;
use crate::error::PublishError;
use crate::plan::ReleaseValues;

/// Pushes a new desired configuration for the workload to the deployment tool.
#[async_trait]
pub trait ConfigPublisher: Send + Sync {
    async fn publish(&self, values: &ReleaseValues) -> Result<(), PublishError>;
}

/// [`ConfigPublisher`] that runs `helm upgrade --reuse-values` for a release.
#[derive(Debug, Clone)]
pub struct HelmPublisher {
    program: String,
    release: String,
    chart: PathBuf,
    namespace: String,
    timeout: Duration,
}

impl HelmPublisher {
    pub fn new(
        program: impl Into<String>,
        release: impl Into<String>,
        chart: impl Into<PathBuf>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            release: release.into(),
            chart: chart.into(),
            namespace: namespace.into(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = limit;
        self
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    /// Argument vector for an upgrade carrying `values`.
    pub fn upgrade_args(&self, values: &ReleaseValues) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_owned(),
            self.release.clone(),
            self.chart.display().to_string(),
            "-n".to_owned(),
            self.namespace.clone(),
            "--reuse-values".to_owned(),
        ];
        for (key, value) in values.pairs() {
            args.push("--set".to_owned());
            args.push(format!("{key}={}", escape_set_value(&value)));
        }
        args
    }
}

#[async_trait]
impl ConfigPublisher for HelmPublisher {
    async fn publish(&self, values: &ReleaseValues) -> Result<(), PublishError> {
        let args = self.upgrade_args(values);
        let output = run_tool(&self.program, &args, self.timeout).await?;
        if !output.success() {
            return Err(PublishError::Rejected {
                release: self.release.clone(),
                stderr: output.stderr.trim().to_owned(),
            });
        }
        info!(
            release = %self.release,
            replicas = values.replica_count,
            overrides = values.overrides.len(),
            "release configuration published"
        );
        Ok(())
    }
}

/// Escape characters `helm --set` treats as separators.
pub fn escape_set_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, ',' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Locate a chart directory, falling back to the configured reference unchanged.
///
/// Relative references are tried against `base`, `base/helm` and `base/charts` so the
/// tool works from a repository root or its chart directory.
pub fn resolve_chart_path(configured: &Path, base: &Path) -> PathBuf {
    if configured.is_absolute() {
        return configured.to_path_buf();
    }
    let candidates = [
        base.join(configured),
        base.join("helm").join(configured),
        base.join("charts").join(configured),
    ];
    for candidate in candidates {
        if candidate.join("Chart.yaml").is_file() {
            return candidate;
        }
    }
    warn!(
        chart = %configured.display(),
        "no local chart directory found; passing reference to helm unchanged"
    );
    configured.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::UpdatePlan;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn upgrade_reuses_values_and_sets_replica_count_first() {
        let publisher = HelmPublisher::new("helm", "minecraft-server", "minecraft", "games");
        let values = UpdatePlan::new(1)
            .with_override("motd", "hello, world")
            .release_values(1);
        let args = publisher.upgrade_args(&values);
        assert_eq!(
            args,
            vec![
                "upgrade",
                "minecraft-server",
                "minecraft",
                "-n",
                "games",
                "--reuse-values",
                "--set",
                "replicaCount=1",
                "--set",
                "motd=hello\\, world",
            ]
        );
    }

    #[test]
    fn chart_is_found_under_helm_directory() {
        let dir = tempdir().unwrap();
        let chart = dir.path().join("helm").join("minecraft");
        fs::create_dir_all(&chart).unwrap();
        fs::write(chart.join("Chart.yaml"), "name: minecraft\n").unwrap();

        let resolved = resolve_chart_path(Path::new("minecraft"), dir.path());
        assert_eq!(resolved, chart);

        let missing = resolve_chart_path(Path::new("repo/minecraft"), dir.path());
        assert_eq!(missing, PathBuf::from("repo/minecraft"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_upgrade_is_rejected() {
        let publisher = HelmPublisher::new("false", "mc", "minecraft", "default");
        let err = publisher
            .publish(&UpdatePlan::new(1).release_values(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Rejected { ref release, .. } if release == "mc"));
    }
}
