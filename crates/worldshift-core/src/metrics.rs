//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Update orchestration state machine and lifecycle operations."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{self, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::session::{MigrationState, Step};

/// Shared registry type used by the update tooling.
pub type SharedRegistry = Arc<Registry>;

/// Metrics recorded by update sessions.
#[derive(Clone)]
pub struct UpdateMetrics {
    registry: SharedRegistry,
    sessions_total: IntCounterVec,
    step_duration_seconds: HistogramVec,
    degraded_steps_total: IntCounterVec,
}

impl UpdateMetrics {
    /// Register the update metric family against `registry`.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let sessions_total = IntCounterVec::new(
            Opts::new(
                "worldshift_sessions_total",
                "Update sessions by strategy and terminal state",
            ),
            &["strategy", "terminal"],
        )?;
        registry.register(Box::new(sessions_total.clone()))?;

        let histogram_opts = HistogramOpts::new(
            "worldshift_step_duration_seconds",
            "Wall time spent in each orchestrator step",
        )
        .buckets(prometheus::exponential_buckets(0.05, 2.0, 16)?);
        let step_duration_seconds = HistogramVec::new(histogram_opts, &["step"])?;
        registry.register(Box::new(step_duration_seconds.clone()))?;

        let degraded_steps_total = IntCounterVec::new(
            Opts::new(
                "worldshift_degraded_steps_total",
                "Steps that failed without failing the session",
            ),
            &["step"],
        )?;
        registry.register(Box::new(degraded_steps_total.clone()))?;

        Ok(Self {
            registry,
            sessions_total,
            step_duration_seconds,
            degraded_steps_total,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn observe_step(&self, step: &Step, duration: Duration) {
        self.step_duration_seconds
            .with_label_values(&[step.kind()])
            .observe(duration.as_secs_f64());
    }

    pub fn record_degraded(&self, step: &Step) {
        self.degraded_steps_total
            .with_label_values(&[step.kind()])
            .inc();
    }

    pub fn record_session(&self, strategy: &str, terminal: &MigrationState) {
        self.sessions_total
            .with_label_values(&[strategy, terminal.as_str()])
            .inc();
    }

    pub fn render(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .context("failed to encode metrics")
    }

    /// Write the registry for a node-exporter textfile collector.
    ///
    /// The file is written beside the target and renamed into place.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let body = self.render()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create metrics directory {}", dir.display()))?;
        let mut staged = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to stage metrics file in {}", dir.display()))?;
        staged.write_all(body.as_bytes())?;
        staged
            .persist(path)
            .with_context(|| format!("failed to write metrics file {}", path.display()))?;
        Ok(())
    }
}

impl std::fmt::Debug for UpdateMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textfile_contains_recorded_sessions() {
        let metrics = UpdateMetrics::new(Arc::new(Registry::new())).unwrap();
        metrics.record_session("world-sync", &MigrationState::Succeeded);
        metrics.observe_step(&Step::SyncToBackup(0), Duration::from_millis(250));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worldshift.prom");
        metrics.write_textfile(&path).unwrap();
        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains(
            "worldshift_sessions_total{strategy=\"world-sync\",terminal=\"Succeeded\"} 1"
        ));
        assert!(body.contains("worldshift_step_duration_seconds_count{step=\"sync_to_backup\"} 1"));
    }
}
