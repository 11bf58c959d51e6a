//! ---
//! ws_section: "01-shared-runtime"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Shared primitives and utilities for the update tooling."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_workload_name() -> String {
    "minecraft-server".to_owned()
}

fn default_namespace() -> String {
    "default".to_owned()
}

fn default_chart_path() -> PathBuf {
    PathBuf::from("minecraft")
}

fn default_kubectl() -> String {
    "kubectl".to_owned()
}

fn default_helm() -> String {
    "helm".to_owned()
}

fn default_replica_count() -> u32 {
    1
}

fn default_first_scale_up() -> Duration {
    Duration::from_secs(300)
}

fn default_restart() -> Duration {
    Duration::from_secs(180)
}

fn default_session() -> Duration {
    Duration::from_secs(1800)
}

fn default_settle() -> Duration {
    Duration::from_secs(10)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_marker() -> String {
    "Done (".to_owned()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_max_attempts() -> u32 {
    24
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_proxy_address() -> String {
    "localhost:25575".to_owned()
}

fn default_console_address() -> String {
    "localhost:30575".to_owned()
}

fn default_rcon_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_notify_message() -> String {
    "Server update in progress, you are being moved to a standby server.".to_owned()
}

fn default_sync_command() -> Vec<String> {
    vec!["worldshiftctl".to_owned(), "sync".to_owned()]
}

fn default_sync_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_restore_attempts() -> usize {
    3
}

fn default_restore_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_countdown() -> Vec<u64> {
    vec![30, 20, 10, 5]
}

fn default_restart_pause() -> Duration {
    Duration::from_secs(10)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_true() -> bool {
    true
}

/// Primary configuration object for the update tooling.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub console: Option<ConsoleConfig>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "WORLDSHIFT_CONFIG";

    /// Load configuration from disk, respecting the `WORLDSHIFT_CONFIG` override.
    ///
    /// Unlike the daemon-style loaders this falls back to built-in defaults when no
    /// candidate exists, since every field has an operator-friendly default.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using defaults"
        );
        let config = AppConfig::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Release name used for the deployment tool, defaulting to the workload name.
    pub fn release(&self) -> &str {
        self.workload
            .release
            .as_deref()
            .unwrap_or(self.workload.name.as_str())
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.workload.validate()?;
        self.timeouts.validate()?;
        self.readiness.validate()?;
        if self.strategy.uses_proxy() {
            let Some(proxy) = &self.proxy else {
                return Err(anyhow!(
                    "strategy '{}' requires a [proxy] section",
                    self.strategy.as_str()
                ));
            };
            proxy.validate()?;
        }
        if self.strategy.uses_world_sync() && self.sync.command.is_empty() {
            return Err(anyhow!(
                "strategy '{}' requires a non-empty sync.command",
                self.strategy.as_str()
            ));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Identity and deployment coordinates of the managed workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default = "default_workload_name")]
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default = "default_chart_path")]
    pub chart_path: PathBuf,
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    #[serde(default = "default_helm")]
    pub helm: String,
    /// Steady-state replica count published by an update.
    #[serde(default = "default_replica_count")]
    pub replica_count: u32,
    #[serde(default)]
    pub overrides: IndexMap<String, String>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            name: default_workload_name(),
            namespace: default_namespace(),
            release: None,
            chart_path: default_chart_path(),
            kubectl: default_kubectl(),
            helm: default_helm(),
            replica_count: default_replica_count(),
            overrides: IndexMap::new(),
        }
    }
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("workload.name must not be empty"));
        }
        if self.namespace.trim().is_empty() {
            return Err(anyhow!("workload.namespace must not be empty"));
        }
        if self.overrides.contains_key("replicaCount") {
            return Err(anyhow!(
                "workload.overrides must not set replicaCount; use workload.replica_count"
            ));
        }
        Ok(())
    }
}

/// Migration strategy selected by configuration.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Publish configuration only.
    Plain,
    /// Transient second instance, no world sync and no proxy.
    #[default]
    Rolling,
    /// Proxy redirect around an in-place restart of the primary.
    Proxy,
    /// World data handed over through the backup store.
    WorldSync,
    /// Proxy redirect and world sync together.
    Combined,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Plain => "plain",
            StrategyKind::Rolling => "rolling",
            StrategyKind::Proxy => "proxy",
            StrategyKind::WorldSync => "world-sync",
            StrategyKind::Combined => "combined",
        }
    }

    pub fn uses_proxy(&self) -> bool {
        matches!(self, StrategyKind::Proxy | StrategyKind::Combined)
    }

    pub fn uses_world_sync(&self) -> bool {
        matches!(self, StrategyKind::WorldSync | StrategyKind::Combined)
    }

    /// Whether the strategy brings up a transient second instance.
    pub fn scales_out(&self) -> bool {
        !matches!(self, StrategyKind::Plain)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(StrategyKind::Plain),
            "rolling" => Ok(StrategyKind::Rolling),
            "proxy" => Ok(StrategyKind::Proxy),
            "world-sync" | "worldsync" => Ok(StrategyKind::WorldSync),
            "combined" => Ok(StrategyKind::Combined),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Readiness deadline for the first scale-up of the standby.
    #[serde(default = "default_first_scale_up")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub first_scale_up: Duration,
    /// Readiness deadline for a delete-and-recreate of the primary.
    #[serde(default = "default_restart")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub restart: Duration,
    /// Upper bound for an entire session.
    #[serde(default = "default_session")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub session: Duration,
    /// Settle delay after scaling down excess instances.
    #[serde(default = "default_settle")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub settle: Duration,
    /// Deadline for individual non-waiting control-plane commands.
    #[serde(default = "default_command_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub command: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            first_scale_up: default_first_scale_up(),
            restart: default_restart(),
            session: default_session(),
            settle: default_settle(),
            command: default_command_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn validate(&self) -> Result<()> {
        if self.first_scale_up.is_zero() || self.restart.is_zero() {
            return Err(anyhow!("readiness timeouts must be greater than zero"));
        }
        if self.session < self.first_scale_up + self.restart {
            return Err(anyhow!(
                "timeouts.session ({}s) must cover first_scale_up + restart ({}s)",
                self.session.as_secs(),
                (self.first_scale_up + self.restart).as_secs()
            ));
        }
        Ok(())
    }
}

/// Readiness-confirmation mechanism applied after an instance reports ready.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessKind {
    #[default]
    LogMarker,
    HealthEndpoint,
    None,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default)]
    pub kind: ReadinessKind,
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Health URL template; `{instance}` is replaced with the instance name.
    #[serde(default)]
    pub health_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            kind: ReadinessKind::default(),
            marker: default_marker(),
            poll_interval: default_poll_interval(),
            max_attempts: default_max_attempts(),
            health_url: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl ReadinessConfig {
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            ReadinessKind::LogMarker if self.marker.is_empty() => {
                Err(anyhow!("readiness.marker must not be empty"))
            }
            ReadinessKind::HealthEndpoint if self.health_url.is_none() => Err(anyhow!(
                "readiness.kind = health-endpoint requires readiness.health_url"
            )),
            _ => Ok(()),
        }
    }
}

/// Reverse-proxy admin console settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_address")]
    pub address: String,
    #[serde(default)]
    pub password: String,
    /// Proxy backend alias per replica ordinal (index 0 = instance-0).
    #[serde(default)]
    pub backends: Vec<String>,
    #[serde(default = "default_notify_message")]
    pub notify_message: String,
    #[serde(default = "default_rcon_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backends.len() < 2 {
            return Err(anyhow!(
                "proxy.backends must name an alias for both instance ordinals"
            ));
        }
        Ok(())
    }
}

/// RCON console of the game server itself.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_console_address")]
    pub address: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_rcon_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Command prefix executed inside the instance; the direction is appended.
    #[serde(default = "default_sync_command")]
    pub command: Vec<String>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default = "default_sync_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            command: default_sync_command(),
            container: None,
            timeout: default_sync_timeout(),
        }
    }
}

/// Behaviour once a session has crossed its rollback point.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PostRollbackPolicyKind {
    #[default]
    HaltForOperator,
    RetryRestore,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub post_rollback: PostRollbackPolicyKind,
    #[serde(default = "default_restore_attempts")]
    pub restore_attempts: usize,
    #[serde(default = "default_restore_backoff")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub restore_backoff: Duration,
    /// Directory for per-workload session lock files shared between processes.
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            post_rollback: PostRollbackPolicyKind::default(),
            restore_attempts: default_restore_attempts(),
            restore_backoff: default_restore_backoff(),
            lock_dir: None,
        }
    }
}

/// Start/stop behaviour of the lifecycle commands.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Seconds-before-shutdown at which players are warned, descending.
    #[serde(default = "default_countdown")]
    pub countdown: Vec<u64>,
    #[serde(default)]
    pub backup_on_stop: bool,
    /// Pause between the stop and the start of a restart.
    #[serde(default = "default_restart_pause")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub restart_pause: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            countdown: default_countdown(),
            backup_on_stop: false,
            restart_pause: default_restart_pause(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Filter used when neither `WORLDSHIFT_LOG` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write a daily JSON file under `directory`.
    #[serde(default = "default_true")]
    pub file: bool,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            level: default_log_level(),
            file: true,
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsConfig {
    /// Prometheus textfile-collector output written after each command.
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.strategy, StrategyKind::Rolling);
        assert_eq!(config.timeouts.first_scale_up, Duration::from_secs(300));
        assert_eq!(config.timeouts.restart, Duration::from_secs(180));
        assert_eq!(config.release(), "minecraft-server");
    }

    #[test]
    fn proxy_strategy_requires_backends() {
        let err = r#"
            strategy = "combined"
            [proxy]
            address = "velocity:25575"
            backends = ["mc-0"]
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("proxy.backends"));

        let config = r#"
            strategy = "combined"
            [workload]
            name = "survival"
            release = "survival-release"
            [timeouts]
            first_scale_up = 120
            restart = 60
            session = 600
            [proxy]
            address = "velocity:25575"
            password = "secret"
            backends = ["survival-0", "survival-1"]
        "#
        .parse::<AppConfig>()
        .unwrap();
        assert_eq!(config.release(), "survival-release");
        assert_eq!(config.timeouts.first_scale_up, Duration::from_secs(120));
        assert!(config.strategy.uses_proxy() && config.strategy.uses_world_sync());
    }

    #[test]
    fn session_must_cover_readiness_budgets() {
        let err = r#"
            [timeouts]
            first_scale_up = 300
            restart = 180
            session = 60
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("timeouts.session"));
    }

    #[test]
    fn replica_count_override_is_rejected() {
        let err = r#"
            [workload.overrides]
            replicaCount = "3"
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("replicaCount"));
    }

    #[test]
    fn strategy_parses_from_cli_strings() {
        assert_eq!("world-sync".parse::<StrategyKind>(), Ok(StrategyKind::WorldSync));
        assert_eq!("Combined".parse::<StrategyKind>(), Ok(StrategyKind::Combined));
        assert!("blue-green".parse::<StrategyKind>().is_err());
    }
}
