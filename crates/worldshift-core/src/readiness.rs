//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Update orchestration state machine and lifecycle operations."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Advisory readiness confirmation run after an instance reports ready.
//!
//! Confirmation never fails a session: an unconfirmed instance is logged as degraded and
//! the run proceeds. Each implementation carries its own bounded attempt budget.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;
use worldshift_cluster::{InstanceId, ReplicaController};
use worldshift_common::config::{ReadinessConfig, ReadinessKind};

#[async_trait]
pub trait ReadinessConfirmation: Send + Sync {
    fn name(&self) -> &'static str;

    /// `true` once the instance is confirmed initialised.
    async fn confirm(&self, replicas: &dyn ReplicaController, instance: &InstanceId) -> bool;
}

/// Looks for a literal marker in the instance log.
#[derive(Debug, Clone)]
pub struct LogMarker {
    marker: String,
    poll_interval: Duration,
    max_attempts: u32,
}

impl LogMarker {
    pub fn new(marker: impl Into<String>, poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            marker: marker.into(),
            poll_interval,
            max_attempts: max_attempts.max(1),
        }
    }
}

#[async_trait]
impl ReadinessConfirmation for LogMarker {
    fn name(&self) -> &'static str {
        "log-marker"
    }

    async fn confirm(&self, replicas: &dyn ReplicaController, instance: &InstanceId) -> bool {
        replicas
            .tail_for_marker(instance, &self.marker, self.poll_interval, self.max_attempts)
            .await
    }
}

/// Polls an HTTP endpoint until it answers with a 2xx status.
#[derive(Debug, Clone)]
pub struct HealthEndpoint {
    client: reqwest::Client,
    template: String,
    poll_interval: Duration,
    max_attempts: u32,
}

impl HealthEndpoint {
    /// `template` may contain `{instance}`, replaced by the instance name.
    pub fn new(
        template: impl Into<String>,
        request_timeout: Duration,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Result<Self> {
        let template = template.into();
        Url::parse(&template.replace("{instance}", "instance-0"))
            .with_context(|| format!("invalid health endpoint `{template}`"))?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build health-check client")?;
        Ok(Self {
            client,
            template,
            poll_interval,
            max_attempts: max_attempts.max(1),
        })
    }

    pub fn url_for(&self, instance: &InstanceId) -> String {
        self.template.replace("{instance}", &instance.to_string())
    }
}

#[async_trait]
impl ReadinessConfirmation for HealthEndpoint {
    fn name(&self) -> &'static str {
        "health-endpoint"
    }

    async fn confirm(&self, _replicas: &dyn ReplicaController, instance: &InstanceId) -> bool {
        let url = self.url_for(instance);
        for attempt in 1..=self.max_attempts {
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(%instance, %url, attempt, "health endpoint confirmed readiness");
                    return true;
                }
                Ok(response) => {
                    debug!(%instance, %url, attempt, status = %response.status(), "health endpoint not ready")
                }
                Err(err) => debug!(%instance, %url, attempt, error = %err, "health probe failed"),
            }
            if attempt < self.max_attempts {
                sleep(self.poll_interval).await;
            }
        }
        warn!(%instance, %url, attempts = self.max_attempts, "health endpoint never confirmed readiness");
        false
    }
}

/// Accepts the control plane's readiness as final.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConfirmation;

#[async_trait]
impl ReadinessConfirmation for NoConfirmation {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn confirm(&self, _replicas: &dyn ReplicaController, _instance: &InstanceId) -> bool {
        true
    }
}

pub fn from_config(config: &ReadinessConfig) -> Result<Arc<dyn ReadinessConfirmation>> {
    let confirmation: Arc<dyn ReadinessConfirmation> = match config.kind {
        ReadinessKind::LogMarker => Arc::new(LogMarker::new(
            config.marker.clone(),
            config.poll_interval,
            config.max_attempts,
        )),
        ReadinessKind::HealthEndpoint => {
            let template = config
                .health_url
                .clone()
                .ok_or_else(|| anyhow!("readiness.health_url is required"))?;
            Arc::new(HealthEndpoint::new(
                template,
                config.request_timeout,
                config.poll_interval,
                config.max_attempts,
            )?)
        }
        ReadinessKind::None => Arc::new(NoConfirmation),
    };
    Ok(confirmation)
}
