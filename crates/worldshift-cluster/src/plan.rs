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

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use worldshift_common::config::{AppConfig, TimeoutConfig};

/// Deadlines carried by a plan; the state machine never hardcodes these.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTimeouts {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub first_scale_up: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub restart: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub session: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub settle: Duration,
}

impl From<&TimeoutConfig> for PlanTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            first_scale_up: config.first_scale_up,
            restart: config.restart,
            session: config.session,
            settle: config.settle,
        }
    }
}

impl Default for PlanTimeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

/// Target configuration supplied by the caller of an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePlan {
    /// Steady-state replica count once the update completes.
    pub replica_count: u32,
    /// Additional values overridden on publish.
    pub overrides: IndexMap<String, String>,
    pub timeouts: PlanTimeouts,
}

impl UpdatePlan {
    pub fn new(replica_count: u32) -> Self {
        Self {
            replica_count,
            overrides: IndexMap::new(),
            timeouts: PlanTimeouts::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            replica_count: config.workload.replica_count,
            overrides: config.workload.overrides.clone(),
            timeouts: PlanTimeouts::from(&config.timeouts),
        }
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: PlanTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Values to publish with an explicit replica count override.
    pub fn release_values(&self, replica_count: u32) -> ReleaseValues {
        ReleaseValues {
            replica_count,
            overrides: self.overrides.clone(),
        }
    }
}

/// Override map handed to the deployment tool; always carries `replicaCount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseValues {
    pub replica_count: u32,
    pub overrides: IndexMap<String, String>,
}

impl ReleaseValues {
    /// Flattened `key=value` pairs with `replicaCount` first.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.overrides.len() + 1);
        pairs.push(("replicaCount".to_owned(), self.replica_count.to_string()));
        for (key, value) in &self.overrides {
            if key == "replicaCount" {
                continue;
            }
            pairs.push((key.clone(), value.clone()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_count_is_always_the_explicit_override() {
        let plan = UpdatePlan::new(1)
            .with_override("image.tag", "1.21.4")
            .with_override("replicaCount", "7");
        let pairs = plan.release_values(2).pairs();
        assert_eq!(pairs[0], ("replicaCount".to_owned(), "2".to_owned()));
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], ("image.tag".to_owned(), "1.21.4".to_owned()));
    }
}
