//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Control-plane and deployment-tool adapters."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};
use worldshift_common::config::WorkloadConfig;

/// Identity of the replicated workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub name: String,
    pub namespace: String,
}

impl WorkloadRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn from_config(config: &WorkloadConfig) -> Self {
        Self::new(config.name.clone(), config.namespace.clone())
    }

    /// Instance handle for a stable ordinal.
    pub fn instance(&self, ordinal: u32) -> InstanceId {
        InstanceId {
            workload: self.name.clone(),
            ordinal,
        }
    }

    /// Key used to detect concurrent sessions against the same workload.
    pub fn key(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One addressable replica; renders as the pod name `<workload>-<ordinal>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId {
    pub workload: String,
    pub ordinal: u32,
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.workload, self.ordinal)
    }
}

/// Observed readiness of a replica instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceReadiness {
    Pending,
    Ready,
    Terminating,
    Gone,
}

impl InstanceReadiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceReadiness::Pending => "pending",
            InstanceReadiness::Ready => "ready",
            InstanceReadiness::Terminating => "terminating",
            InstanceReadiness::Gone => "gone",
        }
    }
}
