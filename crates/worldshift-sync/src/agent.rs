//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "World snapshot synchronisation between instances and the backup."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use worldshift_cluster::InstanceId;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("world sync for {instance} failed: {reason}")]
    Failure { instance: String, reason: String },
    #[error("a world sync for {instance} is already running")]
    Concurrent { instance: String },
}

impl SyncError {
    pub fn failure(instance: impl fmt::Display, reason: impl Into<String>) -> Self {
        SyncError::Failure {
            instance: instance.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    ToBackup,
    FromBackup,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::ToBackup => "to-backup",
            SyncDirection::FromBackup => "from-backup",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to-backup" => Ok(SyncDirection::ToBackup),
            "from-backup" => Ok(SyncDirection::FromBackup),
            other => Err(format!("unknown sync direction `{other}`")),
        }
    }
}

/// Moves the authoritative world snapshot between instances and the backup location.
///
/// Both directions are idempotent: repeating a call with no intervening world writes
/// leaves the destination byte-identical.
#[async_trait]
pub trait WorldSyncAgent: Send + Sync {
    async fn sync_to_backup(&self, source: &InstanceId) -> Result<(), SyncError>;

    async fn sync_from_backup(&self, target: &InstanceId) -> Result<(), SyncError>;
}
