//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Update orchestration state machine and lifecycle operations."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;
use worldshift_cluster::WorkloadRef;
use worldshift_common::lock::{LockError, LockFile};

use crate::error::SessionInProgress;

static PROCESS_SESSIONS: Lazy<Arc<Mutex<HashSet<String>>>> =
    Lazy::new(|| Arc::new(Mutex::new(HashSet::new())));

/// Admits at most one session per workload.
///
/// Sessions are tracked in-process; with a lock directory configured, a lock file per
/// workload extends the exclusion to other processes sharing that directory.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
    lock_dir: Option<PathBuf>,
}

impl SessionRegistry {
    /// Registry isolated from every other registry instance.
    pub fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashSet::new())),
            lock_dir: None,
        }
    }

    /// Registry shared by the whole process.
    pub fn global() -> Self {
        Self {
            active: PROCESS_SESSIONS.clone(),
            lock_dir: None,
        }
    }

    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    pub fn is_active(&self, workload: &WorkloadRef) -> bool {
        self.active.lock().contains(&workload.key())
    }

    pub fn begin(&self, workload: &WorkloadRef) -> Result<SessionGuard, SessionInProgress> {
        let key = workload.key();
        if !self.active.lock().insert(key.clone()) {
            return Err(SessionInProgress {
                workload: workload.to_string(),
            });
        }

        let lock = match &self.lock_dir {
            Some(dir) => match LockFile::acquire(dir.join(format!("{key}.session.lock"))) {
                Ok(lock) => Some(lock),
                Err(err) => {
                    self.active.lock().remove(&key);
                    if let LockError::Io { .. } = err {
                        debug!(error = %err, "session lock unavailable");
                    }
                    return Err(SessionInProgress {
                        workload: workload.to_string(),
                    });
                }
            },
            None => None,
        };

        Ok(SessionGuard {
            active: self.active.clone(),
            key,
            _lock: lock,
        })
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::global()
    }
}

/// Held for the lifetime of a session; dropping it releases the workload.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<Mutex<HashSet<String>>>,
    key: String,
    _lock: Option<LockFile>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}
