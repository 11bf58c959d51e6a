//! ---
//! ws_section: "01-shared-runtime"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Shared primitives and utilities for the update tooling."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Exclusive lock files.
//!
//! A lock is a file created with `create_new`; holding the [`LockFile`] value holds the
//! lock and dropping it removes the file. A crashed holder leaves the file behind and
//! it has to be removed by hand; the owning pid is written into it to make that easy.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {path} is held by another process ({holder})")]
    Held { path: PathBuf, holder: String },
    #[error("unable to create lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive lock backed by a file on disk.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Try to take the lock without blocking.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(err) = writeln!(file, "pid={}", std::process::id()) {
                    warn!(lock = %path.display(), error = %err, "failed to record lock owner");
                }
                debug!(lock = %path.display(), "lock acquired");
                Ok(Self { path })
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .map(|content| content.trim().to_owned())
                    .unwrap_or_else(|_| "unknown".to_owned());
                Err(LockError::Held { path, holder })
            }
            Err(source) => Err(LockError::Io { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %err, "failed to release lock");
        }
    }
}
