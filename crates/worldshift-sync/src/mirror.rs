//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "World snapshot synchronisation between instances and the backup."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Stage-then-swap directory mirroring.
//!
//! A sync copies the source tree into a hidden staging directory next to the
//! destination and swaps it with the destination only once the copy is complete. On
//! Linux the swap is a single `renameat2(RENAME_EXCHANGE)`, so a reader sees either the
//! previous world or the new one and never a missing directory. Elsewhere, or on
//! filesystems without exchange support, the previous destination is parked first and
//! put back if the second rename fails.
//!
//! Both lock files live inside the blocking copy task and are released only when the
//! swap has finished, even if the awaiting future is cancelled.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use worldshift_cluster::InstanceId;
use worldshift_common::lock::{LockError, LockFile};

use crate::agent::{SyncDirection, SyncError, WorldSyncAgent};

/// Totals for one completed sync.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
}

/// In-instance agent mirroring a live world directory to and from a backup directory.
#[derive(Debug, Clone)]
pub struct WorldMirror {
    live: PathBuf,
    backup: PathBuf,
    label: String,
}

impl WorldMirror {
    pub fn new(live: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        let live = live.into();
        let label = live.display().to_string();
        Self {
            live,
            backup: backup.into(),
            label,
        }
    }

    /// Name used in errors and logs, normally the instance name.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn live(&self) -> &Path {
        &self.live
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    pub async fn sync(&self, direction: SyncDirection) -> Result<SyncSummary, SyncError> {
        let (source, destination) = match direction {
            SyncDirection::ToBackup => (self.live.clone(), self.backup.clone()),
            SyncDirection::FromBackup => (self.backup.clone(), self.live.clone()),
        };

        // Taken before the first await so overlapping calls fail fast.
        let locks = (self.lock(&self.live)?, self.lock(&self.backup)?);

        debug!(
            instance = %self.label,
            direction = %direction,
            source = %source.display(),
            destination = %destination.display(),
            "world sync started"
        );
        let summary = tokio::task::spawn_blocking(move || {
            let _locks = locks;
            replace_dir(&source, &destination)
        })
        .await
        .map_err(|err| SyncError::failure(&self.label, format!("copy task aborted: {err}")))?
        .map_err(|err| SyncError::failure(&self.label, err.to_string()))?;

        info!(
            instance = %self.label,
            direction = %direction,
            files = summary.files,
            bytes = summary.bytes,
            "world sync complete"
        );
        Ok(summary)
    }

    fn lock(&self, dir: &Path) -> Result<LockFile, SyncError> {
        LockFile::acquire(lock_path(dir)).map_err(|err| match err {
            LockError::Held { .. } => SyncError::Concurrent {
                instance: self.label.clone(),
            },
            LockError::Io { .. } => SyncError::failure(&self.label, err.to_string()),
        })
    }
}

/// [`WorldSyncAgent`] over local directories: `<root>/<instance>` per instance and one
/// shared backup directory.
#[derive(Debug, Clone)]
pub struct LocalWorldStore {
    root: PathBuf,
    backup: PathBuf,
}

impl LocalWorldStore {
    pub fn new(root: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backup: backup.into(),
        }
    }

    pub fn instance_dir(&self, instance: &InstanceId) -> PathBuf {
        self.root.join(instance.to_string())
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup
    }

    fn mirror(&self, instance: &InstanceId) -> WorldMirror {
        WorldMirror::new(self.instance_dir(instance), self.backup.clone())
            .with_label(instance.to_string())
    }
}

#[async_trait]
impl WorldSyncAgent for LocalWorldStore {
    async fn sync_to_backup(&self, source: &InstanceId) -> Result<(), SyncError> {
        self.mirror(source).sync(SyncDirection::ToBackup).await.map(|_| ())
    }

    async fn sync_from_backup(&self, target: &InstanceId) -> Result<(), SyncError> {
        self.mirror(target)
            .sync(SyncDirection::FromBackup)
            .await
            .map(|_| ())
    }
}

fn lock_path(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "world".to_owned());
    parent_of(dir).join(format!(".{name}.sync.lock"))
}

fn parent_of(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn replace_dir(source: &Path, destination: &Path) -> io::Result<SyncSummary> {
    if !source.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", source.display()),
        ));
    }
    let parent = parent_of(destination);
    fs::create_dir_all(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".worldshift-staging-")
        .tempdir_in(parent)?;
    let summary = copy_tree(source, staging.path())?;
    fs::set_permissions(staging.path(), fs::metadata(source)?.permissions())?;

    if !destination.exists() {
        let staged = staging.into_path();
        if let Err(err) = fs::rename(&staged, destination) {
            if let Err(cleanup) = fs::remove_dir_all(&staged) {
                warn!(staging = %staged.display(), error = %cleanup, "failed to remove staging directory");
            }
            return Err(err);
        }
        return Ok(summary);
    }

    match exchange_dirs(staging.path(), destination) {
        // The staging directory now holds the previous world and is dropped with it.
        Ok(()) => {}
        Err(err) if exchange_unsupported(&err) => {
            debug!(error = %err, "atomic exchange unavailable, parking previous world");
            park_and_replace(staging.path(), destination, parent)?;
        }
        Err(err) => return Err(err),
    }
    Ok(summary)
}

/// Two-rename swap. The previous destination is restored when the second rename fails,
/// and kept on disk if even that restore fails.
fn park_and_replace(staged: &Path, destination: &Path, parent: &Path) -> io::Result<()> {
    let retired = tempfile::Builder::new()
        .prefix(".worldshift-retired-")
        .tempdir_in(parent)?;
    let previous = retired.path().join("previous");
    fs::rename(destination, &previous)?;

    if let Err(err) = fs::rename(staged, destination) {
        if let Err(restore) = fs::rename(&previous, destination) {
            let kept = retired.into_path().join("previous");
            return Err(io::Error::new(
                restore.kind(),
                format!(
                    "swap into {} failed ({err}) and the previous world could not be restored \
                     ({restore}); it is kept at {}",
                    destination.display(),
                    kept.display()
                ),
            ));
        }
        return Err(err);
    }
    Ok(())
}

/// `RENAME_EXCHANGE` from `<linux/fs.h>`.
#[cfg(target_os = "linux")]
const RENAME_EXCHANGE: libc::c_uint = 1 << 1;

#[cfg(target_os = "linux")]
fn exchange_dirs(first: &Path, second: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let first = CString::new(first.as_os_str().as_bytes())?;
    let second = CString::new(second.as_os_str().as_bytes())?;
    // SAFETY: both pointers come from live NUL-terminated CStrings.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_renameat2,
            libc::AT_FDCWD,
            first.as_ptr(),
            libc::AT_FDCWD,
            second.as_ptr(),
            RENAME_EXCHANGE,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
fn exchange_dirs(_first: &Path, _second: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "atomic directory exchange is not available on this platform",
    ))
}

fn exchange_unsupported(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::Unsupported {
        return true;
    }
    #[cfg(target_os = "linux")]
    {
        matches!(err.raw_os_error(), Some(libc::EINVAL) | Some(libc::ENOSYS))
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

fn copy_tree(source: &Path, destination: &Path) -> io::Result<SyncSummary> {
    let mut summary = SyncSummary::default();
    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let target = destination.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            summary.directories += 1;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            summary.files += 1;
        } else {
            summary.bytes += fs::copy(entry.path(), &target)?;
            summary.files += 1;
        }
    }
    Ok(summary)
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(source)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    fs::copy(source, target).map(|_| ())
}
