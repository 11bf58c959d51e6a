//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "World snapshot synchronisation between instances and the backup."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! World snapshot transfer between a replica instance and the shared backup location.
//!
//! The orchestrator only sequences calls through [`WorldSyncAgent`]; the copy itself is
//! performed in-instance by [`WorldMirror`], reached remotely through [`ExecSyncAgent`].

mod agent;
mod exec;
mod mirror;

pub use agent::{SyncDirection, SyncError, WorldSyncAgent};
pub use exec::ExecSyncAgent;
pub use mirror::{LocalWorldStore, SyncSummary, WorldMirror};
