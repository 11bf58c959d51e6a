//! ---
//! ws_section: "01-shared-runtime"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Shared primitives and utilities for the update tooling."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Core shared primitives for the worldshift workspace.
//! This crate exposes configuration loading, tracing setup, and the
//! exclusive lock files used by sessions and the in-instance sync agent.

pub mod config;
pub mod lock;
pub mod logging;

pub use config::{
    AppConfig, ConsoleConfig, LifecycleConfig, LoggingConfig, MetricsConfig, PolicyConfig,
    PostRollbackPolicyKind, ProxyConfig, ReadinessConfig, ReadinessKind, StrategyKind,
    SyncConfig, TimeoutConfig, WorkloadConfig,
};
pub use lock::{LockError, LockFile};
pub use logging::{init_tracing, LogFormat};
