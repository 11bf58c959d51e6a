//! ---
//! ws_section: "01-shared-runtime"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Shared primitives and utilities for the update tooling."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! Tracing setup for the CLI and the in-instance sync agent.
//!
//! Console output always goes to stderr so that stdout carries only the YAML/JSON
//! result of a command. The optional session file is JSON, one file per tool and day.

use std::io::IsTerminal;

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "WORLDSHIFT_LOG";

static GUARDS: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

/// Console formats for the operator-facing status trace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

/// Pick the filter directive: `WORLDSHIFT_LOG`, then `RUST_LOG`, then the configured level.
fn filter_directive(own: Option<String>, rust_log: Option<String>, configured: &str) -> String {
    let set = |directive: &String| !directive.trim().is_empty();
    own.filter(set)
        .or_else(|| rust_log.filter(set))
        .unwrap_or_else(|| configured.to_owned())
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let directive = filter_directive(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        &config.level,
    );
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("invalid log filter `{directive}` ({err}); using `{}`", config.level);
        EnvFilter::new(&config.level)
    })
}

fn console_layer<S>(format: LogFormat, writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer()
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer);
    match format {
        LogFormat::StructuredJson => layer.json().boxed(),
        LogFormat::Pretty => layer
            .compact()
            .with_ansi(std::io::stderr().is_terminal())
            .boxed(),
    }
}

/// Install the global subscriber for `service_name`.
///
/// Calling it twice keeps the first subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let mut guards = Vec::with_capacity(2);
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stderr());
    guards.push(console_guard);

    let file_layer = if config.file {
        std::fs::create_dir_all(&config.directory)?;
        let prefix = config.file_prefix.as_deref().unwrap_or("worldshift");
        let appender = daily(&config.directory, format!("{prefix}.{service_name}.log"));
        let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
        guards.push(file_guard);
        Some(
            fmt::layer()
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(file_writer),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(build_filter(config))
        .with(console_layer(config.format, console_writer))
        .with(file_layer)
        .try_init()
        .is_ok();
    if installed {
        let _ = GUARDS.set(guards);
        info!(
            service = %service_name,
            file = config.file,
            log_dir = %config.directory.display(),
            format = ?config.format,
            "tracing initialised"
        );
    }
    Ok(())
}
