//! ---
//! ws_section: "02-observability"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Structured status-trace logging helpers."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Status-trace logging shared by the orchestrator and the CLI.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

/// Context-enriched logging macros.
pub mod macros;

/// Initialize a baseline tracing subscriber suitable for tests and development.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_test_writer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogContext<'a> {
    /// Workload (StatefulSet) name.
    pub workload: Option<&'a str>,
    /// Migration session identifier.
    pub session: Option<&'a str>,
    /// Replica instance the event concerns.
    pub instance: Option<&'a str>,
    /// State-machine state the session was in.
    pub state: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a workload name.
    pub fn with_workload(mut self, workload: &'a str) -> Self {
        self.workload = Some(workload);
        self
    }

    /// Attach a session identifier.
    pub fn with_session(mut self, session: &'a str) -> Self {
        self.session = Some(session);
        self
    }

    /// Attach an instance name.
    pub fn with_instance(mut self, instance: &'a str) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Attach a state name.
    pub fn with_state(mut self, state: &'a str) -> Self {
        self.state = Some(state);
        self
    }
}

/// Outcome attached to a session trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventOutcome {
    /// The step completed.
    Success,
    /// The step failed but the session continues in a degraded mode.
    Degraded,
    /// The step failed and the session stops.
    Fault,
}

impl SessionEventOutcome {
    /// Stable label used in structured output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventOutcome::Success => "success",
            SessionEventOutcome::Degraded => "degraded",
            SessionEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized session trace event.
pub fn log_session_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SessionEventOutcome,
) {
    let ctx = context.copied().unwrap_or_default();
    // `tracing::event!` needs a constant level, so dispatch per level.
    macro_rules! emit {
        ($level:expr) => {
            tracing::event!(
                $level,
                event,
                outcome = outcome.as_str(),
                workload = ctx.workload.unwrap_or(""),
                session = ctx.session.unwrap_or(""),
                instance = ctx.instance.unwrap_or(""),
                state = ctx.state.unwrap_or(""),
                message = %message
            )
        };
    }
    match outcome {
        SessionEventOutcome::Success => emit!(Level::INFO),
        SessionEventOutcome::Degraded => emit!(Level::WARN),
        SessionEventOutcome::Fault => emit!(Level::ERROR),
    }
}
