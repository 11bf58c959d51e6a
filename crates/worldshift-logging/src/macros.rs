//! ---
//! ws_section: "02-observability"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Structured status-trace logging helpers."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
/// Emit an informational log enriched with session context.
#[macro_export]
macro_rules! ws_info {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::INFO,
            workload = ctx.workload.unwrap_or(""),
            session = ctx.session.unwrap_or(""),
            instance = ctx.instance.unwrap_or(""),
            state = ctx.state.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::ws_info!(context = $crate::LogContext::default(), $($arg)+)
    }};
}

/// Emit a warning enriched with session context.
#[macro_export]
macro_rules! ws_warn {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::WARN,
            workload = ctx.workload.unwrap_or(""),
            session = ctx.session.unwrap_or(""),
            instance = ctx.instance.unwrap_or(""),
            state = ctx.state.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::ws_warn!(context = $crate::LogContext::default(), $($arg)+)
    }};
}

/// Emit an error log enriched with session context.
#[macro_export]
macro_rules! ws_error {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::ERROR,
            workload = ctx.workload.unwrap_or(""),
            session = ctx.session.unwrap_or(""),
            instance = ctx.instance.unwrap_or(""),
            state = ctx.state.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        $crate::ws_error!(context = $crate::LogContext::default(), $($arg)+)
    }};
}
