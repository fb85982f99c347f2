// macros only; no direct imports needed

/// Replay-safe logging for orchestration bodies. A resumed instance
/// re-executes its body from the start, so unconditional logging would emit
/// every line again on each resume; these macros stay silent while the
/// context is binding steps from the checkpoint log.
#[macro_export]
macro_rules! durable_info {
    ($ctx:expr, $($arg:tt)+) => {{
        if !$ctx.is_replaying() {
            ::tracing::info!(instance = %$ctx.instance(), $($arg)+);
        }
    }};
}

#[macro_export]
macro_rules! durable_warn {
    ($ctx:expr, $($arg:tt)+) => {{
        if !$ctx.is_replaying() {
            ::tracing::warn!(instance = %$ctx.instance(), $($arg)+);
        }
    }};
}

#[macro_export]
macro_rules! durable_error {
    ($ctx:expr, $($arg:tt)+) => {{
        if !$ctx.is_replaying() {
            ::tracing::error!(instance = %$ctx.instance(), $($arg)+);
        }
    }};
}
