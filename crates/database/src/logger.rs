//! Engine logging.
//!
//! Every write, transaction step and query run is formatted as a line and handed to a
//! `Logger` while logging is enabled on the database.

use brook_core::Value;

/// Sink for engine log lines.
pub trait Logger: Send + Sync {
    /// Records one message.
    fn log(&self, message: &str);
}

/// Forwards log lines to `tracing` at debug level on target `brook::database`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::debug!(target: "brook::database", "{}", message);
    }
}

impl<F> Logger for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Indents continuation lines of a statement so they line up under `sql: `.
pub(crate) fn indent_sql(sql: &str) -> String {
    sql.replace('\n', "\n       ")
}

/// Formats bound arguments as `[a, b, c]`.
pub(crate) fn display_args(args: &[Value]) -> String {
    let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}
