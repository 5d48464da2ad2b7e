//! Process-wide fallback for errors nobody can receive.
//!
//! An error raised after its stream was cancelled, or by a fire-and-forget consumer,
//! lands here. The default handler logs it with `tracing::error!`.

use brook_core::Error;
use parking_lot::RwLock;
use std::sync::Arc;

type ErrorHandler = Arc<dyn Fn(Error) + Send + Sync>;

static ERROR_HANDLER: RwLock<Option<ErrorHandler>> = parking_lot::const_rwlock(None);

/// Installs the fallback error handler, replacing any previous one.
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(Error) + Send + Sync + 'static,
{
    *ERROR_HANDLER.write() = Some(Arc::new(handler));
}

/// Restores the default handler.
pub fn reset_error_handler() {
    *ERROR_HANDLER.write() = None;
}

/// Hands an undeliverable error to the fallback handler.
pub fn report_error(error: Error) {
    let handler = ERROR_HANDLER.read().clone();
    match handler {
        Some(handler) => handler(error),
        None => tracing::error!(target: "brook::reactive", error = %error, "undeliverable error"),
    }
}
