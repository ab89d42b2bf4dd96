//! Isolation boundary for user callbacks.

use crate::error::CallbackResult;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// Nested notification depth after which subscribers are no longer called.
///
/// Shared by state-manager subscribers and bridge state listeners, so a
/// chain that bounces between the two is bounded as well.
pub const MAX_NOTIFY_DEPTH: usize = 32;

thread_local! {
    static NOTIFY_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Run `notify` one nesting level deeper.
///
/// Returns false without running it once `MAX_NOTIFY_DEPTH` nested
/// notifications are active on this thread.
pub(crate) fn with_notify_depth<F>(kind: &'static str, component: &str, notify: F) -> bool
where
    F: FnOnce(),
{
    let depth = NOTIFY_DEPTH.with(Cell::get);
    if depth >= MAX_NOTIFY_DEPTH {
        warn!(kind, component, depth, "notification depth limit reached, skipping");
        return false;
    }

    NOTIFY_DEPTH.with(|d| d.set(depth + 1));
    notify();
    NOTIFY_DEPTH.with(|d| d.set(depth));
    true
}

/// Run a user callback, containing both returned errors and panics.
///
/// Returns `true` if the callback completed successfully. Failures are
/// logged with `kind` and `component` and never reach the caller.
pub(crate) fn invoke_isolated<F>(kind: &'static str, component: &str, callback: F) -> bool
where
    F: FnOnce() -> CallbackResult,
{
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            warn!(kind, component, %error, "callback failed");
            false
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            warn!(kind, component, panic = %message, "callback panicked");
            false
        }
    }
}
