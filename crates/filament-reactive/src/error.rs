#![forbid(unsafe_code)]

//! Error boundary for user-supplied code.
//!
//! User hooks, watch callbacks, render functions, and scheduled jobs all run
//! through [`call_with_error_handling`]: a panic is contained at the call
//! boundary, reported through `tracing`, and never allowed to stop the
//! enclosing batch. This mirrors the run-to-completion rule of the
//! scheduler — one failing job must not starve the rest of the flush.

use std::panic::{AssertUnwindSafe, catch_unwind};

/// Run `f`, containing any panic.
///
/// On panic, logs an error event tagged with `context` and returns `None`.
/// The tracking stack and scheduler state are unwind-safe: every scoped
/// acquisition in this crate pairs its exit via RAII guards.
pub fn call_with_error_handling<R>(context: &str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::error!(
                context,
                message = panic_message(payload.as_ref()),
                "caught error in {context}"
            );
            None
        }
    }
}

/// Best-effort extraction of a panic payload message.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
