#![forbid(unsafe_code)]

//! The host-facing render seam.
//!
//! The runtime never touches a view layer directly: it hands a flat payload
//! of `path → value` patches to a [`RenderTarget`] and gets told, through the
//! `done` callback, when the view has applied it. [`RenderTask`] is the
//! settle signal for one render pass, resolved when the view acknowledges
//! the corresponding payload (or, for the initial pass, when the component
//! mounts).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

/// Why a render dispatch failed.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The host view layer is gone or not yet attached.
    #[error("render backend unavailable")]
    BackendUnavailable,
    /// The host rejected the payload.
    #[error("render rejected by host: {0}")]
    Rejected(String),
}

/// A view layer that can apply flat `path → value` patch payloads.
pub trait RenderTarget {
    /// Apply `payload` (a JSON object keyed by data paths), invoking `done`
    /// once the view reflects it. Hosts may invoke `done` synchronously.
    fn render(&self, payload: Value, done: Box<dyn FnOnce()>) -> Result<(), RenderError>;
}

#[derive(Default)]
struct RenderTaskInner {
    resolved: Cell<bool>,
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// Completion signal for one render pass. Clones share the same signal.
#[derive(Clone, Default)]
pub struct RenderTask {
    inner: Rc<RenderTaskInner>,
}

impl RenderTask {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.get()
    }

    /// Run `f` when the task resolves (immediately if it already has).
    pub fn then(&self, f: impl FnOnce() + 'static) {
        if self.inner.resolved.get() {
            f();
        } else {
            self.inner.callbacks.borrow_mut().push(Box::new(f));
        }
    }

    pub(crate) fn resolve(&self) {
        if self.inner.resolved.replace(true) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.inner.callbacks.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }
}
