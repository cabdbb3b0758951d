#![forbid(unsafe_code)]

//! Effect scopes: grouped lifetime management for effects.
//!
//! An [`EffectScope`] collects every effect created while it is the active
//! scope, plus any nested scopes, so a whole component's reactive graph can
//! be torn down with one `stop()` call. Stopping cascades transitively and
//! is idempotent.
//!
//! Scope activation uses the same scoped-acquisition discipline as effect
//! tracking: [`EffectScope::enter`] returns an RAII guard, so the active
//! scope is restored even when user code panics.

use std::cell::RefCell;
use std::rc::Rc;

use crate::effect::stop_effect;
use crate::registry::EffectId;

thread_local! {
    static ACTIVE_SCOPES: RefCell<Vec<EffectScope>> = const { RefCell::new(Vec::new()) };
}

struct ScopeInner {
    active: bool,
    effects: Vec<EffectId>,
    scopes: Vec<EffectScope>,
}

/// A lifetime container grouping effects for collective teardown.
///
/// Cloning the scope clones the handle; all clones refer to the same group.
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<RefCell<ScopeInner>>,
}

impl EffectScope {
    /// Create a scope nested under the currently active scope (if any):
    /// stopping the parent stops this scope too.
    pub fn new() -> Self {
        Self::create(false)
    }

    /// Create a detached scope, excluded from parent teardown.
    pub fn detached() -> Self {
        Self::create(true)
    }

    fn create(detached: bool) -> Self {
        let scope = Self {
            inner: Rc::new(RefCell::new(ScopeInner {
                active: true,
                effects: Vec::new(),
                scopes: Vec::new(),
            })),
        };
        if !detached {
            ACTIVE_SCOPES.with(|stack| {
                if let Some(parent) = stack.borrow().last() {
                    parent.inner.borrow_mut().scopes.push(scope.clone());
                }
            });
        }
        scope
    }

    /// Make this scope the active one for the duration of the guard.
    pub fn enter(&self) -> ScopeGuard {
        ACTIVE_SCOPES.with(|stack| stack.borrow_mut().push(self.clone()));
        ScopeGuard
    }

    /// Run `f` with this scope active. Returns `None` (with a warning) if
    /// the scope has already been stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            tracing::warn!("cannot run an inactive effect scope");
            return None;
        }
        let _guard = self.enter();
        Some(f())
    }

    /// True until `stop` is called.
    pub fn is_active(&self) -> bool {
        self.inner.borrow().active
    }

    /// Stop every owned effect and nested scope, exactly once.
    pub fn stop(&self) {
        let (effects, scopes) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.active {
                return;
            }
            inner.active = false;
            (
                std::mem::take(&mut inner.effects),
                std::mem::take(&mut inner.scopes),
            )
        };
        for effect in effects {
            stop_effect(effect);
        }
        for scope in scopes {
            scope.stop();
        }
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard restoring the previously active scope.
pub struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        ACTIVE_SCOPES.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Record a newly created effect on the active scope, if one exists.
pub(crate) fn record_effect(id: EffectId) {
    ACTIVE_SCOPES.with(|stack| {
        if let Some(scope) = stack.borrow().last() {
            let mut inner = scope.inner.borrow_mut();
            if inner.active {
                inner.effects.push(id);
            }
        }
    });
}
