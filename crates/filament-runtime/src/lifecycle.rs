#![forbid(unsafe_code)]

//! Component lifecycle states, hook kinds, and composition-style hook
//! injection.
//!
//! While a component initializes (setup, data, computed, watchers) or runs a
//! lifecycle hook, it is the *current instance* on a thread-local stack and
//! its effect scope is active, so reactive primitives created inside attach
//! to the component and the free [`on_mounted`]-style functions know where
//! to register.

use std::cell::RefCell;

use crate::proxy::ComponentProxy;

thread_local! {
    static CURRENT_INSTANCE: RefCell<Vec<ComponentProxy>> = const { RefCell::new(Vec::new()) };
}

/// Where a component is in its life.
///
/// `BeforeCreate` → `Created` → `Mounted` → `Destroyed`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LifecycleState {
    BeforeCreate,
    Created,
    Mounted,
    Destroyed,
}

/// The lifecycle moments a hook can attach to.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum HookKind {
    BeforeCreate,
    Created,
    BeforeMount,
    Mounted,
    Updated,
    BeforeDestroy,
    Destroyed,
}

/// The component currently initializing or running a hook, if any.
pub fn current_instance() -> Option<ComponentProxy> {
    CURRENT_INSTANCE.with(|stack| stack.borrow().last().cloned())
}

/// RAII frame: the component is the current instance and its scope is
/// active until the guard drops.
pub(crate) struct InstanceGuard {
    _scope: filament_reactive::scope::ScopeGuard,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        CURRENT_INSTANCE.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

pub(crate) fn enter_instance(proxy: &ComponentProxy) -> InstanceGuard {
    CURRENT_INSTANCE.with(|stack| stack.borrow_mut().push(proxy.clone()));
    InstanceGuard {
        _scope: proxy.scope().enter(),
    }
}

/// Register a hook on the current instance. Returns false (with a warning)
/// when called outside component initialization.
pub fn inject_hook(kind: HookKind, hook: impl Fn(&ComponentProxy) + 'static) -> bool {
    match current_instance() {
        Some(proxy) => {
            proxy.add_hook(kind, hook);
            true
        }
        None => {
            tracing::warn!(
                ?kind,
                "lifecycle hook injection failed: no component instance is active"
            );
            false
        }
    }
}

pub fn on_before_create(hook: impl Fn(&ComponentProxy) + 'static) -> bool {
    inject_hook(HookKind::BeforeCreate, hook)
}

pub fn on_created(hook: impl Fn(&ComponentProxy) + 'static) -> bool {
    inject_hook(HookKind::Created, hook)
}

pub fn on_before_mount(hook: impl Fn(&ComponentProxy) + 'static) -> bool {
    inject_hook(HookKind::BeforeMount, hook)
}

pub fn on_mounted(hook: impl Fn(&ComponentProxy) + 'static) -> bool {
    inject_hook(HookKind::Mounted, hook)
}

pub fn on_updated(hook: impl Fn(&ComponentProxy) + 'static) -> bool {
    inject_hook(HookKind::Updated, hook)
}

pub fn on_before_destroy(hook: impl Fn(&ComponentProxy) + 'static) -> bool {
    inject_hook(HookKind::BeforeDestroy, hook)
}

pub fn on_destroyed(hook: impl Fn(&ComponentProxy) + 'static) -> bool {
    inject_hook(HookKind::Destroyed, hook)
}
