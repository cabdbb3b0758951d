#![forbid(unsafe_code)]

//! Lazy memoized derived values.
//!
//! A [`Computed`] wraps a getter in a [`ReactiveEffect`] whose scheduler
//! marks the cached value dirty instead of recomputing: the getter only runs
//! when someone reads a dirty computed. Readers subscribe through a private
//! backing [`Observable`], so invalidation propagates to them exactly like an
//! ordinary dependency change.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::effect::ReactiveEffect;
use crate::observable::Observable;

struct ComputedInner {
    effect: ReactiveEffect,
    setter: Option<Box<dyn FnMut(Value)>>,
    /// Dependency anchor for readers; holds no data of its own.
    anchor: Observable,
    value: Value,
    dirty: bool,
}

/// A derived value recomputed on demand.
///
/// Clones share the same cache and effect.
#[derive(Clone)]
pub struct Computed {
    inner: Rc<RefCell<ComputedInner>>,
}

impl Computed {
    /// A read-only computed. The getter does not run until the first read.
    pub fn new(getter: impl FnMut() -> Value + 'static) -> Self {
        Self::build(getter, None)
    }

    /// A writable computed: writes are routed through `setter`, which is
    /// expected to mutate the sources the getter reads.
    pub fn writable(
        getter: impl FnMut() -> Value + 'static,
        setter: impl FnMut(Value) + 'static,
    ) -> Self {
        Self::build(getter, Some(Box::new(setter)))
    }

    fn build(getter: impl FnMut() -> Value + 'static, setter: Option<Box<dyn FnMut(Value)>>) -> Self {
        let effect = ReactiveEffect::new(getter);
        let inner = Rc::new(RefCell::new(ComputedInner {
            effect: effect.clone(),
            setter,
            anchor: Observable::new(Value::Null),
            value: Value::Null,
            dirty: true,
        }));
        let weak: Weak<RefCell<ComputedInner>> = Rc::downgrade(&inner);
        // Invalidate instead of recomputing; the next read pays the cost.
        effect.set_scheduler(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let anchor = {
                let mut inner = inner.borrow_mut();
                if inner.dirty {
                    return;
                }
                inner.dirty = true;
                inner.anchor.clone()
            };
            anchor.trigger("");
        });
        Self { inner }
    }

    /// Current value, recomputing first if a dependency changed since the
    /// last read. Registers the active effect (if any) as a reader.
    pub fn get(&self) -> Value {
        let (dirty, effect, anchor) = {
            let inner = self.inner.borrow();
            (inner.dirty, inner.effect.clone(), inner.anchor.clone())
        };
        if dirty {
            let value = effect.run();
            let mut inner = self.inner.borrow_mut();
            inner.value = value;
            inner.dirty = false;
        }
        anchor.track("");
        self.inner.borrow().value.clone()
    }

    /// Current value without reader registration or recomputation.
    pub fn peek(&self) -> Value {
        self.inner.borrow().value.clone()
    }

    /// Route a write through the setter. Warns and drops the value for a
    /// read-only computed.
    pub fn set(&self, value: Value) {
        let setter = self.inner.borrow_mut().setter.take();
        match setter {
            Some(mut setter) => {
                setter(value);
                let mut inner = self.inner.borrow_mut();
                if inner.setter.is_none() {
                    inner.setter = Some(setter);
                }
            }
            None => tracing::warn!("computed property is readonly"),
        }
    }

    /// Stop tracking; the cached value freezes at its last state.
    pub fn stop(&self) {
        self.inner.borrow().effect.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn getter_is_lazy_and_memoized() {
        let state = Observable::new(json!({"n": 2}));
        let reader = state.clone();
        let computes = Rc::new(Cell::new(0));
        let computes2 = Rc::clone(&computes);
        let doubled = Computed::new(move || {
            computes2.set(computes2.get() + 1);
            json!(reader.get("n").as_i64().unwrap_or(0) * 2)
        });

        // Nothing runs at construction.
        assert_eq!(computes.get(), 0);
        assert_eq!(doubled.get(), json!(4));
        assert_eq!(computes.get(), 1);

        // Repeated reads hit the cache.
        assert_eq!(doubled.get(), json!(4));
        assert_eq!(computes.get(), 1);
    }

    #[test]
    fn dependency_change_invalidates_without_recomputing() {
        let state = Observable::new(json!({"n": 2}));
        let reader = state.clone();
        let computes = Rc::new(Cell::new(0));
        let computes2 = Rc::clone(&computes);
        let doubled = Computed::new(move || {
            computes2.set(computes2.get() + 1);
            json!(reader.get("n").as_i64().unwrap_or(0) * 2)
        });
        assert_eq!(doubled.get(), json!(4));

        state.set("n", json!(5));
        // Invalidation alone does not recompute.
        assert_eq!(computes.get(), 1);
        assert_eq!(doubled.get(), json!(10));
        assert_eq!(computes.get(), 2);
    }

    #[test]
    fn readers_are_notified_on_invalidation() {
        let state = Observable::new(json!({"n": 1}));
        let reader = state.clone();
        let doubled = Computed::new(move || json!(reader.get("n").as_i64().unwrap_or(0) * 2));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);
        let doubled2 = doubled.clone();
        let effect = ReactiveEffect::new(move || {
            let value = doubled2.get();
            seen2.borrow_mut().push(value.clone());
            value
        });
        effect.run();
        state.set("n", json!(3));
        assert_eq!(*seen.borrow(), vec![json!(2), json!(6)]);
    }

    #[test]
    fn computed_chains_propagate() {
        let state = Observable::new(json!({"n": 1}));
        let reader = state.clone();
        let doubled = Computed::new(move || json!(reader.get("n").as_i64().unwrap_or(0) * 2));
        let doubled2 = doubled.clone();
        let quadrupled = Computed::new(move || json!(doubled2.get().as_i64().unwrap_or(0) * 2));

        assert_eq!(quadrupled.get(), json!(4));
        state.set("n", json!(2));
        assert_eq!(quadrupled.get(), json!(8));
    }

    #[test]
    fn writable_computed_routes_through_setter() {
        let state = Observable::new(json!({"n": 1}));
        let reader = state.clone();
        let writer = state.clone();
        let doubled = Computed::writable(
            move || json!(reader.get("n").as_i64().unwrap_or(0) * 2),
            move |value| {
                writer.set("n", json!(value.as_i64().unwrap_or(0) / 2));
            },
        );
        assert_eq!(doubled.get(), json!(2));
        doubled.set(json!(10));
        assert_eq!(state.get_untracked("n"), json!(5));
        assert_eq!(doubled.get(), json!(10));
    }

    #[test]
    fn readonly_set_is_ignored() {
        let constant = Computed::new(|| json!(1));
        constant.set(json!(9));
        assert_eq!(constant.get(), json!(1));
    }

    #[test]
    fn stopped_computed_freezes() {
        let state = Observable::new(json!({"n": 1}));
        let reader = state.clone();
        let doubled = Computed::new(move || json!(reader.get("n").as_i64().unwrap_or(0) * 2));
        assert_eq!(doubled.get(), json!(2));
        doubled.stop();
        state.set("n", json!(7));
        assert_eq!(doubled.get(), json!(2));
    }
}
