#![forbid(unsafe_code)]

//! Path-addressed observable state containers.
//!
//! An [`Observable`] wraps a [`serde_json::Value`] tree. There is no
//! transparent property interception: reads and writes go through an explicit
//! path API. A tracked read ([`Observable::get`]) deep-clones the addressed
//! subtree and registers the active effect on the path **and every descendant
//! path** of the returned value — the deep clone plays the role the
//! recursive property walk plays in proxy-based reactivity systems.
//!
//! # Invariants
//!
//! 1. Reading a path while an effect is active registers that effect as a
//!    dependent of the path.
//! 2. Writing a path notifies exactly the dependents recorded before the
//!    write; dependents stay registered until their own next run re-collects
//!    subscriptions.
//! 3. A write that does not change a scalar value is a no-op. Object and
//!    array writes always notify (reference identity cannot be observed
//!    through clones, so container writes are assumed to be changes).
//! 4. Structural mutations (new key, deletion, push, splice) notify the
//!    container path and all registered descendant paths, as if every
//!    index/key changed.
//!
//! Dependents are effect *ids*, never owning references — see the
//! [`registry`](crate::registry) module for the arena discipline.

use serde_json::Value;

use crate::effect::trigger_effects;
use crate::path::{
    delete_by_path, get_by_path, is_descendant_path, join_index, join_key, parse_path,
    set_by_path,
};
use crate::registry::{
    self, ObservableId, ObservableSlot, current_effect, insert_observable,
    release_observable_if_unused, with_observable_slot,
};

/// A shared, path-addressed reactive state container.
///
/// Cloning an `Observable` clones the handle, not the state; the backing
/// entry is released when the last handle drops.
#[derive(Debug)]
pub struct Observable {
    id: ObservableId,
}

impl Observable {
    /// Wrap `initial` in a new container.
    pub fn new(initial: Value) -> Self {
        let id = insert_observable(ObservableSlot {
            generation: registry::next_generation(),
            value: initial,
            deps: Default::default(),
            handles: 1,
        });
        Self { id }
    }

    pub(crate) fn raw_id(&self) -> ObservableId {
        self.id
    }

    /// Tracked read: clone of the subtree at `path` (`Null` when absent).
    ///
    /// While an effect is active this registers it on `path` and every
    /// descendant path of the returned subtree.
    pub fn get(&self, path: &str) -> Value {
        let value = self.get_untracked(path);
        if current_effect().is_some() {
            self.track(path);
            let mut descendants = Vec::new();
            collect_descendant_paths(path, &value, &mut descendants);
            for descendant in descendants {
                self.track(&descendant);
            }
        }
        value
    }

    /// Clone of the subtree at `path` without dependency registration.
    pub fn get_untracked(&self, path: &str) -> Value {
        with_observable_slot(self.id, |slot| {
            get_by_path(&slot.value, path).cloned().unwrap_or(Value::Null)
        })
        .unwrap_or(Value::Null)
    }

    /// Borrow the raw root value without cloning or tracking.
    ///
    /// The closure must not call back into this observable (the backing
    /// storage is borrowed for the duration of the call).
    pub fn peek<R>(&self, f: impl FnOnce(&Value) -> R) -> Option<R> {
        with_observable_slot(self.id, |slot| f(&slot.value))
    }

    /// Untracked clone of the whole root value.
    pub fn snapshot(&self) -> Value {
        self.get_untracked("")
    }

    /// Write `value` at `path`, notifying dependents on change.
    ///
    /// Scalar writes that leave the value identical are no-ops. Writing a
    /// previously-absent path is a structural change and notifies the
    /// enclosing container's dependents as well.
    pub fn set(&self, path: &str, value: Value) {
        let existing = with_observable_slot(self.id, |slot| {
            get_by_path(&slot.value, path).cloned()
        })
        .flatten();

        let is_container = matches!(value, Value::Object(_) | Value::Array(_));
        if let Some(old) = &existing {
            if *old == value && !is_container {
                return;
            }
        }
        let structural = existing.is_none();

        with_observable_slot(self.id, |slot| set_by_path(&mut slot.value, path, value));

        if structural {
            self.notify_subtree(&parent_path(path));
        } else {
            self.notify_subtree(path);
        }
    }

    /// Remove the value at `path` (object key or array element), notifying
    /// the enclosing container's dependents.
    pub fn delete(&self, path: &str) {
        let removed = with_observable_slot(self.id, |slot| delete_by_path(&mut slot.value, path))
            .unwrap_or(false);
        if removed {
            self.notify_subtree(&parent_path(path));
        }
    }

    /// Append to the array at `path`; structural notification.
    pub fn push(&self, path: &str, value: Value) {
        let pushed = with_observable_slot(self.id, |slot| {
            match crate::path::get_by_segments_mut(&mut slot.value, &parse_path(path)) {
                Some(Value::Array(items)) => {
                    items.push(value);
                    true
                }
                _ => false,
            }
        })
        .unwrap_or(false);
        if pushed {
            self.notify_subtree(path);
        } else {
            tracing::warn!(path, "push target is not an array");
        }
    }

    /// Splice the array at `path`: remove `delete_count` elements at `start`
    /// and insert `items` in their place. Structural notification.
    pub fn splice(&self, path: &str, start: usize, delete_count: usize, items: Vec<Value>) {
        let spliced = with_observable_slot(self.id, |slot| {
            match crate::path::get_by_segments_mut(&mut slot.value, &parse_path(path)) {
                Some(Value::Array(existing)) => {
                    let start = start.min(existing.len());
                    let end = (start + delete_count).min(existing.len());
                    existing.splice(start..end, items);
                    true
                }
                _ => false,
            }
        })
        .unwrap_or(false);
        if spliced {
            self.notify_subtree(path);
        } else {
            tracing::warn!(path, "splice target is not an array");
        }
    }

    /// Low-level dependency registration: subscribe the active effect to
    /// exactly `path` (no descendant walk).
    pub fn track(&self, path: &str) {
        let Some(effect) = current_effect() else {
            return;
        };
        let newly_added = with_observable_slot(self.id, |slot| {
            slot.deps.entry(path.to_string()).or_default().insert(effect)
        })
        .unwrap_or(false);
        if newly_added {
            crate::registry::with_effect_slot(effect, |slot| {
                slot.deps.push((self.id, path.to_string()));
            });
        }
    }

    /// Low-level notification: trigger the dependents of `path` and of every
    /// registered descendant path.
    pub fn trigger(&self, path: &str) {
        self.notify_subtree(path);
    }

    fn notify_subtree(&self, base: &str) {
        let dependents = with_observable_slot(self.id, |slot| {
            let mut ids: Vec<_> = slot
                .deps
                .iter()
                .filter(|(path, _)| path.as_str() == base || is_descendant_path(path, base))
                .flat_map(|(_, effects)| effects.iter().copied())
                .collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        })
        .unwrap_or_default();
        trigger_effects(dependents);
    }
}

impl Clone for Observable {
    fn clone(&self) -> Self {
        with_observable_slot(self.id, |slot| slot.handles += 1);
        Self { id: self.id }
    }
}

impl Drop for Observable {
    fn drop(&mut self) {
        with_observable_slot(self.id, |slot| slot.handles = slot.handles.saturating_sub(1));
        release_observable_if_unused(self.id);
    }
}

/// The enclosing container path (everything up to the last segment).
fn parent_path(path: &str) -> String {
    let segments = parse_path(path);
    let mut parent = String::new();
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        match segment {
            crate::path::PathSeg::Key(k) => parent = join_key(&parent, k),
            crate::path::PathSeg::Index(i) => parent = join_index(&parent, *i),
        }
    }
    parent
}

/// Enumerate the paths of every nested value under `value`, rooted at `base`.
fn collect_descendant_paths(base: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = join_key(base, key);
                collect_descendant_paths(&path, child, out);
                out.push(path);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let path = join_index(base, index);
                collect_descendant_paths(&path, child, out);
                out.push(path);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::ReactiveEffect;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counting_effect(f: impl Fn() + 'static) -> (ReactiveEffect, Rc<Cell<u32>>) {
        let runs = Rc::new(Cell::new(0));
        let runs_inner = Rc::clone(&runs);
        let effect = ReactiveEffect::new(move || {
            runs_inner.set(runs_inner.get() + 1);
            f();
            Value::Null
        });
        (effect, runs)
    }

    #[test]
    fn read_registers_and_write_notifies() {
        let state = Observable::new(json!({"a": 1, "b": {"c": 2}}));
        let reader = state.clone();
        let (effect, runs) = counting_effect(move || {
            let _ = reader.get("a");
        });
        effect.run();
        assert_eq!(runs.get(), 1);

        state.set("a", json!(2));
        assert_eq!(runs.get(), 2);

        // Unread key does not notify.
        state.set("b.c", json!(3));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn identical_scalar_write_is_noop() {
        let state = Observable::new(json!({"n": 5}));
        let reader = state.clone();
        let (effect, runs) = counting_effect(move || {
            let _ = reader.get("n");
        });
        effect.run();
        state.set("n", json!(5));
        assert_eq!(runs.get(), 1);
        state.set("n", json!(6));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn container_write_always_notifies() {
        let state = Observable::new(json!({"obj": {"x": 1}}));
        let reader = state.clone();
        let (effect, runs) = counting_effect(move || {
            let _ = reader.get("obj");
        });
        effect.run();
        state.set("obj", json!({"x": 1}));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn deep_read_tracks_nested_paths() {
        let state = Observable::new(json!({"b": {"c": 2}}));
        let reader = state.clone();
        let (effect, runs) = counting_effect(move || {
            let _ = reader.get("b");
        });
        effect.run();

        // Deep clone of "b" registered "b.c" as well.
        state.set("b.c", json!(3));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn new_key_notifies_container_readers() {
        let state = Observable::new(json!({"b": {"c": 2}}));
        let reader = state.clone();
        let (effect, runs) = counting_effect(move || {
            let _ = reader.get("b");
        });
        effect.run();

        // "b.d" never existed, so readers of "b" must still be notified.
        state.set("b.d", json!(4));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn delete_notifies_container_readers() {
        let state = Observable::new(json!({"b": {"c": 2, "d": 3}}));
        let reader = state.clone();
        let (effect, runs) = counting_effect(move || {
            let _ = reader.get("b");
        });
        effect.run();
        state.delete("b.d");
        assert_eq!(runs.get(), 2);
        assert_eq!(state.get_untracked("b"), json!({"c": 2}));
    }

    #[test]
    fn structural_array_mutations_notify_iterators() {
        let state = Observable::new(json!({"list": [1, 2]}));
        let reader = state.clone();
        let (effect, runs) = counting_effect(move || {
            let _ = reader.get("list");
        });
        effect.run();

        state.push("list", json!(3));
        assert_eq!(runs.get(), 2);
        assert_eq!(state.get_untracked("list"), json!([1, 2, 3]));

        state.splice("list", 0, 2, vec![json!(9)]);
        assert_eq!(runs.get(), 3);
        assert_eq!(state.get_untracked("list"), json!([9, 3]));
    }

    #[test]
    fn stale_dependencies_are_pruned_each_run() {
        let state = Observable::new(json!({"flag": true, "a": 1, "b": 2}));
        let reader = state.clone();
        let (effect, runs) = counting_effect(move || {
            if reader.get("flag") == json!(true) {
                let _ = reader.get("a");
            } else {
                let _ = reader.get("b");
            }
        });
        effect.run();
        assert_eq!(runs.get(), 1);

        state.set("flag", json!(false));
        assert_eq!(runs.get(), 2);

        // The latest run read "b", not "a": mutating "a" must not notify.
        state.set("a", json!(10));
        assert_eq!(runs.get(), 2);
        state.set("b", json!(20));
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn untracked_reads_do_not_register() {
        let state = Observable::new(json!({"a": 1}));
        let reader = state.clone();
        let (effect, runs) = counting_effect(move || {
            let _ = reader.get_untracked("a");
        });
        effect.run();
        state.set("a", json!(2));
        assert_eq!(runs.get(), 1);
    }
}
