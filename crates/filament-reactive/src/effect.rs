#![forbid(unsafe_code)]

//! Re-runnable computations with tracked dependencies.
//!
//! A [`ReactiveEffect`] owns a computation (`FnMut() -> Value`). `run()`
//! prunes every dependency registered by the previous run, marks the effect
//! active on the tracking stack (nested runs nest; the previous entry is
//! restored on completion, panic included), and executes the computation.
//! Reads performed inside re-populate the dependency set.
//!
//! When a dependency notifies a live effect, its custom scheduler callback is
//! invoked if present (typically "enqueue my job"), otherwise the effect
//! re-runs synchronously.
//!
//! `stop()` permanently excludes the effect from notification: it prunes all
//! dependent-set entries and fires the cleanup hook once. A stopped effect
//! may still be run manually, but registers nothing.
//!
//! Dropping the last [`ReactiveEffect`] handle stops the effect and releases
//! its arena slot.

use serde_json::Value;
use smallvec::SmallVec;

use crate::registry::{
    EffectId, EffectSlot, TrackGuard, effect_is_running, insert_effect, next_generation,
    release_effect_if_unused, with_effect_slot, with_observable_slot,
};
use crate::scope;

/// A unit of re-runnable computation with a recomputed dependency set.
#[derive(Debug)]
pub struct ReactiveEffect {
    id: EffectId,
}

impl ReactiveEffect {
    /// Create an effect. The computation does not run until [`run`] is
    /// called. If an [`EffectScope`](crate::EffectScope) is active, the
    /// effect is recorded on it for grouped teardown.
    pub fn new(computation: impl FnMut() -> Value + 'static) -> Self {
        let id = insert_effect(EffectSlot {
            generation: next_generation(),
            computation: Some(Box::new(computation)),
            scheduler: None,
            on_stop: None,
            active: true,
            running: false,
            handles: 1,
            deps: SmallVec::new(),
        });
        scope::record_effect(id);
        Self { id }
    }

    /// Install the custom scheduler callback invoked when a dependency
    /// notifies this effect (instead of a synchronous re-run).
    pub fn set_scheduler(&self, scheduler: impl Fn() + 'static) {
        // A replaced closure drops after the arena borrow ends: it may own
        // reactive handles whose Drop re-enters the arena.
        let previous =
            with_effect_slot(self.id, |slot| slot.scheduler.replace(Box::new(scheduler)));
        drop(previous);
    }

    /// Install the cleanup hook fired exactly once when the effect stops.
    pub fn set_on_stop(&self, on_stop: impl FnOnce() + 'static) {
        let previous = with_effect_slot(self.id, |slot| slot.on_stop.replace(Box::new(on_stop)));
        drop(previous);
    }

    /// Run the computation, re-collecting dependencies (unless stopped).
    pub fn run(&self) -> Value {
        run_effect(self.id)
    }

    /// Permanently exclude this effect from notification and fire its
    /// cleanup hook. Idempotent.
    pub fn stop(&self) {
        stop_effect(self.id);
    }

    /// False once stopped.
    pub fn is_active(&self) -> bool {
        with_effect_slot(self.id, |slot| slot.active).unwrap_or(false)
    }

    /// A non-owning reference, safe to store inside scheduler jobs without
    /// keeping the effect alive.
    pub fn downgrade(&self) -> WeakEffect {
        WeakEffect { id: self.id }
    }

    pub(crate) fn raw_id(&self) -> EffectId {
        self.id
    }
}

impl Clone for ReactiveEffect {
    fn clone(&self) -> Self {
        with_effect_slot(self.id, |slot| slot.handles += 1);
        Self { id: self.id }
    }
}

impl Drop for ReactiveEffect {
    fn drop(&mut self) {
        let last = with_effect_slot(self.id, |slot| {
            slot.handles = slot.handles.saturating_sub(1);
            slot.handles == 0
        })
        .unwrap_or(false);
        if last {
            stop_effect(self.id);
            release_effect_if_unused(self.id);
        }
    }
}

/// Non-owning handle to an effect. All operations are no-ops once the last
/// strong handle has dropped.
#[derive(Copy, Clone, Debug)]
pub struct WeakEffect {
    id: EffectId,
}

impl WeakEffect {
    /// Run the effect if it still exists; `Null` otherwise.
    pub fn run(&self) -> Value {
        run_effect(self.id)
    }

    /// True while the effect exists and has not been stopped.
    pub fn is_active(&self) -> bool {
        with_effect_slot(self.id, |slot| slot.active).unwrap_or(false)
    }
}

/// Run a closure with dependency tracking suppressed: reads inside do not
/// register the enclosing effect.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = TrackGuard::enter(None);
    f()
}

/// Restores the computation into its slot when a run completes, panic
/// included, then releases the slot if the last handle dropped mid-run.
struct RestoreComputation {
    id: EffectId,
    computation: Option<Box<dyn FnMut() -> Value>>,
}

impl Drop for RestoreComputation {
    fn drop(&mut self) {
        let computation = self.computation.take();
        with_effect_slot(self.id, |slot| {
            slot.computation = computation;
            slot.running = false;
        });
        release_effect_if_unused(self.id);
    }
}

pub(crate) fn run_effect(id: EffectId) -> Value {
    let active = match with_effect_slot(id, |slot| slot.active) {
        Some(active) => active,
        None => return Value::Null,
    };
    if active {
        cleanup_effect(id);
    }
    // Check the computation out of the arena so user code runs without any
    // outstanding borrow.
    let Some(computation) = with_effect_slot(id, |slot| {
        slot.computation.take().inspect(|_| slot.running = true)
    })
    .flatten() else {
        // Mid-run re-entrant invocation; nothing to do.
        return Value::Null;
    };
    let mut restore = RestoreComputation {
        id,
        computation: Some(computation),
    };
    let _guard = active.then(|| TrackGuard::enter(Some(id)));
    (restore
        .computation
        .as_mut()
        .expect("computation set just above"))()
}

pub(crate) fn stop_effect(id: EffectId) {
    let was_active = with_effect_slot(id, |slot| {
        let was_active = slot.active;
        slot.active = false;
        was_active
    })
    .unwrap_or(false);
    if !was_active {
        return;
    }
    cleanup_effect(id);
    let on_stop = with_effect_slot(id, |slot| slot.on_stop.take()).flatten();
    if let Some(on_stop) = on_stop {
        on_stop();
    }
}

/// Remove this effect from every dependent set it registered in and clear
/// its recorded dependency list.
pub(crate) fn cleanup_effect(id: EffectId) {
    let deps = with_effect_slot(id, |slot| std::mem::take(&mut slot.deps)).unwrap_or_default();
    for (observable, path) in deps {
        with_observable_slot(observable, |slot| {
            if let Some(dependents) = slot.deps.get_mut(&path) {
                dependents.remove(&id);
                if dependents.is_empty() {
                    slot.deps.remove(&path);
                }
            }
        });
    }
}

/// Notify a batch of effects in ascending creation order.
///
/// Stopped or released effects are skipped, as is any effect currently on
/// the tracking stack (a computation mutating its own dependency must not
/// retrigger itself synchronously). Each effect's custom scheduler runs if
/// present; otherwise the effect re-runs immediately.
pub(crate) fn trigger_effects(mut ids: Vec<EffectId>) {
    ids.sort_unstable();
    ids.dedup();
    for id in ids {
        if effect_is_running(id) {
            continue;
        }
        if !with_effect_slot(id, |slot| slot.active).unwrap_or(false) {
            continue;
        }
        let scheduler = with_effect_slot(id, |slot| slot.scheduler.take()).flatten();
        match scheduler {
            Some(scheduler) => {
                scheduler();
                // Put the scheduler back unless a new one was installed
                // mid-call; either way the displaced closure (and, if the
                // slot is gone, this one) drops outside the arena borrow.
                let mut scheduler = Some(scheduler);
                let superseded = with_effect_slot(id, |slot| {
                    if slot.scheduler.is_none() {
                        slot.scheduler = scheduler.take();
                        None
                    } else {
                        scheduler.take()
                    }
                })
                .flatten();
                drop(superseded);
                drop(scheduler);
            }
            None => {
                run_effect(id);
            }
        }
    }
}
