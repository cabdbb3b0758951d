#![forbid(unsafe_code)]

//! Arena-style storage for reactive node metadata.
//!
//! Two thread-local arenas back the whole dependency graph:
//!
//! - the **effect arena** stores each effect's computation, optional custom
//!   scheduler, cleanup hook, and the `(observable, path)` pairs it currently
//!   depends on;
//! - the **observable arena** stores each container's value and its
//!   per-path map of dependent effect ids.
//!
//! Ids are index + generation pairs. The generation comes from one global
//! monotone counter, so ordering ids by generation is creation order; stale
//! ids (slot reused after release) are detected by generation mismatch and
//! ignored. Observables hold [`EffectId`]s and effects hold
//! [`ObservableId`]s — there is no pointer cycle to break, clearing either
//! side is removal from an index map.
//!
//! The thread-local **active effect stack** records which effect (if any) is
//! currently running, so reads attribute themselves to the innermost
//! computation. [`TrackGuard`] gives scoped push/pop that pairs even when a
//! computation panics.

use std::cell::{Cell, RefCell};

use ahash::{AHashMap, AHashSet};
use serde_json::Value;
use slab::Slab;
use smallvec::SmallVec;

// ─── Ids ─────────────────────────────────────────────────────────────────────

/// Identifier of an effect slot. Ordered by creation (generation).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct EffectId {
    pub(crate) index: u32,
    pub(crate) generation: u64,
}

impl PartialOrd for EffectId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EffectId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.generation.cmp(&other.generation)
    }
}

/// Identifier of an observable slot.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ObservableId {
    pub(crate) index: u32,
    pub(crate) generation: u64,
}

thread_local! {
    static NEXT_GENERATION: Cell<u64> = const { Cell::new(1) };
    static EFFECTS: RefCell<Slab<EffectSlot>> = RefCell::new(Slab::new());
    static OBSERVABLES: RefCell<Slab<ObservableSlot>> = RefCell::new(Slab::new());
    static ACTIVE_EFFECTS: RefCell<Vec<Option<EffectId>>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.with(|g| {
        let v = g.get();
        g.set(v + 1);
        v
    })
}

// ─── Effect arena ────────────────────────────────────────────────────────────

/// Backing storage for one effect.
pub(crate) struct EffectSlot {
    pub(crate) generation: u64,
    /// The computation. Taken out of the slot for the duration of a run so
    /// the arena is not borrowed while user code executes.
    pub(crate) computation: Option<Box<dyn FnMut() -> Value>>,
    /// Custom scheduler callback; invoked instead of a synchronous re-run
    /// when a dependency notifies this effect.
    pub(crate) scheduler: Option<Box<dyn Fn()>>,
    /// Cleanup hook, invoked exactly once by `stop`.
    pub(crate) on_stop: Option<Box<dyn FnOnce()>>,
    /// Cleared by `stop`; a stopped effect never re-registers dependencies.
    pub(crate) active: bool,
    /// True while the computation is checked out of the slot.
    pub(crate) running: bool,
    /// Strong handle count; the slot is released when this reaches zero.
    pub(crate) handles: u32,
    /// `(observable, path)` pairs this effect registered during its latest
    /// run. Pruned wholesale before every run.
    pub(crate) deps: SmallVec<[(ObservableId, String); 4]>,
}

pub(crate) fn with_effects<R>(f: impl FnOnce(&mut Slab<EffectSlot>) -> R) -> R {
    EFFECTS.with(|e| f(&mut e.borrow_mut()))
}

pub(crate) fn insert_effect(slot: EffectSlot) -> EffectId {
    let generation = slot.generation;
    let index = with_effects(|effects| effects.insert(slot)) as u32;
    EffectId { index, generation }
}

/// Run `f` against the slot behind `id`, if it is still live.
pub(crate) fn with_effect_slot<R>(
    id: EffectId,
    f: impl FnOnce(&mut EffectSlot) -> R,
) -> Option<R> {
    with_effects(|effects| {
        effects
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .map(f)
    })
}

/// Release the slot if nothing references it and it is not mid-run.
///
/// The slot is moved out of the arena and dropped only after the borrow
/// ends: its computation may own other reactive handles (a `Computed`
/// watch source, an `Observable` clone) whose `Drop` re-enters the arena.
pub(crate) fn release_effect_if_unused(id: EffectId) {
    let release = with_effect_slot(id, |slot| slot.handles == 0 && !slot.running).unwrap_or(false);
    if !release {
        return;
    }
    let slot = with_effects(|effects| effects.remove(id.index as usize));
    drop(slot);
}

// ─── Observable arena ────────────────────────────────────────────────────────

/// Backing storage for one observable container.
pub(crate) struct ObservableSlot {
    pub(crate) generation: u64,
    pub(crate) value: Value,
    /// path -> effects registered on that path.
    pub(crate) deps: AHashMap<String, AHashSet<EffectId>>,
    pub(crate) handles: u32,
}

pub(crate) fn with_observables<R>(f: impl FnOnce(&mut Slab<ObservableSlot>) -> R) -> R {
    OBSERVABLES.with(|o| f(&mut o.borrow_mut()))
}

pub(crate) fn insert_observable(slot: ObservableSlot) -> ObservableId {
    let generation = slot.generation;
    let index = with_observables(|obs| obs.insert(slot)) as u32;
    ObservableId { index, generation }
}

pub(crate) fn with_observable_slot<R>(
    id: ObservableId,
    f: impl FnOnce(&mut ObservableSlot) -> R,
) -> Option<R> {
    with_observables(|obs| {
        obs.get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .map(f)
    })
}

/// Same drop-outside-the-borrow discipline as [`release_effect_if_unused`].
pub(crate) fn release_observable_if_unused(id: ObservableId) {
    let release = with_observable_slot(id, |slot| slot.handles == 0).unwrap_or(false);
    if !release {
        return;
    }
    let slot = with_observables(|obs| obs.remove(id.index as usize));
    drop(slot);
}

// ─── Active effect stack ─────────────────────────────────────────────────────

/// The effect currently collecting dependencies, if any.
///
/// `None` entries on the stack mark untracked windows (see
/// [`untracked`](crate::effect::untracked)).
pub(crate) fn current_effect() -> Option<EffectId> {
    ACTIVE_EFFECTS.with(|stack| stack.borrow().last().copied().flatten())
}

/// True if `id` is anywhere on the active stack (used to suppress an effect
/// notifying itself from inside its own run).
pub(crate) fn effect_is_running(id: EffectId) -> bool {
    ACTIVE_EFFECTS.with(|stack| stack.borrow().iter().any(|e| *e == Some(id)))
}

/// Scoped push onto the active effect stack; pops on drop, panic included.
pub(crate) struct TrackGuard {
    depth: usize,
}

impl TrackGuard {
    pub(crate) fn enter(entry: Option<EffectId>) -> Self {
        let depth = ACTIVE_EFFECTS.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(entry);
            stack.len()
        });
        Self { depth }
    }
}

impl Drop for TrackGuard {
    fn drop(&mut self) {
        ACTIVE_EFFECTS.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(stack.len(), self.depth, "unbalanced tracking stack");
            stack.pop();
        });
    }
}
