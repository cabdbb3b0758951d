#![forbid(unsafe_code)]

//! Fine-grained reactivity primitives for Filament.
//!
//! This crate implements the dependency-tracking half of the engine:
//!
//! - [`Observable`]: a path-addressed state container that records which
//!   effect read which property and notifies exactly those effects on write.
//! - [`ReactiveEffect`]: a re-runnable computation whose dependency set is
//!   recomputed on every run.
//! - [`EffectScope`]: a lifetime container that tears down a group of effects
//!   (and nested scopes) in one call.
//! - [`Computed`]: a lazily-evaluated, memoized derived value with its own
//!   dependent set.
//! - [`watch`] / [`watch_effect`]: declarative bridges from a source
//!   (getter, observable, computed, or an array of these) to a callback.
//! - The [`scheduler`]: three host-driven flush queues (pre, main, post)
//!   with identity-based dedup, ascending-identity ordering, and a
//!   [`next_tick`](scheduler::next_tick) completion signal.
//!
//! # Architecture
//!
//! All reactive metadata lives in thread-local arenas ([`registry`]):
//! observables hold the ids of their dependent effects, effects hold
//! `(observable, path)` pairs, and clearing either side is index-map removal
//! rather than pointer traversal. Handles ([`Observable`], [`ReactiveEffect`])
//! are cheap id wrappers with their own reference counts; the backing slot is
//! released when the last handle drops.
//!
//! State values are [`serde_json::Value`] trees addressed by dotted/bracketed
//! paths (`"list[0].name"`). There is no transparent property interception:
//! reads and writes go through an explicit `get(path)` / `set(path, value)`
//! API, and a tracked read registers the active effect on the path *and*
//! every descendant path of the returned subtree.
//!
//! # Concurrency
//!
//! Single-threaded cooperative scheduling. Every arena is `thread_local`;
//! effects run to completion and are never executed in parallel.

pub mod computed;
pub mod effect;
pub mod error;
pub mod observable;
pub mod path;
pub(crate) mod registry;
pub mod scheduler;
pub mod scope;
pub mod watch;

pub use computed::Computed;
pub use effect::{ReactiveEffect, WeakEffect, untracked};
pub use observable::Observable;
pub use scheduler::{
    Job, JobId, flush_jobs, is_flush_pending, is_flushing, next_job_id, next_tick,
    on_flush_scheduled, queue_job, queue_post_flush, queue_pre_flush,
};
pub use scope::EffectScope;
pub use watch::{
    FlushMode, OnCleanup, WatchHandle, WatchOptions, WatchSource, watch, watch_effect,
    watch_post_effect, watch_sync_effect,
};
