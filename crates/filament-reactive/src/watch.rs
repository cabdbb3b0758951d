#![forbid(unsafe_code)]

//! Declarative watchers: source → callback bridges over the effect system.
//!
//! [`watch`] observes a [`WatchSource`] (getter closure, [`Observable`],
//! [`Computed`], or a list of sources) and invokes a callback with the new
//! and previous values when the source changes. [`watch_effect`] is the
//! callback-free variant: one closure that both reads and reacts.
//!
//! # Flush modes
//!
//! - [`FlushMode::Pre`] (default): the callback is queued on the pre-flush
//!   queue, so rapid-fire writes coalesce into one invocation per flush and
//!   watchers observe state before render jobs run.
//! - [`FlushMode::Post`]: queued on the post-flush queue, after render jobs.
//! - [`FlushMode::Sync`]: the callback runs inside the write that triggered
//!   it, with no batching.
//!
//! # Change detection
//!
//! The previous value is a clone, so equality is meaningful: a non-deep
//! watcher whose source re-evaluates to an equal scalar does not fire.
//! Containers always count as changed. Watching an [`Observable`] directly
//! implies `deep`.
//!
//! Callbacks run through the error boundary; cleanup registered via
//! [`OnCleanup`] runs before the next invocation and on stop.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value;

use crate::computed::Computed;
use crate::effect::ReactiveEffect;
use crate::error::call_with_error_handling;
use crate::observable::Observable;
use crate::scheduler::{Job, queue_post_flush, queue_pre_flush};

/// When a watcher's callback runs relative to the flush cycle.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum FlushMode {
    /// Run synchronously inside the triggering write.
    Sync,
    /// Run on the pre-flush queue, before render jobs.
    #[default]
    Pre,
    /// Run on the post-flush queue, after render jobs.
    Post,
}

/// Options for [`watch`].
#[derive(Copy, Clone, Debug, Default)]
pub struct WatchOptions {
    /// Fire the callback once at setup (previous value is `Null`).
    pub immediate: bool,
    /// Fire on any notification, skipping the equality gate.
    pub deep: bool,
    pub flush: FlushMode,
}

/// What a watcher observes.
pub enum WatchSource {
    /// An arbitrary tracked computation.
    Getter(Box<dyn FnMut() -> Value>),
    /// A whole observable tree (implies `deep`).
    Observable(Observable),
    Computed(Computed),
    /// Several sources; values arrive as an array in source order.
    Multi(Vec<WatchSource>),
}

impl WatchSource {
    /// Wrap a getter closure.
    pub fn getter(f: impl FnMut() -> Value + 'static) -> Self {
        Self::Getter(Box::new(f))
    }

    fn evaluate(&mut self) -> Value {
        match self {
            Self::Getter(f) => f(),
            Self::Observable(obs) => obs.get(""),
            Self::Computed(computed) => computed.get(),
            Self::Multi(sources) => {
                Value::Array(sources.iter_mut().map(Self::evaluate).collect())
            }
        }
    }
}

impl From<Observable> for WatchSource {
    fn from(obs: Observable) -> Self {
        Self::Observable(obs)
    }
}

impl From<Computed> for WatchSource {
    fn from(computed: Computed) -> Self {
        Self::Computed(computed)
    }
}

impl From<Vec<WatchSource>> for WatchSource {
    fn from(sources: Vec<WatchSource>) -> Self {
        Self::Multi(sources)
    }
}

/// Registration point for per-invocation cleanup.
///
/// The registered closure runs before the next callback invocation and when
/// the watcher stops, whichever comes first. Registering again replaces the
/// pending closure.
#[derive(Clone, Default)]
pub struct OnCleanup {
    slot: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl OnCleanup {
    pub fn register(&self, f: impl FnOnce() + 'static) {
        *self.slot.borrow_mut() = Some(Box::new(f));
    }

    fn run_pending(&self) {
        if let Some(f) = self.slot.borrow_mut().take() {
            call_with_error_handling("watcher cleanup", f);
        }
    }
}

/// Owning handle to a running watcher. Dropping it stops the watcher.
pub struct WatchHandle {
    effect: ReactiveEffect,
}

impl WatchHandle {
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

/// Watch `source` and call `callback(new, previous, on_cleanup)` when it
/// changes, per `options`.
pub fn watch(
    source: impl Into<WatchSource>,
    mut callback: impl FnMut(&Value, &Value, &OnCleanup) + 'static,
    options: WatchOptions,
) -> WatchHandle {
    let mut source = source.into();
    let deep = options.deep || matches!(source, WatchSource::Observable(_));
    let is_multi = matches!(source, WatchSource::Multi(_));

    let effect = ReactiveEffect::new(move || source.evaluate());
    let cleanup = OnCleanup::default();
    {
        let cleanup = cleanup.clone();
        effect.set_on_stop(move || cleanup.run_pending());
    }

    let previous: Rc<RefCell<Value>> = Rc::new(RefCell::new(Value::Null));
    // An immediate watcher's first invocation skips the equality gate.
    let force_first = Rc::new(Cell::new(options.immediate));
    let weak = effect.downgrade();
    let job_previous = Rc::clone(&previous);
    let job_cleanup = cleanup.clone();
    let job = Job::new(move || {
        if !weak.is_active() {
            return;
        }
        let new = weak.run();
        let fire = force_first.take() || deep || changed(&new, &job_previous.borrow(), is_multi);
        if !fire {
            return;
        }
        let old = job_previous.borrow().clone();
        job_cleanup.run_pending();
        call_with_error_handling("watcher callback", || callback(&new, &old, &job_cleanup));
        *job_previous.borrow_mut() = new;
    })
    .allow_recurse(true);
    install_scheduler(&effect, &job, options.flush);

    if options.immediate {
        job.run_now();
    } else {
        *previous.borrow_mut() = effect.run();
    }
    WatchHandle { effect }
}

/// Run `f` immediately and re-run it (pre-flush) whenever anything it read
/// changes.
pub fn watch_effect(f: impl FnMut(&OnCleanup) + 'static) -> WatchHandle {
    watch_effect_with_flush(f, FlushMode::Pre)
}

/// [`watch_effect`] on the post-flush queue; the first run is queued too.
pub fn watch_post_effect(f: impl FnMut(&OnCleanup) + 'static) -> WatchHandle {
    watch_effect_with_flush(f, FlushMode::Post)
}

/// [`watch_effect`] that re-runs synchronously inside the triggering write.
pub fn watch_sync_effect(f: impl FnMut(&OnCleanup) + 'static) -> WatchHandle {
    watch_effect_with_flush(f, FlushMode::Sync)
}

fn watch_effect_with_flush(
    mut f: impl FnMut(&OnCleanup) + 'static,
    flush: FlushMode,
) -> WatchHandle {
    let cleanup = OnCleanup::default();
    let run_cleanup = cleanup.clone();
    let effect = ReactiveEffect::new(move || {
        run_cleanup.run_pending();
        f(&run_cleanup);
        Value::Null
    });
    {
        let cleanup = cleanup.clone();
        effect.set_on_stop(move || cleanup.run_pending());
    }
    let weak = effect.downgrade();
    let job = Job::new(move || {
        if weak.is_active() {
            weak.run();
        }
    });
    install_scheduler(&effect, &job, flush);
    match flush {
        FlushMode::Post => queue_post_flush(&job),
        _ => {
            effect.run();
        }
    }
    WatchHandle { effect }
}

fn install_scheduler(effect: &ReactiveEffect, job: &Job, flush: FlushMode) {
    let job = job.clone();
    match flush {
        FlushMode::Sync => effect.set_scheduler(move || job.run_now()),
        FlushMode::Pre => effect.set_scheduler(move || queue_pre_flush(&job)),
        FlushMode::Post => effect.set_scheduler(move || queue_post_flush(&job)),
    }
}

fn changed(new: &Value, old: &Value, is_multi: bool) -> bool {
    if is_multi {
        match (new, old) {
            (Value::Array(new), Value::Array(old)) => {
                new.len() != old.len()
                    || new.iter().zip(old).any(|(n, o)| value_changed(n, o))
            }
            _ => true,
        }
    } else {
        value_changed(new, old)
    }
}

/// Containers always count as changed; scalars compare by value.
fn value_changed(new: &Value, old: &Value) -> bool {
    matches!(new, Value::Object(_) | Value::Array(_)) || new != old
}
