#![forbid(unsafe_code)]

//! Host-driven flush scheduler.
//!
//! Three queues of pending jobs — pre-flush, main, post-flush — each deduped
//! by job identity and drained in ascending identity order (high-priority
//! jobs first). The host drives draining by calling [`flush_jobs`] from its
//! event loop, typically when [`is_flush_pending`] reports work (or when the
//! [`on_flush_scheduled`] wake hook fires).
//!
//! # Ordering guarantees
//!
//! 1. Within one flush, pre-flush jobs precede main jobs precede post-flush
//!    jobs.
//! 2. Within a queue, jobs run in ascending identity order (creation order),
//!    except jobs marked high-priority, which sort first.
//! 3. Jobs enqueued during a flush are visible to the same flush: a job
//!    landing in the queue currently being drained is slotted after the
//!    cursor; anything else is picked up by a subsequent pass of the same
//!    flush.
//!
//! # Recursion guard
//!
//! A job re-enqueueing *itself* mid-run is dropped unless it opted into
//! recursion with [`Job::allow_recurse`]. The guard is per-job rather than
//! global; the chosen semantics are pinned down by the tests in this module.
//!
//! # Failure policy
//!
//! A panicking job is contained by the error boundary and reported; the
//! remaining jobs in the batch still run. [`next_tick`] callbacks fire after
//! the in-progress (or next) flush fully completes; all callers share one
//! pending flush.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::call_with_error_handling;

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::new());
    static NEXT_JOB_ID: RefCell<u64> = const { RefCell::new(1) };
}

/// Monotonically increasing job identity, assigned at creation.
///
/// Identity doubles as the ordering key: lower ids flush first.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct JobId(u64);

impl JobId {
    /// Raw ordering key.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Allocate the next job identity.
///
/// Component proxies allocate their creation-order uid from this same
/// counter, so render jobs interleave deterministically with watcher jobs.
pub fn next_job_id() -> JobId {
    NEXT_JOB_ID.with(|n| {
        let mut n = n.borrow_mut();
        let id = *n;
        *n += 1;
        JobId(id)
    })
}

/// A schedulable unit: a stable identity plus a re-runnable callback.
///
/// Clones share the same identity and callback; enqueueing the same job
/// twice before a flush executes it once.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    allow_recurse: bool,
    high_priority: bool,
    callback: Rc<RefCell<dyn FnMut()>>,
}

impl Job {
    /// Create a job with a fresh identity.
    pub fn new(callback: impl FnMut() + 'static) -> Self {
        Self::with_id(next_job_id(), callback)
    }

    /// Create a job with a caller-assigned identity (e.g. a component uid).
    pub fn with_id(id: JobId, callback: impl FnMut() + 'static) -> Self {
        Self {
            id,
            allow_recurse: false,
            high_priority: false,
            callback: Rc::new(RefCell::new(callback)),
        }
    }

    /// Allow this job to re-enqueue itself while it is being flushed.
    pub fn allow_recurse(mut self, allow: bool) -> Self {
        self.allow_recurse = allow;
        self
    }

    /// Sort this job ahead of normal jobs regardless of identity.
    pub fn high_priority(mut self, high: bool) -> Self {
        self.high_priority = high;
        self
    }

    /// This job's identity.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Run the callback immediately through the error boundary, bypassing
    /// the queues (used by synchronous watchers).
    pub fn run_now(&self) {
        let callback = Rc::clone(&self.callback);
        call_with_error_handling("scheduled job", || (callback.borrow_mut())());
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("allow_recurse", &self.allow_recurse)
            .field("high_priority", &self.high_priority)
            .finish()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum QueueKind {
    Pre,
    Main,
    Post,
}

struct JobQueue {
    jobs: Vec<Job>,
    /// Index of the job currently running, while this queue drains.
    cursor: Option<usize>,
}

impl JobQueue {
    const fn new() -> Self {
        Self {
            jobs: Vec::new(),
            cursor: None,
        }
    }

    fn sort_pending(&mut self) {
        self.jobs
            .sort_by_key(|job| (!job.high_priority, job.id));
    }

    /// Dedup by identity, honoring the recursion guard: while draining, the
    /// currently running job is only visible to the duplicate scan when it
    /// did not opt into recursion.
    fn enqueue(&mut self, job: &Job) -> bool {
        let scan_from = match self.cursor {
            Some(cursor) if job.allow_recurse => cursor + 1,
            Some(cursor) => cursor,
            None => 0,
        };
        if self.jobs[scan_from.min(self.jobs.len())..]
            .iter()
            .any(|queued| queued.id == job.id)
        {
            return false;
        }
        match self.cursor {
            Some(cursor) => {
                // Mid-drain: keep the remainder sorted so the new job runs
                // in identity order within this pass. Insertion never goes
                // below cursor + 1 — the slot at the cursor is mid-run, and
                // anything before it already ran this pass.
                let insert_from = (cursor + 1).min(self.jobs.len());
                let insert_at = self.jobs[insert_from..]
                    .iter()
                    .position(|queued| {
                        (!queued.high_priority, queued.id) > (!job.high_priority, job.id)
                    })
                    .map(|offset| insert_from + offset)
                    .unwrap_or(self.jobs.len());
                self.jobs.insert(insert_at, job.clone());
            }
            None => self.jobs.push(job.clone()),
        }
        true
    }

    fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

struct SchedulerState {
    pre: JobQueue,
    main: JobQueue,
    post: JobQueue,
    is_flushing: bool,
    is_flush_pending: bool,
    tick_callbacks: Vec<Box<dyn FnOnce()>>,
    on_flush_scheduled: Option<Rc<dyn Fn()>>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            pre: JobQueue::new(),
            main: JobQueue::new(),
            post: JobQueue::new(),
            is_flushing: false,
            is_flush_pending: false,
            tick_callbacks: Vec::new(),
            on_flush_scheduled: None,
        }
    }

    fn queue(&mut self, kind: QueueKind) -> &mut JobQueue {
        match kind {
            QueueKind::Pre => &mut self.pre,
            QueueKind::Main => &mut self.main,
            QueueKind::Post => &mut self.post,
        }
    }
}

fn enqueue(kind: QueueKind, job: &Job) {
    let wake = SCHEDULER.with(|s| {
        let mut state = s.borrow_mut();
        state.queue(kind).enqueue(job);
        schedule_flush(&mut state)
    });
    if let Some(hook) = wake {
        hook();
    }
}

/// Mark a flush as pending; returns the wake hook to invoke (outside the
/// state borrow) when this is a fresh request.
fn schedule_flush(state: &mut SchedulerState) -> Option<Rc<dyn Fn()>> {
    if state.is_flush_pending || state.is_flushing {
        return None;
    }
    state.is_flush_pending = true;
    state.on_flush_scheduled.clone()
}

/// Enqueue onto the main job queue (render jobs).
pub fn queue_job(job: &Job) {
    enqueue(QueueKind::Main, job);
}

/// Enqueue onto the pre-flush queue (default watcher flush mode).
pub fn queue_pre_flush(job: &Job) {
    enqueue(QueueKind::Pre, job);
}

/// Enqueue onto the post-flush queue.
pub fn queue_post_flush(job: &Job) {
    enqueue(QueueKind::Post, job);
}

/// True when work is queued and no flush is currently draining it.
pub fn is_flush_pending() -> bool {
    SCHEDULER.with(|s| s.borrow().is_flush_pending)
}

/// True while [`flush_jobs`] is draining.
pub fn is_flushing() -> bool {
    SCHEDULER.with(|s| s.borrow().is_flushing)
}

/// Install a wake hook invoked whenever a flush first becomes pending, so a
/// host event loop can schedule a [`flush_jobs`] call.
pub fn on_flush_scheduled(hook: impl Fn() + 'static) {
    SCHEDULER.with(|s| s.borrow_mut().on_flush_scheduled = Some(Rc::new(hook)));
}

/// Register a callback to run once the in-progress (or next) flush fully
/// completes. Multiple callers share one pending flush.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    let wake = SCHEDULER.with(|s| {
        let mut state = s.borrow_mut();
        state.tick_callbacks.push(Box::new(callback));
        schedule_flush(&mut state)
    });
    if let Some(hook) = wake {
        hook();
    }
}

fn drain_queue(kind: QueueKind) {
    SCHEDULER.with(|s| {
        let mut state = s.borrow_mut();
        let queue = state.queue(kind);
        queue.sort_pending();
        queue.cursor = Some(0);
    });
    loop {
        let next = SCHEDULER.with(|s| {
            let mut state = s.borrow_mut();
            let queue = state.queue(kind);
            let cursor = queue.cursor.expect("cursor set while draining");
            queue.jobs.get(cursor).cloned()
        });
        let Some(job) = next else {
            break;
        };
        job.run_now();
        SCHEDULER.with(|s| {
            let mut state = s.borrow_mut();
            let queue = state.queue(kind);
            queue.cursor = Some(queue.cursor.expect("cursor set while draining") + 1);
        });
    }
    SCHEDULER.with(|s| {
        let mut state = s.borrow_mut();
        let queue = state.queue(kind);
        queue.jobs.clear();
        queue.cursor = None;
    });
}

/// Drain all queues: pre, then main, then post, looping until every queue is
/// empty, then fire [`next_tick`] callbacks. Re-entrant calls (from inside a
/// job) are no-ops; the outer drain picks up any new work.
pub fn flush_jobs() {
    let proceed = SCHEDULER.with(|s| {
        let mut state = s.borrow_mut();
        if state.is_flushing {
            return false;
        }
        state.is_flushing = true;
        state.is_flush_pending = false;
        true
    });
    if !proceed {
        return;
    }

    loop {
        drain_queue(QueueKind::Pre);
        drain_queue(QueueKind::Main);
        drain_queue(QueueKind::Post);
        let more = SCHEDULER.with(|s| {
            let state = s.borrow();
            !(state.pre.is_empty() && state.main.is_empty() && state.post.is_empty())
        });
        if !more {
            break;
        }
    }

    SCHEDULER.with(|s| s.borrow_mut().is_flushing = false);

    let callbacks = SCHEDULER.with(|s| std::mem::take(&mut s.borrow_mut().tick_callbacks));
    for callback in callbacks {
        call_with_error_handling("next_tick callback", callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_job(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Job {
        let log = Rc::clone(log);
        Job::new(move || log.borrow_mut().push(tag))
    }

    #[test]
    fn duplicate_enqueue_runs_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let job = recording_job(&log, "a");
        for _ in 0..5 {
            queue_job(&job);
        }
        flush_jobs();
        assert_eq!(log.borrow().len(), 1);

        // A later flush cycle may run it again.
        queue_job(&job);
        flush_jobs();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn jobs_run_in_identity_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = recording_job(&log, "first");
        let second = recording_job(&log, "second");
        // Enqueue out of creation order.
        queue_job(&second);
        queue_job(&first);
        flush_jobs();
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn high_priority_jobs_sort_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let normal = recording_job(&log, "normal");
        let urgent = recording_job(&log, "urgent").high_priority(true);
        queue_job(&normal);
        queue_job(&urgent);
        flush_jobs();
        assert_eq!(*log.borrow(), vec!["urgent", "normal"]);
    }

    #[test]
    fn pre_main_post_ordering() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let pre = recording_job(&log, "pre");
        let main = recording_job(&log, "main");
        let post = recording_job(&log, "post");
        queue_post_flush(&post);
        queue_job(&main);
        queue_pre_flush(&pre);
        flush_jobs();
        assert_eq!(*log.borrow(), vec!["pre", "main", "post"]);
    }

    #[test]
    fn jobs_enqueued_during_flush_run_in_same_flush() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let late = recording_job(&log, "late");
        let log2 = Rc::clone(&log);
        let seed = Job::new(move || {
            log2.borrow_mut().push("seed");
            queue_job(&late);
        });
        queue_job(&seed);
        flush_jobs();
        assert_eq!(*log.borrow(), vec!["seed", "late"]);
    }

    #[test]
    fn mid_flush_enqueue_of_an_older_job_does_not_rerun_the_enqueuer() {
        // The enqueued job's identity sorts *before* the running job's; it
        // must slot in after the cursor, not ahead of it.
        let log = Rc::new(RefCell::new(Vec::new()));
        let older = recording_job(&log, "older");
        let runs = Rc::new(RefCell::new(0));
        let runs2 = Rc::clone(&runs);
        let log2 = Rc::clone(&log);
        let older2 = older.clone();
        let newer = Job::new(move || {
            *runs2.borrow_mut() += 1;
            log2.borrow_mut().push("newer");
            queue_job(&older2);
        });
        queue_job(&newer);
        flush_jobs();
        assert_eq!(*runs.borrow(), 1);
        assert_eq!(*log.borrow(), vec!["newer", "older"]);
    }

    #[test]
    fn self_reenqueue_requires_opt_in() {
        // Without allow_recurse, a job re-enqueueing itself is dropped.
        let runs = Rc::new(RefCell::new(0));
        let job: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));
        let runs2 = Rc::clone(&runs);
        let job2 = Rc::clone(&job);
        *job.borrow_mut() = Some(Job::new(move || {
            *runs2.borrow_mut() += 1;
            let this = job2.borrow().clone().expect("job installed");
            queue_job(&this);
        }));
        let seed = job.borrow().clone().expect("job installed");
        queue_job(&seed);
        flush_jobs();
        assert_eq!(*runs.borrow(), 1);
    }

    #[test]
    fn self_reenqueue_with_opt_in_runs_again() {
        let runs = Rc::new(RefCell::new(0));
        let job: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));
        let runs2 = Rc::clone(&runs);
        let job2 = Rc::clone(&job);
        *job.borrow_mut() = Some(
            Job::new(move || {
                let mut runs = runs2.borrow_mut();
                *runs += 1;
                if *runs < 3 {
                    let this = job2.borrow().clone().expect("job installed");
                    queue_job(&this);
                }
            })
            .allow_recurse(true),
        );
        let seed = job.borrow().clone().expect("job installed");
        queue_job(&seed);
        flush_jobs();
        assert_eq!(*runs.borrow(), 3);
    }

    #[test]
    fn panicking_job_does_not_stop_the_batch() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let bad = Job::new(|| panic!("job failed"));
        let good = recording_job(&log, "good");
        queue_job(&bad);
        queue_job(&good);
        flush_jobs();
        assert_eq!(*log.borrow(), vec!["good"]);
    }

    #[test]
    fn next_tick_fires_after_flush_completes() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let job = recording_job(&log, "job");
        let log2 = Rc::clone(&log);
        queue_job(&job);
        next_tick(move || log2.borrow_mut().push("tick"));
        assert!(is_flush_pending());
        flush_jobs();
        assert_eq!(*log.borrow(), vec!["job", "tick"]);
        assert!(!is_flush_pending());
    }

    #[test]
    fn next_tick_without_jobs_still_fires() {
        let fired = Rc::new(RefCell::new(false));
        let fired2 = Rc::clone(&fired);
        next_tick(move || *fired2.borrow_mut() = true);
        flush_jobs();
        assert!(*fired.borrow());
    }

    #[test]
    fn reentrant_flush_is_a_noop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let after = recording_job(&log, "after");
        let log2 = Rc::clone(&log);
        let seed = Job::new(move || {
            log2.borrow_mut().push("seed");
            queue_job(&after);
            // Flushing from inside a job must not double-drain.
            flush_jobs();
        });
        queue_job(&seed);
        flush_jobs();
        assert_eq!(*log.borrow(), vec!["seed", "after"]);
    }

    #[test]
    fn wake_hook_fires_once_per_pending_flush() {
        let wakes = Rc::new(RefCell::new(0));
        let wakes2 = Rc::clone(&wakes);
        on_flush_scheduled(move || *wakes2.borrow_mut() += 1);
        let a = Job::new(|| {});
        let b = Job::new(|| {});
        queue_job(&a);
        queue_job(&b);
        assert_eq!(*wakes.borrow(), 1);
        flush_jobs();
        queue_job(&a);
        assert_eq!(*wakes.borrow(), 2);
        // Reset the hook so other tests on this thread are unaffected.
        SCHEDULER.with(|s| s.borrow_mut().on_flush_scheduled = None);
    }
}
