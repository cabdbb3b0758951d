#![forbid(unsafe_code)]

//! The component proxy: options-driven lifecycle, reactive state, and
//! strict-diff partial re-render.
//!
//! A [`ComponentProxy`] owns a component's reactive world: its props and
//! data observables, computed properties, watchers, lifecycle hooks, and the
//! render effect that keeps the host view in sync. All of it lives inside
//! one detached [`EffectScope`], so [`ComponentProxy::destroy`] tears the
//! whole graph down in a single call.
//!
//! # Render pipeline
//!
//! The render effect runs the injected render function when one is present
//! (collecting exactly the paths the template touches), falling back to a
//! full read of every local key when there is none or when the injected
//! function panics. Either way the collected data goes through
//! [`process_render_data_with_strict_diff`](ComponentProxy), which maintains
//! the `mini_render_data` baseline of what the view last received and emits
//! only the path patches that actually changed. Re-renders are scheduled on
//! the main job queue under the component's creation-order uid, so parents
//! render before children within a flush.
//!
//! # Identity
//!
//! Component uids come from the scheduler's job-id counter: a component's
//! render job id *is* its uid, which makes render ordering deterministic and
//! global across watchers and components.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use ahash::{AHashMap, AHashSet};
use serde_json::{Map, Value};

use filament_reactive::error::call_with_error_handling;
use filament_reactive::path::{PathSeg, get_by_path, get_first_key, is_sub_path_of};
use filament_reactive::{
    Computed, EffectScope, Job, JobId, Observable, ReactiveEffect, WatchHandle, WatchOptions,
    WatchSource, next_job_id, next_tick, queue_job, untracked, watch,
};

use crate::config;
use crate::diff::{diff_and_clone, pre_process_render_data};
use crate::lifecycle::{self, HookKind, LifecycleState};
use crate::render::{RenderTarget, RenderTask};

type HookFn = Rc<dyn Fn(&ComponentProxy)>;
type InjectedRender = Box<dyn Fn(&ComponentProxy) -> AHashMap<String, Value>>;

/// Getter (and optional setter) for one computed property.
struct ComputedSpec {
    get: Box<dyn Fn(&ComponentProxy) -> Value>,
    set: Option<Box<dyn Fn(&ComponentProxy, Value)>>,
}

struct WatchSpec {
    source: String,
    handler: Box<dyn FnMut(&Value, &Value)>,
    options: WatchOptions,
}

/// Declarative component definition consumed by [`ComponentProxy::create`].
#[derive(Default)]
pub struct ComponentOptions {
    name: String,
    data: Value,
    data_fn: Option<Box<dyn FnOnce(&ComponentProxy) -> Value>>,
    props: Value,
    computed: Vec<(String, ComputedSpec)>,
    watchers: Vec<WatchSpec>,
    setup: Option<Box<dyn FnOnce(&ComponentProxy) -> Value>>,
    injected_render: Option<InjectedRender>,
    hooks: Vec<(HookKind, HookFn)>,
}

impl ComponentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Initial data object.
    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Late data factory, merged over [`data`](Self::data) at creation.
    pub fn data_fn(mut self, f: impl FnOnce(&ComponentProxy) -> Value + 'static) -> Self {
        self.data_fn = Some(Box::new(f));
        self
    }

    /// Externally-owned props object.
    pub fn props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    /// Read-only computed property.
    pub fn computed(mut self, key: impl Into<String>, get: impl Fn(&ComponentProxy) -> Value + 'static) -> Self {
        self.computed.push((
            key.into(),
            ComputedSpec {
                get: Box::new(get),
                set: None,
            },
        ));
        self
    }

    /// Computed property with a write path.
    pub fn computed_writable(
        mut self,
        key: impl Into<String>,
        get: impl Fn(&ComponentProxy) -> Value + 'static,
        set: impl Fn(&ComponentProxy, Value) + 'static,
    ) -> Self {
        self.computed.push((
            key.into(),
            ComputedSpec {
                get: Box::new(get),
                set: Some(Box::new(set)),
            },
        ));
        self
    }

    /// Options watcher on a data path, default (pre-flush) scheduling.
    pub fn watcher(
        self,
        source: impl Into<String>,
        handler: impl FnMut(&Value, &Value) + 'static,
    ) -> Self {
        self.watcher_with(source, handler, WatchOptions::default())
    }

    pub fn watcher_with(
        mut self,
        source: impl Into<String>,
        handler: impl FnMut(&Value, &Value) + 'static,
        options: WatchOptions,
    ) -> Self {
        self.watchers.push(WatchSpec {
            source: source.into(),
            handler: Box::new(handler),
            options,
        });
        self
    }

    /// Composition entry point. Runs before `data` exists; its returned
    /// object merges into component data.
    pub fn setup(mut self, f: impl FnOnce(&ComponentProxy) -> Value + 'static) -> Self {
        self.setup = Some(Box::new(f));
        self
    }

    /// Compiled render function: returns exactly the `path → value` pairs
    /// the view template reads. Absent, every local key is read in full.
    pub fn injected_render(
        mut self,
        f: impl Fn(&ComponentProxy) -> AHashMap<String, Value> + 'static,
    ) -> Self {
        self.injected_render = Some(Box::new(f));
        self
    }

    /// Attach a lifecycle hook.
    pub fn on(mut self, kind: HookKind, hook: impl Fn(&ComponentProxy) + 'static) -> Self {
        self.hooks.push((kind, Rc::new(hook)));
        self
    }
}

/// Options for [`ComponentProxy::force_update`].
#[derive(Default)]
pub struct ForceUpdateOptions {
    /// Run the render effect synchronously instead of queueing it.
    pub sync: bool,
    /// Invoked on the tick after the forced render flushes.
    pub callback: Option<Box<dyn FnOnce()>>,
}

struct ProxyInner {
    uid: JobId,
    name: String,
    state: Cell<LifecycleState>,
    scope: EffectScope,
    props: Observable,
    data: Observable,
    /// Snapshot of data as created, the strict-diff baseline for keys the
    /// view already holds from its static declaration.
    initial_data: RefCell<Value>,
    local_keys: RefCell<AHashSet<String>>,
    prop_keys: RefCell<AHashSet<String>>,
    computed: RefCell<AHashMap<String, Computed>>,
    hooks: RefCell<AHashMap<HookKind, Vec<HookFn>>>,
    watch_handles: RefCell<Vec<WatchHandle>>,
    /// What the view currently holds, keyed by render-data path.
    mini_render_data: RefCell<AHashMap<String, Value>>,
    force_update_data: RefCell<AHashMap<String, Value>>,
    force_update_all: Cell<bool>,
    current_render_task: RefCell<Option<RenderTask>>,
    render_effect: RefCell<Option<ReactiveEffect>>,
    render_job: RefCell<Option<Job>>,
    injected_render: RefCell<Option<InjectedRender>>,
    target: Rc<dyn RenderTarget>,
}

/// Handle to a live component. Clones share the instance.
#[derive(Clone)]
pub struct ComponentProxy {
    inner: Rc<ProxyInner>,
}

/// Non-owning component handle for closures that outlive the component.
#[derive(Clone)]
pub struct WeakComponent {
    inner: Weak<ProxyInner>,
}

impl WeakComponent {
    pub fn upgrade(&self) -> Option<ComponentProxy> {
        self.inner.upgrade().map(|inner| ComponentProxy { inner })
    }
}

impl ComponentProxy {
    /// Build a component from `options`, driving it through its creation
    /// lifecycle (setup → before-create → data/computed/watchers → created)
    /// and performing the initial render.
    pub fn create(options: ComponentOptions, target: Rc<dyn RenderTarget>) -> Self {
        let ComponentOptions {
            name,
            data,
            data_fn,
            props,
            computed,
            watchers,
            setup,
            injected_render,
            hooks,
        } = options;

        let props_value = match props {
            Value::Object(_) => props,
            Value::Null => Value::Object(Map::new()),
            other => {
                tracing::error!(component = %name, ?other, "props must be an object");
                Value::Object(Map::new())
            }
        };

        let proxy = Self {
            inner: Rc::new(ProxyInner {
                uid: next_job_id(),
                name,
                state: Cell::new(LifecycleState::BeforeCreate),
                scope: EffectScope::detached(),
                props: Observable::new(props_value.clone()),
                data: Observable::new(Value::Object(Map::new())),
                initial_data: RefCell::new(Value::Object(Map::new())),
                local_keys: RefCell::new(AHashSet::new()),
                prop_keys: RefCell::new(AHashSet::new()),
                computed: RefCell::new(AHashMap::new()),
                hooks: RefCell::new(AHashMap::new()),
                watch_handles: RefCell::new(Vec::new()),
                mini_render_data: RefCell::new(AHashMap::new()),
                force_update_data: RefCell::new(AHashMap::new()),
                force_update_all: Cell::new(false),
                current_render_task: RefCell::new(None),
                render_effect: RefCell::new(None),
                render_job: RefCell::new(None),
                injected_render: RefCell::new(injected_render),
                target,
            }),
        };

        for (kind, hook) in hooks {
            proxy.inner.hooks.borrow_mut().entry(kind).or_default().push(hook);
        }

        if let Value::Object(map) = &props_value {
            for key in map.keys() {
                proxy.claim_key(key, "props", false);
            }
        }

        let setup_result = setup.map(|setup| {
            let _guard = lifecycle::enter_instance(&proxy);
            call_with_error_handling("setup function", || setup(&proxy)).unwrap_or(Value::Null)
        });

        proxy.call_hook(HookKind::BeforeCreate);

        {
            let _guard = lifecycle::enter_instance(&proxy);
            proxy.init_data(data, data_fn, setup_result);
            proxy.init_computed(computed);
            proxy.init_watchers(watchers);
        }

        proxy.inner.state.set(LifecycleState::Created);
        proxy.call_hook(HookKind::Created);
        proxy.init_render();
        proxy
    }

    /// Creation-order identity; doubles as the render job id.
    pub fn uid(&self) -> u64 {
        self.inner.uid.as_u64()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.state.get() == LifecycleState::Mounted
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.get() == LifecycleState::Destroyed
    }

    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn scope(&self) -> &EffectScope {
        &self.inner.scope
    }

    /// The settle signal for the most recent render pass, if any.
    pub fn render_task(&self) -> Option<RenderTask> {
        self.inner.current_render_task.borrow().clone()
    }

    // ─── Reactive state access ───

    /// Tracked read, resolved across computed properties, props, and data
    /// by the path's first key.
    pub fn get(&self, path: &str) -> Value {
        let first = get_first_key(path);
        let computed = self.inner.computed.borrow().get(first).cloned();
        if let Some(computed) = computed {
            let value = computed.get();
            if path == first {
                return value;
            }
            return get_by_path(&value, &path[first.len()..])
                .cloned()
                .unwrap_or(Value::Null);
        }
        if self.inner.prop_keys.borrow().contains(first) {
            return self.inner.props.get(path);
        }
        self.inner.data.get(path)
    }

    /// Write, routed to a computed setter, props, or data by the first key.
    pub fn set(&self, path: &str, value: Value) {
        let first = get_first_key(path);
        let computed = self.inner.computed.borrow().get(first).cloned();
        if let Some(computed) = computed {
            if path == first {
                computed.set(value);
            } else {
                tracing::warn!(path, "cannot write into a computed property sub-path");
            }
            return;
        }
        if self.inner.prop_keys.borrow().contains(first) {
            self.inner.props.set(path, value);
            return;
        }
        self.inner.data.set(path, value);
    }

    /// Remove a data path (object key or array element).
    pub fn delete(&self, path: &str) {
        self.inner.data.delete(path);
    }

    /// Append to a data array.
    pub fn push(&self, path: &str, value: Value) {
        self.inner.data.push(path, value);
    }

    /// Splice a data array.
    pub fn splice(&self, path: &str, start: usize, delete_count: usize, items: Vec<Value>) {
        self.inner.data.splice(path, start, delete_count, items);
    }

    /// Watch a state path; the handler receives `(new, previous)`.
    ///
    /// The watcher is owned by the returned handle *and* by the component's
    /// scope: dropping the handle or destroying the component stops it.
    pub fn watch_path(
        &self,
        path: &str,
        mut handler: impl FnMut(&Value, &Value) + 'static,
        options: WatchOptions,
    ) -> WatchHandle {
        let weak = self.downgrade();
        let path = path.to_string();
        let getter = move || {
            weak.upgrade()
                .map(|proxy| proxy.get(&path))
                .unwrap_or(Value::Null)
        };
        let _guard = self.inner.scope.enter();
        watch(
            WatchSource::getter(getter),
            move |new, old, _| handler(new, old),
            options,
        )
    }

    /// Schedule `f` for after the in-progress (or next) flush completes.
    pub fn next_tick(&self, f: impl FnOnce() + 'static) {
        next_tick(f);
    }

    // ─── Lifecycle ───

    pub(crate) fn add_hook(&self, kind: HookKind, hook: impl Fn(&ComponentProxy) + 'static) {
        self.inner.hooks.borrow_mut().entry(kind).or_default().push(Rc::new(hook));
    }

    fn call_hook(&self, kind: HookKind) {
        let hooks: Vec<HookFn> = self
            .inner
            .hooks
            .borrow()
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        for hook in hooks {
            let _guard = lifecycle::enter_instance(self);
            call_with_error_handling("lifecycle hook", || hook(self));
        }
    }

    /// Host signal: the view attached. Fires before-mount and mounted hooks
    /// and resolves the initial render task. Idempotent.
    pub fn mounted(&self) {
        if self.inner.state.get() == LifecycleState::Created {
            self.inner.state.set(LifecycleState::Mounted);
            self.call_hook(HookKind::BeforeMount);
            self.call_hook(HookKind::Mounted);
            let task = self.inner.current_render_task.borrow().clone();
            if let Some(task) = task {
                task.resolve();
            }
        }
    }

    /// Tear down the component's whole reactive graph.
    pub fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }
        self.call_hook(HookKind::BeforeDestroy);
        self.inner.scope.stop();
        self.inner.watch_handles.borrow_mut().clear();
        *self.inner.render_effect.borrow_mut() = None;
        *self.inner.render_job.borrow_mut() = None;
        self.call_hook(HookKind::Destroyed);
        self.inner.state.set(LifecycleState::Destroyed);
    }

    // ─── Initialization ───

    fn claim_key(&self, key: &str, owner: &str, local: bool) {
        if config::is_reserved_key(key) {
            tracing::error!(
                key,
                owner,
                component = %self.inner.name,
                "key is reserved by the host view layer, please rename it"
            );
            return;
        }
        let taken = self.inner.prop_keys.borrow().contains(key)
            || self.inner.local_keys.borrow().contains(key)
            || self.inner.computed.borrow().contains_key(key);
        if taken {
            tracing::error!(
                key,
                owner,
                component = %self.inner.name,
                "key already exists on this component, please rename it"
            );
            return;
        }
        if local {
            self.inner.local_keys.borrow_mut().insert(key.to_string());
        } else {
            self.inner.prop_keys.borrow_mut().insert(key.to_string());
        }
    }

    fn init_data(
        &self,
        data: Value,
        data_fn: Option<Box<dyn FnOnce(&ComponentProxy) -> Value>>,
        setup_result: Option<Value>,
    ) {
        let mut initial = match data {
            Value::Object(map) => Value::Object(map),
            Value::Null => Value::Object(Map::new()),
            other => {
                tracing::error!(component = %self.inner.name, ?other, "data must be an object");
                Value::Object(Map::new())
            }
        };
        if let Some(data_fn) = data_fn {
            match call_with_error_handling("data function", || data_fn(self)) {
                Some(Value::Object(extra)) => {
                    let root = initial.as_object_mut().expect("initial data is an object");
                    for (key, value) in extra {
                        root.insert(key, value);
                    }
                }
                Some(other) => {
                    tracing::error!(component = %self.inner.name, ?other, "data function must return an object");
                }
                None => {}
            }
        }
        if let Some(Value::Object(setup_map)) = setup_result {
            let root = initial.as_object_mut().expect("initial data is an object");
            for (key, value) in setup_map {
                self.claim_key(&key, "setup result", true);
                root.insert(key, value);
            }
        } else if let Some(other) = setup_result {
            if other != Value::Null {
                tracing::error!(component = %self.inner.name, ?other, "setup must return an object");
            }
        }
        if let Value::Object(map) = &initial {
            for key in map.keys() {
                if !self.inner.local_keys.borrow().contains(key) {
                    self.claim_key(key, "data", true);
                }
            }
        }
        *self.inner.initial_data.borrow_mut() = initial.clone();
        self.inner.data.set("", initial);
    }

    fn init_computed(&self, specs: Vec<(String, ComputedSpec)>) {
        for (key, spec) in specs {
            self.claim_key(&key, "computed", true);
            let weak = self.downgrade();
            let get = spec.get;
            let getter = move || {
                weak.upgrade()
                    .map(|proxy| get(&proxy))
                    .unwrap_or(Value::Null)
            };
            let computed = match spec.set {
                Some(set) => {
                    let weak = self.downgrade();
                    Computed::writable(getter, move |value| {
                        if let Some(proxy) = weak.upgrade() {
                            set(&proxy, value);
                        }
                    })
                }
                None => Computed::new(getter),
            };
            self.inner.computed.borrow_mut().insert(key, computed);
        }
    }

    fn init_watchers(&self, specs: Vec<WatchSpec>) {
        for WatchSpec {
            source,
            mut handler,
            options,
        } in specs
        {
            let weak = self.downgrade();
            let getter = move || {
                weak.upgrade()
                    .map(|proxy| proxy.get(&source))
                    .unwrap_or(Value::Null)
            };
            let handle = watch(
                WatchSource::getter(getter),
                move |new, old, _| handler(new, old),
                options,
            );
            self.inner.watch_handles.borrow_mut().push(handle);
        }
    }

    fn init_render(&self) {
        let weak = self.downgrade();
        let effect = {
            let _guard = self.inner.scope.enter();
            ReactiveEffect::new(move || {
                if let Some(proxy) = weak.upgrade() {
                    proxy.render_pass();
                }
                Value::Null
            })
        };
        let weak_effect = effect.downgrade();
        let job = Job::with_id(self.inner.uid, move || {
            weak_effect.run();
        });
        {
            let job = job.clone();
            effect.set_scheduler(move || queue_job(&job));
        }
        *self.inner.render_job.borrow_mut() = Some(job);
        *self.inner.render_effect.borrow_mut() = Some(effect.clone());
        effect.run();
    }

    // ─── Rendering ───

    fn render_pass(&self) {
        let injected = self.inner.injected_render.borrow_mut().take();
        match injected {
            Some(render) => {
                let collected = call_with_error_handling("render function", || render(self));
                *self.inner.injected_render.borrow_mut() = Some(render);
                match collected {
                    Some(render_data) => self.render_with_data(render_data),
                    None => {
                        tracing::warn!(
                            component = %self.inner.name,
                            "render function failed, degrading to full-data render"
                        );
                        self.render_full();
                    }
                }
            }
            None => self.render_full(),
        }
    }

    fn render_full(&self) {
        let keys: Vec<String> = self.inner.local_keys.borrow().iter().cloned().collect();
        let mut render_data = AHashMap::new();
        for key in keys {
            let value = self.get(&key);
            render_data.insert(key, value);
        }
        let payload = self.process_render_data_with_strict_diff(render_data);
        self.do_render(payload);
    }

    fn render_with_data(&self, render_data: AHashMap<String, Value>) {
        let render_data = pre_process_render_data(render_data);
        let payload = self.process_render_data_with_strict_diff(render_data);
        self.do_render(payload);
    }

    /// Diff collected render data against what the view last received,
    /// producing the minimal `path → value` payload.
    fn process_render_data_with_strict_diff(
        &self,
        render_data: AHashMap<String, Value>,
    ) -> AHashMap<String, Value> {
        let use_strict = config::use_strict_diff();
        let mut result = AHashMap::new();
        for (key, data) in render_data {
            let first_key = get_first_key(&key).to_string();
            if !self.inner.local_keys.borrow().contains(&first_key) {
                continue;
            }
            let mut mini = self.inner.mini_render_data.borrow_mut();
            if let Some(previous) = mini.get(&key) {
                let diffed = diff_and_clone(&data, previous);
                if diffed.changed() {
                    mini.insert(key.clone(), diffed.clone.clone());
                    if use_strict {
                        expand_diff(&mut result, &key, diffed.diff_data);
                    } else {
                        result.insert(key.clone(), diffed.clone);
                    }
                }
            } else {
                let mut processed = false;
                let mini_keys: Vec<String> = mini.keys().cloned().collect();
                for tar_key in &mini_keys {
                    if is_sub_path_of(tar_key, &key).is_some() {
                        // The new key supersedes a previously shipped
                        // descendant; replace it wholesale.
                        mini.remove(tar_key);
                        mini.insert(key.clone(), data.clone());
                        result.insert(key.clone(), data.clone());
                        processed = true;
                        continue;
                    }
                    if let Some(sub_path) = is_sub_path_of(&key, tar_key) {
                        // The new key lives inside previously shipped data;
                        // patch it in place and diff against it.
                        let baseline = mini.get_mut(tar_key).expect("key listed above");
                        let slot = ensure_path_mut(baseline, &sub_path);
                        let diffed = diff_and_clone(&data, slot);
                        if diffed.changed() {
                            *slot = diffed.clone.clone();
                            if use_strict {
                                expand_diff(&mut result, &key, diffed.diff_data);
                            } else {
                                result.insert(key.clone(), diffed.clone);
                            }
                        }
                        processed = true;
                        break;
                    }
                }
                if !processed {
                    let baseline = {
                        let initial = self.inner.initial_data.borrow();
                        get_by_path(&initial, &first_key).is_some().then(|| {
                            get_by_path(&initial, &key).cloned().unwrap_or(Value::Null)
                        })
                    };
                    match baseline {
                        // The view already holds this key from its static
                        // declaration; ship only what differs from it.
                        Some(baseline) => {
                            let diffed = diff_and_clone(&data, &baseline);
                            mini.insert(key.clone(), diffed.clone.clone());
                            if diffed.changed() {
                                if use_strict {
                                    expand_diff(&mut result, &key, diffed.diff_data);
                                } else {
                                    result.insert(key.clone(), diffed.clone);
                                }
                            }
                        }
                        None => {
                            mini.insert(key.clone(), data.clone());
                            result.insert(key.clone(), data.clone());
                        }
                    }
                }
            }
            if self.inner.force_update_all.get() {
                self.inner
                    .force_update_data
                    .borrow_mut()
                    .insert(key.clone(), data.clone());
            }
        }
        result
    }

    fn do_render(&self, mut data: AHashMap<String, Value>) {
        let force = std::mem::take(&mut *self.inner.force_update_data.borrow_mut());
        let is_empty = data.is_empty() && force.is_empty();
        let render_task = self.create_render_task(is_empty);

        if is_empty {
            return;
        }
        if !force.is_empty() {
            data.extend(force);
            self.inner.force_update_all.set(false);
        }

        let mut payload = Map::new();
        for (key, value) in data {
            payload.insert(key, value);
        }

        let weak = self.downgrade();
        let mounted = self.is_mounted();
        let done: Box<dyn FnOnce()> = Box::new(move || {
            // Hosts may acknowledge synchronously, i.e. inside the render
            // effect; reads in user callbacks must not register on it.
            untracked(|| {
                if mounted {
                    if let Some(proxy) = weak.upgrade() {
                        proxy.call_hook(HookKind::Updated);
                    }
                    if let Some(task) = render_task {
                        task.resolve();
                    }
                }
            });
        });
        if let Err(err) = self.inner.target.render(Value::Object(payload), done) {
            tracing::error!(component = %self.inner.name, error = %err, "render dispatch failed");
        }
    }

    fn create_render_task(&self, is_empty: bool) -> Option<RenderTask> {
        let has_current = self.inner.current_render_task.borrow().is_some();
        if (!self.is_mounted() && has_current) || (self.is_mounted() && is_empty) {
            return None;
        }
        let task = RenderTask::new();
        *self.inner.current_render_task.borrow_mut() = Some(task.clone());
        Some(task)
    }

    /// Bypass the dependency graph: write `data` through (or mark everything
    /// stale when `None`) and ship it on the next render regardless of
    /// diffing.
    pub fn force_update(&self, data: Option<AHashMap<String, Value>>, options: ForceUpdateOptions) {
        match data {
            Some(map) => {
                for (key, value) in &map {
                    if !self
                        .inner
                        .local_keys
                        .borrow()
                        .contains(get_first_key(key))
                    {
                        tracing::warn!(
                            key,
                            component = %self.inner.name,
                            "force-update data includes a props/computed key, which may yield an unexpected result"
                        );
                    }
                    self.inner.data.set(key, value.clone());
                }
                self.inner.force_update_data.borrow_mut().extend(map);
            }
            None => self.inner.force_update_all.set(true),
        }
        if let Some(callback) = options.callback {
            next_tick(callback);
        }
        let effect = self.inner.render_effect.borrow().clone();
        let Some(effect) = effect else {
            return;
        };
        if options.sync {
            effect.run();
        } else {
            let job = self.inner.render_job.borrow().clone();
            if let Some(job) = job {
                queue_job(&job);
            }
        }
    }
}

/// Concatenate relative diff sub-paths onto an absolute render-data key.
fn expand_diff(result: &mut AHashMap<String, Value>, key: &str, diff_data: AHashMap<String, Value>) {
    for (sub_path, value) in diff_data {
        result.insert(format!("{key}{sub_path}"), value);
    }
}

/// Walk `segments` below `root`, creating intermediate containers, and
/// return the final slot.
fn ensure_path_mut<'v>(root: &'v mut Value, segments: &[PathSeg]) -> &'v mut Value {
    let mut current = root;
    for segment in segments {
        current = match segment {
            PathSeg::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                current
                    .as_object_mut()
                    .expect("made an object above")
                    .entry(key.clone())
                    .or_insert(Value::Null)
            }
            PathSeg::Index(index) => {
                if !current.is_array() {
                    *current = Value::Array(Vec::new());
                }
                let items = current.as_array_mut().expect("made an array above");
                while items.len() <= *index {
                    items.push(Value::Null);
                }
                &mut items[*index]
            }
        };
    }
    current
}
