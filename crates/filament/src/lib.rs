#![forbid(unsafe_code)]

//! Filament public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use filament_reactive as reactive;
pub use filament_runtime as runtime;

pub mod prelude {
    pub use filament_reactive::{
        Computed, EffectScope, FlushMode, Job, Observable, OnCleanup, ReactiveEffect, WatchHandle,
        WatchOptions, WatchSource, flush_jobs, is_flush_pending, next_tick, untracked, watch,
        watch_effect, watch_post_effect, watch_sync_effect,
    };
    pub use filament_runtime::{
        ComponentOptions, ComponentProxy, ForceUpdateOptions, HookKind, LifecycleState,
        RenderError, RenderTarget, RenderTask, configure, on_before_destroy, on_created,
        on_destroyed, on_mounted, on_updated,
    };
}
