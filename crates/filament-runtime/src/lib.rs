#![forbid(unsafe_code)]

//! Component runtime for Filament.
//!
//! Where [`filament_reactive`] provides the raw dependency graph, this crate
//! turns it into a component model:
//!
//! - [`ComponentProxy`]: options-driven lifecycle (setup → created →
//!   mounted → destroyed), props/data/computed/watchers, and the render
//!   effect bridging reactive state to a host view.
//! - [`diff`]: structural diffing that reduces render payloads to minimal
//!   `path → value` patches, plus the strict-diff baseline bookkeeping that
//!   tracks what the view already holds.
//! - [`RenderTarget`]: the seam to the host view layer. The runtime ships
//!   flat patch payloads and learns of completion through a callback; it
//!   never owns a UI.
//! - [`lifecycle`]: composition-style hook injection ([`on_mounted`] and
//!   friends) against the currently initializing instance.
//!
//! Rendering is pull-based and host-driven: writes mark the component's
//! render job dirty on the main queue, and the host decides when to call
//! [`filament_reactive::flush_jobs`].

pub mod config;
pub mod diff;
pub mod lifecycle;
pub mod proxy;
pub mod render;

pub use config::{Config, configure};
pub use diff::{DiffResult, apply_diff, diff_and_clone, pre_process_render_data};
pub use lifecycle::{
    HookKind, LifecycleState, current_instance, inject_hook, on_before_create, on_before_destroy,
    on_before_mount, on_created, on_destroyed, on_mounted, on_updated,
};
pub use proxy::{ComponentOptions, ComponentProxy, ForceUpdateOptions, WeakComponent};
pub use render::{RenderError, RenderTarget, RenderTask};
