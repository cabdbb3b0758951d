#![forbid(unsafe_code)]

//! Runtime-wide configuration.
//!
//! Settings are thread-local, matching the single-threaded runtime: each
//! host thread configures its own runtime once at startup via [`configure`].

use std::cell::RefCell;

use ahash::AHashSet;

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Tunable runtime behavior.
#[derive(Clone, Debug)]
pub struct Config {
    /// Compute fine-grained path-level diffs for render payloads. When
    /// false, any changed top-level key ships its whole subtree.
    pub use_strict_diff: bool,
    /// Keys reserved by the host view layer; components may not claim them
    /// for data, props, or computed properties.
    pub reserved_keys: AHashSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_strict_diff: true,
            reserved_keys: AHashSet::new(),
        }
    }
}

/// Mutate this thread's runtime configuration.
pub fn configure(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|config| f(&mut config.borrow_mut()));
}

pub(crate) fn use_strict_diff() -> bool {
    CONFIG.with(|config| config.borrow().use_strict_diff)
}

pub(crate) fn is_reserved_key(key: &str) -> bool {
    CONFIG.with(|config| config.borrow().reserved_keys.contains(key))
}
