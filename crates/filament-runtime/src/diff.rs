#![forbid(unsafe_code)]

//! Structural diffing for render payloads.
//!
//! [`diff_and_clone`] compares a new value against the previously shipped one
//! and produces a map of relative sub-paths to changed values, sized so that
//! applying the map to the old value reproduces the new one. The relative
//! keys compose with an absolute prefix by plain concatenation: `""` (replace
//! the whole value), `".field"`, `"[3]"`, `".items[0].name"`.
//!
//! # Patch granularity
//!
//! Additions are expressible as path patches, removals are not: a deleted
//! object key or a shrunken array forces the enclosing container to ship
//! whole. Appended array elements and added object keys patch at their own
//! paths. When a container ships whole, nothing beneath it is reported
//! separately.

use ahash::AHashMap;
use serde_json::Value;

use filament_reactive::path::set_by_path;

/// Outcome of diffing a new value against the previously shipped one.
#[derive(Debug)]
pub struct DiffResult {
    /// Deep clone of the new value, safe to retain as the next baseline.
    pub clone: Value,
    /// Relative sub-path → changed value. Empty when nothing changed; the
    /// `""` key means the whole value must be replaced.
    pub diff_data: AHashMap<String, Value>,
}

impl DiffResult {
    pub fn changed(&self) -> bool {
        !self.diff_data.is_empty()
    }
}

/// Diff `new` against `old`, producing minimal path patches.
pub fn diff_and_clone(new: &Value, old: &Value) -> DiffResult {
    let mut diff_data = AHashMap::new();
    walk(new, old, "", &mut diff_data);
    DiffResult {
        clone: new.clone(),
        diff_data,
    }
}

fn walk(new: &Value, old: &Value, cur_path: &str, out: &mut AHashMap<String, Value>) -> bool {
    match (new, old) {
        (Value::Object(new_map), Value::Object(old_map)) => {
            // A removed key cannot be patched; ship the container.
            if old_map.keys().any(|k| !new_map.contains_key(k)) {
                out.insert(cur_path.to_string(), new.clone());
                return true;
            }
            let mut changed = false;
            for (key, child) in new_map {
                let child_path = format!("{cur_path}.{key}");
                match old_map.get(key) {
                    Some(old_child) => changed |= walk(child, old_child, &child_path, out),
                    None => {
                        out.insert(child_path, child.clone());
                        changed = true;
                    }
                }
            }
            changed
        }
        (Value::Array(new_items), Value::Array(old_items)) => {
            // A shrunken array cannot be patched element-wise.
            if new_items.len() < old_items.len() {
                out.insert(cur_path.to_string(), new.clone());
                return true;
            }
            let mut changed = false;
            for (index, child) in new_items.iter().enumerate() {
                let child_path = format!("{cur_path}[{index}]");
                match old_items.get(index) {
                    Some(old_child) => changed |= walk(child, old_child, &child_path, out),
                    None => {
                        out.insert(child_path, child.clone());
                        changed = true;
                    }
                }
            }
            changed
        }
        _ if new == old => false,
        _ => {
            out.insert(cur_path.to_string(), new.clone());
            true
        }
    }
}

/// Apply a relative diff (as produced by [`diff_and_clone`]) to a value.
pub fn apply_diff(target: &mut Value, diff_data: &AHashMap<String, Value>) {
    for (sub_path, value) in diff_data {
        set_by_path(target, sub_path, value.clone());
    }
}

/// Drop render-data keys that are covered by a present ancestor key, so one
/// payload never writes a subtree twice.
pub fn pre_process_render_data(data: AHashMap<String, Value>) -> AHashMap<String, Value> {
    let keys: Vec<String> = data.keys().cloned().collect();
    data.into_iter()
        .filter(|(key, _)| !keys.iter().any(|other| is_ancestor_key(other, key)))
        .collect()
}

/// True when `ancestor` is a proper path prefix of `key` ending at a
/// segment boundary (`"a"` covers `"a.b"` and `"a[0]"`, not `"ab"`).
fn is_ancestor_key(ancestor: &str, key: &str) -> bool {
    key != ancestor
        && key.starts_with(ancestor)
        && matches!(key.as_bytes().get(ancestor.len()), Some(b'.') | Some(b'['))
}
