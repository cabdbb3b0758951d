#![forbid(unsafe_code)]

//! Dotted/bracketed path utilities for [`serde_json::Value`] trees.
//!
//! Paths address nested state the way host render layers expect them:
//! `"a.b"` for object fields, `"list[0].name"` for array elements. The empty
//! path addresses the root.
//!
//! Numeric object-style segments (`"list.0"`) are accepted and treated as
//! indices when the value at that point is an array.

use serde_json::{Map, Value};

/// One segment of a parsed path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSeg {
    /// Object field access.
    Key(String),
    /// Array index access.
    Index(usize),
}

/// Parse `"a.b[2].c"` into segments. The empty path parses to no segments.
pub fn parse_path(path: &str) -> Vec<PathSeg> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if !current.is_empty() {
                    segments.push(PathSeg::Key(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSeg::Key(std::mem::take(&mut current)));
                }
                let mut digits = String::new();
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    digits.push(inner);
                }
                match digits.parse::<usize>() {
                    Ok(i) => segments.push(PathSeg::Index(i)),
                    // Non-numeric bracket content behaves like a key segment.
                    Err(_) => segments.push(PathSeg::Key(digits)),
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        segments.push(PathSeg::Key(current));
    }
    segments
}

/// Append an object-field segment to a path string.
pub fn join_key(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{base}.{key}")
    }
}

/// Append an array-index segment to a path string.
pub fn join_index(base: &str, index: usize) -> String {
    format!("{base}[{index}]")
}

/// First segment of a path as a raw string: `get_first_key("a.b[0]") == "a"`.
pub fn get_first_key(path: &str) -> &str {
    let end = path
        .find(['.', '['])
        .unwrap_or(path.len());
    &path[..end]
}

/// Read the value at `path`, if present.
pub fn get_by_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    get_by_segments(root, &parse_path(path))
}

/// Read the value at pre-parsed `segments`, if present.
pub fn get_by_segments<'v>(root: &'v Value, segments: &[PathSeg]) -> Option<&'v Value> {
    let mut current = root;
    for segment in segments {
        current = match (segment, current) {
            (PathSeg::Key(k), Value::Object(map)) => map.get(k)?,
            (PathSeg::Key(k), Value::Array(items)) => items.get(k.parse::<usize>().ok()?)?,
            (PathSeg::Index(i), Value::Array(items)) => items.get(*i)?,
            (PathSeg::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
            _ => return None,
        };
    }
    Some(current)
}

/// Mutable walk to the value at `segments`, if present.
pub fn get_by_segments_mut<'v>(root: &'v mut Value, segments: &[PathSeg]) -> Option<&'v mut Value> {
    let mut current = root;
    for segment in segments {
        current = match (segment, current) {
            (PathSeg::Key(k), Value::Object(map)) => map.get_mut(k)?,
            (PathSeg::Key(k), Value::Array(items)) => items.get_mut(k.parse::<usize>().ok()?)?,
            (PathSeg::Index(i), Value::Array(items)) => items.get_mut(*i)?,
            (PathSeg::Index(i), Value::Object(map)) => map.get_mut(&i.to_string())?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `path`, creating intermediate containers as needed.
///
/// Missing intermediates become objects (or arrays when the next segment is
/// an index); scalars in the way are replaced by a fresh container. Array
/// writes past the end pad with `null`.
pub fn set_by_path(root: &mut Value, path: &str, value: Value) {
    set_by_segments(root, &parse_path(path), value);
}

/// Segment-level form of [`set_by_path`].
pub fn set_by_segments(root: &mut Value, segments: &[PathSeg], value: Value) {
    if segments.is_empty() {
        *root = value;
        return;
    }
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        let wants_array = !is_last && matches!(segments[i + 1], PathSeg::Index(_));
        match segment {
            PathSeg::Key(k) => {
                let as_index = k.parse::<usize>().ok();
                if let (Some(idx), Value::Array(_)) = (as_index, &mut *current) {
                    current = prepare_array_slot(current, idx, is_last, wants_array, &value);
                    if is_last {
                        return;
                    }
                    continue;
                }
                if !matches!(current, Value::Object(_)) {
                    *current = Value::Object(Map::new());
                }
                let Value::Object(map) = current else {
                    unreachable!()
                };
                if is_last {
                    map.insert(k.clone(), value);
                    return;
                }
                let entry = map.entry(k.clone()).or_insert(Value::Null);
                if !matches!(entry, Value::Object(_) | Value::Array(_)) {
                    *entry = if wants_array {
                        Value::Array(Vec::new())
                    } else {
                        Value::Object(Map::new())
                    };
                }
                current = entry;
            }
            PathSeg::Index(idx) => {
                if !matches!(current, Value::Array(_)) {
                    *current = Value::Array(Vec::new());
                }
                current = prepare_array_slot(current, *idx, is_last, wants_array, &value);
                if is_last {
                    return;
                }
            }
        }
    }
}

/// Pad `array` out to `idx`, write the leaf there when `is_last`, and return
/// the slot for further descent otherwise.
fn prepare_array_slot<'v>(
    array: &'v mut Value,
    idx: usize,
    is_last: bool,
    wants_array: bool,
    value: &Value,
) -> &'v mut Value {
    let Value::Array(items) = array else {
        unreachable!()
    };
    while items.len() <= idx {
        items.push(Value::Null);
    }
    if is_last {
        items[idx] = value.clone();
    } else if !matches!(items[idx], Value::Object(_) | Value::Array(_)) {
        items[idx] = if wants_array {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
    }
    &mut items[idx]
}

/// Remove the value at `path`. Object keys are removed; array elements are
/// spliced out. Returns true if something was removed.
pub fn delete_by_path(root: &mut Value, path: &str) -> bool {
    let segments = parse_path(path);
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    let Some(parent) = get_by_segments_mut(root, parents) else {
        return false;
    };
    match (last, parent) {
        (PathSeg::Key(k), Value::Object(map)) => map.remove(k).is_some(),
        (PathSeg::Key(k), Value::Array(items)) => match k.parse::<usize>() {
            Ok(i) if i < items.len() => {
                items.remove(i);
                true
            }
            _ => false,
        },
        (PathSeg::Index(i), Value::Array(items)) => {
            if *i < items.len() {
                items.remove(*i);
                true
            } else {
                false
            }
        }
        (PathSeg::Index(i), Value::Object(map)) => map.remove(&i.to_string()).is_some(),
        _ => false,
    }
}

/// If `b` is a proper ancestor of `a`, return the remaining segments of `a`
/// below `b`. `is_sub_path_of("b.c.d", "b") == Some([Key("c"), Key("d")])`.
pub fn is_sub_path_of(a: &str, b: &str) -> Option<Vec<PathSeg>> {
    let a_segments = parse_path(a);
    let b_segments = parse_path(b);
    if b_segments.len() >= a_segments.len() {
        return None;
    }
    if a_segments[..b_segments.len()] == b_segments[..] {
        Some(a_segments[b_segments.len()..].to_vec())
    } else {
        None
    }
}

/// Segment-aware strict-descendant test: true when `candidate` lies below
/// `base` (and is not `base` itself). An empty `base` is the root, so every
/// non-empty path descends from it.
pub fn is_descendant_path(candidate: &str, base: &str) -> bool {
    if candidate == base {
        return false;
    }
    if base.is_empty() {
        return !candidate.is_empty();
    }
    is_sub_path_of(candidate, base).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_mixed_segments() {
        assert_eq!(
            parse_path("a.b[2].c"),
            vec![
                PathSeg::Key("a".into()),
                PathSeg::Key("b".into()),
                PathSeg::Index(2),
                PathSeg::Key("c".into()),
            ]
        );
        assert!(parse_path("").is_empty());
    }

    #[test]
    fn first_key() {
        assert_eq!(get_first_key("a.b"), "a");
        assert_eq!(get_first_key("list[0].x"), "list");
        assert_eq!(get_first_key("plain"), "plain");
    }

    #[test]
    fn get_walks_objects_and_arrays() {
        let v = json!({"a": {"b": [10, {"c": 3}]}});
        assert_eq!(get_by_path(&v, "a.b[1].c"), Some(&json!(3)));
        assert_eq!(get_by_path(&v, "a.b.0"), Some(&json!(10)));
        assert_eq!(get_by_path(&v, "a.missing"), None);
    }

    #[test]
    fn set_creates_intermediates() {
        let mut v = json!({});
        set_by_path(&mut v, "a.b.c", json!(1));
        assert_eq!(v, json!({"a": {"b": {"c": 1}}}));

        set_by_path(&mut v, "list[2]", json!("x"));
        assert_eq!(v["list"], json!([null, null, "x"]));
    }

    #[test]
    fn set_replaces_scalar_in_the_way() {
        let mut v = json!({"a": 5});
        set_by_path(&mut v, "a.b", json!(1));
        assert_eq!(v, json!({"a": {"b": 1}}));
    }

    #[test]
    fn delete_object_key_and_array_element() {
        let mut v = json!({"a": {"b": 1}, "list": [1, 2, 3]});
        assert!(delete_by_path(&mut v, "a.b"));
        assert!(!delete_by_path(&mut v, "a.b"));
        assert!(delete_by_path(&mut v, "list[1]"));
        assert_eq!(v, json!({"a": {}, "list": [1, 3]}));
    }

    #[test]
    fn sub_path_relationships() {
        assert_eq!(
            is_sub_path_of("b.c", "b"),
            Some(vec![PathSeg::Key("c".into())])
        );
        assert!(is_sub_path_of("b", "b").is_none());
        // Segment-aware: "ab" is not under "a".
        assert!(is_sub_path_of("ab", "a").is_none());
        assert!(is_descendant_path("a.b", ""));
        assert!(!is_descendant_path("", ""));
    }
}
