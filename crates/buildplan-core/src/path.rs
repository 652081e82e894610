//! Dotted key paths into a merged tree.

use serde_json::{Map, Value};

/// Look up `path` (e.g. `android.application_id`) in `root`.
///
/// Keys may themselves contain dots (`flutter.sdk` from a properties file),
/// so at each level the longest matching key is tried first.
pub fn lookup_path<'v>(root: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    let segments: Vec<&str> = path.split('.').collect();
    lookup_segments(root, &segments)
}

fn lookup_segments<'v>(map: &'v Map<String, Value>, segments: &[&str]) -> Option<&'v Value> {
    for split in (1..=segments.len()).rev() {
        let key = segments[..split].join(".");
        let Some(value) = map.get(&key) else {
            continue;
        };
        if split == segments.len() {
            return Some(value);
        }
        if let Value::Object(child) = value {
            if let Some(found) = lookup_segments(child, &segments[split..]) {
                return Some(found);
            }
        }
    }
    None
}

/// Join a parent path and a child key.
pub fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// True when `value` carries no usable content: absent-like scalars, blank
/// strings, and lists or tables with nothing non-blank inside.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_blank),
        Value::Object(map) => map.values().all(is_blank),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
