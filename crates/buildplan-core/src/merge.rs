//! Descriptor tree merge logic
//!
//! Layers are merged in order, later layers taking precedence:
//! - Objects: deep-merge by key
//! - Arrays: ordered union (first-seen order, duplicates dropped)
//! - Scalars: override (last wins)
//! - Null: removes the key, wherever it appears in the overlay

use serde_json::{Map, Value};

/// Deep merge two JSON values.
///
/// Merge semantics:
/// - Objects: deep-merge by key (recursive); a `null` overlay removes the key
/// - Arrays: union, keeping the first occurrence of each element
/// - Scalars: override (overlay wins)
///
/// Nulls never survive into the result, whether they overlay an existing
/// key or sit inside a subtree that is new in this layer.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            Value::Object(merge_maps(base_map, overlay_map))
        }

        (Value::Array(base_items), Value::Array(overlay_items)) => Value::Array(ordered_union(
            base_items,
            overlay_items.into_iter().filter_map(prune_nulls).collect(),
        )),

        (_, overlay) => prune_nulls(overlay).unwrap_or(Value::Null),
    }
}

/// Merge `overlay` into `base` key by key.
pub fn merge_maps(mut base: Map<String, Value>, overlay: Map<String, Value>) -> Map<String, Value> {
    for (key, overlay_value) in overlay {
        if overlay_value.is_null() {
            base.remove(&key);
            continue;
        }
        let merged = match base.remove(&key) {
            Some(base_value) => deep_merge(base_value, overlay_value),
            None => match prune_nulls(overlay_value) {
                Some(value) => value,
                None => continue,
            },
        };
        base.insert(key, merged);
    }
    base
}

/// Merge multiple layers in order (first is base, last has highest precedence)
pub fn merge_layers<I>(layers: I) -> Map<String, Value>
where
    I: IntoIterator<Item = Map<String, Value>>,
{
    layers.into_iter().fold(Map::new(), merge_maps)
}

/// Drop every null from a subtree; `None` if `value` itself is null.
fn prune_nulls(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => Some(Value::Object(merge_maps(Map::new(), map))),
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(prune_nulls).collect(),
        )),
        scalar => Some(scalar),
    }
}

/// Append `extra` to `items`, skipping anything already present.
pub fn ordered_union(items: Vec<Value>, extra: Vec<Value>) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::with_capacity(items.len() + extra.len());
    for item in items.into_iter().chain(extra) {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}
