// src/store/document.rs

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::{StoreError, Write};

/// Server-side field mutation applied at commit time.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    /// Adds to the stored number; a missing or non-numeric field becomes the delta.
    Increment(i64),
    /// Commit time as a fixed-width RFC 3339 string (sorts lexicographically).
    ServerTimestamp,
    /// Appends elements not already present.
    ArrayUnion(Vec<Value>),
    /// Removes every element equal to one of the given values.
    ArrayRemove(Vec<Value>),
    Delete,
}

/// A [`FieldOp`] addressed by a dotted field path such as `counts.students`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTransform {
    pub field: String,
    pub op: FieldOp,
}

impl FieldTransform {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FieldOp::Set(value.into()) }
    }

    pub fn increment(field: &str, delta: i64) -> Self {
        Self { field: field.to_string(), op: FieldOp::Increment(delta) }
    }

    pub fn server_timestamp(field: &str) -> Self {
        Self { field: field.to_string(), op: FieldOp::ServerTimestamp }
    }

    pub fn array_union(field: &str, values: Vec<Value>) -> Self {
        Self { field: field.to_string(), op: FieldOp::ArrayUnion(values) }
    }

    pub fn array_remove(field: &str, values: Vec<Value>) -> Self {
        Self { field: field.to_string(), op: FieldOp::ArrayRemove(values) }
    }

    pub fn delete(field: &str) -> Self {
        Self { field: field.to_string(), op: FieldOp::Delete }
    }
}

fn invalid(field: &str, reason: &str) -> StoreError {
    StoreError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn split_field(field: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = field.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid(field, "empty segment"));
    }
    Ok(segments)
}

/// Looks up a dotted field path inside a document body.
pub fn read_field<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    field.split('.').try_fold(doc, |value, segment| value.get(segment))
}

fn merge_into(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_into(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn apply_transform(
    root: &mut Map<String, Value>,
    transform: &FieldTransform,
    now: &str,
) -> Result<(), StoreError> {
    let segments = split_field(&transform.field)?;
    let (leaf, parents) = segments
        .split_last()
        .ok_or_else(|| invalid(&transform.field, "empty path"))?;

    let mut current = root;
    for segment in parents {
        let entry = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => return Err(invalid(&transform.field, "intermediate is not a map")),
        };
    }

    match &transform.op {
        FieldOp::Set(value) => {
            current.insert((*leaf).to_string(), value.clone());
        }
        FieldOp::Delete => {
            current.remove(*leaf);
        }
        FieldOp::ServerTimestamp => {
            current.insert((*leaf).to_string(), Value::String(now.to_string()));
        }
        FieldOp::Increment(delta) => {
            let next = match current.get(*leaf) {
                Some(Value::Number(n)) if n.is_i64() => {
                    Value::from(n.as_i64().unwrap_or_default().saturating_add(*delta))
                }
                Some(Value::Number(n)) => Value::from(n.as_f64().unwrap_or_default() + *delta as f64),
                _ => Value::from(*delta),
            };
            current.insert((*leaf).to_string(), next);
        }
        FieldOp::ArrayUnion(values) => {
            let mut items = match current.remove(*leaf) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            for value in values {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
            current.insert((*leaf).to_string(), Value::Array(items));
        }
        FieldOp::ArrayRemove(values) => {
            let items = match current.remove(*leaf) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            let kept = items.into_iter().filter(|item| !values.contains(item)).collect();
            current.insert((*leaf).to_string(), Value::Array(kept));
        }
    }
    Ok(())
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn apply_transforms(
    mut body: Map<String, Value>,
    transforms: &[FieldTransform],
    now: &str,
) -> Result<Value, StoreError> {
    for transform in transforms {
        apply_transform(&mut body, transform, now)?;
    }
    Ok(Value::Object(body))
}

/// Computes the state of a document after `write`. `None` means deleted.
pub fn apply_write(
    current: Option<&Value>,
    write: &Write,
    now: DateTime<Utc>,
) -> Result<Option<Value>, StoreError> {
    let now = timestamp(now);
    match write {
        Write::Delete { .. } => Ok(None),
        Write::Set {
            path,
            data,
            merge,
            transforms,
        } => {
            let Value::Object(incoming) = data else {
                return Err(invalid(path.as_str(), "document body must be a map"));
            };
            let body = match (merge, current) {
                (true, Some(Value::Object(existing))) => {
                    let mut merged = existing.clone();
                    merge_into(&mut merged, incoming);
                    merged
                }
                _ => incoming.clone(),
            };
            apply_transforms(body, transforms, &now).map(Some)
        }
        Write::Update { path, transforms } => {
            let Some(Value::Object(existing)) = current else {
                return Err(StoreError::NotFound(path.clone()));
            };
            apply_transforms(existing.clone(), transforms, &now).map(Some)
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for query filters and ordering: values of different
/// types order by type, numbers numerically, strings lexicographically.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
