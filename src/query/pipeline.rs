//! Structural parameter substitution for aggregation pipelines.
//!
//! A placeholder is an object `{"$param": "<name>"}`, optionally with a `"default"` value.
//! It is replaced by the request value of that name, the default, or `null`.

use std::collections::HashMap;

use serde_json::Value;

use super::coerce::coerce;
use crate::descriptor::{ModelShape, DELETED_KEY};

pub const PARAM_KEY: &str = "$param";

fn placeholder(map: &serde_json::Map<String, Value>) -> Option<(&str, Option<&Value>)> {
    let name = map.get(PARAM_KEY)?.as_str()?;
    if map.keys().any(|k| k != PARAM_KEY && k != "default") {
        return None;
    }
    Some((name, map.get("default")))
}

fn substitute_value(node: &Value, values: &HashMap<String, Value>) -> Value {
    match node {
        Value::Object(map) => {
            if let Some((name, default)) = placeholder(map) {
                return values
                    .get(name)
                    .or(default)
                    .cloned()
                    .unwrap_or(Value::Null);
            }
            Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), substitute_value(v, values)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items.iter().map(|v| substitute_value(v, values)).collect(),
        ),
        other => other.clone(),
    }
}

/// Replace every placeholder in `pipeline`.
pub fn substitute(pipeline: &[Value], values: &HashMap<String, Value>) -> Vec<Value> {
    pipeline
        .iter()
        .map(|stage| substitute_value(stage, values))
        .collect()
}

/// Typed request values for a GET aggregation, coerced through the request shape.
/// Parameters the shape does not declare, or that do not coerce, are dropped.
pub fn values_from_query(
    params: &HashMap<String, String>,
    shape: Option<&ModelShape>,
) -> HashMap<String, Value> {
    let Some(shape) = shape else {
        return HashMap::new();
    };
    shape
        .wire_fields()
        .filter_map(|f| {
            let key = f.wire_key.as_deref()?;
            let value = coerce(params.get(key)?, &f.field_type)?;
            Some((key.to_string(), value.to_json()))
        })
        .collect()
}

/// Stage excluding soft-deleted documents; prepended to aggregation pipelines.
pub fn not_deleted_stage() -> Value {
    serde_json::json!({ "$match": { DELETED_KEY: false } })
}
