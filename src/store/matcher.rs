//! Evaluate a filter document against a stored document.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::Document;
use crate::error::StoreError;

/// Dotted-path lookup: `company.name`.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Integers compare exactly; f64 only when either side is a float.
fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    match (as_integer(x), as_integer(y)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

/// Equality with numbers compared by value, so `5` matches `5.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            compare_numbers(x, y) == Some(Ordering::Equal)
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order used by `$sort`, `$min` and `$max`: null < numbers < strings < objects <
/// arrays < booleans.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Ordering comparison only between values of the same kind.
fn comparable(a: &Value, b: &Value) -> Option<Ordering> {
    (type_rank(a) == type_rank(b) && matches!(a, Value::Number(_) | Value::String(_)))
        .then(|| compare_values(a, b))
}

fn is_operator_doc(v: &Value) -> bool {
    match v {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn field_equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(actual) => values_equal(actual, expected),
    }
}

fn operator_matches(field: Option<&Value>, op: &str, arg: &Value) -> Result<bool, StoreError> {
    let ordered = |want: fn(Ordering) -> bool| {
        field
            .and_then(|actual| comparable(actual, arg))
            .map(want)
            .unwrap_or(false)
    };
    Ok(match op {
        "$eq" => field_equals(field, arg),
        "$ne" => !field_equals(field, arg),
        "$gt" => ordered(|o| o == Ordering::Greater),
        "$gte" => ordered(|o| o != Ordering::Less),
        "$lt" => ordered(|o| o == Ordering::Less),
        "$lte" => ordered(|o| o != Ordering::Greater),
        "$in" | "$nin" => {
            let Value::Array(options) = arg else {
                return Err(StoreError::InvalidPipeline(format!("{} expects an array", op)));
            };
            let found = options.iter().any(|o| field_equals(field, o));
            if op == "$in" {
                found
            } else {
                !found
            }
        }
        "$exists" => field.is_some() == arg.as_bool().unwrap_or(true),
        other => return Err(StoreError::UnsupportedStage(other.to_string())),
    })
}

/// True when `doc` satisfies every constraint in `filter`.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool, StoreError> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" | "$or" => {
                let Value::Array(clauses) = cond else {
                    return Err(StoreError::InvalidPipeline(format!("{} expects an array", key)));
                };
                let mut results = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    let Value::Object(clause) = clause else {
                        return Err(StoreError::InvalidPipeline(format!(
                            "{} expects objects",
                            key
                        )));
                    };
                    results.push(matches(doc, clause)?);
                }
                if key == "$and" {
                    results.iter().all(|r| *r)
                } else {
                    results.iter().any(|r| *r)
                }
            }
            _ if is_operator_doc(cond) => {
                let field = lookup(doc, key);
                let mut all = true;
                if let Value::Object(ops) = cond {
                    for (op, arg) in ops {
                        all &= operator_matches(field, op, arg)?;
                    }
                }
                all
            }
            _ => field_equals(lookup(doc, key), cond),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}
