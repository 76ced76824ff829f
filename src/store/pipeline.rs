//! In-process aggregation pipeline evaluation, shared by the memory and Postgres stores.
//! Supported stages: `$match`, `$sort`, `$skip`, `$limit`, `$project`, `$group`, `$count`.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use super::matcher::{compare_values, lookup, matches, values_equal};
use super::Document;
use crate::error::StoreError;

fn invalid(msg: impl Into<String>) -> StoreError {
    StoreError::InvalidPipeline(msg.into())
}

fn as_count(stage: &str, v: &Value) -> Result<usize, StoreError> {
    v.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| invalid(format!("{} expects a non-negative integer", stage)))
}

/// `"$field.path"` reads from the document; anything else is a literal. Objects are
/// evaluated key by key so `{_id: {t: "$ticker"}}` groups by a compound key.
fn eval_expr(doc: &Document, expr: &Value) -> Value {
    match expr {
        Value::String(s) if s.starts_with('$') => {
            lookup(doc, &s[1..]).cloned().unwrap_or(Value::Null)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), eval_expr(doc, v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn sort(mut docs: Vec<Document>, body: &Value) -> Result<Vec<Document>, StoreError> {
    let Value::Object(body) = body else {
        return Err(invalid("$sort expects an object"));
    };
    let keys: Vec<(String, bool)> = body
        .iter()
        .map(|(k, dir)| match dir.as_i64() {
            Some(1) => Ok((k.clone(), true)),
            Some(-1) => Ok((k.clone(), false)),
            _ => Err(invalid(format!("$sort direction for '{}' must be 1 or -1", k))),
        })
        .collect::<Result<_, _>>()?;
    docs.sort_by(|a, b| {
        for (key, ascending) in &keys {
            let ord = compare_values(
                lookup(a, key).unwrap_or(&Value::Null),
                lookup(b, key).unwrap_or(&Value::Null),
            );
            if ord != Ordering::Equal {
                return if *ascending { ord } else { ord.reverse() };
            }
        }
        Ordering::Equal
    });
    Ok(docs)
}

fn project(docs: Vec<Document>, body: &Value) -> Result<Vec<Document>, StoreError> {
    let Value::Object(body) = body else {
        return Err(invalid("$project expects an object"));
    };
    let flag = |v: &Value| match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    };
    let exclusion = body
        .iter()
        .filter(|(k, _)| k.as_str() != "_id")
        .all(|(_, v)| flag(v) == Some(false))
        && !body.is_empty();
    let keep_id = body.get("_id").and_then(flag).unwrap_or(true);

    Ok(docs
        .into_iter()
        .map(|doc| {
            if exclusion {
                let mut out = doc.clone();
                for (k, _) in body.iter() {
                    if k != "_id" {
                        out.remove(k);
                    }
                }
                if !keep_id {
                    out.remove("_id");
                }
                return out;
            }
            let mut out = Map::new();
            if keep_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id".into(), id.clone());
                }
            }
            for (k, v) in body {
                if k == "_id" && flag(v).is_some() {
                    continue;
                }
                match flag(v) {
                    Some(true) => {
                        if let Some(value) = lookup(&doc, k) {
                            out.insert(k.clone(), value.clone());
                        }
                    }
                    Some(false) => {}
                    None => {
                        out.insert(k.clone(), eval_expr(&doc, v));
                    }
                }
            }
            out
        })
        .collect())
}

#[derive(Clone, Copy)]
enum Accumulator {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Count,
}

struct GroupField {
    name: String,
    acc: Accumulator,
    expr: Value,
}

#[derive(Default)]
struct AccState {
    int_sum: i64,
    float_sum: f64,
    all_int: bool,
    n: u64,
    value: Option<Value>,
}

fn number(v: &Value) -> Option<&Number> {
    match v {
        Value::Number(n) => Some(n),
        _ => None,
    }
}

impl AccState {
    fn new() -> Self {
        AccState {
            all_int: true,
            ..Default::default()
        }
    }

    fn add(&mut self, acc: Accumulator, v: Value) {
        match acc {
            Accumulator::Sum | Accumulator::Avg => {
                if let Some(n) = number(&v) {
                    match n.as_i64() {
                        Some(i) if self.all_int => match self.int_sum.checked_add(i) {
                            Some(s) => self.int_sum = s,
                            None => {
                                self.all_int = false;
                                self.float_sum = self.int_sum as f64 + i as f64;
                            }
                        },
                        _ => {
                            if self.all_int {
                                self.all_int = false;
                                self.float_sum = self.int_sum as f64;
                            }
                            self.float_sum += n.as_f64().unwrap_or(0.0);
                        }
                    }
                    self.n += 1;
                }
            }
            Accumulator::Count => self.n += 1,
            Accumulator::Min | Accumulator::Max => {
                if v.is_null() {
                    return;
                }
                let replace = match &self.value {
                    None => true,
                    Some(cur) => {
                        let ord = compare_values(&v, cur);
                        matches!(
                            (acc, ord),
                            (Accumulator::Min, Ordering::Less) | (Accumulator::Max, Ordering::Greater)
                        )
                    }
                };
                if replace {
                    self.value = Some(v);
                }
            }
            Accumulator::First => {
                if self.value.is_none() {
                    self.value = Some(v);
                }
            }
            Accumulator::Last => self.value = Some(v),
        }
    }

    fn finish(self, acc: Accumulator) -> Value {
        match acc {
            Accumulator::Sum if self.all_int => Value::from(self.int_sum),
            Accumulator::Sum => Number::from_f64(self.float_sum)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Accumulator::Avg if self.n == 0 => Value::Null,
            Accumulator::Avg => {
                let total = if self.all_int {
                    self.int_sum as f64
                } else {
                    self.float_sum
                };
                Number::from_f64(total / self.n as f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
            Accumulator::Count => Value::from(self.n),
            Accumulator::Min | Accumulator::Max | Accumulator::First | Accumulator::Last => {
                self.value.unwrap_or(Value::Null)
            }
        }
    }
}

fn parse_group(body: &Value) -> Result<(Value, Vec<GroupField>), StoreError> {
    let Value::Object(body) = body else {
        return Err(invalid("$group expects an object"));
    };
    let key = body
        .get("_id")
        .cloned()
        .ok_or_else(|| invalid("$group requires _id"))?;
    let mut fields = Vec::new();
    for (name, def) in body.iter().filter(|(k, _)| k.as_str() != "_id") {
        let Some((op, expr)) = def.as_object().filter(|m| m.len() == 1).and_then(|m| m.iter().next())
        else {
            return Err(invalid(format!("$group field '{}' needs one accumulator", name)));
        };
        let acc = match op.as_str() {
            "$sum" => Accumulator::Sum,
            "$avg" => Accumulator::Avg,
            "$min" => Accumulator::Min,
            "$max" => Accumulator::Max,
            "$first" => Accumulator::First,
            "$last" => Accumulator::Last,
            "$count" => Accumulator::Count,
            other => return Err(StoreError::UnsupportedStage(format!("$group {}", other))),
        };
        fields.push(GroupField {
            name: name.clone(),
            acc,
            expr: expr.clone(),
        });
    }
    Ok((key, fields))
}

fn group(docs: Vec<Document>, body: &Value) -> Result<Vec<Document>, StoreError> {
    let (key_expr, fields) = parse_group(body)?;
    let mut groups: Vec<(Value, Vec<AccState>)> = Vec::new();
    for doc in &docs {
        let key = eval_expr(doc, &key_expr);
        let idx = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(i) => i,
            None => {
                groups.push((key, fields.iter().map(|_| AccState::new()).collect()));
                groups.len() - 1
            }
        };
        for (field, state) in fields.iter().zip(groups[idx].1.iter_mut()) {
            state.add(field.acc, eval_expr(doc, &field.expr));
        }
    }
    Ok(groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = Map::new();
            out.insert("_id".into(), key);
            for (field, state) in fields.iter().zip(states) {
                out.insert(field.name.clone(), state.finish(field.acc));
            }
            out
        })
        .collect())
}

/// Run `pipeline` over `docs`.
pub fn evaluate(mut docs: Vec<Document>, pipeline: &[Value]) -> Result<Vec<Document>, StoreError> {
    for stage in pipeline {
        let Some((name, body)) = stage
            .as_object()
            .filter(|m| m.len() == 1)
            .and_then(|m| m.iter().next())
        else {
            return Err(invalid("each stage must be an object with exactly one key"));
        };
        docs = match name.as_str() {
            "$match" => {
                let Value::Object(filter) = body else {
                    return Err(invalid("$match expects an object"));
                };
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$sort" => sort(docs, body)?,
            "$skip" => docs.into_iter().skip(as_count("$skip", body)?).collect(),
            "$limit" => docs.into_iter().take(as_count("$limit", body)?).collect(),
            "$project" => project(docs, body)?,
            "$group" => group(docs, body)?,
            "$count" => {
                let field = body
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| invalid("$count expects a field name"))?;
                let mut out = Map::new();
                out.insert(field.to_string(), Value::from(docs.len() as u64));
                vec![out]
            }
            other => return Err(StoreError::UnsupportedStage(other.to_string())),
        };
    }
    Ok(docs)
}
