//! Runtime shape codec. A resource's field set stands in for a concrete record type:
//! request bodies are checked against it and re-keyed to storage keys, stored documents
//! are re-keyed to wire keys on the way out.

use std::str::FromStr;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};

use super::field::{FieldType, ModelShape};
use crate::error::AppError;
use crate::query::value::format_timestamp;
use crate::store::Document;

#[derive(Clone, Copy)]
enum Direction {
    /// wire keys in, storage keys out
    Encode,
    /// storage keys in, wire keys out
    Decode,
}

fn int_in_range(v: &Value, min: i64, max: i64) -> Option<Value> {
    let n = v.as_i64()?;
    (min..=max).contains(&n).then(|| Value::from(n))
}

fn uint_in_range(v: &Value, max: u64) -> Option<Value> {
    let n = v.as_u64()?;
    (n <= max).then(|| Value::from(n))
}

fn scalar(ty: &FieldType, v: &Value) -> Option<Value> {
    match ty {
        FieldType::Int8 => int_in_range(v, i8::MIN.into(), i8::MAX.into()),
        FieldType::Int16 => int_in_range(v, i16::MIN.into(), i16::MAX.into()),
        FieldType::Int32 => int_in_range(v, i32::MIN.into(), i32::MAX.into()),
        FieldType::Int64 => int_in_range(v, i64::MIN, i64::MAX),
        FieldType::UInt8 => uint_in_range(v, u8::MAX.into()),
        FieldType::UInt16 => uint_in_range(v, u16::MAX.into()),
        FieldType::UInt32 => uint_in_range(v, u32::MAX.into()),
        FieldType::UInt64 => uint_in_range(v, u64::MAX),
        // stored at f32 precision so it compares equal to a coerced filter value
        FieldType::Float32 => v
            .as_f64()
            .map(|f| f as f32)
            .filter(|f| f.is_finite())
            .and_then(|f| Number::from_f64(f64::from(f)))
            .map(Value::Number),
        FieldType::Float64 => v.as_f64().and_then(Number::from_f64).map(Value::Number),
        FieldType::Bool => v.as_bool().map(Value::Bool),
        FieldType::String => v.as_str().map(|s| Value::String(s.to_string())),
        FieldType::ObjectId => v
            .as_str()
            .and_then(|s| ObjectId::parse_str(s).ok())
            .map(|id| Value::String(id.to_hex())),
        FieldType::Decimal => {
            let text = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Decimal::from_str(&text)
                .ok()
                .map(|d| Value::String(d.normalize().to_string()))
        }
        FieldType::Timestamp => v
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| Value::String(format_timestamp(&ts.with_timezone(&Utc)))),
        FieldType::Any => Some(v.clone()),
        FieldType::Object(_) | FieldType::Array(_) => None,
    }
}

fn type_name(ty: &FieldType) -> String {
    match ty {
        FieldType::Object(shape) => format!("object {}", shape.name),
        FieldType::Array(shape) => format!("array of {}", shape.name),
        other => format!("{:?}", other).to_lowercase(),
    }
}

fn convert(ty: &FieldType, v: &Value, dir: Direction, path: &str) -> Result<Value, String> {
    match ty {
        FieldType::Object(shape) => match v {
            Value::Object(map) => Ok(Value::Object(rekey(shape, map, dir, path)?)),
            _ => Err(format!("{}: expected {}", path, type_name(ty))),
        },
        FieldType::Array(shape) => match v {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let item_path = format!("{}[{}]", path, i);
                    match item {
                        Value::Object(map) => rekey(shape, map, dir, &item_path).map(Value::Object),
                        _ => Err(format!("{}: expected object {}", item_path, shape.name)),
                    }
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Err(format!("{}: expected {}", path, type_name(ty))),
        },
        _ => scalar(ty, v).ok_or_else(|| format!("{}: expected {}", path, type_name(ty))),
    }
}

fn rekey(
    shape: &ModelShape,
    input: &Map<String, Value>,
    dir: Direction,
    parent: &str,
) -> Result<Map<String, Value>, String> {
    let mut out = Map::new();
    for field in &shape.fields {
        let Some(wire) = field.wire_key.as_deref() else {
            continue;
        };
        let (from, to) = match dir {
            Direction::Encode => (wire, field.storage_key.as_str()),
            Direction::Decode => (field.storage_key.as_str(), wire),
        };
        let Some(value) = input.get(from).filter(|v| !v.is_null()) else {
            continue;
        };
        let path = if parent.is_empty() {
            wire.to_string()
        } else {
            format!("{}.{}", parent, wire)
        };
        out.insert(to.to_string(), convert(&field.field_type, value, dir, &path)?);
    }
    Ok(out)
}

/// Check a request body against `shape` and produce the storage document.
/// Unknown keys are ignored; a type mismatch is a 400.
pub fn encode_body(shape: &ModelShape, body: &Value) -> Result<Document, AppError> {
    match body {
        Value::Object(map) => rekey(shape, map, Direction::Encode, "")
            .map_err(|e| AppError::bad_request("body parse error", e)),
        _ => Err(AppError::bad_request(
            "body parse error",
            "expected a JSON object",
        )),
    }
}

/// Render a stored document through `shape`. Hidden fields are dropped; a stored value
/// that does not fit its declared type is a 500.
pub fn decode_document(shape: &ModelShape, doc: &Document) -> Result<Value, AppError> {
    rekey(shape, doc, Direction::Decode, "")
        .map(Value::Object)
        .map_err(|e| AppError::internal("decode error", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldDef, FieldTypeConfig as T, ModelDef};
    use crate::descriptor::field::build_resource_shape;
    use serde_json::json;

    fn shape() -> ModelShape {
        let company = ModelDef::record("Company").field(FieldDef::new("LegalName", T::String));
        build_resource_shape(
            &ModelDef::record("Stock")
                .field(FieldDef::new("Ticker", T::String).storage_key("sym"))
                .field(FieldDef::new("Shares", T::Uint32))
                .field(FieldDef::new("Price", T::Decimal))
                .field(FieldDef::new("ListedAt", T::Timestamp))
                .field(FieldDef::new("Company", T::Object(company.clone())))
                .field(FieldDef::new("Peers", T::Array(company))),
            true,
        )
        .unwrap()
    }

    #[test]
    fn encode_maps_wire_to_storage_and_normalizes() {
        let doc = encode_body(
            &shape(),
            &json!({
                "ticker": "ABC",
                "shares": 10,
                "price": "12.50",
                "listed_at": "2024-03-01T12:00:00+02:00",
                "company": {"legal_name": "Acme"},
                "peers": [{"legal_name": "Globex"}],
                "unknown": true,
                "is_deleted": true
            }),
        )
        .unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({
                "sym": "ABC",
                "shares": 10,
                "price": "12.5",
                "listed_at": "2024-03-01T10:00:00Z",
                "company": {"legal_name": "Acme"},
                "peers": [{"legal_name": "Globex"}]
            })
        );
    }

    #[test]
    fn float32_values_are_stored_at_f32_precision() {
        let shape = build_resource_shape(
            &ModelDef::record("Gauge").field(FieldDef::new("Level", T::Float32)),
            false,
        )
        .unwrap();
        let doc = encode_body(&shape, &json!({"level": 0.1})).unwrap();
        assert_eq!(doc["level"], json!(f64::from(0.1f32)));
        assert!(encode_body(&shape, &json!({"level": 1e300})).is_err());
    }

    #[test]
    fn encode_rejects_type_mismatch() {
        let err = encode_body(&shape(), &json!({"shares": -1})).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        let err = encode_body(&shape(), &json!({"peers": [1]})).unwrap_err();
        assert!(err.to_string().contains("body parse error"));
        assert!(encode_body(&shape(), &json!([1, 2])).is_err());
    }

    #[test]
    fn decode_hides_deletion_flag_and_renames_identity() {
        let doc: Document = json!({
            "_id": "507f1f77bcf86cd799439011",
            "sym": "ABC",
            "is_deleted": false
        })
        .as_object()
        .unwrap()
        .clone();
        let out = decode_document(&shape(), &doc).unwrap();
        assert_eq!(out, json!({"ticker": "ABC", "id": "507f1f77bcf86cd799439011"}));
    }
}
