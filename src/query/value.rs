//! Typed filter values: the closed output domain of coercion.

use bson::oid::ObjectId;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use super::filter::QueryFilter;

#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    String(String),
    ObjectId(ObjectId),
    Decimal(Decimal),
    Timestamp(DateTime<Utc>),
    Map(QueryFilter),
}

impl TypedValue {
    /// JSON form as stored in documents. Identity, decimal and timestamp values use
    /// their canonical text so stored documents compare by equality.
    pub fn to_json(&self) -> Value {
        match self {
            TypedValue::Int(v) => Value::from(*v),
            TypedValue::UInt(v) => Value::from(*v),
            TypedValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            TypedValue::Bool(v) => Value::Bool(*v),
            TypedValue::String(v) => Value::String(v.clone()),
            TypedValue::ObjectId(v) => Value::String(v.to_hex()),
            TypedValue::Decimal(v) => Value::String(v.normalize().to_string()),
            TypedValue::Timestamp(v) => Value::String(format_timestamp(v)),
            TypedValue::Map(filter) => Value::Object(filter.to_document()),
        }
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        TypedValue::String(s.to_string())
    }
}

impl From<bool> for TypedValue {
    fn from(b: bool) -> Self {
        TypedValue::Bool(b)
    }
}

impl From<ObjectId> for TypedValue {
    fn from(id: ObjectId) -> Self {
        TypedValue::ObjectId(id)
    }
}

/// Timestamp text as written to documents.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
