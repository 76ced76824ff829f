//! Type coercion: one textual request value to a typed value for a field's declared type.
//! Never fails; `None` means "do not apply this key".

use std::str::FromStr;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::value::TypedValue;
use crate::descriptor::FieldType;

fn signed<T>(text: &str) -> Option<TypedValue>
where
    T: FromStr + Into<i64>,
{
    text.trim().parse::<T>().ok().map(|v| TypedValue::Int(v.into()))
}

fn unsigned<T>(text: &str) -> Option<TypedValue>
where
    T: FromStr + Into<u64>,
{
    text.trim().parse::<T>().ok().map(|v| TypedValue::UInt(v.into()))
}

pub fn coerce(text: &str, target: &FieldType) -> Option<TypedValue> {
    match target {
        FieldType::Int8 => signed::<i8>(text),
        FieldType::Int16 => signed::<i16>(text),
        FieldType::Int32 => signed::<i32>(text),
        FieldType::Int64 => signed::<i64>(text),
        FieldType::UInt8 => unsigned::<u8>(text),
        FieldType::UInt16 => unsigned::<u16>(text),
        FieldType::UInt32 => unsigned::<u32>(text),
        FieldType::UInt64 => unsigned::<u64>(text),
        FieldType::Float32 => text
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| TypedValue::Float(f64::from(v))),
        FieldType::Float64 => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(TypedValue::Float),
        FieldType::Bool => {
            let t = text.trim();
            if t.eq_ignore_ascii_case("true") {
                Some(TypedValue::Bool(true))
            } else if t.eq_ignore_ascii_case("false") {
                Some(TypedValue::Bool(false))
            } else {
                None
            }
        }
        FieldType::String => Some(TypedValue::String(text.to_string())),
        FieldType::ObjectId => ObjectId::parse_str(text.trim())
            .ok()
            .map(TypedValue::ObjectId),
        FieldType::Decimal => Decimal::from_str(text.trim())
            .ok()
            .map(TypedValue::Decimal),
        FieldType::Timestamp => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|ts| TypedValue::Timestamp(ts.with_timezone(&Utc))),
        FieldType::Any | FieldType::Object(_) | FieldType::Array(_) => {
            tracing::warn!(target_type = ?target, "coercion target not supported; key skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn canonical_text_round_trips() {
        assert_eq!(coerce("-12", &FieldType::Int8), Some(TypedValue::Int(-12)));
        assert_eq!(coerce("40000", &FieldType::Int32), Some(TypedValue::Int(40000)));
        assert_eq!(
            coerce("9223372036854775807", &FieldType::Int64),
            Some(TypedValue::Int(i64::MAX))
        );
        assert_eq!(coerce("255", &FieldType::UInt8), Some(TypedValue::UInt(255)));
        assert_eq!(
            coerce("18446744073709551615", &FieldType::UInt64),
            Some(TypedValue::UInt(u64::MAX))
        );
        assert_eq!(coerce("0.5", &FieldType::Float32), Some(TypedValue::Float(0.5)));
        assert_eq!(coerce("2.25", &FieldType::Float64), Some(TypedValue::Float(2.25)));
        assert_eq!(coerce("TRUE", &FieldType::Bool), Some(TypedValue::Bool(true)));
        assert_eq!(coerce("false", &FieldType::Bool), Some(TypedValue::Bool(false)));
        assert_eq!(
            coerce("ABC", &FieldType::String),
            Some(TypedValue::String("ABC".into()))
        );
        let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(
            coerce("507f1f77bcf86cd799439011", &FieldType::ObjectId),
            Some(TypedValue::ObjectId(oid))
        );
        assert_eq!(
            coerce("12.345", &FieldType::Decimal),
            Some(TypedValue::Decimal(Decimal::new(12345, 3)))
        );
        assert_eq!(
            coerce("2024-03-01T10:00:00Z", &FieldType::Timestamp),
            Some(TypedValue::Timestamp(
                Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
            ))
        );
    }

    #[test]
    fn out_of_width_or_malformed_text_is_absent() {
        assert_eq!(coerce("128", &FieldType::Int8), None);
        assert_eq!(coerce("-1", &FieldType::UInt16), None);
        assert_eq!(coerce("12abc", &FieldType::Int64), None);
        assert_eq!(coerce("yes", &FieldType::Bool), None);
        assert_eq!(coerce("nan", &FieldType::Float64), None);
        assert_eq!(coerce("507f1f77", &FieldType::ObjectId), None);
        assert_eq!(coerce("1.2.3", &FieldType::Decimal), None);
        assert_eq!(coerce("yesterday", &FieldType::Timestamp), None);
    }

    #[test]
    fn unsupported_targets_are_absent() {
        assert_eq!(coerce("{}", &FieldType::Any), None);
    }
}
