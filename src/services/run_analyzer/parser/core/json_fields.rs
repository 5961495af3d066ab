//! Tolerant field accessors over `serde_json::Value`
//!
//! Spark writes numbers as JSON integers, but hand-edited or re-serialized logs
//! sometimes carry floats or numeric strings. Every accessor returns `None` for a
//! missing or unusable field so callers can degrade per field.

use serde_json::Value;

pub struct JsonFields;

impl JsonFields {
    /// Read an integer field; floats are truncated, numeric strings parsed.
    pub fn i64_at(value: &Value, field: &str) -> Option<i64> {
        value.get(field).and_then(Self::as_i64)
    }

    /// Read an integer two levels deep, e.g. `"Task Info" -> "Launch Time"`.
    pub fn i64_at_path(value: &Value, outer: &str, inner: &str) -> Option<i64> {
        value.get(outer).and_then(|o| Self::i64_at(o, inner))
    }

    pub fn u32_at(value: &Value, field: &str) -> Option<u32> {
        Self::i64_at(value, field).and_then(|v| u32::try_from(v).ok())
    }

    pub fn i32_at(value: &Value, field: &str) -> Option<i32> {
        Self::i64_at(value, field).and_then(|v| i32::try_from(v).ok())
    }

    /// Non-negative counter, missing or negative values read as zero.
    pub fn counter_at(value: &Value, field: &str) -> u64 {
        Self::i64_at(value, field)
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0)
    }

    pub fn str_at<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
        value.get(field).and_then(|v| v.as_str())
    }

    /// Nested object, `None` when missing or not an object.
    pub fn object_at<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
        value.get(field).filter(|v| v.is_object())
    }

    fn as_i64(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
