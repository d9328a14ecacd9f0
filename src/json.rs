//! This module converts between [`serde_json::Value`] and the local
//! [`Value`] type.
//!
//! Parsed JSON is the second input realm: `validate_json` parses text
//! with serde_json and converts the result through `TryFrom` below, so
//! the rest of the engine is agnostic to where an input came from.

use crate::errors::SerError;
use crate::value::Value;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::convert::TryFrom;

impl TryFrom<&JsonValue> for Value {
    type Error = String;

    fn try_from(value: &JsonValue) -> Result<Self, Self::Error> {
        let result = match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(num) => {
                if let Some(u) = num.as_u64() {
                    Value::Int(u as i128)
                } else if let Some(i) = num.as_i64() {
                    Value::Int(i as i128)
                } else if let Some(f) = num.as_f64() {
                    Value::from_float(f)
                } else {
                    return Err("JSON number conversion failure".into());
                }
            }
            JsonValue::String(t) => Value::Str(t.clone()),
            JsonValue::Array(a) => {
                let array: Result<Vec<Value>, String> = a.iter().map(Value::try_from).collect();
                Value::Array(array?)
            }
            JsonValue::Object(m) => {
                type MapTree = BTreeMap<Value, Value>;
                let map: Result<MapTree, String> = m
                    .iter()
                    .map(|(k, v)| Ok((Value::Str(k.clone()), Value::try_from(v)?)))
                    .collect();
                Value::Map(map?)
            }
        };
        Ok(result)
    }
}

// A variant that consumes the JSON Value.
impl TryFrom<JsonValue> for Value {
    type Error = String;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        Value::try_from(&value)
    }
}

/// Convert a `Value` into JSON, failing on shapes JSON can't carry.
///
/// Bytes must be valid UTF-8 and map keys must have a scalar rendering.
pub(crate) fn to_json_strict(value: &Value) -> Result<JsonValue, SerError> {
    let result = match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => {
            if let Ok(i) = i64::try_from(*i) {
                JsonValue::from(i)
            } else {
                // Out-of-range integers degrade to their decimal string
                // rather than losing precision through f64.
                JsonValue::String(i.to_string())
            }
        }
        Value::Float(f) => serde_json::Number::from_f64(f.0)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => JsonValue::String(s.to_string()),
            Err(_) => return Err(SerError::BytesNotUtf8),
        },
        Value::Array(a) => {
            let array: Result<Vec<_>, _> = a.iter().map(to_json_strict).collect();
            JsonValue::Array(array?)
        }
        Value::Map(m) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in m {
                let key = k
                    .key_repr()
                    .ok_or_else(|| SerError::BadKey(k.short_repr()))?;
                obj.insert(key, to_json_strict(v)?);
            }
            JsonValue::Object(obj)
        }
    };
    Ok(result)
}

/// Best-effort conversion for diagnostics: never fails, degrading bytes
/// to lossy strings and unrepresentable keys to their debug rendering.
pub(crate) fn to_json_lossy(value: &Value) -> JsonValue {
    match value {
        Value::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
        Value::Array(a) => JsonValue::Array(a.iter().map(to_json_lossy).collect()),
        Value::Map(m) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in m {
                let key = k.key_repr().unwrap_or_else(|| k.short_repr());
                obj.insert(key, to_json_lossy(v));
            }
            JsonValue::Object(obj)
        }
        other => to_json_strict(other).unwrap_or(JsonValue::Null),
    }
}
