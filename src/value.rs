//! This module declares the generic Value enum used for validation and
//! serialization.

use std::collections::BTreeMap;
use std::fmt;

use float_ord::FloatOrd;

/// `Value` represents all the types of data the engine can process.
///
/// Inputs from every realm (native trees, parsed JSON, string maps) are
/// converted into a `Value` before validation, and validators emit `Value`
/// trees as their output.  See the [`json`] module for the JSON conversions.
///
/// [`json`]: crate::json
#[derive(Clone, Eq, Ord, PartialEq, PartialOrd)]
#[allow(missing_docs)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i128),
    Float(FloatOrd<f64>),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<Value, Value>),
}

// FloatOrd doesn't implement Debug, so we have to do all the work by hand.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(x) => x.fmt(f),
            Value::Int(x) => x.fmt(f),
            Value::Float(x) => x.0.fmt(f),
            Value::Str(x) => x.fmt(f),
            Value::Bytes(x) => write!(f, "b'{}'", hex::encode(x)),
            Value::Array(x) => x.fmt(f),
            Value::Map(x) => x.fmt(f),
        }
    }
}

impl Value {
    /// Build a `Value::Float` without exposing `float_ord::FloatOrd`.
    pub fn from_float<F: Into<f64>>(f: F) -> Value {
        Value::Float(FloatOrd(f.into()))
    }

    /// The name of this value's type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// True for `Int` and `Float` values.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// The address of this value, used as its identity by the recursion
    /// guards.  Only meaningful while the value is not moved.
    pub(crate) fn ident(&self) -> usize {
        self as *const Value as usize
    }

    /// Render a scalar value as a map-key string.
    ///
    /// Returns None for arrays and maps, which have no key form.
    pub(crate) fn key_repr(&self) -> Option<String> {
        match self {
            Value::Null => Some("null".to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.0.to_string()),
            Value::Str(s) => Some(s.clone()),
            Value::Bytes(b) => Some(hex::encode(b)),
            Value::Array(_) | Value::Map(_) => None,
        }
    }

    /// A short single-line rendering for diagnostics, truncated so that a
    /// huge input doesn't flood an error message.
    pub(crate) fn short_repr(&self) -> String {
        let full = format!("{:?}", self);
        if full.chars().count() > 40 {
            let head: String = full.chars().take(37).collect();
            format!("{}...", head)
        } else {
            full
        }
    }
}

/// Shortcut for building a `Value::Str`.
pub fn text<T: Into<String>>(s: T) -> Value {
    Value::Str(s.into())
}

/// Shortcut for building a `Value::Int`.
pub fn int<T: Into<i128>>(i: T) -> Value {
    Value::Int(i.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_ordering() {
        // Map keys require a total order, floats included.
        let mut map = BTreeMap::new();
        map.insert(Value::from_float(1.5), Value::Null);
        map.insert(Value::Int(1), Value::Null);
        map.insert(text("a"), Value::Null);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn short_repr_truncates() {
        let v = text("x".repeat(100));
        assert!(v.short_repr().len() <= 40);
        assert!(v.short_repr().ends_with("..."));
    }
}
