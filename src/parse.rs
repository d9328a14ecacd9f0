//! This module builds a schema tree from its data-driven wire format.
//!
//! A schema document is plain JSON: an object with a string `kind`
//! discriminant plus kind-specific keys, nested arbitrarily.  Everything
//! except the function-hook kinds (which carry callables and therefore
//! have no data form) can be expressed this way.
//!
//! ```
//! use valicore::parse::schema_from_json;
//!
//! let doc = serde_json::json!({
//!     "kind": "list",
//!     "items": {"kind": "int", "ge": 0},
//!     "max_length": 10,
//! });
//! let schema = schema_from_json(&doc).unwrap();
//! assert_eq!(schema.kind_str(), "list");
//! ```
//!
//! Bytes values (literals, defaults) are written as `{"$bytes": "..."}`
//! with a base64 payload, since JSON has no byte-string form.

use crate::errors::{PathItem, SchemaError};
use crate::schema::*;
use crate::value::Value;
use serde_json::Value as JsonValue;
use std::convert::TryFrom;

/// Build a [`SchemaNode`] from a JSON schema document.
pub fn schema_from_json(doc: &JsonValue) -> Result<SchemaNode, SchemaError> {
    let obj = doc
        .as_object()
        .ok_or(SchemaError::MissingKey("kind"))?;
    let kind = obj
        .get("kind")
        .and_then(JsonValue::as_str)
        .ok_or(SchemaError::MissingKey("kind"))?;

    let node = match kind {
        "any" => SchemaNode::Any,
        "none" => SchemaNode::None,
        "bool" => SchemaNode::Bool(BoolSchema {
            strict: opt_bool(obj, "strict")?,
        }),
        "int" => SchemaNode::Int(IntSchema {
            strict: opt_bool(obj, "strict")?,
            bounds: number_bounds(obj)?,
        }),
        "float" => SchemaNode::Float(FloatSchema {
            strict: opt_bool(obj, "strict")?,
            bounds: number_bounds(obj)?,
        }),
        "str" => SchemaNode::Str(StrSchema {
            strict: opt_bool(obj, "strict")?,
            min_length: opt_usize(obj, "min_length")?,
            max_length: opt_usize(obj, "max_length")?,
            pattern: match obj.get("pattern") {
                Some(p) => {
                    let text = p.as_str().ok_or(SchemaError::InvalidKey {
                        key: "pattern",
                        reason: "expected a string".into(),
                    })?;
                    Some(Pattern::new(text).map_err(SchemaError::InvalidPattern)?)
                }
                None => None,
            },
        }),
        "bytes" => SchemaNode::Bytes(BytesSchema {
            strict: opt_bool(obj, "strict")?,
            min_length: opt_usize(obj, "min_length")?,
            max_length: opt_usize(obj, "max_length")?,
        }),
        "literal" => {
            let raw = obj
                .get("expected")
                .and_then(JsonValue::as_array)
                .ok_or(SchemaError::MissingKey("expected"))?;
            let expected = raw
                .iter()
                .map(value_from_json)
                .collect::<Result<Vec<_>, _>>()?;
            SchemaNode::Literal(LiteralSchema { expected })
        }
        "list" => SchemaNode::List(seq_schema(obj)?),
        "set" => SchemaNode::Set(seq_schema(obj)?),
        "tuple" => {
            let items = match obj.get("items") {
                Some(JsonValue::Array(a)) => a
                    .iter()
                    .map(schema_from_json)
                    .collect::<Result<Vec<_>, _>>()?,
                Some(_) => {
                    return Err(SchemaError::InvalidKey {
                        key: "items",
                        reason: "expected an array of schemas".into(),
                    })
                }
                None => Vec::new(),
            };
            SchemaNode::Tuple(TupleSchema {
                items,
                variadic_item: opt_schema(obj, "variadic_item")?.map(Box::new),
                strict: opt_bool(obj, "strict")?,
            })
        }
        "dict" => SchemaNode::Dict(DictSchema {
            key: opt_schema(obj, "keys")?.map(Box::new),
            value: opt_schema(obj, "values")?.map(Box::new),
            min_length: opt_usize(obj, "min_length")?,
            max_length: opt_usize(obj, "max_length")?,
            strict: opt_bool(obj, "strict")?,
        }),
        "union" => {
            let raw = obj
                .get("choices")
                .and_then(JsonValue::as_array)
                .ok_or(SchemaError::MissingKey("choices"))?;
            let choices = raw
                .iter()
                .map(schema_from_json)
                .collect::<Result<Vec<_>, _>>()?;
            let mode = match obj.get("mode").and_then(JsonValue::as_str) {
                Some("smart") | None => UnionMode::Smart,
                Some("left_to_right") => UnionMode::LeftToRight,
                Some(other) => {
                    return Err(SchemaError::InvalidKey {
                        key: "mode",
                        reason: format!("unknown union mode '{}'", other),
                    })
                }
            };
            SchemaNode::Union(UnionSchema { choices, mode })
        }
        "tagged-union" => {
            let discriminator = match obj.get("discriminator") {
                Some(JsonValue::String(name)) => Discriminator::key(name),
                Some(JsonValue::Array(segments)) => {
                    Discriminator::Field(path_from_json(segments)?)
                }
                _ => return Err(SchemaError::MissingKey("discriminator")),
            };
            let raw = obj
                .get("choices")
                .and_then(JsonValue::as_object)
                .ok_or(SchemaError::MissingKey("choices"))?;
            let choices = raw
                .iter()
                .map(|(tag, node)| Ok((tag.clone(), schema_from_json(node)?)))
                .collect::<Result<Vec<_>, SchemaError>>()?;
            SchemaNode::TaggedUnion(TaggedUnionSchema {
                discriminator,
                choices,
            })
        }
        "model" => SchemaNode::Model(model_schema(obj)?),
        "chain" => {
            let raw = obj
                .get("steps")
                .and_then(JsonValue::as_array)
                .ok_or(SchemaError::MissingKey("steps"))?;
            let steps = raw
                .iter()
                .map(schema_from_json)
                .collect::<Result<Vec<_>, _>>()?;
            SchemaNode::Chain(ChainSchema { steps })
        }
        "nullable" => {
            let inner = req_schema(obj, "schema")?;
            SchemaNode::Nullable(Box::new(inner))
        }
        "with-default" => SchemaNode::WithDefault(WithDefaultSchema {
            schema: Box::new(req_schema(obj, "schema")?),
            default: match obj.get("default") {
                Some(v) => Some(value_from_json(v)?),
                None => None,
            },
            default_factory: None,
            on_error_default: opt_bool(obj, "on_error_default")?.unwrap_or(false),
        }),
        "custom-error" => SchemaNode::CustomError(CustomErrorSchema {
            schema: Box::new(req_schema(obj, "schema")?),
            message: obj
                .get("message")
                .and_then(JsonValue::as_str)
                .ok_or(SchemaError::MissingKey("message"))?
                .to_string(),
        }),
        "definitions" => {
            let raw = obj
                .get("definitions")
                .and_then(JsonValue::as_object)
                .ok_or(SchemaError::MissingKey("definitions"))?;
            let definitions = raw
                .iter()
                .map(|(name, node)| Ok((name.clone(), schema_from_json(node)?)))
                .collect::<Result<Vec<_>, SchemaError>>()?;
            SchemaNode::Definitions(DefinitionsSchema {
                definitions,
                schema: Box::new(req_schema(obj, "schema")?),
            })
        }
        "definition-ref" => {
            let name = obj
                .get("name")
                .and_then(JsonValue::as_str)
                .ok_or(SchemaError::MissingKey("name"))?;
            SchemaNode::DefinitionRef(DefRef::new(name))
        }
        "function-before" | "function-after" | "function-wrap" | "function-plain"
        | "custom-ser" => {
            return Err(SchemaError::InvalidKey {
                key: "kind",
                reason: format!("'{}' carries a callable and has no data form", kind),
            })
        }
        other => return Err(SchemaError::UnknownKind(other.to_string())),
    };
    Ok(node)
}

/// Convert a JSON value into a `Value`, decoding `{"$bytes": "..."}`
/// wrappers into byte strings.
pub fn value_from_json(doc: &JsonValue) -> Result<Value, SchemaError> {
    if let Some(obj) = doc.as_object() {
        if obj.len() == 1 {
            if let Some(JsonValue::String(b64)) = obj.get("$bytes") {
                let bytes = base64::decode(b64).map_err(|e| SchemaError::InvalidKey {
                    key: "$bytes",
                    reason: e.to_string(),
                })?;
                return Ok(Value::Bytes(bytes));
            }
        }
        let map = obj
            .iter()
            .map(|(k, v)| Ok((Value::Str(k.clone()), value_from_json(v)?)))
            .collect::<Result<_, SchemaError>>()?;
        return Ok(Value::Map(map));
    }
    if let JsonValue::Array(a) = doc {
        let array = a
            .iter()
            .map(value_from_json)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::Array(array));
    }
    Value::try_from(doc).map_err(|reason| SchemaError::InvalidKey {
        key: "value",
        reason,
    })
}

fn model_schema(obj: &serde_json::Map<String, JsonValue>) -> Result<ModelSchema, SchemaError> {
    let name = obj
        .get("name")
        .and_then(JsonValue::as_str)
        .unwrap_or("model")
        .to_string();
    let raw_fields = obj
        .get("fields")
        .and_then(JsonValue::as_array)
        .ok_or(SchemaError::MissingKey("fields"))?;
    let mut fields = Vec::with_capacity(raw_fields.len());
    for raw in raw_fields {
        let fobj = raw.as_object().ok_or(SchemaError::InvalidKey {
            key: "fields",
            reason: "each field must be an object".into(),
        })?;
        let fname = fobj
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or(SchemaError::MissingKey("name"))?;
        let schema = req_schema(fobj, "schema")?;
        let default = match fobj.get("default") {
            Some(v) => Some(value_from_json(v)?),
            None => None,
        };
        let required = match opt_bool(fobj, "required")? {
            Some(r) => r,
            None => default.is_none(),
        };
        let alias = match fobj.get("alias") {
            Some(JsonValue::String(name)) => Some(Alias::Name(name.clone())),
            Some(JsonValue::Array(items)) => Some(alias_from_json(items)?),
            Some(_) => {
                return Err(SchemaError::InvalidKey {
                    key: "alias",
                    reason: "expected a string or an array".into(),
                })
            }
            None => None,
        };
        let on_error = match fobj.get("on_error").and_then(JsonValue::as_str) {
            Some("raise") | None => OnError::Raise,
            Some("omit") => OnError::Omit,
            Some("fallback_on_default") => OnError::FallbackOnDefault,
            Some(other) => {
                return Err(SchemaError::InvalidKey {
                    key: "on_error",
                    reason: format!("unknown on_error policy '{}'", other),
                })
            }
        };
        fields.push(Field {
            name: fname.to_string(),
            schema,
            alias,
            required,
            default,
            default_factory: None,
            on_error,
            frozen: opt_bool(fobj, "frozen")?.unwrap_or(false),
        });
    }
    let extra = match obj.get("extra").and_then(JsonValue::as_str) {
        Some("ignore") | None => ExtraBehavior::Ignore,
        Some("forbid") => ExtraBehavior::Forbid,
        Some("allow") => ExtraBehavior::Allow,
        Some(other) => {
            return Err(SchemaError::InvalidKey {
                key: "extra",
                reason: format!("unknown extra behavior '{}'", other),
            })
        }
    };
    Ok(ModelSchema {
        name,
        fields,
        extra,
        extra_schema: opt_schema(obj, "extra_schema")?.map(Box::new),
        populate_by_name: opt_bool(obj, "populate_by_name")?.unwrap_or(false),
        strict: opt_bool(obj, "strict")?,
        frozen: opt_bool(obj, "frozen")?.unwrap_or(false),
    })
}

// An array of arrays means alternative lookup paths; a flat array is one
// path of segments.
fn alias_from_json(items: &[JsonValue]) -> Result<Alias, SchemaError> {
    if items.iter().all(JsonValue::is_array) {
        let choices = items
            .iter()
            .map(|path| path_from_json(path.as_array().expect("checked above")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Alias::Choices(choices))
    } else {
        Ok(Alias::Path(path_from_json(items)?))
    }
}

fn path_from_json(segments: &[JsonValue]) -> Result<Vec<PathItem>, SchemaError> {
    segments
        .iter()
        .map(|seg| match seg {
            JsonValue::String(k) => Ok(PathItem::Key(k.clone())),
            JsonValue::Number(n) => n
                .as_u64()
                .map(|i| PathItem::Index(i as usize))
                .ok_or(SchemaError::InvalidKey {
                    key: "alias",
                    reason: "path indices must be non-negative integers".into(),
                }),
            _ => Err(SchemaError::InvalidKey {
                key: "alias",
                reason: "path segments must be strings or integers".into(),
            }),
        })
        .collect()
}

fn seq_schema(obj: &serde_json::Map<String, JsonValue>) -> Result<SeqSchema, SchemaError> {
    Ok(SeqSchema {
        item: opt_schema(obj, "items")?.map(Box::new),
        min_length: opt_usize(obj, "min_length")?,
        max_length: opt_usize(obj, "max_length")?,
        strict: opt_bool(obj, "strict")?,
    })
}

fn number_bounds(obj: &serde_json::Map<String, JsonValue>) -> Result<NumberBounds, SchemaError> {
    let get = |key: &'static str| -> Result<Option<Value>, SchemaError> {
        match obj.get(key) {
            Some(v) => {
                let value = value_from_json(v)?;
                if !value.is_number() {
                    return Err(SchemaError::InvalidBounds(format!(
                        "{} bound must be a number",
                        key
                    )));
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    };
    Ok(NumberBounds {
        ge: get("ge")?,
        gt: get("gt")?,
        le: get("le")?,
        lt: get("lt")?,
        multiple_of: get("multiple_of")?,
    })
}

fn opt_bool(
    obj: &serde_json::Map<String, JsonValue>,
    key: &'static str,
) -> Result<Option<bool>, SchemaError> {
    match obj.get(key) {
        Some(JsonValue::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(SchemaError::InvalidKey {
            key,
            reason: "expected a boolean".into(),
        }),
        None => Ok(None),
    }
}

fn opt_usize(
    obj: &serde_json::Map<String, JsonValue>,
    key: &'static str,
) -> Result<Option<usize>, SchemaError> {
    match obj.get(key) {
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or(SchemaError::InvalidKey {
                key,
                reason: "expected a non-negative integer".into(),
            }),
        None => Ok(None),
    }
}

fn opt_schema(
    obj: &serde_json::Map<String, JsonValue>,
    key: &'static str,
) -> Result<Option<SchemaNode>, SchemaError> {
    match obj.get(key) {
        Some(v) => Ok(Some(schema_from_json(v)?)),
        None => Ok(None),
    }
}

fn req_schema(
    obj: &serde_json::Map<String, JsonValue>,
    key: &'static str,
) -> Result<SchemaNode, SchemaError> {
    opt_schema(obj, key)?.ok_or(SchemaError::MissingKey(key))
}
