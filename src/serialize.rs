//! This module contains the serialization engine.
//!
//! Serializers are the duals of validators: they walk the same resolved
//! schema graph, but turn an (already validated) value back into an
//! output tree or a JSON document.  A value that doesn't match the
//! schema is an error by default, recoverable through the `fallback`
//! function and then the `serialize_unknown` flag, in that order.

use crate::errors::SerError;
use crate::json::to_json_strict;
use crate::resolve::{resolve, Resolved};
use crate::schema::*;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A user fallback consulted when a value doesn't match the schema.
///
/// Returning `Some` substitutes the returned value (serialized by shape
/// inference); returning `None` declines, letting the next recovery step
/// run.
pub type FallbackFunc = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// The output flavor of a serialization call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SerMode {
    /// A native value tree: bytes stay bytes, map keys stay values.
    Native,
    /// A JSON-compatible tree: bytes become strings, map keys become
    /// their string renderings.
    Json,
}

impl Default for SerMode {
    fn default() -> SerMode {
        SerMode::Native
    }
}

/// Per-call options for the serialize entry points.
#[derive(Clone)]
pub struct SerOptions {
    /// Output flavor; `to_json` always forces [`SerMode::Json`].
    pub mode: SerMode,
    /// Write model fields under their alias instead of their name.
    /// On by default.
    pub by_alias: bool,
    /// If set, only these top-level model fields are emitted.
    pub include: Option<BTreeSet<String>>,
    /// Top-level model fields to omit.  Applied after `include`.
    pub exclude: Option<BTreeSet<String>>,
    /// Pretty-print `to_json` output with this many spaces per level.
    pub indent: Option<usize>,
    /// User recovery for mismatched values.
    pub fallback: Option<FallbackFunc>,
    /// Last-resort recovery: serialize a mismatched value by its shape.
    pub serialize_unknown: bool,
}

impl Default for SerOptions {
    fn default() -> SerOptions {
        SerOptions {
            mode: SerMode::default(),
            by_alias: true,
            include: None,
            exclude: None,
            indent: None,
            fallback: None,
            serialize_unknown: false,
        }
    }
}

impl fmt::Debug for SerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerOptions")
            .field("mode", &self.mode)
            .field("by_alias", &self.by_alias)
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .field("indent", &self.indent)
            .field("fallback", &self.fallback.as_ref().map(|_| "<function>"))
            .field("serialize_unknown", &self.serialize_unknown)
            .finish()
    }
}

/// A compiled serializer for one schema.
///
/// Usually obtained from [`SchemaValidator::serializer`], sharing the
/// validator's resolved graph; [`SchemaSerializer::new`] compiles one
/// standalone.
///
/// [`SchemaValidator::serializer`]: crate::validate::SchemaValidator::serializer
#[derive(Debug)]
pub struct SchemaSerializer {
    resolved: Arc<Resolved>,
}

impl SchemaSerializer {
    /// Resolve and compile a schema, as [`SchemaValidator::new`] does.
    ///
    /// [`SchemaValidator::new`]: crate::validate::SchemaValidator::new
    pub fn new(schema: SchemaNode) -> Result<SchemaSerializer, crate::errors::SchemaError> {
        Ok(SchemaSerializer {
            resolved: Arc::new(resolve(schema)?),
        })
    }

    pub(crate) fn from_resolved(resolved: Arc<Resolved>) -> SchemaSerializer {
        SchemaSerializer { resolved }
    }

    /// Serialize a value into an output tree per `opts.mode`.
    pub fn to_value(&self, value: &Value, opts: &SerOptions) -> Result<Value, SerError> {
        let cx = SerCx {
            defs: &self.resolved.defs,
            opts,
            mode: opts.mode,
        };
        let mut state = SerState::default();
        serialize(value, &self.resolved.root, &cx, &mut state, true, true)
    }

    /// Serialize a value to a JSON document.
    ///
    /// Always serializes in [`SerMode::Json`]; `opts.indent` selects
    /// pretty printing.
    pub fn to_json(&self, value: &Value, opts: &SerOptions) -> Result<Vec<u8>, SerError> {
        let cx = SerCx {
            defs: &self.resolved.defs,
            opts,
            mode: SerMode::Json,
        };
        let mut state = SerState::default();
        let tree = serialize(value, &self.resolved.root, &cx, &mut state, true, true)?;
        let json = to_json_strict(&tree)?;
        encode(&json, opts.indent)
    }
}

fn encode(json: &serde_json::Value, indent: Option<usize>) -> Result<Vec<u8>, SerError> {
    let result = match indent {
        Some(n) => {
            let indent_bytes = vec![b' '; n];
            let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent_bytes);
            let mut out = Vec::new();
            let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
            serde::Serialize::serialize(json, &mut ser).map(|_| out)
        }
        None => serde_json::to_vec(json),
    };
    result.map_err(|e| SerError::Json(e.to_string()))
}

// Immutable per-call context threaded through the walk.
struct SerCx<'a> {
    defs: &'a [SchemaNode],
    opts: &'a SerOptions,
    mode: SerMode,
}

#[derive(Default)]
struct SerState {
    // Addresses of container values currently being serialized.
    guards: Vec<usize>,
    depth: u32,
}

// Same ceiling as validation.  Plain value trees can't cycle, but a
// fallback function that keeps manufacturing nested values can.
const MAX_DEPTH: u32 = 4096;

fn guarded_ser<T, F>(state: &mut SerState, value: &Value, f: F) -> Result<T, SerError>
where
    F: FnOnce(&mut SerState) -> Result<T, SerError>,
{
    let ident = value.ident();
    if state.guards.contains(&ident) {
        return Err(SerError::CircularReference);
    }
    if state.depth >= MAX_DEPTH {
        return Err(SerError::DepthExceeded);
    }
    state.guards.push(ident);
    state.depth += 1;
    let result = f(state);
    state.depth -= 1;
    state.guards.pop();
    result
}

// The recovery ladder for a value the schema can't represent.  During a
// union probe (`recover` false in serialize) the ladder is skipped so
// the union can try its other choices first.
fn mismatch(
    value: &Value,
    expected: &'static str,
    cx: &SerCx,
    state: &mut SerState,
) -> Result<Value, SerError> {
    if let Some(fallback) = &cx.opts.fallback {
        if let Some(substitute) = fallback(value) {
            return guarded_ser(state, value, |state| infer(&substitute, cx, state));
        }
    }
    if cx.opts.serialize_unknown {
        return infer(value, cx, state);
    }
    Err(SerError::UnknownValue {
        expected,
        value: value.short_repr(),
    })
}

// Serialize a value by its own shape, without schema guidance.
fn infer(value: &Value, cx: &SerCx, state: &mut SerState) -> Result<Value, SerError> {
    match value {
        Value::Bytes(b) if cx.mode == SerMode::Json => match std::str::from_utf8(b) {
            Ok(s) => Ok(Value::Str(s.to_string())),
            Err(_) => Err(SerError::BytesNotUtf8),
        },
        Value::Array(items) => guarded_ser(state, value, |state| {
            let out: Result<Vec<_>, _> = items.iter().map(|v| infer(v, cx, state)).collect();
            Ok(Value::Array(out?))
        }),
        Value::Map(map) => guarded_ser(state, value, |state| {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(ser_key(k, cx)?, infer(v, cx, state)?);
            }
            Ok(Value::Map(out))
        }),
        other => Ok(other.clone()),
    }
}

// In JSON mode every map key must have a string rendering.
fn ser_key(key: &Value, cx: &SerCx) -> Result<Value, SerError> {
    match cx.mode {
        SerMode::Native => Ok(key.clone()),
        SerMode::Json => key
            .key_repr()
            .map(Value::Str)
            .ok_or_else(|| SerError::BadKey(key.short_repr())),
    }
}

// The main serialization dispatch, dual to validation.  `recover`
// controls whether the mismatch ladder runs; `at_root` tracks whether
// the top-level include/exclude filter still applies.
fn serialize(
    value: &Value,
    node: &SchemaNode,
    cx: &SerCx,
    state: &mut SerState,
    recover: bool,
    at_root: bool,
) -> Result<Value, SerError> {
    let miss = |expected: &'static str, cx: &SerCx, state: &mut SerState| {
        if recover {
            mismatch(value, expected, cx, state)
        } else {
            Err(SerError::UnknownValue {
                expected,
                value: value.short_repr(),
            })
        }
    };
    match node {
        SchemaNode::Any => infer(value, cx, state),
        SchemaNode::None => match value {
            Value::Null => Ok(Value::Null),
            _ => miss("none", cx, state),
        },
        SchemaNode::Bool(_) => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => miss("bool", cx, state),
        },
        SchemaNode::Int(_) => match value {
            Value::Int(_) => Ok(value.clone()),
            _ => miss("int", cx, state),
        },
        SchemaNode::Float(_) => match value {
            Value::Float(_) => Ok(value.clone()),
            // Validation in lax mode can leave an int behind a float
            // schema via a union; pass it through as a number.
            Value::Int(_) => Ok(value.clone()),
            _ => miss("float", cx, state),
        },
        SchemaNode::Str(_) => match value {
            Value::Str(_) => Ok(value.clone()),
            _ => miss("str", cx, state),
        },
        SchemaNode::Bytes(_) => match value {
            Value::Bytes(b) => match cx.mode {
                SerMode::Native => Ok(value.clone()),
                SerMode::Json => match std::str::from_utf8(b) {
                    Ok(s) => Ok(Value::Str(s.to_string())),
                    Err(_) => Err(SerError::BytesNotUtf8),
                },
            },
            _ => miss("bytes", cx, state),
        },
        SchemaNode::Literal(_) => infer(value, cx, state),
        SchemaNode::List(s) | SchemaNode::Set(s) => match value {
            Value::Array(items) => guarded_ser(state, value, |state| {
                let out: Result<Vec<_>, _> = items
                    .iter()
                    .map(|item| match &s.item {
                        Some(schema) => serialize(item, schema, cx, state, recover, false),
                        None => infer(item, cx, state),
                    })
                    .collect();
                Ok(Value::Array(out?))
            }),
            _ => miss(node.kind_str(), cx, state),
        },
        SchemaNode::Tuple(t) => match value {
            Value::Array(items) => guarded_ser(state, value, |state| {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let schema = t.items.get(i).or_else(|| {
                        t.variadic_item.as_deref().filter(|_| i >= t.items.len())
                    });
                    out.push(match schema {
                        Some(schema) => serialize(item, schema, cx, state, recover, false)?,
                        None => infer(item, cx, state)?,
                    });
                }
                Ok(Value::Array(out))
            }),
            _ => miss("tuple", cx, state),
        },
        SchemaNode::Dict(d) => match value {
            Value::Map(map) => guarded_ser(state, value, |state| {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    let key = match &d.key {
                        Some(schema) => {
                            ser_key(&serialize(k, schema, cx, state, recover, false)?, cx)?
                        }
                        None => ser_key(k, cx)?,
                    };
                    let val = match &d.value {
                        Some(schema) => serialize(v, schema, cx, state, recover, false)?,
                        None => infer(v, cx, state)?,
                    };
                    out.insert(key, val);
                }
                Ok(Value::Map(out))
            }),
            _ => miss("dict", cx, state),
        },
        SchemaNode::Model(m) => match value {
            Value::Map(map) => guarded_ser(state, value, |state| {
                serialize_model(m, map, cx, state, recover, at_root)
            }),
            _ => miss("model", cx, state),
        },
        SchemaNode::Union(u) => {
            // Probe each choice without recovery; the ladder only runs
            // once every choice has declined.
            for choice in &u.choices {
                match serialize(value, choice, cx, state, false, at_root) {
                    Ok(v) => return Ok(v),
                    Err(SerError::UnknownValue { .. }) => continue,
                    Err(other) => return Err(other),
                }
            }
            miss("union", cx, state)
        }
        SchemaNode::TaggedUnion(tu) => {
            let tag = match &tu.discriminator {
                Discriminator::Field(path) => {
                    crate::validate::lookup_path(value, path).and_then(Value::key_repr)
                }
                Discriminator::Function(f) => f(value),
            };
            let choice = tag
                .as_ref()
                .and_then(|t| tu.choices.iter().find(|(name, _)| name == t));
            match choice {
                Some((_, schema)) => serialize(value, schema, cx, state, recover, at_root),
                None => miss("tagged-union", cx, state),
            }
        }
        // A chain's validated output came from its last step.
        SchemaNode::Chain(c) => match c.steps.last() {
            Some(last) => serialize(value, last, cx, state, recover, false),
            None => infer(value, cx, state),
        },
        SchemaNode::Nullable(inner) => match value {
            Value::Null => Ok(Value::Null),
            _ => serialize(value, inner, cx, state, recover, at_root),
        },
        SchemaNode::WithDefault(w) => serialize(value, &w.schema, cx, state, recover, at_root),
        SchemaNode::CustomError(s) => serialize(value, &s.schema, cx, state, recover, at_root),
        // Validation-side hooks are invisible to serialization.
        SchemaNode::FunctionBefore(s) | SchemaNode::FunctionAfter(s) => {
            serialize(value, &s.schema, cx, state, recover, at_root)
        }
        SchemaNode::FunctionWrap(s) => serialize(value, &s.schema, cx, state, recover, at_root),
        SchemaNode::FunctionPlain(_) => infer(value, cx, state),
        SchemaNode::CustomSer(s) => {
            let mut handler = SerHandler {
                node: &s.schema,
                cx,
                state: &mut *state,
            };
            let out = (s.function)(value, &mut handler)?;
            // The hook's output still has to fit the output mode.
            infer(&out, cx, state)
        }
        SchemaNode::Definitions(s) => serialize(value, &s.schema, cx, state, recover, at_root),
        SchemaNode::DefinitionRef(r) => {
            let index = r.index.ok_or_else(|| {
                SerError::Internal(format!("unresolved definition reference '{}'", r.name))
            })?;
            let target = &cx.defs[index];
            // The value guard lives on the container arms; a reference
            // that consumes no input is bounded by depth alone.
            if state.depth >= MAX_DEPTH {
                return Err(SerError::DepthExceeded);
            }
            state.depth += 1;
            let result = serialize(value, target, cx, state, recover, at_root);
            state.depth -= 1;
            result
        }
    }
}

// The output key for a model field: its alias when `by_alias` is set
// and the alias has a single-key form, otherwise its name.
fn output_key(field: &Field, by_alias: bool) -> &str {
    if by_alias {
        if let Some(Alias::Name(alias)) = &field.alias {
            return alias;
        }
    }
    &field.name
}

fn serialize_model(
    m: &ModelSchema,
    map: &BTreeMap<Value, Value>,
    cx: &SerCx,
    state: &mut SerState,
    recover: bool,
    at_root: bool,
) -> Result<Value, SerError> {
    let included = |name: &str| {
        if !at_root {
            return true;
        }
        if let Some(include) = &cx.opts.include {
            if !include.contains(name) {
                return false;
            }
        }
        if let Some(exclude) = &cx.opts.exclude {
            if exclude.contains(name) {
                return false;
            }
        }
        true
    };
    let mut out = BTreeMap::new();
    let mut declared: BTreeSet<&str> = BTreeSet::new();
    for field in &m.fields {
        declared.insert(field.name.as_str());
        if !included(&field.name) {
            continue;
        }
        // Absent optional fields are simply omitted.
        let field_value = match map.get(&Value::Str(field.name.clone())) {
            Some(v) => v,
            None => continue,
        };
        let serialized = serialize(field_value, &field.schema, cx, state, recover, false)?;
        let key = output_key(field, cx.opts.by_alias);
        out.insert(Value::Str(key.to_string()), serialized);
    }
    // Extras admitted by `allow` live in the validated map alongside the
    // declared fields.
    for (key, extra_value) in map {
        let key_name = match key {
            Value::Str(s) => s.as_str(),
            _ => continue,
        };
        if declared.contains(key_name) || !included(key_name) {
            continue;
        }
        let serialized = match &m.extra_schema {
            Some(schema) => serialize(extra_value, schema, cx, state, recover, false)?,
            None => infer(extra_value, cx, state)?,
        };
        out.insert(key.clone(), serialized);
    }
    Ok(Value::Map(out))
}

// The handler handed to custom serializer hooks.
struct SerHandler<'a, 'b> {
    node: &'a SchemaNode,
    cx: &'a SerCx<'a>,
    state: &'b mut SerState,
}

impl<'a, 'b> InnerSerializer for SerHandler<'a, 'b> {
    fn call(&mut self, value: &Value) -> Result<Value, SerError> {
        serialize(value, self.node, self.cx, self.state, true, false)
    }
}
