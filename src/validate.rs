//! This module contains the validation engine.
//!
//! [`validate`] is the central dispatch function: it matches one schema
//! node against one input value, recursing as needed.  Expected failures
//! are reported as line-items through the recoverable error channel;
//! only hook bugs and depth exhaustion travel the fatal channel.
//!
//! [`SchemaValidator`] wraps a resolved schema graph and exposes the
//! top-level entry points.

use crate::context::{guarded, Extra, State, UserContext};
use crate::errors::{
    prefix_items, ErrorKind, FatalError, LineItem, PathItem, SchemaError, ValError, ValResult,
    ValidateError, ValidationErrors,
};
use crate::resolve::{resolve, Resolved};
use crate::schema::*;
use crate::serialize::SchemaSerializer;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;
use std::sync::Arc;

/// Per-call options for the validate entry points.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// Strictness override for this call; wins over per-node settings.
    pub strict: Option<bool>,
    /// Opaque context passed through to hooks unchanged.
    pub context: Option<UserContext>,
}

impl ValidateOptions {
    fn extra(&self) -> Extra {
        Extra {
            strict: self.strict,
            context: self.context.clone(),
        }
    }
}

/// A compiled validator for one schema.
///
/// Compilation happens once in [`SchemaValidator::new`]; after that the
/// graph (including the shared definitions arena) is immutable, so one
/// validator may be shared freely across threads.
#[derive(Debug)]
pub struct SchemaValidator {
    resolved: Arc<Resolved>,
    title: String,
}

impl SchemaValidator {
    /// Resolve and compile a schema.  All structural schema errors are
    /// raised here, never during per-instance validation.
    pub fn new(schema: SchemaNode) -> Result<SchemaValidator, SchemaError> {
        let resolved = resolve(schema)?;
        let title = schema_title(&resolved);
        Ok(SchemaValidator {
            resolved: Arc::new(resolved),
            title,
        })
    }

    /// The display title used for aggregate errors: the root model's
    /// name, or the root schema kind.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Validate a native value tree.
    pub fn validate_value(
        &self,
        input: &Value,
        opts: &ValidateOptions,
    ) -> Result<Value, ValidateError> {
        self.run(input, opts.extra())
    }

    /// Parse a JSON document and validate it.
    ///
    /// Malformed JSON is reported as a single `json_invalid` line-item
    /// rather than a separate error type.
    pub fn validate_json(
        &self,
        json: &str,
        opts: &ValidateOptions,
    ) -> Result<Value, ValidateError> {
        let parsed: serde_json::Value = match serde_json::from_str(json) {
            Ok(v) => v,
            Err(e) => return Err(self.json_invalid(json, e.to_string())),
        };
        let value = match Value::try_from(&parsed) {
            Ok(v) => v,
            Err(e) => return Err(self.json_invalid(json, e)),
        };
        self.run(&value, opts.extra())
    }

    /// Validate a tree whose leaves are all strings (e.g. parsed from a
    /// query string or environment variables), coercing them through the
    /// lax ladders.
    pub fn validate_strings(
        &self,
        input: &Value,
        opts: &ValidateOptions,
    ) -> Result<Value, ValidateError> {
        let mut extra = opts.extra();
        if extra.strict.is_none() {
            extra.strict = Some(false);
        }
        self.run(input, extra)
    }

    /// Cheap boolean check: does this input validate?
    ///
    /// Discards all error detail and never panics; a fatal error counts
    /// as "no".
    pub fn isinstance_value(&self, input: &Value) -> bool {
        self.run(input, Extra::default()).is_ok()
    }

    /// Re-validate a single field mutation against its declared schema.
    ///
    /// `current` must be the model's current (already validated) field
    /// map; the returned value is that map with the new field value
    /// substituted.  Honors per-field and whole-model `frozen` flags.
    pub fn validate_assignment(
        &self,
        field_name: &str,
        new_value: &Value,
        current: &Value,
    ) -> Result<Value, ValidateError> {
        let model = match find_model(&self.resolved) {
            Some(m) => m,
            None => {
                return Err(ValidateError::Fatal(FatalError::Internal(
                    "schema root is not a model; cannot validate assignment".into(),
                )))
            }
        };
        let current_map = match current {
            Value::Map(map) => map,
            _ => {
                return Err(ValidateError::Fatal(FatalError::Internal(
                    "current field values must be a map".into(),
                )))
            }
        };
        if model.frozen {
            let item = LineItem::new(ErrorKind::FrozenInstance, new_value);
            return Err(self.invalid(vec![item]));
        }
        let field = match model.fields.iter().find(|f| f.name == field_name) {
            Some(f) => f,
            None => {
                let item = LineItem::new(ErrorKind::NoSuchAttribute, new_value)
                    .with_ctx("attribute", Value::Str(field_name.to_string()));
                return Err(self.invalid(vec![item]));
            }
        };
        if field.frozen {
            let mut item = LineItem::new(ErrorKind::FrozenField, new_value);
            item.path.push(PathItem::Key(field_name.to_string()));
            return Err(self.invalid(vec![item]));
        }
        let mut state = State::new();
        let extra = Extra::default();
        match validate(
            new_value,
            &field.schema,
            &self.resolved.defs,
            &extra,
            &mut state,
        ) {
            Ok(validated) => {
                let mut updated = current_map.clone();
                updated.insert(Value::Str(field_name.to_string()), validated);
                Ok(Value::Map(updated))
            }
            Err(ValError::LineErrors(items)) => {
                Err(self.invalid(prefix_items(items, PathItem::Key(field_name.to_string()))))
            }
            Err(ValError::Fatal(fatal)) => Err(ValidateError::Fatal(fatal)),
        }
    }

    /// A serializer sharing this validator's compiled graph.
    pub fn serializer(&self) -> SchemaSerializer {
        SchemaSerializer::from_resolved(self.resolved.clone())
    }

    pub(crate) fn resolved(&self) -> &Arc<Resolved> {
        &self.resolved
    }

    fn run(&self, input: &Value, extra: Extra) -> Result<Value, ValidateError> {
        let mut state = State::new();
        match validate(
            input,
            &self.resolved.root,
            &self.resolved.defs,
            &extra,
            &mut state,
        ) {
            Ok(v) => Ok(v),
            Err(ValError::LineErrors(items)) => Err(self.invalid(items)),
            Err(ValError::Fatal(fatal)) => Err(ValidateError::Fatal(fatal)),
        }
    }

    fn invalid(&self, items: Vec<LineItem>) -> ValidateError {
        ValidateError::Invalid(ValidationErrors::new(&self.title, items))
    }

    fn json_invalid(&self, json: &str, message: String) -> ValidateError {
        let input = Value::Str(json.chars().take(100).collect());
        let item = LineItem::new(ErrorKind::JsonInvalid, &input)
            .with_ctx("error", Value::Str(message));
        self.invalid(vec![item])
    }
}

fn schema_title(resolved: &Resolved) -> String {
    let mut node = &resolved.root;
    // Chase a few indirections looking for a model name; give up on
    // anything convoluted.
    for _ in 0..8 {
        match node {
            SchemaNode::Model(m) => return m.name.clone(),
            SchemaNode::Nullable(inner) => node = inner,
            SchemaNode::WithDefault(w) => node = &w.schema,
            SchemaNode::DefinitionRef(r) => match r.index {
                Some(i) => node = &resolved.defs[i],
                None => break,
            },
            _ => break,
        }
    }
    node.kind_str().to_string()
}

fn find_model(resolved: &Resolved) -> Option<&ModelSchema> {
    let mut node = &resolved.root;
    for _ in 0..8 {
        match node {
            SchemaNode::Model(m) => return Some(m),
            SchemaNode::DefinitionRef(r) => node = &resolved.defs[r.index?],
            _ => return None,
        }
    }
    None
}

fn node_key(node: &SchemaNode) -> usize {
    node as *const SchemaNode as usize
}

// This is the main validation dispatch function.
// It matches a schema node and a value, recursing as needed.
pub(crate) fn validate(
    value: &Value,
    node: &SchemaNode,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
) -> ValResult<Value> {
    match node {
        SchemaNode::Any => Ok(value.clone()),
        SchemaNode::None => match value {
            Value::Null => Ok(Value::Null),
            _ => Err(ValError::one(LineItem::new(ErrorKind::NoneRequired, value))),
        },
        SchemaNode::Bool(s) => validate_bool(s, value, extra),
        SchemaNode::Int(s) => validate_int(s, value, extra),
        SchemaNode::Float(s) => validate_float(s, value, extra),
        SchemaNode::Str(s) => validate_str(s, value, extra),
        SchemaNode::Bytes(s) => validate_bytes(s, value, extra),
        SchemaNode::Literal(s) => validate_literal(s, value),
        SchemaNode::List(s) => guarded(state, node_key(node), value, |state| {
            validate_sequence(s, value, defs, extra, state, ErrorKind::ListType)
        }),
        SchemaNode::Set(s) => guarded(state, node_key(node), value, |state| {
            validate_set(s, value, defs, extra, state)
        }),
        SchemaNode::Tuple(s) => guarded(state, node_key(node), value, |state| {
            validate_tuple(s, value, defs, extra, state)
        }),
        SchemaNode::Dict(s) => guarded(state, node_key(node), value, |state| {
            validate_dict(s, value, defs, extra, state)
        }),
        SchemaNode::Model(s) => guarded(state, node_key(node), value, |state| {
            validate_model(s, value, defs, extra, state)
        }),
        SchemaNode::Union(s) => validate_union(s, value, defs, extra, state),
        SchemaNode::TaggedUnion(s) => validate_tagged_union(s, value, defs, extra, state),
        SchemaNode::Chain(s) => validate_chain(s, value, defs, extra, state),
        SchemaNode::Nullable(inner) => match value {
            Value::Null => Ok(Value::Null),
            _ => validate(value, inner, defs, extra, state),
        },
        SchemaNode::WithDefault(s) => validate_with_default(s, value, defs, extra, state),
        SchemaNode::CustomError(s) => {
            match validate(value, &s.schema, defs, extra, state) {
                Ok(v) => Ok(v),
                Err(ValError::LineErrors(_)) => {
                    Err(ValError::one(LineItem::new(ErrorKind::ValueError, value)
                        .with_ctx("error", Value::Str(s.message.clone()))))
                }
                Err(fatal) => Err(fatal),
            }
        }
        SchemaNode::FunctionBefore(s) => {
            let transformed =
                (s.function)(value.clone(), extra).map_err(|e| map_hook_error(e, value))?;
            validate(&transformed, &s.schema, defs, extra, state)
        }
        SchemaNode::FunctionAfter(s) => {
            let inner = validate(value, &s.schema, defs, extra, state)?;
            (s.function)(inner, extra).map_err(|e| map_hook_error(e, value))
        }
        SchemaNode::FunctionWrap(s) => validate_wrap(s, value, defs, extra, state),
        SchemaNode::FunctionPlain(s) => {
            (s.function)(value.clone(), extra).map_err(|e| map_hook_error(e, value))
        }
        SchemaNode::CustomSer(s) => validate(value, &s.schema, defs, extra, state),
        // Stripped during resolution; validate the inner schema if one
        // somehow survives.
        SchemaNode::Definitions(s) => validate(value, &s.schema, defs, extra, state),
        SchemaNode::DefinitionRef(r) => {
            let index = match r.index {
                Some(i) => i,
                None => {
                    return Err(ValError::Fatal(FatalError::Internal(format!(
                        "unresolved definition reference '{}'",
                        r.name
                    ))))
                }
            };
            let target = &defs[index];
            // Guard on this reference node, not the target: the target's
            // own arm may guard itself, and a recursive walk that returns
            // to the same value must re-enter through some reference node.
            guarded(state, node_key(node), value, |state| {
                validate(value, target, defs, extra, state)
            })
        }
    }
}

fn map_hook_error(e: HookError, input: &Value) -> ValError {
    match e {
        HookError::Value(msg) => ValError::one(
            LineItem::new(ErrorKind::ValueError, input).with_ctx("error", Value::Str(msg)),
        ),
        HookError::Assertion(msg) => ValError::one(
            LineItem::new(ErrorKind::AssertionError, input).with_ctx("error", Value::Str(msg)),
        ),
        HookError::Validation(errors) => ValError::LineErrors(errors.into_items()),
        HookError::Fatal(msg) => ValError::Fatal(FatalError::Hook(msg)),
    }
}

fn validate_bool(s: &BoolSchema, value: &Value, extra: &Extra) -> ValResult<Value> {
    let strict = extra.strictness(s.strict);
    match value {
        Value::Bool(_) => Ok(value.clone()),
        _ if strict => Err(ValError::one(LineItem::new(ErrorKind::BoolType, value))),
        Value::Int(0) => Ok(Value::Bool(false)),
        Value::Int(1) => Ok(Value::Bool(true)),
        Value::Str(text) => match text.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Ok(Value::Bool(true)),
            "false" | "f" | "no" | "n" | "off" | "0" => Ok(Value::Bool(false)),
            _ => Err(ValError::one(LineItem::new(ErrorKind::BoolParsing, value))),
        },
        _ => Err(ValError::one(LineItem::new(ErrorKind::BoolType, value))),
    }
}

// 2^127; finite floats strictly below this magnitude fit in i128.
const INT_MAGNITUDE_LIMIT: f64 = 170141183460469231731687303715884105728.0;

// Convert an integer-valued float exactly, refusing to saturate.
fn float_to_int(f: f64) -> Option<i128> {
    if (-INT_MAGNITUDE_LIMIT..INT_MAGNITUDE_LIMIT).contains(&f) {
        Some(f as i128)
    } else {
        None
    }
}

fn int_from_float(f: f64, raw: &Value) -> ValResult<Value> {
    if f.is_finite() && f.fract() == 0.0 {
        match float_to_int(f) {
            Some(i) => Ok(Value::Int(i)),
            None => Err(ValError::one(LineItem::new(ErrorKind::IntParsingSize, raw))),
        }
    } else {
        Err(ValError::one(LineItem::new(ErrorKind::IntFromFloat, raw)))
    }
}

fn validate_int(s: &IntSchema, value: &Value, extra: &Extra) -> ValResult<Value> {
    let strict = extra.strictness(s.strict);
    let out = match value {
        Value::Int(_) => value.clone(),
        _ if strict => return Err(ValError::one(LineItem::new(ErrorKind::IntType, value))),
        Value::Bool(b) => Value::Int(*b as i128),
        Value::Float(f) => int_from_float(f.0, value)?,
        Value::Str(text) => {
            let trimmed = text.trim();
            if let Ok(i) = trimmed.parse::<i128>() {
                Value::Int(i)
            } else if let Ok(f) = trimmed.parse::<f64>() {
                int_from_float(f, value)?
            } else {
                return Err(ValError::one(LineItem::new(ErrorKind::IntParsing, value)));
            }
        }
        _ => return Err(ValError::one(LineItem::new(ErrorKind::IntType, value))),
    };
    check_number_bounds(&s.bounds, &out, value)?;
    Ok(out)
}

fn validate_float(s: &FloatSchema, value: &Value, extra: &Extra) -> ValResult<Value> {
    let strict = extra.strictness(s.strict);
    let out = match value {
        Value::Float(_) => value.clone(),
        _ if strict => return Err(ValError::one(LineItem::new(ErrorKind::FloatType, value))),
        Value::Int(i) => Value::from_float(*i as f64),
        Value::Bool(b) => Value::from_float(if *b { 1.0 } else { 0.0 }),
        Value::Str(text) => match text.trim().parse::<f64>() {
            Ok(f) => Value::from_float(f),
            Err(_) => {
                return Err(ValError::one(LineItem::new(ErrorKind::FloatParsing, value)))
            }
        },
        _ => return Err(ValError::one(LineItem::new(ErrorKind::FloatType, value))),
    };
    check_number_bounds(&s.bounds, &out, value)?;
    Ok(out)
}

fn validate_str(s: &StrSchema, value: &Value, extra: &Extra) -> ValResult<Value> {
    let strict = extra.strictness(s.strict);
    let out = match value {
        Value::Str(_) => value.clone(),
        _ if strict => return Err(ValError::one(LineItem::new(ErrorKind::StringType, value))),
        Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(text) => Value::Str(text.to_string()),
            Err(_) => {
                return Err(ValError::one(LineItem::new(ErrorKind::StringUnicode, value)))
            }
        },
        _ => return Err(ValError::one(LineItem::new(ErrorKind::StringType, value))),
    };
    let text = match &out {
        Value::Str(t) => t,
        _ => unreachable!(),
    };
    let mut errors = Vec::new();
    let chars = text.chars().count();
    if let Some(min) = s.min_length {
        if chars < min {
            errors.push(
                LineItem::new(ErrorKind::StringTooShort, value)
                    .with_ctx("min_length", Value::Int(min as i128)),
            );
        }
    }
    if let Some(max) = s.max_length {
        if chars > max {
            errors.push(
                LineItem::new(ErrorKind::StringTooLong, value)
                    .with_ctx("max_length", Value::Int(max as i128)),
            );
        }
    }
    if let Some(pattern) = &s.pattern {
        if !pattern.re.is_match(text) {
            errors.push(
                LineItem::new(ErrorKind::StringPatternMismatch, value)
                    .with_ctx("pattern", Value::Str(pattern.as_str().to_string())),
            );
        }
    }
    if errors.is_empty() {
        Ok(out)
    } else {
        Err(ValError::LineErrors(errors))
    }
}

fn validate_bytes(s: &BytesSchema, value: &Value, extra: &Extra) -> ValResult<Value> {
    let strict = extra.strictness(s.strict);
    let out = match value {
        Value::Bytes(_) => value.clone(),
        _ if strict => return Err(ValError::one(LineItem::new(ErrorKind::BytesType, value))),
        Value::Str(text) => Value::Bytes(text.as_bytes().to_vec()),
        _ => return Err(ValError::one(LineItem::new(ErrorKind::BytesType, value))),
    };
    let len = match &out {
        Value::Bytes(b) => b.len(),
        _ => unreachable!(),
    };
    if let Some(min) = s.min_length {
        if len < min {
            return Err(ValError::one(
                LineItem::new(ErrorKind::BytesTooShort, value)
                    .with_ctx("min_length", Value::Int(min as i128)),
            ));
        }
    }
    if let Some(max) = s.max_length {
        if len > max {
            return Err(ValError::one(
                LineItem::new(ErrorKind::BytesTooLong, value)
                    .with_ctx("max_length", Value::Int(max as i128)),
            ));
        }
    }
    Ok(out)
}

fn validate_literal(s: &LiteralSchema, value: &Value) -> ValResult<Value> {
    if s.expected.iter().any(|e| e == value) {
        return Ok(value.clone());
    }
    let expected: Vec<String> = s.expected.iter().map(Value::short_repr).collect();
    Err(ValError::one(
        LineItem::new(ErrorKind::LiteralError, value)
            .with_ctx("expected", Value::Str(expected.join(" or "))),
    ))
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => f.0,
        _ => f64::NAN,
    }
}

// Compare a validated number against one bound value.
fn num_lt(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x < y,
        _ => as_f64(a) < as_f64(b),
    }
}

fn num_le(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x <= y,
        _ => as_f64(a) <= as_f64(b),
    }
}

fn is_multiple(value: &Value, multiple: &Value) -> bool {
    match (value, multiple) {
        (Value::Int(v), Value::Int(m)) => *m != 0 && v % m == 0,
        _ => {
            let (v, m) = (as_f64(value), as_f64(multiple));
            if m == 0.0 || !v.is_finite() {
                return false;
            }
            let quotient = v / m;
            (quotient - quotient.round()).abs() < 1e-9
        }
    }
}

// Bounds apply after coercion; each violated bound yields its own
// line-item, carrying the bound value in the context.
fn check_number_bounds(bounds: &NumberBounds, out: &Value, raw: &Value) -> ValResult<()> {
    if bounds.is_empty() {
        return Ok(());
    }
    let mut errors = Vec::new();
    if let Some(ge) = &bounds.ge {
        if num_lt(out, ge) {
            errors.push(
                LineItem::new(ErrorKind::GreaterThanEqual, raw).with_ctx("ge", ge.clone()),
            );
        }
    }
    if let Some(gt) = &bounds.gt {
        if num_le(out, gt) {
            errors.push(LineItem::new(ErrorKind::GreaterThan, raw).with_ctx("gt", gt.clone()));
        }
    }
    if let Some(le) = &bounds.le {
        if num_lt(le, out) {
            errors.push(LineItem::new(ErrorKind::LessThanEqual, raw).with_ctx("le", le.clone()));
        }
    }
    if let Some(lt) = &bounds.lt {
        if num_le(lt, out) {
            errors.push(LineItem::new(ErrorKind::LessThan, raw).with_ctx("lt", lt.clone()));
        }
    }
    if let Some(multiple) = &bounds.multiple_of {
        if !is_multiple(out, multiple) {
            errors.push(
                LineItem::new(ErrorKind::MultipleOf, raw)
                    .with_ctx("multiple_of", multiple.clone()),
            );
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValError::LineErrors(errors))
    }
}

fn check_seq_lengths(
    len: usize,
    min: Option<usize>,
    max: Option<usize>,
    raw: &Value,
    errors: &mut Vec<LineItem>,
) {
    if let Some(min) = min {
        if len < min {
            errors.push(
                LineItem::new(ErrorKind::TooShort, raw)
                    .with_ctx("min_length", Value::Int(min as i128)),
            );
        }
    }
    if let Some(max) = max {
        if len > max {
            errors.push(
                LineItem::new(ErrorKind::TooLong, raw)
                    .with_ctx("max_length", Value::Int(max as i128)),
            );
        }
    }
}

// Shared element loop for list and set: validate every element against
// the item schema, continuing past failures so one bad element doesn't
// hide the rest.
fn validate_sequence(
    s: &SeqSchema,
    value: &Value,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
    type_error: ErrorKind,
) -> ValResult<Value> {
    let items = match value {
        Value::Array(a) => a,
        _ => return Err(ValError::one(LineItem::new(type_error, value))),
    };
    let extra = &extra.scoped(s.strict);
    let mut out = Vec::with_capacity(items.len());
    let mut errors: Vec<LineItem> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match &s.item {
            Some(item_schema) => match validate(item, item_schema, defs, extra, state) {
                Ok(v) => out.push(v),
                Err(ValError::LineErrors(child)) => {
                    errors.extend(prefix_items(child, PathItem::Index(i)));
                }
                Err(fatal) => return Err(fatal),
            },
            None => out.push(item.clone()),
        }
    }
    check_seq_lengths(items.len(), s.min_length, s.max_length, value, &mut errors);
    if errors.is_empty() {
        Ok(Value::Array(out))
    } else {
        Err(ValError::LineErrors(errors))
    }
}

// Sets are arrays whose validated elements must be pairwise distinct.
// Lax mode coerces duplicates away; strict mode reports them.
fn validate_set(
    s: &SeqSchema,
    value: &Value,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
) -> ValResult<Value> {
    let validated = validate_sequence(s, value, defs, extra, state, ErrorKind::SetType)?;
    let items = match validated {
        Value::Array(a) => a,
        _ => unreachable!(),
    };
    let strict = extra.strictness(s.strict);
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        if seen.insert(item.clone()) {
            out.push(item);
        } else if strict {
            errors.push(prefixed_item(
                LineItem::new(ErrorKind::SetItemNotUnique, &item),
                PathItem::Index(i),
            ));
        }
    }
    if errors.is_empty() {
        Ok(Value::Array(out))
    } else {
        Err(ValError::LineErrors(errors))
    }
}

fn prefixed_item(mut item: LineItem, segment: PathItem) -> LineItem {
    item.path.insert(0, segment);
    item
}

fn validate_tuple(
    s: &TupleSchema,
    value: &Value,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
) -> ValResult<Value> {
    let items = match value {
        Value::Array(a) => a,
        _ => return Err(ValError::one(LineItem::new(ErrorKind::TupleType, value))),
    };
    let extra = &extra.scoped(s.strict);
    let mut out = Vec::with_capacity(items.len());
    let mut errors: Vec<LineItem> = Vec::new();
    for (i, schema) in s.items.iter().enumerate() {
        match items.get(i) {
            Some(item) => match validate(item, schema, defs, extra, state) {
                Ok(v) => out.push(v),
                Err(ValError::LineErrors(child)) => {
                    errors.extend(prefix_items(child, PathItem::Index(i)));
                }
                Err(fatal) => return Err(fatal),
            },
            None => {
                errors.push(prefixed_item(
                    LineItem::new(ErrorKind::Missing, value),
                    PathItem::Index(i),
                ));
            }
        }
    }
    if items.len() > s.items.len() {
        match &s.variadic_item {
            Some(schema) => {
                for (i, item) in items.iter().enumerate().skip(s.items.len()) {
                    match validate(item, schema, defs, extra, state) {
                        Ok(v) => out.push(v),
                        Err(ValError::LineErrors(child)) => {
                            errors.extend(prefix_items(child, PathItem::Index(i)));
                        }
                        Err(fatal) => return Err(fatal),
                    }
                }
            }
            None => {
                errors.push(
                    LineItem::new(ErrorKind::TooLong, value)
                        .with_ctx("max_length", Value::Int(s.items.len() as i128)),
                );
            }
        }
    }
    if errors.is_empty() {
        Ok(Value::Array(out))
    } else {
        Err(ValError::LineErrors(errors))
    }
}

fn validate_dict(
    s: &DictSchema,
    value: &Value,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
) -> ValResult<Value> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(ValError::one(LineItem::new(ErrorKind::DictType, value))),
    };
    let extra = &extra.scoped(s.strict);
    let mut out = BTreeMap::new();
    let mut errors: Vec<LineItem> = Vec::new();
    for (key, val) in map {
        let key_name = key.key_repr().unwrap_or_else(|| key.short_repr());
        let validated_key = match &s.key {
            Some(schema) => match validate(key, schema, defs, extra, state) {
                Ok(k) => k,
                Err(ValError::LineErrors(child)) => {
                    let child = prefix_items(child, PathItem::Key("[key]".to_string()));
                    errors.extend(prefix_items(child, PathItem::Key(key_name)));
                    continue;
                }
                Err(fatal) => return Err(fatal),
            },
            None => key.clone(),
        };
        let validated_val = match &s.value {
            Some(schema) => match validate(val, schema, defs, extra, state) {
                Ok(v) => v,
                Err(ValError::LineErrors(child)) => {
                    errors.extend(prefix_items(child, PathItem::Key(key_name)));
                    continue;
                }
                Err(fatal) => return Err(fatal),
            },
            None => val.clone(),
        };
        out.insert(validated_key, validated_val);
    }
    check_seq_lengths(map.len(), s.min_length, s.max_length, value, &mut errors);
    if errors.is_empty() {
        Ok(Value::Map(out))
    } else {
        Err(ValError::LineErrors(errors))
    }
}

/// Try each choice in order; the first success wins.
///
/// Smart mode makes one pass with strictness forced on, preferring an
/// exact type match, then (unless the call itself is strict) a lax pass.
/// Fatal errors abort the trial immediately; recoverable errors from the
/// reported pass are collected per choice.
fn validate_union(
    u: &UnionSchema,
    value: &Value,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
) -> ValResult<Value> {
    match u.mode {
        UnionMode::LeftToRight => union_pass(&u.choices, value, defs, extra, state),
        UnionMode::Smart => {
            let strict_extra = extra.with_strict(true);
            let strict_err = match union_pass(&u.choices, value, defs, &strict_extra, state) {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            if strict_err.is_fatal() || extra.strict == Some(true) {
                return Err(strict_err);
            }
            let lax_extra = extra.with_strict(false);
            union_pass(&u.choices, value, defs, &lax_extra, state)
        }
    }
}

// One trial pass across all choices.  If none match, the collected
// line-items of every choice are returned, each tagged with the choice's
// kind.  A fatal error aborts the trial immediately.
fn union_pass(
    choices: &[SchemaNode],
    value: &Value,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
) -> ValResult<Value> {
    let mut collected = Vec::new();
    for choice in choices {
        match validate(value, choice, defs, extra, state) {
            Ok(v) => return Ok(v),
            Err(ValError::LineErrors(items)) => {
                collected.extend(prefix_items(
                    items,
                    PathItem::Key(choice.kind_str().to_string()),
                ));
            }
            Err(fatal) => return Err(fatal),
        }
    }
    Err(ValError::LineErrors(collected))
}

fn validate_tagged_union(
    tu: &TaggedUnionSchema,
    value: &Value,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
) -> ValResult<Value> {
    let tag = match &tu.discriminator {
        Discriminator::Field(path) => lookup_path(value, path).and_then(Value::key_repr),
        Discriminator::Function(f) => f(value),
    };
    let tag = match tag {
        Some(t) => t,
        None => {
            return Err(ValError::one(
                LineItem::new(ErrorKind::UnionTagNotFound, value)
                    .with_ctx("discriminator", Value::Str(tu.discriminator.repr())),
            ))
        }
    };
    // Exactly one choice is attempted; a tag miss never falls back to
    // trying schema bodies.
    match tu.choices.iter().find(|(t, _)| *t == tag) {
        Some((_, choice)) => validate(value, choice, defs, extra, state)
            .map_err(|e| e.prefixed(PathItem::Key(tag.clone()))),
        None => {
            let expected: Vec<&str> = tu.choices.iter().map(|(t, _)| t.as_str()).collect();
            Err(ValError::one(
                LineItem::new(ErrorKind::UnionTagInvalid, value)
                    .with_ctx("tag", Value::Str(tag))
                    .with_ctx("discriminator", Value::Str(tu.discriminator.repr()))
                    .with_ctx("expected_tags", Value::Str(expected.join(", "))),
            ))
        }
    }
}

pub(crate) fn lookup_path<'a>(value: &'a Value, path: &[PathItem]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = match (current, segment) {
            (Value::Map(map), PathItem::Key(key)) => map.get(&Value::Str(key.clone()))?,
            (Value::Array(items), PathItem::Index(i)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

fn field_default(field: &Field) -> Option<Value> {
    if let Some(default) = &field.default {
        return Some(default.clone());
    }
    field.default_factory.as_ref().map(|factory| factory())
}

// The candidate lookup paths for a field, in priority order.
fn field_lookup_paths(field: &Field, populate_by_name: bool) -> Vec<Vec<PathItem>> {
    let name_path = vec![PathItem::Key(field.name.clone())];
    match &field.alias {
        None => vec![name_path],
        Some(alias) => {
            let mut paths = match alias {
                Alias::Name(name) => vec![vec![PathItem::Key(name.clone())]],
                Alias::Path(path) => vec![path.clone()],
                Alias::Choices(choices) => choices.clone(),
            };
            if populate_by_name {
                paths.push(name_path);
            }
            paths
        }
    }
}

fn validate_model(
    m: &ModelSchema,
    value: &Value,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
) -> ValResult<Value> {
    let map = match value {
        Value::Map(map) => map,
        _ => {
            return Err(ValError::one(
                LineItem::new(ErrorKind::ModelType, value)
                    .with_ctx("model_name", Value::Str(m.name.clone())),
            ))
        }
    };
    let extra = &extra.scoped(m.strict);
    let mut out = BTreeMap::new();
    let mut errors: Vec<LineItem> = Vec::new();
    let mut used_keys: BTreeSet<String> = BTreeSet::new();

    for field in &m.fields {
        let mut found = None;
        for path in field_lookup_paths(field, m.populate_by_name) {
            if let Some(v) = lookup_path(value, &path) {
                if let Some(PathItem::Key(first)) = path.first() {
                    used_keys.insert(first.clone());
                }
                found = Some(v);
                break;
            }
        }
        match found {
            Some(field_value) => {
                match validate(field_value, &field.schema, defs, extra, state) {
                    Ok(v) => {
                        out.insert(Value::Str(field.name.clone()), v);
                    }
                    Err(ValError::LineErrors(child)) => match field.on_error {
                        OnError::Raise => {
                            errors.extend(prefix_items(
                                child,
                                PathItem::Key(field.name.clone()),
                            ));
                        }
                        OnError::Omit => {}
                        OnError::FallbackOnDefault => {
                            if let Some(default) = field_default(field) {
                                out.insert(Value::Str(field.name.clone()), default);
                            }
                        }
                    },
                    Err(fatal) => return Err(fatal),
                }
            }
            None => {
                if let Some(default) = field_default(field) {
                    out.insert(Value::Str(field.name.clone()), default);
                } else if field.required {
                    errors.push(prefixed_item(
                        LineItem::new(ErrorKind::Missing, value),
                        PathItem::Key(field.name.clone()),
                    ));
                }
            }
        }
    }

    for (key, extra_value) in map {
        let key_name = key.key_repr().unwrap_or_else(|| key.short_repr());
        if used_keys.contains(&key_name) {
            continue;
        }
        match m.extra {
            ExtraBehavior::Ignore => {}
            ExtraBehavior::Forbid => {
                errors.push(prefixed_item(
                    LineItem::new(ErrorKind::ExtraForbidden, extra_value),
                    PathItem::Key(key_name),
                ));
            }
            ExtraBehavior::Allow => match &m.extra_schema {
                Some(schema) => match validate(extra_value, schema, defs, extra, state) {
                    Ok(v) => {
                        out.insert(Value::Str(key_name), v);
                    }
                    Err(ValError::LineErrors(child)) => {
                        errors.extend(prefix_items(child, PathItem::Key(key_name)));
                    }
                    Err(fatal) => return Err(fatal),
                },
                None => {
                    out.insert(Value::Str(key_name), extra_value.clone());
                }
            },
        }
    }

    if errors.is_empty() {
        Ok(Value::Map(out))
    } else {
        Err(ValError::LineErrors(errors))
    }
}

// Chains are fail-fast internally, unlike container element validation:
// each step consumes the previous step's output.
fn validate_chain(
    c: &ChainSchema,
    value: &Value,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
) -> ValResult<Value> {
    let mut current = value.clone();
    for step in &c.steps {
        current = validate(&current, step, defs, extra, state)?;
    }
    Ok(current)
}

fn validate_with_default(
    w: &WithDefaultSchema,
    value: &Value,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
) -> ValResult<Value> {
    match validate(value, &w.schema, defs, extra, state) {
        Ok(v) => Ok(v),
        Err(ValError::LineErrors(items)) => {
            if w.on_error_default {
                if let Some(default) = with_default_value(w) {
                    return Ok(default);
                }
            }
            Err(ValError::LineErrors(items))
        }
        Err(fatal) => Err(fatal),
    }
}

fn with_default_value(w: &WithDefaultSchema) -> Option<Value> {
    if let Some(default) = &w.default {
        return Some(default.clone());
    }
    w.default_factory.as_ref().map(|factory| factory())
}

// The handler handed to wrap hooks.  A fatal error from the inner
// validator is stashed so it can't be swallowed by the hook.
struct WrapHandler<'a, 'b> {
    node: &'a SchemaNode,
    defs: &'a [SchemaNode],
    extra: &'a Extra,
    state: &'b mut State,
    fatal: Option<FatalError>,
}

impl<'a, 'b> InnerValidator for WrapHandler<'a, 'b> {
    fn call(&mut self, value: Value) -> Result<Value, ValidationErrors> {
        match validate(&value, self.node, self.defs, self.extra, self.state) {
            Ok(v) => Ok(v),
            Err(ValError::LineErrors(items)) => {
                Err(ValidationErrors::new(self.node.kind_str(), items))
            }
            Err(ValError::Fatal(fatal)) => {
                self.fatal = Some(fatal);
                Err(ValidationErrors::new(self.node.kind_str(), Vec::new()))
            }
        }
    }
}

fn validate_wrap(
    s: &WrapSchema,
    value: &Value,
    defs: &[SchemaNode],
    extra: &Extra,
    state: &mut State,
) -> ValResult<Value> {
    let mut handler = WrapHandler {
        node: &s.schema,
        defs,
        extra,
        state,
        fatal: None,
    };
    let result = (s.function)(value.clone(), &mut handler, extra);
    if let Some(fatal) = handler.fatal {
        // Fatal errors are never recovered, even if the hook tried.
        return Err(ValError::Fatal(fatal));
    }
    result.map_err(|e| map_hook_error(e, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{int, text};

    fn validator(schema: SchemaNode) -> SchemaValidator {
        SchemaValidator::new(schema).unwrap()
    }

    fn run(v: &SchemaValidator, input: Value) -> Result<Value, ValidateError> {
        v.validate_value(&input, &ValidateOptions::default())
    }

    #[test]
    fn int_coercion_ladder() {
        let v = validator(SchemaNode::int());
        assert_eq!(run(&v, text("42")).unwrap(), int(42));
        assert_eq!(run(&v, Value::from_float(42.0)).unwrap(), int(42));
        assert_eq!(run(&v, Value::Bool(true)).unwrap(), int(1));

        let err = run(&v, Value::from_float(42.5)).unwrap_err().into_errors();
        assert_eq!(err.errors()[0].kind, ErrorKind::IntFromFloat);
    }

    #[test]
    fn strict_int_rejects_coercions() {
        let v = validator(SchemaNode::int());
        let opts = ValidateOptions {
            strict: Some(true),
            ..ValidateOptions::default()
        };
        let err = v.validate_value(&Value::Bool(true), &opts).unwrap_err();
        assert_eq!(err.into_errors().errors()[0].kind, ErrorKind::IntType);
        assert_eq!(v.validate_value(&int(3), &opts).unwrap(), int(3));
    }

    #[test]
    fn list_collects_all_element_errors() {
        let v = validator(SchemaNode::list_of(SchemaNode::int()));
        let input = Value::Array(vec![text("a"), int(2), text("b")]);
        let errors = run(&v, input).unwrap_err().into_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.errors()[0].path, vec![PathItem::Index(0)]);
        assert_eq!(errors.errors()[1].path, vec![PathItem::Index(2)]);
    }

    #[test]
    fn chain_is_fail_fast() {
        // A chain that parses a string to an int, then bounds-checks it.
        let chain = SchemaNode::Chain(ChainSchema {
            steps: vec![
                SchemaNode::int(),
                SchemaNode::Int(IntSchema {
                    bounds: NumberBounds {
                        ge: Some(int(10)),
                        ..NumberBounds::default()
                    },
                    ..IntSchema::default()
                }),
            ],
        });
        let v = validator(chain);
        assert_eq!(run(&v, text("42")).unwrap(), int(42));
        let errors = run(&v, text("nope")).unwrap_err().into_errors();
        // Only the first step's failure is reported.
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors()[0].kind, ErrorKind::IntParsing);
    }

    #[test]
    fn isinstance_never_errors() {
        let v = validator(SchemaNode::int());
        assert!(v.isinstance_value(&int(1)));
        assert!(!v.isinstance_value(&Value::Null));
    }
}
