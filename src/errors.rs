//! This module defines the error types for every stage of the engine.
//!
//! There are three distinct categories:
//! - [`SchemaError`]: a structural problem in the schema itself, raised once
//!   when the schema is compiled and never during per-instance validation.
//! - [`ValidationErrors`]: the aggregate of one or more [`LineItem`]s
//!   collected during a single top-level validation call.
//! - [`FatalError`]: a non-validation failure (a user hook that broke, or
//!   depth exhaustion) that terminates the call immediately.

use crate::value::Value;
use std::error;
use std::fmt;
use strum_macros::{Display, IntoStaticStr};
use thiserror::Error;

/// One segment of the location path attached to a validation error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathItem {
    /// A map key or model field name.
    Key(String),
    /// An index into a sequence.
    Index(usize),
}

impl fmt::Display for PathItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathItem::Key(k) => write!(f, "{}", k),
            PathItem::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Render a path as a dotted location string, e.g. `items.0.name`.
pub(crate) fn render_path(path: &[PathItem]) -> String {
    if path.is_empty() {
        return "(root)".to_string();
    }
    let parts: Vec<String> = path.iter().map(|p| p.to_string()).collect();
    parts.join(".")
}

/// The taxonomy of per-instance validation failures.
///
/// The `Display` form of each variant is the wire-stable snake_case tag
/// that appears in the `type` field of structured error output.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Display, Eq, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "snake_case")]
#[allow(missing_docs)]
pub enum ErrorKind {
    JsonInvalid,
    IntType,
    IntParsing,
    IntParsingSize,
    IntFromFloat,
    FloatType,
    FloatParsing,
    BoolType,
    BoolParsing,
    StringType,
    StringUnicode,
    StringTooShort,
    StringTooLong,
    StringPatternMismatch,
    BytesType,
    BytesTooShort,
    BytesTooLong,
    NoneRequired,
    LiteralError,
    ListType,
    SetType,
    TupleType,
    DictType,
    ModelType,
    SetItemNotUnique,
    Missing,
    ExtraForbidden,
    FrozenField,
    FrozenInstance,
    NoSuchAttribute,
    UnionTagInvalid,
    UnionTagNotFound,
    RecursionLoop,
    TooShort,
    TooLong,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    MultipleOf,
    ValueError,
    AssertionError,
}

/// One discrete validation failure: kind, location, message context, and
/// the offending input value.
#[derive(Clone, Debug, PartialEq)]
pub struct LineItem {
    /// The failure taxonomy tag.
    pub kind: ErrorKind,
    /// Path from the top-level input down to the failing value.
    pub path: Vec<PathItem>,
    /// The raw input that failed, for diagnostics.
    pub input: Value,
    /// Kind-specific structured data (bound values, expected tags, ...).
    pub ctx: Vec<(&'static str, Value)>,
}

impl LineItem {
    /// Create a line-item with an empty path and no context.
    pub fn new(kind: ErrorKind, input: &Value) -> LineItem {
        LineItem {
            kind,
            path: Vec::new(),
            input: input.clone(),
            ctx: Vec::new(),
        }
    }

    /// Attach one context entry, builder-style.
    pub fn with_ctx(mut self, key: &'static str, value: Value) -> LineItem {
        self.ctx.push((key, value));
        self
    }

    fn ctx_get(&self, key: &str) -> Option<&Value> {
        self.ctx.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    fn ctx_repr(&self, key: &str) -> String {
        match self.ctx_get(key) {
            Some(Value::Str(s)) => s.clone(),
            Some(v) => format!("{:?}", v),
            None => "?".to_string(),
        }
    }

    /// The human-readable message for this failure.
    pub fn message(&self) -> String {
        use ErrorKind::*;
        match self.kind {
            JsonInvalid => format!("Invalid JSON: {}", self.ctx_repr("error")),
            IntType => "Input should be a valid integer".into(),
            IntParsing => {
                "Input should be a valid integer, unable to parse string as an integer".into()
            }
            IntParsingSize => {
                "Input should be a valid integer, value is out of range for an integer".into()
            }
            IntFromFloat => {
                "Input should be a valid integer, got a number with a fractional part".into()
            }
            FloatType => "Input should be a valid number".into(),
            FloatParsing => {
                "Input should be a valid number, unable to parse string as a number".into()
            }
            BoolType => "Input should be a valid boolean".into(),
            BoolParsing => {
                "Input should be a valid boolean, unable to interpret input".into()
            }
            StringType => "Input should be a valid string".into(),
            StringUnicode => "Input should be a valid string, invalid UTF-8".into(),
            StringTooShort => format!(
                "String should have at least {} characters",
                self.ctx_repr("min_length")
            ),
            StringTooLong => format!(
                "String should have at most {} characters",
                self.ctx_repr("max_length")
            ),
            StringPatternMismatch => {
                format!("String should match pattern '{}'", self.ctx_repr("pattern"))
            }
            BytesType => "Input should be a valid bytes value".into(),
            BytesTooShort => format!(
                "Bytes should have at least {} bytes",
                self.ctx_repr("min_length")
            ),
            BytesTooLong => format!(
                "Bytes should have at most {} bytes",
                self.ctx_repr("max_length")
            ),
            NoneRequired => "Input should be null".into(),
            LiteralError => format!("Input should be {}", self.ctx_repr("expected")),
            ListType => "Input should be a valid list".into(),
            SetType => "Input should be a valid set".into(),
            TupleType => "Input should be a valid tuple".into(),
            DictType => "Input should be a valid dictionary".into(),
            ModelType => format!(
                "Input should be a valid dictionary or instance of {}",
                self.ctx_repr("model_name")
            ),
            SetItemNotUnique => "Set items should be unique".into(),
            Missing => "Field required".into(),
            ExtraForbidden => "Extra inputs are not permitted".into(),
            FrozenField => "Field is frozen".into(),
            FrozenInstance => "Instance is frozen".into(),
            NoSuchAttribute => format!(
                "Object has no attribute '{}'",
                self.ctx_repr("attribute")
            ),
            UnionTagInvalid => format!(
                "Input tag '{}' found using '{}' does not match any of the expected tags: {}",
                self.ctx_repr("tag"),
                self.ctx_repr("discriminator"),
                self.ctx_repr("expected_tags")
            ),
            UnionTagNotFound => format!(
                "Unable to extract tag using discriminator '{}'",
                self.ctx_repr("discriminator")
            ),
            RecursionLoop => "Recursion error - cyclic reference detected".into(),
            TooShort => format!(
                "Input should have at least {} items",
                self.ctx_repr("min_length")
            ),
            TooLong => format!(
                "Input should have at most {} items",
                self.ctx_repr("max_length")
            ),
            GreaterThan => format!("Input should be greater than {}", self.ctx_repr("gt")),
            GreaterThanEqual => format!(
                "Input should be greater than or equal to {}",
                self.ctx_repr("ge")
            ),
            LessThan => format!("Input should be less than {}", self.ctx_repr("lt")),
            LessThanEqual => format!(
                "Input should be less than or equal to {}",
                self.ctx_repr("le")
            ),
            MultipleOf => format!(
                "Input should be a multiple of {}",
                self.ctx_repr("multiple_of")
            ),
            ValueError => format!("Value error, {}", self.ctx_repr("error")),
            AssertionError => format!("Assertion failed, {}", self.ctx_repr("error")),
        }
    }

    /// This error as a structured JSON object:
    /// `{type, loc, msg, input, ctx?}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("type".into(), serde_json::Value::String(self.kind.to_string()));
        let loc: Vec<serde_json::Value> = self
            .path
            .iter()
            .map(|p| match p {
                PathItem::Key(k) => serde_json::Value::String(k.clone()),
                PathItem::Index(i) => serde_json::Value::from(*i),
            })
            .collect();
        obj.insert("loc".into(), serde_json::Value::Array(loc));
        obj.insert("msg".into(), serde_json::Value::String(self.message()));
        obj.insert("input".into(), crate::json::to_json_lossy(&self.input));
        if !self.ctx.is_empty() {
            let ctx: serde_json::Map<String, serde_json::Value> = self
                .ctx
                .iter()
                .map(|(k, v)| (k.to_string(), crate::json::to_json_lossy(v)))
                .collect();
            obj.insert("ctx".into(), serde_json::Value::Object(ctx));
        }
        serde_json::Value::Object(obj)
    }
}

/// Prefix every line-item in a list with one path segment.
pub(crate) fn prefix_items(mut items: Vec<LineItem>, segment: PathItem) -> Vec<LineItem> {
    for item in &mut items {
        item.path.insert(0, segment.clone());
    }
    items
}

/// A failure that terminates a validation or serialization call without
/// being recoverable as line-items.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum FatalError {
    /// A user hook failed with a non-validation error.
    Hook(String),
    /// The engine's depth ceiling was exceeded.
    DepthExceeded,
    /// The engine was driven outside its contract (e.g. assignment
    /// validation against a schema with no model root).
    Internal(String),
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::Hook(msg) => write!(f, "hook error: {}", msg),
            FatalError::DepthExceeded => write!(f, "maximum recursion depth exceeded"),
            FatalError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl error::Error for FatalError {}

/// The internal error channel of the engine.
///
/// Line-items are recoverable: an enclosing union or on_error policy may
/// absorb them.  Fatal errors always propagate to the caller.
#[derive(Debug, PartialEq)]
pub(crate) enum ValError {
    LineErrors(Vec<LineItem>),
    Fatal(FatalError),
}

impl ValError {
    pub(crate) fn one(item: LineItem) -> ValError {
        ValError::LineErrors(vec![item])
    }

    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, ValError::Fatal(_))
    }

    /// Prefix the path of every contained line-item.  Fatal errors pass
    /// through untouched.
    pub(crate) fn prefixed(self, segment: PathItem) -> ValError {
        match self {
            ValError::LineErrors(items) => ValError::LineErrors(prefix_items(items, segment)),
            fatal => fatal,
        }
    }
}

pub(crate) type ValResult<T> = Result<T, ValError>;

/// The collected set of line-items from one top-level validation call.
#[derive(Debug, PartialEq)]
pub struct ValidationErrors {
    title: String,
    items: Vec<LineItem>,
}

impl ValidationErrors {
    pub(crate) fn new(title: impl Into<String>, items: Vec<LineItem>) -> ValidationErrors {
        ValidationErrors {
            title: title.into(),
            items,
        }
    }

    /// The display title, usually the schema or model name.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Structured access to the individual failures, in collection order.
    pub fn errors(&self) -> &[LineItem] {
        &self.items
    }

    /// Consume the aggregate, yielding the raw line-items.
    pub(crate) fn into_items(self) -> Vec<LineItem> {
        self.items
    }

    /// The number of line-items collected.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if no line-items were collected.  An aggregate built by the
    /// engine is never empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All failures as a JSON array of `{type, loc, msg, input, ctx?}`
    /// objects, for tooling/API consumption.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.items.iter().map(LineItem::to_json).collect())
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.items.len();
        let plural = if n == 1 { "" } else { "s" };
        writeln!(f, "{} validation error{} for {}", n, plural, self.title)?;
        for item in &self.items {
            writeln!(f, "{}", render_path(&item.path))?;
            writeln!(
                f,
                "  {} [type={}, input_value={}]",
                item.message(),
                item.kind,
                item.input.short_repr()
            )?;
        }
        Ok(())
    }
}

impl error::Error for ValidationErrors {}

/// The failure of one top-level validate call: either accumulated
/// validation errors, or a fatal non-validation error.
#[derive(Debug)]
pub enum ValidateError {
    /// One or more validation line-items.
    Invalid(ValidationErrors),
    /// A fatal failure; never produced by bad data alone.
    Fatal(FatalError),
}

impl ValidateError {
    /// True for the fatal (non-validation) category.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ValidateError::Fatal(_))
    }

    /// The aggregate validation errors, if this is the `Invalid` category.
    pub fn errors(&self) -> Option<&ValidationErrors> {
        match self {
            ValidateError::Invalid(e) => Some(e),
            ValidateError::Fatal(_) => None,
        }
    }

    /// Unwrap the `Invalid` category, panicking on a fatal error.
    ///
    /// Intended for tests and examples.
    pub fn into_errors(self) -> ValidationErrors {
        match self {
            ValidateError::Invalid(e) => e,
            ValidateError::Fatal(fatal) => panic!("fatal error: {}", fatal),
        }
    }
}

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidateError::Invalid(e) => e.fmt(f),
            ValidateError::Fatal(e) => e.fmt(f),
        }
    }
}

impl error::Error for ValidateError {}

impl From<ValidationErrors> for ValidateError {
    fn from(e: ValidationErrors) -> ValidateError {
        ValidateError::Invalid(e)
    }
}

/// A structural problem in a schema, detected when the schema is compiled.
///
/// These are never raised during per-instance validation; the schema must
/// be fixed by the caller.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    /// The schema document used a kind string that isn't recognized.
    #[error("unknown schema kind '{0}'")]
    UnknownKind(String),
    /// A required schema key was absent.
    #[error("schema is missing required key '{0}'")]
    MissingKey(&'static str),
    /// A schema key held a value of the wrong shape.
    #[error("invalid schema key '{key}': {reason}")]
    InvalidKey {
        /// The offending key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// A definition reference names a definition that doesn't exist.
    #[error("definition reference '{0}' was used but never defined")]
    DanglingRef(String),
    /// Two definitions share one reference name.
    #[error("duplicate definition reference name '{0}'")]
    DuplicateRef(String),
    /// A field declared both `default` and `default_factory`.
    #[error("field '{0}' declares both a default and a default factory")]
    DefaultConflict(String),
    /// Numeric or length bounds that can never be satisfied.
    #[error("invalid bounds: {0}")]
    InvalidBounds(String),
    /// An `on_error` policy incompatible with the field's shape.
    #[error("field '{field}' has invalid on_error policy: {reason}")]
    InvalidOnError {
        /// The offending field name.
        field: String,
        /// Why the policy was rejected.
        reason: String,
    },
    /// A string pattern that isn't a valid regular expression.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

/// An error during serialization.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq)]
pub enum SerError {
    /// A value didn't match the schema and no fallback was configured.
    #[error("cannot serialize {value} where {expected} was expected")]
    UnknownValue {
        /// The kind of value the schema expected.
        expected: &'static str,
        /// A short rendering of the offending value.
        value: String,
    },
    /// The same value was revisited while still being serialized.
    #[error("circular reference detected")]
    CircularReference,
    /// The depth ceiling was exceeded (e.g. a fallback function kept
    /// manufacturing new nested values).
    #[error("maximum serialization depth exceeded")]
    DepthExceeded,
    /// Bytes that couldn't be represented in JSON output.
    #[error("bytes are not valid UTF-8; cannot represent in JSON")]
    BytesNotUtf8,
    /// A map key with no string representation in JSON output.
    #[error("map key {0} cannot be represented as a JSON object key")]
    BadKey(String),
    /// An error from the underlying JSON encoder.
    #[error("JSON encoding failed: {0}")]
    Json(String),
    /// The engine was driven outside its contract.
    #[error("internal error: {0}")]
    Internal(String),
}
