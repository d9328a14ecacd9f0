//! This module defines the schema node tree.
//!
//! A schema is a nested, possibly self-referential tree of [`SchemaNode`]
//! values, each describing one validation/serialization rule.  The tree is
//! declarative data; the [`resolve`] module turns it into an executable
//! graph by collecting named definitions into an arena and rewriting
//! references into indices.
//!
//! [`resolve`]: crate::resolve

use crate::context::Extra;
use crate::errors::{PathItem, SerError, ValidationErrors};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use strum_macros::IntoStaticStr;

/// A user hook that transforms one value.
///
/// Used by the `function-before`, `function-after`, and `function-plain`
/// kinds.
pub type ValFunc = Arc<dyn Fn(Value, &Extra) -> Result<Value, HookError> + Send + Sync>;

/// A user hook that wraps an inner validator.
///
/// The hook receives a handler for the inner schema and may invoke it
/// zero, one, or several times, catching its failure and substituting a
/// recovered value if desired.
pub type WrapFunc =
    Arc<dyn Fn(Value, &mut dyn InnerValidator, &Extra) -> Result<Value, HookError> + Send + Sync>;

/// A user discriminator function for tagged unions.  Returns the tag for
/// an input value, or None if no tag can be extracted.
pub type TagFunc = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// A factory producing a fresh default value per use.
pub type DefaultFunc = Arc<dyn Fn() -> Value + Send + Sync>;

/// A user serializer that overrides the representation of a value.
///
/// The handler argument defers to the inner/default serialization.
pub type SerFunc =
    Arc<dyn Fn(&Value, &mut dyn InnerSerializer) -> Result<Value, SerError> + Send + Sync>;

/// The handler passed to a [`WrapFunc`], invoking the wrapped schema.
pub trait InnerValidator {
    /// Validate a value against the inner schema.
    fn call(&mut self, value: Value) -> Result<Value, ValidationErrors>;
}

/// The handler passed to a [`SerFunc`], invoking the inner serializer.
pub trait InnerSerializer {
    /// Serialize a value with the inner schema.
    fn call(&mut self, value: &Value) -> Result<Value, SerError>;
}

/// The ways a user hook can fail.
///
/// `Value` and `Assertion` are treated as ordinary validation failures
/// (`value_error` / `assertion_error` line-items).  `Validation` re-raises
/// errors previously caught from an inner validator.  `Fatal` propagates
/// unchanged and terminates the whole call; the engine never reclassifies
/// arbitrary hook failures as data errors.
#[derive(Debug)]
pub enum HookError {
    /// A validation failure with a message (becomes `value_error`).
    Value(String),
    /// A failed assertion with a message (becomes `assertion_error`).
    Assertion(String),
    /// Re-raise errors caught from an inner validator.
    Validation(ValidationErrors),
    /// A non-validation failure; terminates the call.
    Fatal(String),
}

impl From<ValidationErrors> for HookError {
    fn from(e: ValidationErrors) -> HookError {
        HookError::Validation(e)
    }
}

/// Numeric bounds for `int` and `float` schemas.
///
/// Each bound, when violated, produces its own error kind carrying the
/// bound value in the error context.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct NumberBounds {
    pub ge: Option<Value>,
    pub gt: Option<Value>,
    pub le: Option<Value>,
    pub lt: Option<Value>,
    pub multiple_of: Option<Value>,
}

impl NumberBounds {
    /// True if no bound is set.
    pub fn is_empty(&self) -> bool {
        self.ge.is_none()
            && self.gt.is_none()
            && self.le.is_none()
            && self.lt.is_none()
            && self.multiple_of.is_none()
    }
}

/// A compiled regular expression constraint for string schemas.
#[derive(Clone, Debug)]
pub struct Pattern {
    pub(crate) re: regex::Regex,
}

impl Pattern {
    /// Compile a pattern.  Returns the regex error text on failure.
    pub fn new(pattern: &str) -> Result<Pattern, String> {
        regex::Regex::new(pattern)
            .map(|re| Pattern { re })
            .map_err(|e| e.to_string())
    }

    /// The original pattern text.
    pub fn as_str(&self) -> &str {
        self.re.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        // We only need to compare the string form,
        // not the compiled form.
        self.re.as_str() == other.re.as_str()
    }
}

/// Options for the `bool` kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoolSchema {
    /// Strictness override; falls back to the per-call setting.
    pub strict: Option<bool>,
}

/// Options for the `int` kind.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct IntSchema {
    pub strict: Option<bool>,
    pub bounds: NumberBounds,
}

/// Options for the `float` kind.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct FloatSchema {
    pub strict: Option<bool>,
    pub bounds: NumberBounds,
}

/// Options for the `str` kind.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct StrSchema {
    pub strict: Option<bool>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Pattern>,
}

/// Options for the `bytes` kind.
#[derive(Clone, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct BytesSchema {
    pub strict: Option<bool>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

/// A literal: the input must equal one of the expected values.
#[derive(Clone, Debug, PartialEq)]
pub struct LiteralSchema {
    /// The allowed values; must be non-empty.
    pub expected: Vec<Value>,
}

/// Options shared by the `list` and `set` kinds.
#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct SeqSchema {
    /// Schema for each element; `None` accepts anything.
    pub item: Option<Box<SchemaNode>>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Ambient strictness for elements; on `set`, duplicates additionally
    /// become errors instead of being dropped.
    pub strict: Option<bool>,
}

/// A tuple: positional item schemas, plus an optional variadic tail.
#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct TupleSchema {
    pub items: Vec<SchemaNode>,
    /// Schema for elements beyond the positional ones.  Absent means the
    /// tuple accepts exactly `items.len()` elements.
    pub variadic_item: Option<Box<SchemaNode>>,
    pub strict: Option<bool>,
}

/// Options for the `dict` kind.
#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct DictSchema {
    pub key: Option<Box<SchemaNode>>,
    pub value: Option<Box<SchemaNode>>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub strict: Option<bool>,
}

/// How a union picks among its choices.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnionMode {
    /// Try every choice in strict mode first, then every choice in lax
    /// mode, preferring an exact type match over a coercive one.
    Smart,
    /// Try choices in declared order, once, in the ambient mode.
    LeftToRight,
}

impl Default for UnionMode {
    fn default() -> UnionMode {
        UnionMode::Smart
    }
}

/// A union of alternatives, tried per [`UnionMode`].
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct UnionSchema {
    pub choices: Vec<SchemaNode>,
    pub mode: UnionMode,
}

/// How a tagged union extracts the tag from an input.
#[derive(Clone)]
pub enum Discriminator {
    /// Look the tag up in the input map, by key path.
    Field(Vec<PathItem>),
    /// Ask a user function for the tag.
    Function(TagFunc),
}

impl Discriminator {
    /// Shortcut for a single-key field discriminator.
    pub fn key(name: &str) -> Discriminator {
        Discriminator::Field(vec![PathItem::Key(name.to_string())])
    }

    pub(crate) fn repr(&self) -> String {
        match self {
            Discriminator::Field(path) => crate::errors::render_path(path),
            Discriminator::Function(_) => "<function>".to_string(),
        }
    }
}

impl fmt::Debug for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Discriminator({})", self.repr())
    }
}

/// A union selected by a discriminator tag: exactly one choice is ever
/// attempted, unlike a plain union's trial across all choices.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct TaggedUnionSchema {
    pub discriminator: Discriminator,
    /// Ordered (tag, schema) pairs; order fixes the `expected_tags`
    /// listing in errors.
    pub choices: Vec<(String, SchemaNode)>,
}

/// Where a model field's value is looked up in the input.
#[derive(Clone, Debug, PartialEq)]
pub enum Alias {
    /// A single key, different from the field name.
    Name(String),
    /// A path of keys/indices into nested input.
    Path(Vec<PathItem>),
    /// Several alternative paths, tried in order.
    Choices(Vec<Vec<PathItem>>),
}

/// Per-field behavior when the field's value fails validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OnError {
    /// Propagate the line-items (the default).
    Raise,
    /// Drop the field from the output; requires a non-required field.
    Omit,
    /// Substitute the field's default; requires a default.
    FallbackOnDefault,
}

impl Default for OnError {
    fn default() -> OnError {
        OnError::Raise
    }
}

/// How a model treats undeclared input keys.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExtraBehavior {
    /// Drop them silently (the default).
    Ignore,
    /// Emit `extra_forbidden` per extra key.
    Forbid,
    /// Validate them against `extra_schema` (if given) and include them
    /// in the output.
    Allow,
}

impl Default for ExtraBehavior {
    fn default() -> ExtraBehavior {
        ExtraBehavior::Ignore
    }
}

/// One declared field of a model.
#[derive(Clone)]
pub struct Field {
    /// The output key for this field.
    pub name: String,
    /// The child schema the field's value must satisfy.
    pub schema: SchemaNode,
    /// Input lookup override; absent means lookup by name.
    pub alias: Option<Alias>,
    /// Whether an absent value is a `missing` error.
    pub required: bool,
    /// Default used when the input is absent (and for
    /// `fallback_on_default`).  Mutually exclusive with
    /// `default_factory`; declaring both is a build-time error.
    pub default: Option<Value>,
    /// Factory producing a fresh default per use.
    pub default_factory: Option<DefaultFunc>,
    /// Behavior when this field's value fails validation.
    pub on_error: OnError,
    /// Reject re-assignment of this field via assignment validation.
    pub frozen: bool,
}

impl Field {
    /// A required field with no alias, default, or special policies.
    pub fn new(name: &str, schema: SchemaNode) -> Field {
        Field {
            name: name.to_string(),
            schema,
            alias: None,
            required: true,
            default: None,
            default_factory: None,
            on_error: OnError::Raise,
            frozen: false,
        }
    }

    /// An optional field with a default value.
    pub fn with_default(name: &str, schema: SchemaNode, default: Value) -> Field {
        Field {
            required: false,
            default: Some(default),
            ..Field::new(name, schema)
        }
    }

    pub(crate) fn has_default(&self) -> bool {
        self.default.is_some() || self.default_factory.is_some()
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("alias", &self.alias)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("on_error", &self.on_error)
            .field("frozen", &self.frozen)
            .finish()
    }
}

/// A record with declared fields.
#[derive(Clone, Debug)]
pub struct ModelSchema {
    /// The model name, used in titles and `model_type` errors.
    pub name: String,
    /// The declared fields, in output order.
    pub fields: Vec<Field>,
    /// Treatment of undeclared input keys.
    pub extra: ExtraBehavior,
    /// Schema for extra values when `extra` is `Allow`.
    pub extra_schema: Option<Box<SchemaNode>>,
    /// Also accept the field name where an alias is declared.
    pub populate_by_name: bool,
    /// Ambient strictness for this model's fields; the per-call setting
    /// wins.
    pub strict: Option<bool>,
    /// Reject all assignment validation against this model.
    pub frozen: bool,
}

impl ModelSchema {
    /// A model with the given name and fields and default configuration.
    pub fn new(name: &str, fields: Vec<Field>) -> ModelSchema {
        ModelSchema {
            name: name.to_string(),
            fields,
            extra: ExtraBehavior::Ignore,
            extra_schema: None,
            populate_by_name: false,
            strict: None,
            frozen: false,
        }
    }
}

/// An ordered pipeline of schemas; each step's output feeds the next
/// step's input.  Fails fast on the first failing step.
#[derive(Clone, Debug)]
pub struct ChainSchema {
    /// The steps, applied first to last; must be non-empty.
    pub steps: Vec<SchemaNode>,
}

/// Wraps a schema with a default used on absent input and, with
/// `fallback_on_default`, on validation failure.
#[derive(Clone)]
#[allow(missing_docs)]
pub struct WithDefaultSchema {
    pub schema: Box<SchemaNode>,
    pub default: Option<Value>,
    pub default_factory: Option<DefaultFunc>,
    /// When true, a failing inner validation is replaced by the default
    /// instead of propagating.
    pub on_error_default: bool,
}

impl fmt::Debug for WithDefaultSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithDefaultSchema")
            .field("schema", &self.schema)
            .field("default", &self.default)
            .field("on_error_default", &self.on_error_default)
            .finish()
    }
}

/// Replaces the inner schema's line-items with a single `value_error`
/// carrying a custom message.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct CustomErrorSchema {
    pub schema: Box<SchemaNode>,
    pub message: String,
}

/// A `function-before` or `function-after` hook around an inner schema.
#[derive(Clone)]
#[allow(missing_docs)]
pub struct FunctionSchema {
    pub function: ValFunc,
    pub schema: Box<SchemaNode>,
}

impl fmt::Debug for FunctionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSchema")
            .field("schema", &self.schema)
            .finish()
    }
}

/// A `function-wrap` hook controlling the invocation of an inner schema.
#[derive(Clone)]
#[allow(missing_docs)]
pub struct WrapSchema {
    pub function: WrapFunc,
    pub schema: Box<SchemaNode>,
}

impl fmt::Debug for WrapSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapSchema").field("schema", &self.schema).finish()
    }
}

/// A `function-plain` hook: the function replaces the schema entirely.
#[derive(Clone)]
#[allow(missing_docs)]
pub struct PlainSchema {
    pub function: ValFunc,
}

impl fmt::Debug for PlainSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlainSchema(<function>)")
    }
}

/// A user serializer overriding the inner schema's representation.
/// Validation passes through to the inner schema unchanged.
#[derive(Clone)]
#[allow(missing_docs)]
pub struct CustomSerSchema {
    pub function: SerFunc,
    pub schema: Box<SchemaNode>,
}

impl fmt::Debug for CustomSerSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomSerSchema")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Registers named definitions that `definition-ref` nodes elsewhere in
/// the tree (including the definitions themselves) may reference.
#[derive(Clone, Debug)]
pub struct DefinitionsSchema {
    /// Named definitions; each name must be unique across the whole tree.
    pub definitions: Vec<(String, SchemaNode)>,
    /// The schema this node stands for.
    pub schema: Box<SchemaNode>,
}

/// A by-name reference to a definition, rewritten to an arena index when
/// the schema is resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct DefRef {
    /// The referenced definition name.
    pub name: String,
    /// Filled in by the resolver; references sharing one definition share
    /// one index (and therefore one recursion-guard slot).
    pub(crate) index: Option<usize>,
}

impl DefRef {
    /// A reference to the definition registered under `name`.
    pub fn new(name: &str) -> DefRef {
        DefRef {
            name: name.to_string(),
            index: None,
        }
    }
}

/// Any node in the schema tree.
///
/// This is the closed set of schema kinds; the validation and
/// serialization engines dispatch over it with exhaustive matches, so a
/// new kind can't be added without the compiler pointing at every place
/// that must learn about it.
#[derive(Clone, Debug, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
#[allow(missing_docs)]
pub enum SchemaNode {
    Any,
    None,
    Bool(BoolSchema),
    Int(IntSchema),
    Float(FloatSchema),
    Str(StrSchema),
    Bytes(BytesSchema),
    Literal(LiteralSchema),
    List(SeqSchema),
    Set(SeqSchema),
    Tuple(TupleSchema),
    Dict(DictSchema),
    Union(UnionSchema),
    TaggedUnion(TaggedUnionSchema),
    Model(ModelSchema),
    Chain(ChainSchema),
    Nullable(Box<SchemaNode>),
    WithDefault(WithDefaultSchema),
    CustomError(CustomErrorSchema),
    FunctionBefore(FunctionSchema),
    FunctionAfter(FunctionSchema),
    FunctionWrap(WrapSchema),
    FunctionPlain(PlainSchema),
    CustomSer(CustomSerSchema),
    Definitions(DefinitionsSchema),
    DefinitionRef(DefRef),
}

impl SchemaNode {
    /// The kebab-case kind string for this node, e.g. `tagged-union`.
    pub fn kind_str(&self) -> &'static str {
        self.into()
    }

    /// Shortcut for an unconstrained `int` schema.
    pub fn int() -> SchemaNode {
        SchemaNode::Int(IntSchema::default())
    }

    /// Shortcut for an unconstrained `float` schema.
    pub fn float() -> SchemaNode {
        SchemaNode::Float(FloatSchema::default())
    }

    /// Shortcut for an unconstrained `str` schema.
    pub fn str() -> SchemaNode {
        SchemaNode::Str(StrSchema::default())
    }

    /// Shortcut for an unconstrained `bool` schema.
    pub fn bool() -> SchemaNode {
        SchemaNode::Bool(BoolSchema::default())
    }

    /// Shortcut for a list whose elements satisfy `item`.
    pub fn list_of(item: SchemaNode) -> SchemaNode {
        SchemaNode::List(SeqSchema {
            item: Some(Box::new(item)),
            ..SeqSchema::default()
        })
    }

    /// Shortcut for a smart union over `choices`.
    pub fn union_of(choices: Vec<SchemaNode>) -> SchemaNode {
        SchemaNode::Union(UnionSchema {
            choices,
            mode: UnionMode::Smart,
        })
    }
}

impl fmt::Display for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind_str())
    }
}
