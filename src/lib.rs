//! `valicore` compiles declarative schemas into validators and
//! serializers for structured data.
//!
//! A schema is a tree of [`SchemaNode`](crate::schema::SchemaNode)
//! values describing the expected shape of the data: primitives with
//! constraints, containers, models with named fields, unions, and
//! user hook functions.  Compiling the schema once (resolution plus
//! structural checks) yields a [`SchemaValidator`] that can be used any
//! number of times, from any number of threads.
//!
//! # Implementation Details
//!
//! - Inputs from every source (native [`Value`](crate::value::Value)
//!   trees, JSON text, string-leaf maps) are converted into a single
//!   generic value form, so the engine is agnostic to where data came
//!   from.
//!
//! - Named definitions (for recursive or shared schemas) are collected
//!   into an arena during resolution, and references are rewritten to
//!   indices.  Recursive schemas therefore become cheap integer
//!   back-edges rather than infinite trees.
//!
//! - Validation is not fail-fast: all errors in a container or model are
//!   collected into one [`ValidationErrors`] aggregate, each error
//!   carrying its location path, a stable snake_case tag, and a
//!   human-readable message.
//!
//! - By default validation is "lax": well-understood coercions such as
//!   `"42"` to `42` are accepted.  Strict mode, per node or per call,
//!   accepts exact types only.
//!
//! # Examples
//!
//! Validate JSON text against a model schema:
//!
//! ```
//! use valicore::schema::{Field, ModelSchema, SchemaNode};
//! use valicore::{SchemaValidator, ValidateOptions};
//!
//! let schema = SchemaNode::Model(ModelSchema::new(
//!     "Person",
//!     vec![
//!         Field::new("name", SchemaNode::str()),
//!         Field::new("age", SchemaNode::int()),
//!     ],
//! ));
//! let validator = SchemaValidator::new(schema).unwrap();
//!
//! // "43" is coerced to 43 in (default) lax mode.
//! let person = validator
//!     .validate_json(r#"{"name": "Bob", "age": "43"}"#, &ValidateOptions::default())
//!     .unwrap();
//! ```
//!
//! Data that doesn't fit produces a structured error report:
//!
//! ```
//! # use valicore::schema::{Field, ModelSchema, SchemaNode};
//! # use valicore::{SchemaValidator, ValidateOptions};
//! # let schema = SchemaNode::Model(ModelSchema::new(
//! #     "Person",
//! #     vec![
//! #         Field::new("name", SchemaNode::str()),
//! #         Field::new("age", SchemaNode::int()),
//! #     ],
//! # ));
//! # let validator = SchemaValidator::new(schema).unwrap();
//! let err = validator
//!     .validate_json(r#"{"age": "forty three"}"#, &ValidateOptions::default())
//!     .unwrap_err();
//! let errors = err.into_errors();
//! assert_eq!(errors.len(), 2); // name missing, age unparseable
//! ```
//!
//! Schemas can also be built from a JSON document (the wire format used
//! by [`SchemaCache`]):
//!
//! ```
//! use valicore::parse::schema_from_json;
//! use valicore::{SchemaValidator, ValidateOptions};
//! use valicore::value::{int, Value};
//!
//! let doc = serde_json::json!({
//!     "kind": "list",
//!     "items": {"kind": "int", "ge": 0},
//! });
//! let validator = SchemaValidator::new(schema_from_json(&doc).unwrap()).unwrap();
//! let out = validator
//!     .validate_json("[1, 2, 3]", &ValidateOptions::default())
//!     .unwrap();
//! assert_eq!(out, Value::Array(vec![int(1), int(2), int(3)]));
//! ```
//!
//! Every validator hands out a serializer over the same compiled graph:
//!
//! ```
//! # use valicore::{SchemaValidator, ValidateOptions};
//! # use valicore::parse::schema_from_json;
//! # let doc = serde_json::json!({"kind": "list", "items": {"kind": "int"}});
//! # let validator = SchemaValidator::new(schema_from_json(&doc).unwrap()).unwrap();
//! use valicore::SerOptions;
//!
//! let value = validator
//!     .validate_json("[1, 2]", &ValidateOptions::default())
//!     .unwrap();
//! let json = validator.serializer().to_json(&value, &SerOptions::default()).unwrap();
//! assert_eq!(json, b"[1,2]");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
mod context;
pub mod errors;
mod json;
pub mod parse;
mod resolve;
pub mod schema;
mod serialize;
mod validate;
pub mod value;

#[doc(inline)]
pub use cache::SchemaCache;
pub use context::{Extra, UserContext};
#[doc(inline)]
pub use errors::{
    ErrorKind, FatalError, LineItem, PathItem, SchemaError, SerError, ValidateError,
    ValidationErrors,
};
pub use serialize::{FallbackFunc, SchemaSerializer, SerMode, SerOptions};
pub use validate::{SchemaValidator, ValidateOptions};
