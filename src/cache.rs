//! This module provides a reusable cache of compiled validators.
//!
//! Compiling a schema (resolution plus build-time checks) is much more
//! expensive than a single validation, so callers that repeatedly build
//! validators from schema documents should hold a [`SchemaCache`].  The
//! cache is an ordinary owned value; there is no global instance.

use crate::errors::SchemaError;
use crate::parse::schema_from_json;
use crate::validate::SchemaValidator;
use std::collections::HashMap;
use std::sync::Arc;

/// A cache of compiled validators, keyed by the canonical JSON encoding
/// of the schema document.
///
/// Two documents that encode to the same canonical JSON share one
/// compiled validator.  Schemas carrying callables have no document form
/// and cannot be cached; compile those directly with
/// [`SchemaValidator::new`].
#[derive(Debug, Default)]
pub struct SchemaCache {
    validators: HashMap<String, Arc<SchemaValidator>>,
}

impl SchemaCache {
    /// An empty cache.
    pub fn new() -> SchemaCache {
        SchemaCache::default()
    }

    /// Fetch the validator for a schema document, compiling it on first
    /// use.  Structural schema errors are reported on every call with
    /// the same bad document; failures are not cached.
    pub fn get_or_compile(
        &mut self,
        doc: &serde_json::Value,
    ) -> Result<Arc<SchemaValidator>, SchemaError> {
        let key = doc.to_string();
        if let Some(validator) = self.validators.get(&key) {
            return Ok(validator.clone());
        }
        let schema = schema_from_json(doc)?;
        let validator = Arc::new(SchemaValidator::new(schema)?);
        self.validators.insert(key, validator.clone());
        Ok(validator)
    }

    /// The number of compiled validators held.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// True if nothing has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Drop all cached validators.  Outstanding `Arc` handles stay valid.
    pub fn clear(&mut self) {
        self.validators.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_shares_compiled_validators() {
        let mut cache = SchemaCache::new();
        let doc: serde_json::Value = serde_json::from_str(r#"{"kind": "int"}"#).unwrap();
        let a = cache.get_or_compile(&doc).unwrap();
        let b = cache.get_or_compile(&doc).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn bad_documents_are_not_cached() {
        let mut cache = SchemaCache::new();
        let doc: serde_json::Value = serde_json::from_str(r#"{"kind": "wat"}"#).unwrap();
        assert!(cache.get_or_compile(&doc).is_err());
        assert!(cache.is_empty());
    }
}
