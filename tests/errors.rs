use valicore::parse::schema_from_json;
use valicore::{SchemaCache, SchemaValidator, ValidateOptions};

fn validator(doc: serde_json::Value) -> SchemaValidator {
    SchemaValidator::new(schema_from_json(&doc).unwrap()).unwrap()
}

#[test]
fn error_traits() {
    let v = validator(serde_json::json!({"kind": "int"}));
    let err = v.validate_json("null", &ValidateOptions::default()).unwrap_err();

    // It would be unfriendly to not support Send + Sync + Unpin.
    // Error types should also support Error, Display, and Debug.
    fn has_traits1<T: Sized + Send + Sync + Unpin>(_: &T) {}
    fn has_traits2<T: std::error::Error + std::fmt::Display + std::fmt::Debug>(_: &T) {}

    has_traits1(&err);
    has_traits2(&err);

    let schema_err = schema_from_json(&serde_json::json!({"kind": "wat"})).unwrap_err();
    has_traits1(&schema_err);
    has_traits2(&schema_err);
    assert_eq!(format!("{}", schema_err), "unknown schema kind 'wat'");
}

#[test]
fn display_renders_one_block_per_error() {
    let v = validator(serde_json::json!({
        "kind": "model",
        "name": "pair",
        "fields": [
            {"name": "a", "schema": {"kind": "int"}},
            {"name": "b", "schema": {"kind": "int", "ge": 0}},
        ],
    }));
    let err = v
        .validate_json(r#"{"a": "x", "b": -1}"#, &ValidateOptions::default())
        .unwrap_err();
    let rendered = format!("{}", err);
    assert!(rendered.starts_with("2 validation errors for pair"));
    assert!(rendered.contains("a\n"));
    assert!(rendered.contains("type=int_parsing"));
    assert!(rendered.contains("greater than or equal to 0"));
    assert!(rendered.contains("input_value=-1"));
}

#[test]
fn errors_to_json_is_structured() {
    let v = validator(serde_json::json!({
        "kind": "list", "items": {"kind": "int"},
    }));
    let err = v
        .validate_json(r#"[1, "x"]"#, &ValidateOptions::default())
        .unwrap_err();
    let json = err.into_errors().to_json();
    let arr = json.as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["type"], "int_parsing");
    assert_eq!(arr[0]["loc"], serde_json::json!([1]));
    assert_eq!(arr[0]["input"], "x");
    assert!(arr[0]["msg"].as_str().unwrap().contains("integer"));
}

#[test]
fn root_errors_have_an_empty_location() {
    let v = validator(serde_json::json!({"kind": "int"}));
    let err = v.validate_json("null", &ValidateOptions::default()).unwrap_err();
    let json = err.into_errors().to_json();
    assert_eq!(json[0]["loc"], serde_json::json!([]));
}

#[test]
fn schema_cache_compiles_once_per_document() {
    let mut cache = SchemaCache::new();
    let doc = serde_json::json!({"kind": "list", "items": {"kind": "int"}});
    let a = cache.get_or_compile(&doc).unwrap();
    let b = cache.get_or_compile(&doc).unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));

    let other = serde_json::json!({"kind": "int"});
    cache.get_or_compile(&other).unwrap();
    assert_eq!(cache.len(), 2);

    assert!(a.validate_json("[1, 2]", &ValidateOptions::default()).is_ok());
}

#[test]
fn validators_are_shareable_across_threads() {
    let v = std::sync::Arc::new(validator(serde_json::json!({"kind": "int"})));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let v = v.clone();
            std::thread::spawn(move || {
                let json = format!("{}", i);
                v.validate_json(&json, &ValidateOptions::default()).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}
