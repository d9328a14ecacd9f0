use std::collections::BTreeSet;
use std::sync::Arc;
use valicore::parse::schema_from_json;
use valicore::schema::{CustomSerSchema, InnerSerializer, SchemaNode};
use valicore::value::{int, text, Value};
use valicore::{SchemaValidator, SerOptions, ValidateOptions};

fn validator(doc: serde_json::Value) -> SchemaValidator {
    SchemaValidator::new(schema_from_json(&doc).unwrap()).unwrap()
}

fn json_str(v: &SchemaValidator, value: &Value, opts: &SerOptions) -> String {
    String::from_utf8(v.serializer().to_json(value, opts).unwrap()).unwrap()
}

#[test]
fn validate_then_serialize_round_trips() {
    let v = validator(serde_json::json!({
        "kind": "model",
        "name": "person",
        "fields": [
            {"name": "name", "schema": {"kind": "str"}},
            {"name": "age", "schema": {"kind": "int"}},
        ],
    }));
    let value = v
        .validate_json(r#"{"name": "Bob", "age": "43"}"#, &ValidateOptions::default())
        .unwrap();
    assert_eq!(
        json_str(&v, &value, &SerOptions::default()),
        r#"{"age":43,"name":"Bob"}"#
    );
}

#[test]
fn serialize_by_alias() {
    let v = validator(serde_json::json!({
        "kind": "model",
        "name": "person",
        "fields": [
            {"name": "full_name", "schema": {"kind": "str"}, "alias": "fullName"},
        ],
    }));
    let value = v
        .validate_json(r#"{"fullName": "Bob"}"#, &ValidateOptions::default())
        .unwrap();
    // Aliases are the default output keys.
    assert_eq!(
        json_str(&v, &value, &SerOptions::default()),
        r#"{"fullName":"Bob"}"#
    );
    let opts = SerOptions {
        by_alias: false,
        ..SerOptions::default()
    };
    assert_eq!(json_str(&v, &value, &opts), r#"{"full_name":"Bob"}"#);
}

#[test]
fn serialize_include_exclude() {
    let v = validator(serde_json::json!({
        "kind": "model",
        "name": "thing",
        "fields": [
            {"name": "a", "schema": {"kind": "int"}},
            {"name": "b", "schema": {"kind": "int"}},
            {"name": "c", "schema": {"kind": "int"}},
        ],
    }));
    let value = v
        .validate_json(r#"{"a": 1, "b": 2, "c": 3}"#, &ValidateOptions::default())
        .unwrap();

    let opts = SerOptions {
        include: Some(["a", "b"].iter().map(|s| s.to_string()).collect()),
        ..SerOptions::default()
    };
    assert_eq!(json_str(&v, &value, &opts), r#"{"a":1,"b":2}"#);

    let opts = SerOptions {
        exclude: Some(std::iter::once("b".to_string()).collect::<BTreeSet<_>>()),
        ..SerOptions::default()
    };
    assert_eq!(json_str(&v, &value, &opts), r#"{"a":1,"c":3}"#);
}

#[test]
fn include_exclude_is_top_level_only() {
    let v = validator(serde_json::json!({
        "kind": "model",
        "name": "outer",
        "fields": [
            {"name": "a", "schema": {"kind": "model", "name": "inner", "fields": [
                {"name": "a", "schema": {"kind": "int"}},
                {"name": "b", "schema": {"kind": "int"}},
            ]}},
            {"name": "b", "schema": {"kind": "int"}},
        ],
    }));
    let value = v
        .validate_json(r#"{"a": {"a": 1, "b": 2}, "b": 3}"#, &ValidateOptions::default())
        .unwrap();
    let opts = SerOptions {
        exclude: Some(std::iter::once("b".to_string()).collect::<BTreeSet<_>>()),
        ..SerOptions::default()
    };
    // The inner model keeps its "b"; only the top-level one is dropped.
    assert_eq!(json_str(&v, &value, &opts), r#"{"a":{"a":1,"b":2}}"#);
}

#[test]
fn include_exclude_applies_behind_a_definition_ref() {
    // The standard recursive-model shape: the root is a reference.
    let v = validator(serde_json::json!({
        "kind": "definitions",
        "definitions": {
            "thing": {"kind": "model", "name": "thing", "fields": [
                {"name": "a", "schema": {"kind": "int"}},
                {"name": "b", "schema": {"kind": "int"}},
            ]},
        },
        "schema": {"kind": "definition-ref", "name": "thing"},
    }));
    let value = v
        .validate_json(r#"{"a": 1, "b": 2}"#, &ValidateOptions::default())
        .unwrap();
    let opts = SerOptions {
        exclude: Some(std::iter::once("b".to_string()).collect::<BTreeSet<_>>()),
        ..SerOptions::default()
    };
    assert_eq!(json_str(&v, &value, &opts), r#"{"a":1}"#);
}

#[test]
fn serializer_output_revalidates_to_the_same_value() {
    let v = validator(serde_json::json!({
        "kind": "model",
        "name": "person",
        "fields": [
            {"name": "name", "schema": {"kind": "str"}, "alias": "fullName"},
            {"name": "age", "schema": {"kind": "int"}},
        ],
    }));
    let value = v
        .validate_json(r#"{"fullName": "Bob", "age": "43"}"#, &ValidateOptions::default())
        .unwrap();
    let json = v
        .serializer()
        .to_json(&value, &SerOptions::default())
        .unwrap();
    let again = v
        .validate_json(std::str::from_utf8(&json).unwrap(), &ValidateOptions::default())
        .unwrap();
    assert_eq!(again, value);
}

#[test]
fn serialize_tagged_union_value() {
    let v = validator(serde_json::json!({
        "kind": "tagged-union",
        "discriminator": "pet",
        "choices": {
            "cat": {"kind": "model", "name": "cat", "fields": [
                {"name": "pet", "schema": {"kind": "str"}},
                {"name": "lives", "schema": {"kind": "int"}},
            ]},
        },
    }));
    let value = v
        .validate_json(r#"{"pet": "cat", "lives": 9}"#, &ValidateOptions::default())
        .unwrap();
    assert_eq!(
        json_str(&v, &value, &SerOptions::default()),
        r#"{"lives":9,"pet":"cat"}"#
    );
}

#[test]
fn serialize_unknown_passes_values_by_shape() {
    let v = validator(serde_json::json!({"kind": "int"}));
    let err = v
        .serializer()
        .to_value(&text("oops"), &SerOptions::default())
        .unwrap_err();
    assert!(matches!(err, valicore::SerError::UnknownValue { .. }));

    let opts = SerOptions {
        serialize_unknown: true,
        ..SerOptions::default()
    };
    assert_eq!(
        v.serializer().to_value(&text("oops"), &opts).unwrap(),
        text("oops")
    );
}

#[test]
fn custom_serializer_overrides_the_representation() {
    let schema = SchemaNode::CustomSer(CustomSerSchema {
        function: Arc::new(|v: &Value, _: &mut dyn InnerSerializer| match v {
            Value::Int(i) => Ok(text(format!("#{}", i))),
            other => Ok(other.clone()),
        }),
        schema: Box::new(SchemaNode::int()),
    });
    let v = SchemaValidator::new(schema).unwrap();
    // Validation is unaffected by the custom serializer.
    let value = v.validate_value(&int(7), &ValidateOptions::default()).unwrap();
    assert_eq!(value, int(7));
    assert_eq!(json_str(&v, &value, &SerOptions::default()), "\"#7\"");
}

#[test]
fn custom_serializer_can_defer_to_the_inner() {
    let schema = SchemaNode::CustomSer(CustomSerSchema {
        function: Arc::new(|v: &Value, inner: &mut dyn InnerSerializer| inner.call(v)),
        schema: Box::new(SchemaNode::int()),
    });
    let v = SchemaValidator::new(schema).unwrap();
    assert_eq!(json_str(&v, &int(7), &SerOptions::default()), "7");
}

#[test]
fn union_serializes_with_the_matching_branch() {
    let v = validator(serde_json::json!({
        "kind": "union",
        "choices": [{"kind": "int"}, {"kind": "str"}],
    }));
    assert_eq!(json_str(&v, &int(1), &SerOptions::default()), "1");
    assert_eq!(json_str(&v, &text("a"), &SerOptions::default()), r#""a""#);
}
