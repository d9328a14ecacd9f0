use valicore::parse::schema_from_json;
use valicore::value::{int, text, Value};
use valicore::{ErrorKind, SchemaValidator, ValidateOptions};

fn validator(doc: serde_json::Value) -> SchemaValidator {
    SchemaValidator::new(schema_from_json(&doc).unwrap()).unwrap()
}

fn accept(v: &SchemaValidator, json: &str) -> Value {
    v.validate_json(json, &ValidateOptions::default()).unwrap()
}

fn reject(v: &SchemaValidator, json: &str) -> ErrorKind {
    let err = v
        .validate_json(json, &ValidateOptions::default())
        .unwrap_err();
    err.into_errors().errors()[0].kind
}

#[test]
fn validate_json_null() {
    let v = validator(serde_json::json!({"kind": "none"}));
    assert_eq!(accept(&v, "null"), Value::Null);
    assert_eq!(reject(&v, "0"), ErrorKind::NoneRequired);
    assert_eq!(reject(&v, "false"), ErrorKind::NoneRequired);
}

#[test]
fn validate_json_bool() {
    let v = validator(serde_json::json!({"kind": "bool"}));
    assert_eq!(accept(&v, "true"), Value::Bool(true));
    assert_eq!(accept(&v, "\"yes\""), Value::Bool(true));
    assert_eq!(accept(&v, "\"off\""), Value::Bool(false));
    assert_eq!(accept(&v, "1"), Value::Bool(true));
    assert_eq!(reject(&v, "\"maybe\""), ErrorKind::BoolParsing);
    assert_eq!(reject(&v, "2"), ErrorKind::BoolType);
}

#[test]
fn validate_json_int() {
    let v = validator(serde_json::json!({"kind": "int"}));
    assert_eq!(accept(&v, "42"), int(42));
    assert_eq!(accept(&v, "\"42\""), int(42));
    assert_eq!(accept(&v, "42.0"), int(42));
    assert_eq!(reject(&v, "42.5"), ErrorKind::IntFromFloat);
    assert_eq!(reject(&v, "\"x\""), ErrorKind::IntParsing);
    assert_eq!(reject(&v, "null"), ErrorKind::IntType);
}

#[test]
fn out_of_range_floats_do_not_saturate() {
    let v = validator(serde_json::json!({"kind": "int"}));
    // Integer-valued but far beyond any 128-bit integer.
    assert_eq!(reject(&v, "1e40"), ErrorKind::IntParsingSize);
    assert_eq!(reject(&v, "-1e40"), ErrorKind::IntParsingSize);
    assert_eq!(reject(&v, "\"1e40\""), ErrorKind::IntParsingSize);
    // In-range integer-valued floats still convert exactly.
    assert_eq!(accept(&v, "1e15"), int(1_000_000_000_000_000i64));
}

#[test]
fn validate_json_int_bounds() {
    let v = validator(serde_json::json!({"kind": "int", "ge": 0, "lt": 100}));
    assert_eq!(accept(&v, "0"), int(0));
    assert_eq!(accept(&v, "99"), int(99));
    assert_eq!(reject(&v, "-1"), ErrorKind::GreaterThanEqual);
    assert_eq!(reject(&v, "100"), ErrorKind::LessThan);

    let v = validator(serde_json::json!({"kind": "int", "multiple_of": 5}));
    assert_eq!(accept(&v, "15"), int(15));
    assert_eq!(reject(&v, "7"), ErrorKind::MultipleOf);
}

#[test]
fn validate_json_strict_int() {
    let v = validator(serde_json::json!({"kind": "int", "strict": true}));
    assert_eq!(accept(&v, "42"), int(42));
    assert_eq!(reject(&v, "\"42\""), ErrorKind::IntType);
    assert_eq!(reject(&v, "42.0"), ErrorKind::IntType);
    assert_eq!(reject(&v, "true"), ErrorKind::IntType);
}

#[test]
fn per_call_strict_overrides_node() {
    let v = validator(serde_json::json!({"kind": "int"}));
    let strict = ValidateOptions {
        strict: Some(true),
        ..ValidateOptions::default()
    };
    assert!(v.validate_json("\"42\"", &strict).is_err());
    assert!(v.validate_json("42", &strict).is_ok());
}

#[test]
fn validate_json_float() {
    let v = validator(serde_json::json!({"kind": "float"}));
    assert_eq!(accept(&v, "1.5"), Value::from_float(1.5));
    assert_eq!(accept(&v, "3"), Value::from_float(3.0));
    assert_eq!(accept(&v, "\"2.5\""), Value::from_float(2.5));
    assert_eq!(reject(&v, "\"x\""), ErrorKind::FloatParsing);
    assert_eq!(reject(&v, "[]"), ErrorKind::FloatType);
}

#[test]
fn validate_json_str_constraints() {
    let v = validator(serde_json::json!({
        "kind": "str", "min_length": 2, "max_length": 4, "pattern": "^[a-z]+$",
    }));
    assert_eq!(accept(&v, "\"abc\""), text("abc"));
    assert_eq!(reject(&v, "\"a\""), ErrorKind::StringTooShort);
    assert_eq!(reject(&v, "\"abcde\""), ErrorKind::StringTooLong);
    assert_eq!(reject(&v, "\"ABC\""), ErrorKind::StringPatternMismatch);
    assert_eq!(reject(&v, "7"), ErrorKind::StringType);
}

#[test]
fn str_length_is_in_characters() {
    let v = validator(serde_json::json!({"kind": "str", "max_length": 3}));
    // Three characters, more than three bytes.
    assert_eq!(accept(&v, "\"äöü\""), text("äöü"));
}

#[test]
fn validate_json_literal() {
    let v = validator(serde_json::json!({"kind": "literal", "expected": ["a", 1, true]}));
    assert_eq!(accept(&v, "\"a\""), text("a"));
    assert_eq!(accept(&v, "1"), int(1));
    assert_eq!(accept(&v, "true"), Value::Bool(true));
    assert_eq!(reject(&v, "\"b\""), ErrorKind::LiteralError);
}

#[test]
fn validate_json_nullable() {
    let v = validator(serde_json::json!({"kind": "nullable", "schema": {"kind": "int"}}));
    assert_eq!(accept(&v, "null"), Value::Null);
    assert_eq!(accept(&v, "3"), int(3));
    assert_eq!(reject(&v, "\"x\""), ErrorKind::IntParsing);
}

#[test]
fn validate_json_list() {
    let v = validator(serde_json::json!({
        "kind": "list", "items": {"kind": "int"}, "min_length": 1, "max_length": 3,
    }));
    assert_eq!(accept(&v, "[1, \"2\"]"), Value::Array(vec![int(1), int(2)]));
    assert_eq!(reject(&v, "[]"), ErrorKind::TooShort);
    assert_eq!(reject(&v, "[1, 2, 3, 4]"), ErrorKind::TooLong);
    assert_eq!(reject(&v, "{}"), ErrorKind::ListType);
}

#[test]
fn list_reports_every_bad_element() {
    let v = validator(serde_json::json!({"kind": "list", "items": {"kind": "int"}}));
    let err = v
        .validate_json("[\"x\", 2, \"y\", 4]", &ValidateOptions::default())
        .unwrap_err();
    let errors = err.into_errors();
    assert_eq!(errors.len(), 2);
    let rendered = format!("{}", errors);
    assert!(rendered.contains("2 validation errors"));
}

#[test]
fn validate_json_set_deduplicates() {
    let v = validator(serde_json::json!({"kind": "set", "items": {"kind": "int"}}));
    // Lax mode silently drops duplicates.
    assert_eq!(accept(&v, "[1, 2, 1]"), Value::Array(vec![int(1), int(2)]));

    let strict = validator(serde_json::json!({
        "kind": "set", "items": {"kind": "int"}, "strict": true,
    }));
    assert_eq!(reject(&strict, "[1, 2, 1]"), ErrorKind::SetItemNotUnique);
}

#[test]
fn tuple_strict_applies_to_its_elements() {
    let v = validator(serde_json::json!({
        "kind": "tuple",
        "strict": true,
        "items": [{"kind": "int"}],
    }));
    assert_eq!(accept(&v, "[1]"), Value::Array(vec![int(1)]));
    assert_eq!(reject(&v, "[\"1\"]"), ErrorKind::IntType);
}

#[test]
fn validate_json_tuple() {
    let v = validator(serde_json::json!({
        "kind": "tuple",
        "items": [{"kind": "int"}, {"kind": "str"}],
    }));
    assert_eq!(
        accept(&v, "[1, \"a\"]"),
        Value::Array(vec![int(1), text("a")])
    );
    assert_eq!(reject(&v, "[1]"), ErrorKind::Missing);
    assert_eq!(reject(&v, "[1, \"a\", 9]"), ErrorKind::TooLong);

    let variadic = validator(serde_json::json!({
        "kind": "tuple",
        "items": [{"kind": "str"}],
        "variadic_item": {"kind": "int"},
    }));
    assert_eq!(
        accept(&variadic, "[\"a\", 1, 2]"),
        Value::Array(vec![text("a"), int(1), int(2)])
    );
}

#[test]
fn validate_json_dict() {
    let v = validator(serde_json::json!({
        "kind": "dict", "keys": {"kind": "str"}, "values": {"kind": "int"},
    }));
    let out = accept(&v, r#"{"a": 1, "b": "2"}"#);
    match out {
        Value::Map(m) => {
            assert_eq!(m.get(&text("a")), Some(&int(1)));
            assert_eq!(m.get(&text("b")), Some(&int(2)));
        }
        other => panic!("unexpected output {:?}", other),
    }
    assert_eq!(reject(&v, "[]"), ErrorKind::DictType);
}

#[test]
fn malformed_json_is_a_line_item() {
    let v = validator(serde_json::json!({"kind": "int"}));
    assert_eq!(reject(&v, "{not json"), ErrorKind::JsonInvalid);
}

#[test]
fn isinstance_is_a_cheap_boolean() {
    let v = validator(serde_json::json!({"kind": "int"}));
    assert!(v.isinstance_value(&int(1)));
    assert!(v.isinstance_value(&text("2")));
    assert!(!v.isinstance_value(&Value::Null));
}

#[test]
fn validation_is_idempotent() {
    let v = validator(serde_json::json!({
        "kind": "model",
        "name": "config",
        "fields": [
            {"name": "port", "schema": {"kind": "int"}},
            {"name": "tags", "schema": {"kind": "set", "items": {"kind": "str"}}, "default": []},
        ],
    }));
    let once = v
        .validate_json(
            r#"{"port": "8080", "tags": ["a", "b", "a"]}"#,
            &ValidateOptions::default(),
        )
        .unwrap();
    // Re-validating already validated output changes nothing.
    let twice = v.validate_value(&once, &ValidateOptions::default()).unwrap();
    assert_eq!(twice, once);
}

#[test]
fn validate_strings_coerces_leaf_strings() {
    let v = validator(serde_json::json!({
        "kind": "model",
        "name": "config",
        "fields": [
            {"name": "port", "schema": {"kind": "int"}},
            {"name": "debug", "schema": {"kind": "bool"}},
        ],
    }));
    let mut input = std::collections::BTreeMap::new();
    input.insert(text("port"), text("8080"));
    input.insert(text("debug"), text("true"));
    let out = v
        .validate_strings(&Value::Map(input), &ValidateOptions::default())
        .unwrap();
    match out {
        Value::Map(m) => {
            assert_eq!(m.get(&text("port")), Some(&int(8080)));
            assert_eq!(m.get(&text("debug")), Some(&Value::Bool(true)));
        }
        other => panic!("unexpected output {:?}", other),
    }
}
