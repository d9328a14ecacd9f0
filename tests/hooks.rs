use std::sync::Arc;
use valicore::schema::{
    ChainSchema, CustomErrorSchema, FunctionSchema, HookError, InnerValidator, PlainSchema,
    SchemaNode, WrapSchema,
};
use valicore::value::{int, text, Value};
use valicore::{ErrorKind, Extra, SchemaValidator, ValidateOptions};

fn validator(schema: SchemaNode) -> SchemaValidator {
    SchemaValidator::new(schema).unwrap()
}

fn run(v: &SchemaValidator, input: Value) -> Result<Value, valicore::ValidateError> {
    v.validate_value(&input, &ValidateOptions::default())
}

#[test]
fn function_before_preprocesses_the_input() {
    let schema = SchemaNode::FunctionBefore(FunctionSchema {
        function: Arc::new(|v: Value, _: &Extra| match v {
            Value::Str(s) => Ok(text(s.trim())),
            other => Ok(other),
        }),
        schema: Box::new(SchemaNode::int()),
    });
    let v = validator(schema);
    assert_eq!(run(&v, text("  42  ")).unwrap(), int(42));
}

#[test]
fn function_after_postprocesses_the_output() {
    let schema = SchemaNode::FunctionAfter(FunctionSchema {
        function: Arc::new(|v: Value, _: &Extra| match v {
            Value::Int(i) => Ok(int(i * 2)),
            other => Ok(other),
        }),
        schema: Box::new(SchemaNode::int()),
    });
    let v = validator(schema);
    // The hook sees the validated (coerced) value.
    assert_eq!(run(&v, text("21")).unwrap(), int(42));
}

#[test]
fn function_plain_replaces_the_schema() {
    let schema = SchemaNode::FunctionPlain(PlainSchema {
        function: Arc::new(|v: Value, _: &Extra| Ok(Value::Array(vec![v]))),
    });
    let v = validator(schema);
    assert_eq!(run(&v, int(1)).unwrap(), Value::Array(vec![int(1)]));
}

#[test]
fn hook_value_error_becomes_a_line_item() {
    let schema = SchemaNode::FunctionAfter(FunctionSchema {
        function: Arc::new(|v: Value, _: &Extra| match &v {
            Value::Int(i) if *i % 2 == 0 => Ok(v),
            _ => Err(HookError::Value("must be even".into())),
        }),
        schema: Box::new(SchemaNode::int()),
    });
    let v = validator(schema);
    let err = run(&v, int(3)).unwrap_err().into_errors();
    assert_eq!(err.errors()[0].kind, ErrorKind::ValueError);
    assert!(err.errors()[0].message().contains("must be even"));

    let schema = SchemaNode::FunctionAfter(FunctionSchema {
        function: Arc::new(|_: Value, _: &Extra| {
            Err(HookError::Assertion("broken invariant".into()))
        }),
        schema: Box::new(SchemaNode::int()),
    });
    let v = validator(schema);
    let err = run(&v, int(1)).unwrap_err().into_errors();
    assert_eq!(err.errors()[0].kind, ErrorKind::AssertionError);
}

#[test]
fn hook_fatal_error_is_not_a_validation_error() {
    let schema = SchemaNode::FunctionPlain(PlainSchema {
        function: Arc::new(|_: Value, _: &Extra| Err(HookError::Fatal("db is down".into()))),
    });
    let v = validator(schema);
    let err = run(&v, int(1)).unwrap_err();
    assert!(err.is_fatal());
    assert!(err.errors().is_none());
}

#[test]
fn wrap_hook_can_recover_from_inner_failure() {
    let schema = SchemaNode::FunctionWrap(WrapSchema {
        function: Arc::new(|v: Value, inner: &mut dyn InnerValidator, _: &Extra| {
            match inner.call(v) {
                Ok(out) => Ok(out),
                Err(_) => Ok(int(-1)),
            }
        }),
        schema: Box::new(SchemaNode::int()),
    });
    let v = validator(schema);
    assert_eq!(run(&v, int(7)).unwrap(), int(7));
    assert_eq!(run(&v, text("junk")).unwrap(), int(-1));
}

#[test]
fn wrap_hook_can_reraise_inner_errors() {
    let schema = SchemaNode::FunctionWrap(WrapSchema {
        function: Arc::new(|v: Value, inner: &mut dyn InnerValidator, _: &Extra| {
            inner.call(v).map_err(HookError::from)
        }),
        schema: Box::new(SchemaNode::int()),
    });
    let v = validator(schema);
    let err = run(&v, text("junk")).unwrap_err().into_errors();
    assert_eq!(err.errors()[0].kind, ErrorKind::IntParsing);
}

#[test]
fn hooks_see_the_user_context() {
    let schema = SchemaNode::FunctionPlain(PlainSchema {
        function: Arc::new(|v: Value, extra: &Extra| {
            let limit = extra
                .context
                .as_ref()
                .and_then(|c| c.downcast_ref::<i128>())
                .copied()
                .ok_or_else(|| HookError::Fatal("missing context".into()))?;
            match v {
                Value::Int(i) if i <= limit => Ok(int(i)),
                _ => Err(HookError::Value(format!("over the limit {}", limit))),
            }
        }),
    });
    let v = validator(schema);
    let opts = ValidateOptions {
        context: Some(Arc::new(10i128)),
        ..ValidateOptions::default()
    };
    assert_eq!(v.validate_value(&int(5), &opts).unwrap(), int(5));
    assert!(v.validate_value(&int(50), &opts).is_err());
    // No context at all is a fatal error from this hook.
    assert!(run(&v, int(5)).unwrap_err().is_fatal());
}

#[test]
fn chain_pipes_each_step_into_the_next() {
    // str -> trimmed str (before hook) -> int
    let schema = SchemaNode::Chain(ChainSchema {
        steps: vec![
            SchemaNode::str(),
            SchemaNode::FunctionBefore(FunctionSchema {
                function: Arc::new(|v: Value, _: &Extra| match v {
                    Value::Str(s) => Ok(text(s.replace('_', ""))),
                    other => Ok(other),
                }),
                schema: Box::new(SchemaNode::int()),
            }),
        ],
    });
    let v = validator(schema);
    assert_eq!(run(&v, text("1_000_000")).unwrap(), int(1_000_000));
}

#[test]
fn custom_error_replaces_inner_errors() {
    let schema = SchemaNode::CustomError(CustomErrorSchema {
        schema: Box::new(SchemaNode::int()),
        message: "expected something int-like".into(),
    });
    let v = validator(schema);
    let err = run(&v, text("junk")).unwrap_err().into_errors();
    assert_eq!(err.len(), 1);
    assert_eq!(err.errors()[0].kind, ErrorKind::ValueError);
    assert!(err.errors()[0].message().contains("int-like"));
}
