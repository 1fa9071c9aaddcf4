// tests/compiler_tests.rs

use pretty_assertions::assert_eq;
use unq_lang::ast::*;
use unq_lang::{ParseError, Query, compile, convert};

fn compile_str(template: &str) -> Result<Query, ParseError> {
    let json: serde_json::Value = serde_json::from_str(template).unwrap();
    compile(&convert::from_json(json))
}

fn fields(template: &str) -> Vec<FieldTemplate> {
    match compile_str(template).unwrap().root {
        Template::Object(object) => object.fields,
        other => panic!("Expected an object, got {:?}", other),
    }
}

fn value(expr: Expr) -> Template {
    Template::Value {
        expr,
        order: Order::None,
        order_num: 0,
    }
}

fn field(name: &str) -> Expr {
    Expr::Field(name.to_string())
}

// ============================================================================
// Structure
// ============================================================================

#[test]
fn test_copy_field() {
    assert_eq!(
        fields(r#"{"title": "."}"#),
        vec![FieldTemplate {
            key: Key::Name("title".into()),
            value: value(field(".")),
        }]
    );
}

#[test]
fn test_field_order_is_kept() {
    let keys: Vec<Key> = fields(r#"{"b": "x", "a": "y", "c": "z"}"#)
        .into_iter()
        .map(|f| f.key)
        .collect();
    assert_eq!(
        keys,
        vec![
            Key::Name("b".into()),
            Key::Name("a".into()),
            Key::Name("c".into()),
        ]
    );
}

#[test]
fn test_literal_members() {
    let compiled = fields(r#"{"n": 5, "f": 1.5, "b": false}"#);
    assert_eq!(compiled[0].value, value(Expr::Int(5)));
    assert_eq!(compiled[1].value, value(Expr::Float(1.5)));
    assert_eq!(compiled[2].value, value(Expr::Bool(false)));
}

#[test]
fn test_top_level_value() {
    assert_eq!(compile_str(r#""title""#).unwrap().root, value(field("title")));
}

#[test]
fn test_array_template() {
    assert_eq!(
        compile_str(r#"["a", "b"]"#).unwrap().root,
        Template::Array(vec![value(field("a")), value(field("b"))])
    );
}

#[test]
fn test_collecting_key_wraps_value_in_array() {
    let compiled = fields(r#"{"x[]": {"v": "."}}"#);
    let Template::ContextMod(m) = &compiled[0].value else {
        panic!("Expected a context modifier");
    };
    assert_eq!(m.mode, ContextMode::Array);
    assert_eq!(m.path, "x");
    let Template::Array(alternatives) = m.inner.as_ref() else {
        panic!("Expected the value to collect into an array");
    };
    assert_eq!(alternatives.len(), 1);
    assert!(matches!(alternatives[0], Template::Object(_)));
}

#[test]
fn test_collecting_key_keeps_array_value() {
    let compiled = fields(r#"{"x[]": ["."]}"#);
    let Template::ContextMod(m) = &compiled[0].value else {
        panic!("Expected a context modifier");
    };
    assert_eq!(*m.inner, Template::Array(vec![value(field("."))]));
}

// ============================================================================
// Conditions
// ============================================================================

#[test]
fn test_if_becomes_gate() {
    let compiled = fields(r##"{"#if": "year > 1990", "t": "title"}"##);
    assert_eq!(compiled[0].key, Key::Cond);
    assert_eq!(
        compiled[0].value,
        Template::CondWrapper(Condition::Number {
            op: CompareOp::Greater,
            lhs: field("year"),
            rhs: Expr::Int(1990),
        })
    );
    assert_eq!(compiled[1].key, Key::Name("t".into()));
}

#[test]
fn test_value_condition_filters_its_field() {
    let compiled = fields(r#"{"p": "price > 10"}"#);
    assert_eq!(compiled.len(), 1);
    assert_eq!(
        compiled[0].value,
        Template::WithCond {
            inner: Box::new(value(field("price"))),
            cond: Condition::Number {
                op: CompareOp::Greater,
                lhs: field("price"),
                rhs: Expr::Int(10),
            },
        }
    );
}

#[test]
fn test_filter_on_current_value() {
    let compiled = fields(r#"{"big": ". ? > 10"}"#);
    assert!(matches!(compiled[0].value, Template::WithCond { .. }));
    assert!(!compiled[0].value.is_aggregate());
}

// ============================================================================
// Ordering and aggregates
// ============================================================================

#[test]
fn test_ordered_object() {
    let compiled = fields(r#"{"items[]": {"n": "name @descending(1)"}}"#);
    let Template::ContextMod(m) = &compiled[0].value else {
        panic!("Expected a context modifier");
    };
    let Template::Array(alternatives) = m.inner.as_ref() else {
        panic!("Expected an array");
    };
    let Template::Object(object) = &alternatives[0] else {
        panic!("Expected an object");
    };
    assert!(object.ordered);
    assert_eq!(object.fields[0].value.order_number(), 1);
    assert!(alternatives[0].is_ordered());
}

#[test]
fn test_ids_are_unique_per_template() {
    let compiled = fields(r#"{"a": "$count", "b": "$count"}"#);
    assert_eq!(compiled[0].value, value(Expr::Count { id: 1 }));
    assert_eq!(compiled[1].value, value(Expr::Count { id: 2 }));
    assert!(compiled[0].value.is_aggregate());
}

#[test]
fn test_ids_restart_per_compilation() {
    let first = compile_str(r#"{"a": "$count"}"#).unwrap();
    let second = compile_str(r#"{"a": "$count"}"#).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_function_definition() {
    let compiled = fields(r##"{"#func double(x)": "$var(x) * 2", "v": "$double(n)"}"##);
    assert_eq!(
        compiled[0].key,
        Key::Func {
            name: "double".into(),
            params: vec!["x".into()],
        }
    );
    assert!(compiled[1].value.is_aggregate());
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_null_member_is_rejected() {
    let err = compile_str(r#"{"a": null}"#).unwrap_err();
    assert_eq!(err.message, "null is not a valid template value");
}

#[test]
fn test_empty_value_is_rejected() {
    let err = compile_str(r#"{"x": ""}"#).unwrap_err();
    assert_eq!(err.message, "Empty value for key \"x\"");
}

#[test]
fn test_error_in_nested_value() {
    let err = compile_str(r#"{"outer": {"x": "$foo("}}"#).unwrap_err();
    assert_eq!(err.position, 4);
    assert_eq!(err.message, "Unterminated '(' in $foo");
}

#[test]
fn test_error_in_key() {
    let err = compile_str(r#"{"a b": "."}"#).unwrap_err();
    assert_eq!(err.message, "Unexpected token \"b\" in key");
}
