// tests/parser_tests.rs

use pretty_assertions::assert_eq;
use unq_lang::ast::*;
use unq_lang::parser::{KeyContext, NodeIds, ParseError, ParsedValue, Parser};

fn parse_value(input: &str) -> ParsedValue {
    let mut ids = NodeIds::new();
    Parser::new(input, &mut ids)
        .value()
        .unwrap()
        .expect("value should not be empty")
}

fn parse_value_err(input: &str) -> ParseError {
    let mut ids = NodeIds::new();
    Parser::new(input, &mut ids).value().unwrap_err()
}

fn parse_expr(input: &str) -> Expr {
    match parse_value(input).value {
        Template::Value { expr, .. } => expr,
        other => panic!("Expected a plain value, got {:?}", other),
    }
}

fn parse_condition(input: &str) -> Condition {
    let mut ids = NodeIds::new();
    Parser::new(input, &mut ids).full_condition().unwrap()
}

fn parse_key(input: &str) -> (Key, KeyContext) {
    let mut ids = NodeIds::new();
    let mut parser = Parser::new(input, &mut ids);
    let key = parser.key().unwrap();
    let context = parser.key_context(&key).unwrap();
    (key, context)
}

fn field(name: &str) -> Expr {
    Expr::Field(name.to_string())
}

fn boxed(expr: Expr) -> Box<Expr> {
    Box::new(expr)
}

fn modifier(template: &Template) -> &ContextModifier {
    match template {
        Template::ContextMod(m) => m,
        other => panic!("Expected a context modifier, got {:?}", other),
    }
}

// ============================================================================
// Field Access
// ============================================================================

#[test]
fn test_field() {
    assert_eq!(parse_expr("title"), field("title"));
    assert_eq!(parse_expr("."), field("."));
}

#[test]
fn test_nested_path() {
    assert_eq!(parse_expr("actors[0].name"), field("actors[0].name"));
}

#[test]
fn test_backtick_field_is_escaped() {
    assert_eq!(parse_expr("`a.b`"), field("a\\.b"));
}

#[test]
fn test_root_and_parent_paths() {
    assert_eq!(
        parse_expr("/title"),
        Expr::ChangePath {
            op: ChangeOp::Root,
            arg: boxed(field("title")),
        }
    );
    assert_eq!(
        parse_expr("../title"),
        Expr::ChangePath {
            op: ChangeOp::Up,
            arg: boxed(field("title")),
        }
    );
    assert_eq!(
        parse_expr(".."),
        Expr::ChangePath {
            op: ChangeOp::Up,
            arg: boxed(field(".")),
        }
    );
    assert_eq!(
        parse_expr("<<title"),
        Expr::ChangePath {
            op: ChangeOp::PrevId,
            arg: boxed(field("title")),
        }
    );
}

#[test]
fn test_subfield_on_variable() {
    assert_eq!(
        parse_expr("$var(person).name"),
        Expr::Subfield {
            arg: boxed(Expr::Var("person".into())),
            sub: Subpath::Member(boxed(field("name"))),
        }
    );
    assert_eq!(
        parse_expr("$var(list)[1]"),
        Expr::Subfield {
            arg: boxed(Expr::Var("list".into())),
            sub: Subpath::Index(boxed(Expr::Int(1))),
        }
    );
}

#[test]
fn test_leading_bracket_indexes_current_value() {
    assert_eq!(
        parse_expr("[0]"),
        Expr::Subfield {
            arg: boxed(field(".")),
            sub: Subpath::Index(boxed(Expr::Int(0))),
        }
    );
}

#[test]
fn test_dynamic_field() {
    assert_eq!(
        parse_expr("$(name)"),
        Expr::DynamicField(boxed(field("name")))
    );
}

// ============================================================================
// Literals and Arithmetic
// ============================================================================

#[test]
fn test_literals() {
    assert_eq!(parse_expr("42"), Expr::Int(42));
    assert_eq!(parse_expr("-3"), Expr::Int(-3));
    assert_eq!(parse_expr("2.5"), Expr::Float(2.5));
    assert_eq!(parse_expr("-2.5"), Expr::Float(-2.5));
    assert_eq!(parse_expr("'text'"), Expr::Str("text".into()));
    assert_eq!(parse_expr("true"), Expr::Bool(true));
}

#[test]
fn test_precedence() {
    // Should be: Add(1, Multiply(2, 3))
    assert_eq!(
        parse_expr("1 + 2 * 3"),
        Expr::Binary {
            op: BinOp::Add,
            left: boxed(Expr::Int(1)),
            right: boxed(Expr::Binary {
                op: BinOp::Multiply,
                left: boxed(Expr::Int(2)),
                right: boxed(Expr::Int(3)),
            }),
        }
    );
}

#[test]
fn test_parentheses() {
    match parse_expr("(1 + 2) * 3") {
        Expr::Binary {
            op: BinOp::Multiply,
            left,
            right,
        } => {
            assert!(matches!(*left, Expr::Binary { op: BinOp::Add, .. }));
            assert_eq!(*right, Expr::Int(3));
        }
        other => panic!("Expected multiply, got {:?}", other),
    }
}

#[test]
fn test_subtraction_is_left_associative() {
    assert_eq!(
        parse_expr("a - b - c"),
        Expr::Binary {
            op: BinOp::Subtract,
            left: boxed(Expr::Binary {
                op: BinOp::Subtract,
                left: boxed(field("a")),
                right: boxed(field("b")),
            }),
            right: boxed(field("c")),
        }
    );
}

#[test]
fn test_mod_keyword() {
    assert!(matches!(
        parse_expr("x mod 2"),
        Expr::Binary { op: BinOp::Modulo, .. }
    ));
}

// ============================================================================
// Dollar Functions
// ============================================================================

#[test]
fn test_aggregates_get_distinct_ids() {
    assert_eq!(
        parse_expr("$count + $sum(price)"),
        Expr::Binary {
            op: BinOp::Add,
            left: boxed(Expr::Count { id: 1 }),
            right: boxed(Expr::Sum {
                id: 2,
                arg: boxed(field("price")),
            }),
        }
    );
}

#[test]
fn test_min_max_avg() {
    assert!(matches!(parse_expr("$max(x)"), Expr::MinMax { max: true, .. }));
    assert!(matches!(parse_expr("$min(x)"), Expr::MinMax { max: false, .. }));
    assert!(matches!(parse_expr("$avg(x)"), Expr::Avg { .. }));
}

#[test]
fn test_string_functions() {
    assert_eq!(
        parse_expr("$substr(title, 0, 3)"),
        Expr::Substr {
            arg: boxed(field("title")),
            start: boxed(Expr::Int(0)),
            len: Some(boxed(Expr::Int(3))),
        }
    );
    assert_eq!(
        parse_expr("$upper(name)"),
        Expr::ChangeCase {
            arg: boxed(field("name")),
            lower: false,
        }
    );
    assert!(matches!(
        parse_expr("$replace_all(s, 'a', 'b')"),
        Expr::Replace { all: true, .. }
    ));
    assert!(matches!(
        parse_expr("$ifind(s, 'a')"),
        Expr::Find { case_sensitive: false, .. }
    ));
}

#[test]
fn test_casts() {
    assert_eq!(
        parse_expr("$int(x)"),
        Expr::Cast {
            arg: boxed(field("x")),
            to: CastType::Int,
        }
    );
    assert!(matches!(
        parse_expr("$number(x)"),
        Expr::Cast { to: CastType::Number, .. }
    ));
}

#[test]
fn test_if_expression() {
    assert_eq!(
        parse_expr("$if(x > 1, 'big', 'small')"),
        Expr::If {
            cond: Box::new(Condition::Number {
                op: CompareOp::Greater,
                lhs: field("x"),
                rhs: Expr::Int(1),
            }),
            then: boxed(Expr::Str("big".into())),
            otherwise: boxed(Expr::Str("small".into())),
        }
    );
}

#[test]
fn test_calls() {
    assert_eq!(
        parse_expr("$add(1, 'a')"),
        Expr::Call {
            id: 1,
            name: "add".into(),
            args: vec![Expr::Int(1), Expr::Str("a".into())],
        }
    );
    assert_eq!(
        parse_expr("$call(f)"),
        Expr::Call {
            id: 1,
            name: "f".into(),
            args: vec![],
        }
    );
}

#[test]
fn test_context_information() {
    assert_eq!(parse_expr("$path"), Expr::Path);
    assert_eq!(parse_expr("$index"), Expr::Index);
    assert_eq!(parse_expr("$key"), Expr::Key);
    assert_eq!(parse_expr("$reskey"), Expr::Reskey);
    assert_eq!(parse_expr("$identifier"), Expr::Identifier(0));
    assert_eq!(parse_expr("$identifier(2)"), Expr::Identifier(2));
}

#[test]
fn test_date_literal_folds_to_epoch() {
    assert_eq!(parse_expr("$D '2020-01-01'"), Expr::Int(1577836800));
}

#[test]
fn test_xml_functions() {
    assert_eq!(parse_expr("$attr(id)"), Expr::Attr("id".into()));
    assert_eq!(parse_expr("$child('title')"), Expr::Child("title".into()));
    assert_eq!(parse_expr("$text($xml)"), Expr::Text(boxed(Expr::Xml { children: true })));
}

// ============================================================================
// Values: conditions and ordering
// ============================================================================

#[test]
fn test_value_with_ordering() {
    assert_eq!(
        parse_value("name @ascending(2)").value,
        Template::Value {
            expr: field("name"),
            order: Order::Ascending,
            order_num: 2,
        }
    );
    assert!(matches!(
        parse_value("name @unique_descending").value,
        Template::Value {
            order: Order::UniqueDescending,
            order_num: 0,
            ..
        }
    ));
}

#[test]
fn test_unknown_sort_order() {
    let err = parse_value_err("name @sideways");
    assert_eq!(err.message, "Error parsing value. Unknown sort order: sideways");
}

#[test]
fn test_value_filter_without_left_operand() {
    let parsed = parse_value(". ? > 10");
    assert_eq!(
        parsed.value,
        Template::WithCond {
            inner: Box::new(Template::Value {
                expr: field("."),
                order: Order::None,
                order_num: 0,
            }),
            cond: Condition::Number {
                op: CompareOp::Greater,
                lhs: field("."),
                rhs: Expr::Int(10),
            },
        }
    );
    assert_eq!(parsed.cond, None);
}

#[test]
fn test_value_with_separate_condition() {
    let parsed = parse_value("price > 10");
    assert_eq!(
        parsed.value,
        Template::Value {
            expr: field("price"),
            order: Order::None,
            order_num: 0,
        }
    );
    assert_eq!(
        parsed.cond,
        Some(Condition::Number {
            op: CompareOp::Greater,
            lhs: field("price"),
            rhs: Expr::Int(10),
        })
    );
}

#[test]
fn test_empty_value() {
    let mut ids = NodeIds::new();
    assert_eq!(Parser::new("", &mut ids).value(), Ok(None));
}

// ============================================================================
// Conditions
// ============================================================================

#[test]
fn test_condition_precedence() {
    assert_eq!(
        parse_condition("a > 1 & b < 2 | c !"),
        Condition::Or(
            Box::new(Condition::And(
                Box::new(Condition::Number {
                    op: CompareOp::Greater,
                    lhs: field("a"),
                    rhs: Expr::Int(1),
                }),
                Box::new(Condition::Number {
                    op: CompareOp::Less,
                    lhs: field("b"),
                    rhs: Expr::Int(2),
                }),
            )),
            Box::new(Condition::Exists(field("c"))),
        )
    );
}

#[test]
fn test_negated_group() {
    assert_eq!(
        parse_condition("!(x = 1)"),
        Condition::Not(Box::new(Condition::Number {
            op: CompareOp::Equal,
            lhs: field("x"),
            rhs: Expr::Int(1),
        }))
    );
}

#[test]
fn test_double_equals_is_equality() {
    assert_eq!(parse_condition("x == 1"), parse_condition("x = 1"));
}

#[test]
fn test_condition_kinds() {
    assert_eq!(
        parse_condition("x is_array"),
        Condition::Type {
            expr: field("x"),
            test: TypeTest::Array,
        }
    );
    assert!(matches!(
        parse_condition("name starts_with 'A'"),
        Condition::Text { op: TextOp::StartsWith, .. }
    ));
    assert!(matches!(
        parse_condition("name != 'A'"),
        Condition::Text { op: TextOp::NotEqual, .. }
    ));
    assert!(matches!(
        parse_condition("flag = true"),
        Condition::Bool { equal: true, .. }
    ));
    assert!(matches!(
        parse_condition("tag in $var(tags)"),
        Condition::Json { op: JsonOp::In, .. }
    ));
    assert!(matches!(
        parse_condition("$var(a) > 1"),
        Condition::Compare { op: CompareOp::Greater, .. }
    ));
}

#[test]
fn test_literal_pattern_is_compiled() {
    match parse_condition("name matches 'A.*'") {
        Condition::Matches {
            pattern: Some(pattern),
            ..
        } => {
            assert_eq!(pattern.source(), "A.*");
            assert!(pattern.is_match("Ann"));
            assert!(!pattern.is_match("Bob"));
        }
        other => panic!("Expected a compiled pattern, got {:?}", other),
    }
}

#[test]
fn test_aggregate_against_literal() {
    assert_eq!(
        parse_condition("$count > 2"),
        Condition::Number {
            op: CompareOp::Greater,
            lhs: Expr::Count { id: 1 },
            rhs: Expr::Int(2),
        }
    );
}

#[test]
fn test_aggregate_against_field_is_rejected() {
    let mut ids = NodeIds::new();
    let err = Parser::new("$count > x", &mut ids).full_condition().unwrap_err();
    assert_eq!(err.message, "Aggregates can only be compared with literals");
}

// ============================================================================
// Keys
// ============================================================================

#[test]
fn test_plain_key() {
    let (key, context) = parse_key("title");
    assert_eq!(key, Key::Name("title".into()));
    assert_eq!(context.modifier, None);
    assert!(!context.collects);
}

#[test]
fn test_quoted_key() {
    let (key, _) = parse_key("'a.b'");
    assert_eq!(key, Key::Name("a.b".into()));
}

#[test]
fn test_directives() {
    assert_eq!(parse_key("#if").0, Key::Cond);
    assert_eq!(parse_key("#var total").0, Key::Variable("total".into()));
    assert_eq!(parse_key("#assign total").0, Key::Assign("total".into()));
    assert_eq!(parse_key("#exists").0, Key::Exists);
    assert_eq!(parse_key("#returnif").0, Key::ReturnIf);
    assert_eq!(
        parse_key("#func add(a, b)").0,
        Key::Func {
            name: "add".into(),
            params: vec!["a".into(), "b".into()],
        }
    );
}

#[test]
fn test_unknown_directive() {
    let mut ids = NodeIds::new();
    let err = Parser::new("#bogus", &mut ids).key().unwrap_err();
    assert_eq!(err.message, "Unknown directive \"bogus\"");
}

#[test]
fn test_regex_keys() {
    match parse_key("{\"^a.*\"}").0 {
        Key::Regex(pattern) => assert_eq!(pattern.source(), "^a.*"),
        other => panic!("Expected a regex key, got {:?}", other),
    }
    match parse_key("{}").0 {
        Key::Regex(pattern) => assert_eq!(pattern.source(), ".*"),
        other => panic!("Expected a regex key, got {:?}", other),
    }
}

#[test]
fn test_parameterized_key() {
    assert_eq!(parse_key("$(name)").0, Key::Param(field("name")));
    assert_eq!(parse_key("$reskey").0, Key::Param(Expr::Reskey));
}

#[test]
fn test_array_shorthand_key() {
    let (key, context) = parse_key("x[]");
    assert_eq!(key, Key::Name("x".into()));
    assert!(context.collects);

    let template = context.modifier.expect("shorthand builds a modifier");
    let m = modifier(&template);
    assert_eq!(m.mode, ContextMode::Array);
    assert_eq!(m.path, "x");
    assert_eq!(*m.inner, Template::Placeholder);
}

#[test]
fn test_path_modifier() {
    let (key, context) = parse_key("name:person.name");
    assert_eq!(key, Key::Name("name".into()));
    assert!(!context.collects);

    let template = context.modifier.unwrap();
    let m = modifier(&template);
    assert_eq!(m.mode, ContextMode::None);
    assert_eq!(m.path, "person.name");
}

#[test]
fn test_empty_path_is_result_key() {
    let template = parse_key("title:").1.modifier.unwrap();
    assert_eq!(modifier(&template).mode, ContextMode::Reskey);
}

#[test]
fn test_modifier_chain() {
    let template = parse_key("v:items[]:tags[]").1.modifier.unwrap();
    let outer = modifier(&template);
    assert_eq!(outer.mode, ContextMode::Array);
    assert_eq!(outer.path, "items");

    let inner = modifier(&outer.inner);
    assert_eq!(inner.mode, ContextMode::Array);
    assert_eq!(inner.path, "tags");
}

#[test]
fn test_all_paths_and_regex_modifiers() {
    let template = parse_key("v:**").1.modifier.unwrap();
    assert_eq!(modifier(&template).mode, ContextMode::AllPaths);

    let template = parse_key("v:{\"^a\"}").1.modifier.unwrap();
    assert!(matches!(modifier(&template).mode, ContextMode::Regex(_)));
}

#[test]
fn test_arrows() {
    let template = parse_key("p:->$parent").1.modifier.unwrap();
    let m = modifier(&template);
    assert_eq!(m.mode, ContextMode::Arrow);
    assert_eq!(m.arrow, ArrowOp::Parent);
    assert_eq!(m.path, "");
    assert!(m.new_frame);

    let template = parse_key("p:->'/lib/a'").1.modifier.unwrap();
    let m = modifier(&template);
    assert_eq!(m.arrow, ArrowOp::None);
    assert_eq!(m.path, "'/lib/a'");

    let template = parse_key("p:->parent_id").1.modifier.unwrap();
    assert_eq!(modifier(&template).path, "parent_id");

    let template = parse_key("p:->$var(other)").1.modifier.unwrap();
    let m = modifier(&template);
    assert_eq!(m.arrow, ArrowOp::Var);
    assert_eq!(m.path, "other");

    let template = parse_key("p:->$date('2020-01-01')").1.modifier.unwrap();
    let m = modifier(&template);
    assert_eq!(m.arrow, ArrowOp::Date);
    assert_eq!(m.expr, Some(Expr::Str("2020-01-01".into())));
}

#[test]
fn test_or_alternatives_share_continuation() {
    let template = parse_key("v:a||b").1.modifier.unwrap();
    let Template::Or(alternatives) = template else {
        panic!("Expected alternatives");
    };
    assert_eq!(alternatives.len(), 2);

    let shared = Template::Shared {
        id: 1,
        inner: Box::new(Template::Placeholder),
    };
    for (alternative, path) in alternatives.iter().zip(["a", "b"]) {
        let m = modifier(alternative);
        assert_eq!(m.path, path);
        assert_eq!(*m.inner, shared);
    }
}

#[test]
fn test_unexpected_token_in_key() {
    let mut ids = NodeIds::new();
    let mut parser = Parser::new("x y", &mut ids);
    let key = parser.key().unwrap();
    let err = parser.key_context(&key).unwrap_err();
    assert_eq!(err.message, "Unexpected token \"y\" in key");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_unterminated_call_points_at_parenthesis() {
    let err = parse_value_err("$foo(");
    assert_eq!(err.position, 4);
    assert_eq!(err.marked, "$foo/*error*/(");
    assert_eq!(err.message, "Unterminated '(' in $foo");
    assert_eq!(
        err.to_string(),
        "Error at: $foo/*error*/(\nUnterminated '(' in $foo"
    );
}

#[test]
fn test_missing_operand() {
    let err = parse_value_err("1 +");
    assert_eq!(err.message, "Expected expression");
}

#[test]
fn test_invalid_regex() {
    let mut ids = NodeIds::new();
    let err = Parser::new("{\"(\"}", &mut ids).key().unwrap_err();
    assert!(err.message.starts_with("Invalid regular expression"));
}
