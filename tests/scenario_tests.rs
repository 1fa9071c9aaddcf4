// tests/scenario_tests.rs
//
// End-to-end behavior: templates compiled from JSON text and run over
// JSON documents.

use pretty_assertions::assert_eq;
use serde_json::json;
use unq_lang::{RunOptions, Runner, compile, convert, run};

fn run_text(template: &str, docs: &[&str]) -> serde_json::Value {
    let template: serde_json::Value = serde_json::from_str(template).unwrap();
    let query = compile(&convert::from_json(template)).unwrap();
    let documents = docs
        .iter()
        .flat_map(|doc| convert::parse_documents(doc).unwrap());
    convert::to_json(run(&query, documents, RunOptions::default()).unwrap())
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_copy_title() {
    assert_eq!(
        run_text(r#"{"title": "."}"#, &[r#"{"title": "Act"}"#]),
        json!({"title": "Act"})
    );
}

#[test]
fn test_count_documents() {
    assert_eq!(
        run_text(r#"{"count": "$count"}"#, &["{}", "{}", "{}"]),
        json!({"count": 3})
    );
}

#[test]
fn test_concatenated_documents_count_separately() {
    assert_eq!(
        run_text(r#"{"count": "$count"}"#, &["{} {}\n{}"]),
        json!({"count": 3})
    );
}

#[test]
fn test_array_of_objects() {
    assert_eq!(
        run_text(r#"{"x[]": {"v": "."}}"#, &[r#"{"x": [1, 2]}"#]),
        json!({"x": [{"v": 1}, {"v": 2}]})
    );
}

#[test]
fn test_numeric_filter() {
    let template = r#"{"big": ". ?  > 10"}"#;
    assert_eq!(run_text(template, &[r#"{"big": 5}"#]), json!({}));
    assert_eq!(run_text(template, &[r#"{"big": 10}"#]), json!({}));
    assert_eq!(run_text(template, &[r#"{"big": 11}"#]), json!({"big": 11}));
}

#[test]
fn test_unterminated_call_reports_offset() {
    let template = convert::from_json(json!({"x": "$foo("}));
    let err = compile(&template).unwrap_err();
    assert_eq!(err.position, 4);
    assert_eq!(err.marked, "$foo/*error*/(");
    assert_eq!(
        err.to_string(),
        "Error at: $foo/*error*/(\nUnterminated '(' in $foo"
    );
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_path_round_trip() {
    for path in ["a", "a.b", "a.b.c"] {
        let mut template = serde_json::Map::new();
        template.insert(format!("p:{}", path), json!("$path"));
        let query = compile(&convert::from_json(template.into())).unwrap();
        let doc = json!({"a": {"b": {"c": 1}}});
        let result = run(&query, vec![convert::from_json(doc)], RunOptions::default()).unwrap();
        assert_eq!(
            convert::to_json(result),
            json!({"p": path}),
            "Failed for path: {}",
            path
        );
    }
}

#[test]
fn test_unique_sort_is_idempotent() {
    let template = r#"{"v": [". @unique_ascending"]}"#;
    let first = run_text(template, &[r#"3 1 2 1 3"#]);
    assert_eq!(first, json!({"v": [1, 2, 3]}));

    let sorted: Vec<String> = first["v"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.to_string())
        .collect();
    let again = run_text(template, &[&sorted.join(" ")]);
    assert_eq!(again, first);
}

#[test]
fn test_count_is_stable_across_renders() {
    let template = convert::from_json(json!({"count": "$count"}));
    let query = compile(&template).unwrap();
    let mut runner = Runner::new(&query, RunOptions::default());
    for n in 1..=4 {
        runner
            .process_document(convert::from_json(json!({})), "")
            .unwrap();
        for _ in 0..3 {
            assert_eq!(convert::to_json(runner.render().unwrap()), json!({"count": n}));
        }
    }
}

#[test]
fn test_or_alternatives_render_the_same_value() {
    assert_eq!(
        run_text(
            r#"{"v:a||b": {"n": "name"}}"#,
            &[r#"{"a": {"name": "first"}, "b": {"name": "second"}}"#]
        ),
        json!({"v": {"n": "first"}})
    );
}

#[test]
fn test_substr_past_end() {
    assert_eq!(
        run_text(r#"{"s": "$substr(t, 5)"}"#, &[r#"{"t": "hello"}"#]),
        json!({"s": ""})
    );
}

#[test]
fn test_avg_over_no_values() {
    assert_eq!(run_text(r#"{"a": "$avg(x)"}"#, &[]), json!({}));
    assert_eq!(run_text(r#"{"a": "$avg(x)"}"#, &["{}", "{}"]), json!({}));
}

#[test]
fn test_local_problems_are_not_errors() {
    assert_eq!(
        run_text(
            r#"{"div": "a / 0", "idx": "arr[9]", "num": "s * 2", "ok": "a"}"#,
            &[r#"{"a": 4, "arr": [1], "s": {"k": 1}}"#]
        ),
        json!({"div": 0, "ok": 4})
    );
}

// ============================================================================
// A Larger Template
// ============================================================================

#[test]
fn test_report() {
    let template = r##"{
        "#if": "year >= 2000",
        "count": "$count",
        "total": "$sum(price)",
        "titles": ["title @ascending"],
        "by_year": {"$(year)": ["title"]},
        "cheapest": "$min(price)"
    }"##;
    let docs = [
        r#"{"title": "Zed", "year": 2001, "price": 12}"#,
        r#"{"title": "Old", "year": 1999, "price": 1}"#,
        r#"{"title": "Abe", "year": 2001, "price": 8}"#,
        r#"{"title": "Mia", "year": 2010, "price": 20}"#,
    ];
    assert_eq!(
        run_text(template, &docs),
        json!({
            "count": 3,
            "total": 40,
            "titles": ["Abe", "Mia", "Zed"],
            "by_year": {"2001": ["Zed", "Abe"], "2010": ["Mia"]},
            "cheapest": 8
        })
    );
}
