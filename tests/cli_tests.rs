// tests/cli_tests.rs

#![cfg(feature = "cli")]

use std::io::Write;

use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;
use unq_lang::RunOptions;
use unq_lang::cli::{
    CliError, Input, InputFormat, RunCommand, execute_check, execute_run, read_input,
};

fn input(name: &str, text: &str) -> Input {
    Input {
        name: name.to_string(),
        text: text.to_string(),
    }
}

fn command(template: &str, inputs: Vec<Input>) -> RunCommand {
    RunCommand {
        template: template.to_string(),
        inputs,
        format: InputFormat::Json,
        options: RunOptions::default(),
        pretty: false,
    }
}

// ============================================================================
// Run
// ============================================================================

#[test]
fn test_run_over_inputs() {
    let output = execute_run(&command(
        r#"{"count": "$count", "titles": ["title"]}"#,
        vec![
            input("a.json", r#"{"title": "A"} {"title": "B"}"#),
            input("b.json", r#"{"title": "C"}"#),
        ],
    ))
    .unwrap();
    assert_eq!(output, r#"{"count":3,"titles":["A","B","C"]}"#);
}

#[test]
fn test_run_pretty() {
    let mut cmd = command(r#"{"t": "title"}"#, vec![input("a.json", r#"{"title": "A"}"#)]);
    cmd.pretty = true;
    assert_eq!(execute_run(&cmd).unwrap(), "{\n    \"t\": \"A\"\n}");
}

#[test]
fn test_run_filename() {
    let output = execute_run(&command(
        r#"{"files": ["$filename"]}"#,
        vec![input("a.json", "{}"), input("b.json", "{}")],
    ))
    .unwrap();
    assert_eq!(output, r#"{"files":["a.json","b.json"]}"#);
}

#[test]
fn test_run_show_nulls() {
    let mut cmd = command(r#"{"a": "missing"}"#, vec![input("a.json", "{}")]);
    assert_eq!(execute_run(&cmd).unwrap(), "{}");
    cmd.options.show_nulls = true;
    assert_eq!(execute_run(&cmd).unwrap(), r#"{"a":null}"#);
}

#[test]
fn test_run_csv() {
    let mut cmd = command(
        r#"{"names:[]": ["name"]}"#,
        vec![input("people.csv", "name;age\nAnn;30\nBob;25\n")],
    );
    cmd.format = InputFormat::Csv {
        delim: ";".to_string(),
        headers: true,
    };
    assert_eq!(execute_run(&cmd).unwrap(), r#"{"names":["Ann","Bob"]}"#);
}

#[test]
fn test_run_csv_without_headers() {
    let mut cmd = command(r#"{"ages:[]": ["[1]"]}"#, vec![input("n.csv", "Ann,30\nBob,25\n")]);
    cmd.format = InputFormat::Csv {
        delim: ",".to_string(),
        headers: false,
    };
    assert_eq!(execute_run(&cmd).unwrap(), r#"{"ages":[30,25]}"#);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_run_without_inputs() {
    let err = execute_run(&command(r#"{"t": "title"}"#, vec![])).unwrap_err();
    assert!(matches!(err, CliError::NoInput));
}

#[test]
fn test_run_bad_template() {
    let err = execute_run(&command(r#"{"x": "$foo("}"#, vec![input("a.json", "{}")])).unwrap_err();
    assert!(matches!(err, CliError::Parse(_)));
    assert_eq!(err.to_string(), "Error at: $foo/*error*/(\nUnterminated '(' in $foo");
}

#[test]
fn test_run_template_not_json() {
    let err = execute_run(&command("{title", vec![input("a.json", "{}")])).unwrap_err();
    assert!(matches!(err, CliError::Json { ref file, .. } if file == "template"));
}

#[test]
fn test_run_input_not_json() {
    let err = execute_run(&command(r#"{"t": "title"}"#, vec![input("bad.json", "{oops")]))
        .unwrap_err();
    assert!(matches!(err, CliError::Json { ref file, .. } if file == "bad.json"));
}

#[test]
fn test_query_error_names_the_file() {
    let err = execute_run(&command(
        r#"{"x:->n": "name"}"#,
        vec![input("data.json", r#"{"n": 3}"#)],
    ))
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "In file: data.json, Error executing query: Expected array or string at ->{n}"
    );
}

#[test]
fn test_read_missing_input() {
    let err = read_input("/no/such/input.json").unwrap_err();
    assert_eq!(err.to_string(), "File not found: /no/such/input.json");
}

#[test]
fn test_read_input_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"title": "From disk"}}"#).unwrap();
    let path = file.path().display().to_string();

    let loaded = read_input(&path).unwrap();
    assert_eq!(loaded.name, path);

    let output = execute_run(&command(r#"{"t": "title"}"#, vec![loaded])).unwrap();
    assert_eq!(output, r#"{"t":"From disk"}"#);
}

// ============================================================================
// Check
// ============================================================================

#[test]
fn test_check_valid_template() {
    assert_eq!(
        execute_check(r##"{"#if": "year > 1990", "t": "title"}"##).unwrap(),
        "Template is valid"
    );
}

#[test]
fn test_check_invalid_template() {
    let err = execute_check(r#"{"a b": "."}"#).unwrap_err();
    assert!(err.to_string().ends_with("Unexpected token \"b\" in key"));
}
