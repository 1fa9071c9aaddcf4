// tests/navigation_tests.rs

use std::io::Write;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::NamedTempFile;
use unq_lang::{
    MemoryStore, MemoryXml, RunOptions, Runner, Value, XmlNode, compile, convert,
};

fn library() -> MemoryStore {
    let mut store = MemoryStore::new();
    let docs = [
        ("/lib", json!({"name": "Library"})),
        ("/lib/books", json!({"name": "Books"})),
        (
            "/lib/books/1",
            json!({"title": "Dune", "author_id": "/people/frank", "related": ["/lib/books/2"]}),
        ),
        ("/lib/books/2", json!({"title": "Emma", "author_id": "/people/jane"})),
        ("/people/frank", json!({"name": "Frank"})),
        ("/people/jane", json!({"name": "Jane"})),
    ];
    for (id, doc) in docs {
        store.insert(id, convert::from_json(doc));
    }
    store
}

fn query_with(
    template: serde_json::Value,
    identifier: &str,
    store: MemoryStore,
    options: RunOptions,
) -> serde_json::Value {
    let query = compile(&convert::from_json(template)).unwrap();
    let mut runner = Runner::new(&query, options).with_store(store);
    runner.process_identifier(identifier).unwrap();
    convert::to_json(runner.render().unwrap())
}

fn query(template: serde_json::Value, identifier: &str) -> serde_json::Value {
    query_with(template, identifier, library(), RunOptions::default())
}

fn run_file_template(template: &str, document: serde_json::Value) -> serde_json::Value {
    let template: serde_json::Value = serde_json::from_str(template).unwrap();
    let query = compile(&convert::from_json(template)).unwrap();
    let mut runner = Runner::new(&query, RunOptions::default());
    runner
        .process_document(convert::from_json(document), "")
        .unwrap();
    convert::to_json(runner.render().unwrap())
}

// ============================================================================
// Identifier Arrows
// ============================================================================

#[test]
fn test_field_arrow() {
    assert_eq!(
        query(json!({"author:->author_id": "name"}), "/lib/books/1"),
        json!({"author": "Frank"})
    );
}

#[test]
fn test_array_arrow() {
    assert_eq!(
        query(json!({"related:->related": ["title"]}), "/lib/books/1"),
        json!({"related": ["Emma"]})
    );
}

#[test]
fn test_literal_arrow() {
    assert_eq!(
        query(json!({"jane:->'/people/jane'": "name"}), "/lib/books/1"),
        json!({"jane": "Jane"})
    );
}

#[test]
fn test_computed_arrow() {
    assert_eq!(
        query(
            json!({"next:->$('/lib/books/' + '2')": "title"}),
            "/lib/books/1"
        ),
        json!({"next": "Emma"})
    );
}

#[test]
fn test_previous_document_inside_arrow() {
    assert_eq!(
        query(
            json!({"author:->author_id": {"name": "name", "book": "<<title"}}),
            "/lib/books/1"
        ),
        json!({"author": {"name": "Frank", "book": "Dune"}})
    );
}

#[test]
fn test_arrow_to_missing_field() {
    assert_eq!(
        query(json!({"x:->nothing": "name"}), "/lib/books/1"),
        json!({})
    );
}

#[test]
fn test_arrow_to_number_is_an_error() {
    let query = compile(&convert::from_json(json!({"x:->n": "name"}))).unwrap();
    let mut runner = Runner::new(&query, RunOptions::default());
    let err = runner
        .process_document(convert::from_json(json!({"n": 3})), "")
        .unwrap_err();
    assert_eq!(err.message, "Expected array or string at ->{n}");
}

#[test]
fn test_variable_arrow() {
    assert_eq!(
        query(
            json!({"#var p": {"name": "'Zed'"}, "n:->$var(p)": "name"}),
            "/lib/books/1"
        ),
        json!({"n": "Zed"})
    );
}

// ============================================================================
// Hierarchy Arrows
// ============================================================================

#[test]
fn test_parent() {
    assert_eq!(
        query(json!({"parent:->$parent": "name"}), "/lib/books/1"),
        json!({"parent": "Books"})
    );
}

#[test]
fn test_parent_with_path() {
    assert_eq!(
        query(json!({"parent:->$parent(name)": "."}), "/lib/books/1"),
        json!({"parent": "Books"})
    );
}

#[test]
fn test_ancestors() {
    assert_eq!(
        query(json!({"names:->$ancestors": ["name"]}), "/lib/books/1"),
        json!({"names": ["Books", "Library"]})
    );
}

#[test]
fn test_ancestors_stop_at_prefix() {
    let options = RunOptions {
        parent_prefix_len: 4,
        ..RunOptions::default()
    };
    assert_eq!(
        query_with(
            json!({"names:->$ancestors": ["name"]}),
            "/lib/books/1",
            library(),
            options
        ),
        json!({"names": ["Books"]})
    );
}

#[test]
fn test_children() {
    assert_eq!(
        query(json!({"kids:->$children": ["name"]}), "/lib"),
        json!({"kids": ["Books"]})
    );
}

#[test]
fn test_descendants() {
    assert_eq!(
        query(json!({"ids:->$descendants": ["$identifier"]}), "/lib"),
        json!({"ids": ["/lib/books", "/lib/books/1", "/lib/books/2"]})
    );
}

#[test]
fn test_descendants_and_self() {
    assert_eq!(
        query(json!({"ids:->$descendants_and_self": ["$identifier"]}), "/lib/books"),
        json!({"ids": ["/lib/books", "/lib/books/1", "/lib/books/2"]})
    );
}

#[test]
fn test_all_skips_current_document() {
    assert_eq!(
        query(json!({"people:->$all": ["name ? starts_with 'J'"]}), "/people/frank"),
        json!({"people": ["Jane"]})
    );
}

#[test]
fn test_identifier_prefix() {
    assert_eq!(
        query(json!({"root": "$identifier(1)", "id": "$identifier"}), "/lib/books/1"),
        json!({"root": "/lib", "id": "/lib/books/1"})
    );
}

// ============================================================================
// Dates and Branches
// ============================================================================

fn versioned() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert_version("main", "/d", 0, convert::from_json(json!({"name": "one"})));
    store.insert_version("main", "/d", 100, convert::from_json(json!({"name": "two"})));
    store.insert_version("dev", "/d", 0, convert::from_json(json!({"name": "three"})));
    store
}

#[test]
fn test_date_arrow() {
    assert_eq!(
        query_with(
            json!({"old:->$date(50)->$self": "name", "now": "name"}),
            "/d",
            versioned(),
            RunOptions::default()
        ),
        json!({"old": "one", "now": "two"})
    );
}

#[test]
fn test_branch_arrow() {
    assert_eq!(
        query_with(
            json!({"dev:->$branch('dev')->$self": "name", "main": "name"}),
            "/d",
            versioned(),
            RunOptions::default()
        ),
        json!({"dev": "three", "main": "two"})
    );
}

// ============================================================================
// XML
// ============================================================================

#[test]
fn test_xml_functions() {
    let mut xml = MemoryXml::new();
    xml.insert(
        "/b1",
        XmlNode::new("book")
            .with_attribute("id", "b1")
            .with_child(XmlNode::new("title").with_text("Dune")),
    );
    xml.add_filter("meta", &["book"]);

    let template = json!({
        "node": "$node",
        "id": "$attr(id)",
        "title": "$text($child(title))",
        "xml": "$xml",
        "empty": "$xml_no_children",
        "meta": "$in_filter(meta)",
        "other": "$in_filter(media)"
    });
    let query = compile(&convert::from_json(template)).unwrap();
    let mut store = MemoryStore::new();
    store.insert("/b1", Value::Object(Vec::new()));
    let mut runner = Runner::new(&query, RunOptions::default())
        .with_store(store)
        .with_xml(xml);
    runner.process_identifier("/b1").unwrap();

    assert_eq!(
        convert::to_json(runner.render().unwrap()),
        json!({
            "node": "book",
            "id": "b1",
            "title": "Dune",
            "xml": "<book id=\"b1\"><title>Dune</title></book>",
            "empty": "<book id=\"b1\"/>",
            "meta": true,
            "other": false
        })
    );
}

#[test]
fn test_xml_declares_namespaces() {
    let mut xml = MemoryXml::new();
    xml.insert("/b1", XmlNode::new("dc:book").with_text("Dune"));
    xml.add_namespace("dc", "http://purl.org/dc/elements/1.1/");

    let query = compile(&convert::from_json(json!({"xml": "$xml", "node": "$node"}))).unwrap();
    let mut store = MemoryStore::new();
    store.insert("/b1", Value::Object(Vec::new()));
    let mut runner = Runner::new(&query, RunOptions::default())
        .with_store(store)
        .with_xml(xml);
    runner.process_identifier("/b1").unwrap();

    assert_eq!(
        convert::to_json(runner.render().unwrap()),
        json!({
            "xml": "<dc:book xmlns:dc=\"http://purl.org/dc/elements/1.1/\">Dune</dc:book>",
            "node": "dc:book"
        })
    );
}

#[test]
fn test_xml_without_reader() {
    assert_eq!(
        query(json!({"node": "$node"}), "/lib"),
        json!({})
    );
}

// ============================================================================
// Files
// ============================================================================

#[test]
fn test_file_function() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"name": "from file"}}"#).unwrap();
    let path = file.path().display().to_string();

    let template = format!(r#"{{"n": "$file('{}').name"}}"#, path);
    assert_eq!(
        run_file_template(&template, json!({})),
        json!({"n": "from file"})
    );
}

#[test]
fn test_file_arrow_sets_filename() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"name": "from file"}}"#).unwrap();
    let path = file.path().display().to_string();

    let template = format!(
        r#"{{"f:->$file('{}')": {{"n": "name", "from": "$filename"}}}}"#,
        path
    );
    assert_eq!(
        run_file_template(&template, json!({})),
        json!({"f": {"n": "from file", "from": path}})
    );
}

#[test]
fn test_missing_file() {
    assert_eq!(
        run_file_template(r#"{"n": "$file('/no/such/file.json')"}"#, json!({})),
        json!({})
    );
}

#[test]
fn test_csv_function() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "name;age\nAnn;30\nBob;25\n").unwrap();
    let path = file.path().display().to_string();

    let template = format!(r#"{{"rows": "$csv('{}', ';')"}}"#, path);
    assert_eq!(
        run_file_template(&template, json!({})),
        json!({"rows": [{"name": "Ann", "age": 30}, {"name": "Bob", "age": 25}]})
    );
}

#[test]
fn test_csv_arrow() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "name,age\nAnn,30\nBob,25\n").unwrap();
    let path = file.path().display().to_string();

    let template = format!(r#"{{"first:->$csv('{}')": "[0].name"}}"#, path);
    assert_eq!(
        run_file_template(&template, json!({})),
        json!({"first": "Ann"})
    );
}
