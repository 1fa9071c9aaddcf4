//! Evaluation context: the mutable state of one query run.
//!
//! The context tracks where evaluation currently is: which document (an
//! input document, a store document reached through `->`, or a local value
//! such as a variable or a loaded file), and which path inside it. Paths,
//! documents, result keys and file names are stacks; every push has one
//! matching pop. Frames remember a path entry so `<<` can temporarily go
//! back to it.

use std::collections::HashMap;

use crate::ast::Template;
use crate::path;
use crate::store::{DocumentStore, Meta, MemoryStore, XmlNode, XmlReader};
use crate::value::{NULL, Value};

/// Options of a query run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    /// Keep null results in objects and arrays
    pub show_nulls: bool,
    /// `->$parent` and `->$ancestors` stop at a `/` at or before this offset
    pub parent_prefix_len: usize,
}

/// A function defined with `#func`.
#[derive(Debug, Clone)]
pub struct Function<'a> {
    pub body: &'a Template,
    pub params: Vec<String>,
}

#[derive(Debug)]
struct Document {
    root: Value,
    identifier: String,
}

#[derive(Debug, Clone)]
struct PathEntry {
    path: String,
    document: usize,
}

pub struct Context<'a> {
    store: Box<dyn DocumentStore + 'a>,
    xml: Option<Box<dyn XmlReader + 'a>>,
    options: RunOptions,
    documents: Vec<Document>,
    paths: Vec<PathEntry>,
    frames: Vec<usize>,
    reskeys: Vec<String>,
    filenames: Vec<String>,
    vars: HashMap<String, Vec<Value>>,
    funcs: HashMap<String, Function<'a>>,
}

impl<'a> Context<'a> {
    pub fn new(options: RunOptions) -> Self {
        Context {
            store: Box::new(MemoryStore::new()),
            xml: None,
            options,
            documents: Vec::new(),
            paths: Vec::new(),
            frames: Vec::new(),
            reskeys: Vec::new(),
            filenames: Vec::new(),
            vars: HashMap::new(),
            funcs: HashMap::new(),
        }
    }

    pub fn set_store(&mut self, store: Box<dyn DocumentStore + 'a>) {
        self.store = store;
    }

    pub fn set_xml(&mut self, xml: Box<dyn XmlReader + 'a>) {
        self.xml = Some(xml);
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn DocumentStore {
        self.store.as_mut()
    }

    /// Starts a new input document. Function definitions survive, every
    /// stack is cleared.
    pub fn reset(&mut self, document: Value, identifier: &str, filename: &str) {
        self.documents.clear();
        self.paths.clear();
        self.frames.clear();
        self.reskeys.clear();
        self.filenames.clear();
        self.vars.clear();
        self.documents.push(Document {
            root: document,
            identifier: identifier.to_string(),
        });
        self.paths.push(PathEntry {
            path: String::new(),
            document: 0,
        });
        self.filenames.push(filename.to_string());
    }

    // ========================================================================
    // Paths
    // ========================================================================

    fn entry(&self) -> Option<&PathEntry> {
        self.paths.last()
    }

    pub fn path(&self) -> &str {
        self.entry().map(|e| e.path.as_str()).unwrap_or("")
    }

    /// Path of `sub` relative to the current path. `/` restarts from the
    /// document root and each `../` moves to the enclosing value.
    pub fn full_path(&self, sub: &str) -> String {
        let mut current = self.path().to_string();
        let mut sub = sub;
        loop {
            if sub.is_empty() || sub == "." {
                return current;
            }
            if let Some(rest) = sub.strip_prefix('/') {
                current.clear();
                sub = rest;
            } else if let Some(rest) = sub.strip_prefix("../") {
                current = path::up_path(&current);
                sub = rest;
            } else if sub == ".." {
                return path::up_path(&current);
            } else {
                return path::full_path(&current, sub);
            }
        }
    }

    pub fn add_to_path(&mut self, added: &str) {
        let path = self.full_path(added);
        self.push_path(path);
    }

    /// Pushes `path` as is, in the current document.
    pub fn push_path(&mut self, path: String) {
        let document = self.entry().map(|e| e.document).unwrap_or(0);
        self.paths.push(PathEntry { path, document });
    }

    pub fn pop_path(&mut self) {
        self.paths.pop();
    }

    /// The value at `sub`, if there is one.
    pub fn lookup(&self, sub: &str) -> Option<&Value> {
        let entry = self.entry()?;
        let document = self.documents.get(entry.document)?;
        document.root.lookup(&self.full_path(sub))
    }

    pub fn value(&self, sub: &str) -> Value {
        self.lookup(sub).cloned().unwrap_or(Value::Null)
    }

    pub fn meta(&self, sub: &str) -> Meta {
        Meta::of(self.lookup(sub))
    }

    /// Member names of the current value.
    pub fn members(&self) -> Vec<String> {
        self.lookup("").map(Value::member_names).unwrap_or_default()
    }

    // ========================================================================
    // Documents
    // ========================================================================

    pub fn identifier(&self) -> &str {
        self.entry()
            .and_then(|e| self.documents.get(e.document))
            .map(|d| d.identifier.as_str())
            .unwrap_or("")
    }

    /// Enters an in-memory value; the identifier stays the same.
    pub fn start_local(&mut self, root: Value) {
        let identifier = self.identifier().to_string();
        self.push_document(root, identifier);
    }

    /// Enters the store document behind `identifier`.
    pub fn start_identifier(&mut self, identifier: &str) {
        let root = self.store.document(identifier).unwrap_or(Value::Null);
        self.push_document(root, identifier.to_string());
    }

    fn push_document(&mut self, root: Value, identifier: String) {
        self.documents.push(Document { root, identifier });
        self.paths.push(PathEntry {
            path: String::new(),
            document: self.documents.len() - 1,
        });
    }

    /// Leaves the document entered by `start_local` or `start_identifier`.
    pub fn end_document(&mut self) {
        self.paths.pop();
        self.documents.pop();
    }

    // ========================================================================
    // Frames
    // ========================================================================

    pub fn begin_frame(&mut self) {
        self.frames.push(self.paths.len().saturating_sub(1));
    }

    pub fn end_frame(&mut self) {
        self.frames.pop();
    }

    /// Goes back to the position saved by the innermost frame. Returns false
    /// if there is no frame; `pop_frame` must then be told so.
    pub fn push_last_frame(&mut self) -> bool {
        let Some(entry) = self.frames.last().and_then(|&i| self.paths.get(i)).cloned() else {
            return false;
        };
        self.paths.push(entry);
        true
    }

    pub fn pop_frame(&mut self, pushed: bool) {
        if pushed {
            self.paths.pop();
        }
    }

    // ========================================================================
    // Result keys and file names
    // ========================================================================

    pub fn push_reskey(&mut self, key: &str) {
        self.reskeys.push(key.to_string());
    }

    pub fn pop_reskey(&mut self) {
        self.reskeys.pop();
    }

    pub fn reskey(&self) -> &str {
        self.reskeys.last().map(String::as_str).unwrap_or("")
    }

    pub fn push_filename(&mut self, name: &str) {
        self.filenames.push(name.to_string());
    }

    pub fn pop_filename(&mut self) {
        self.filenames.pop();
    }

    pub fn filename(&self) -> &str {
        self.filenames.last().map(String::as_str).unwrap_or("")
    }

    // ========================================================================
    // Variables and functions
    // ========================================================================

    pub fn add_var(&mut self, name: &str, value: Value) {
        self.vars.entry(name.to_string()).or_default().push(value);
    }

    /// Replaces the innermost binding of `name`.
    pub fn assign_var(&mut self, name: &str, value: Value) {
        let bindings = self.vars.entry(name.to_string()).or_default();
        bindings.pop();
        bindings.push(value);
    }

    pub fn var(&self, name: &str) -> &Value {
        self.vars
            .get(name)
            .and_then(|bindings| bindings.last())
            .unwrap_or(&NULL)
    }

    pub fn pop_var(&mut self, name: &str) {
        if let Some(bindings) = self.vars.get_mut(name) {
            bindings.pop();
        }
    }

    pub fn add_func(&mut self, name: &str, body: &'a Template, params: &[String]) {
        self.funcs.insert(
            name.to_string(),
            Function {
                body,
                params: params.to_vec(),
            },
        );
    }

    pub fn func(&self, name: &str) -> Option<Function<'a>> {
        self.funcs.get(name).cloned()
    }

    // ========================================================================
    // XML records
    // ========================================================================

    /// XML record of the current identifier.
    pub fn xml_node(&self) -> Option<XmlNode> {
        self.xml.as_ref()?.node(self.identifier())
    }

    /// The current record with the namespace declarations it relies on.
    pub fn xml_record(&self) -> Option<XmlNode> {
        let xml = self.xml.as_ref()?;
        let mut node = xml.node(self.identifier())?;
        for (prefix, uri) in xml.namespaces(self.identifier()) {
            node.add_namespace(&prefix, &uri);
        }
        Some(node)
    }

    pub fn in_filter(&self, element: &str, filter: &str) -> bool {
        self.xml
            .as_ref()
            .is_some_and(|xml| xml.in_filter(element, filter))
    }
}
