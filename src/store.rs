//! External collaborators: the document store and the XML record reader.
//!
//! Queries reach other documents through `->` arrows. Documents are
//! addressed by hierarchical identifiers (`/library/books/1`), may exist in
//! several versions (dates) and branches, and may carry an XML record.
//! [`MemoryStore`] and [`MemoryXml`] are the in-memory implementations used
//! by the CLI and the tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::value::Value;

pub const DEFAULT_BRANCH: &str = "main";

/// Shape of the value at a path, without materializing it.
#[derive(Debug, Clone, PartialEq)]
pub enum Meta {
    Missing,
    Null,
    Bool,
    Int,
    Float,
    String,
    Array(usize),
    Object(Vec<String>),
}

impl Meta {
    pub fn of(value: Option<&Value>) -> Meta {
        match value {
            None => Meta::Missing,
            Some(Value::Null) => Meta::Null,
            Some(Value::Boolean(_)) => Meta::Bool,
            Some(Value::Integer(_)) => Meta::Int,
            Some(Value::Float(_)) => Meta::Float,
            Some(Value::String(_)) => Meta::String,
            Some(Value::Array(items)) => Meta::Array(items.len()),
            Some(v @ Value::Object(_)) => Meta::Object(v.member_names()),
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, Meta::Missing | Meta::Null)
    }

    pub fn array_size(&self) -> usize {
        match self {
            Meta::Array(size) => *size,
            _ => 0,
        }
    }
}

/// Identifier to document resolution.
pub trait DocumentStore {
    /// The document stored under `identifier` in the current branch at the
    /// current date.
    fn document(&self, identifier: &str) -> Option<Value>;

    /// Every identifier visible in the current branch, sorted.
    fn identifiers(&self) -> Vec<String>;

    /// Scopes lookups to the versions valid at `date` (`None` = latest).
    /// Returns the previous setting.
    fn set_date(&mut self, date: Option<i64>) -> Option<i64>;

    /// Scopes lookups to `branch` (`None` = default). Returns the previous
    /// setting.
    fn set_branch(&mut self, branch: Option<String>) -> Option<String>;

    fn meta(&self, identifier: &str, path: &str) -> Meta {
        let document = self.document(identifier);
        Meta::of(document.as_ref().and_then(|d| d.lookup(path)))
    }

    /// Identifiers below `prefix`; `children` keeps only direct children.
    fn descendants(&self, prefix: &str, children: bool) -> Vec<String> {
        let start = format!("{}/", prefix);
        self.identifiers()
            .into_iter()
            .filter(|id| {
                id.strip_prefix(&start)
                    .is_some_and(|rest| !rest.is_empty() && (!children || !rest.contains('/')))
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Version {
    date: i64,
    document: Value,
}

/// In-memory document store with dated versions and branches.
///
/// # Examples
///
/// ```
/// use unq_lang::store::{DocumentStore, MemoryStore};
/// use unq_lang::Value;
///
/// let mut store = MemoryStore::new();
/// store.insert("/lib/a", Value::from("first"));
/// store.insert_version("main", "/lib/a", 100, Value::from("second"));
///
/// assert_eq!(store.document("/lib/a"), Some(Value::from("second")));
/// store.set_date(Some(50));
/// assert_eq!(store.document("/lib/a"), Some(Value::from("first")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    branches: HashMap<String, BTreeMap<String, Vec<Version>>>,
    date: Option<i64>,
    branch: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `document` in the default branch, valid from the beginning
    /// of time.
    pub fn insert(&mut self, identifier: impl Into<String>, document: Value) {
        self.insert_version(DEFAULT_BRANCH, identifier, 0, document);
    }

    pub fn insert_version(
        &mut self,
        branch: &str,
        identifier: impl Into<String>,
        date: i64,
        document: Value,
    ) {
        let versions = self
            .branches
            .entry(branch.to_string())
            .or_default()
            .entry(identifier.into())
            .or_default();
        let at = versions.partition_point(|v| v.date <= date);
        versions.insert(at, Version { date, document });
    }

    fn branch_documents(&self, branch: &str) -> Option<&BTreeMap<String, Vec<Version>>> {
        self.branches.get(branch)
    }

    fn versions(&self, identifier: &str) -> Option<&Vec<Version>> {
        let current = self.branch.as_deref().unwrap_or(DEFAULT_BRANCH);
        self.branch_documents(current)
            .and_then(|docs| docs.get(identifier))
            .or_else(|| {
                self.branch_documents(DEFAULT_BRANCH)
                    .and_then(|docs| docs.get(identifier))
            })
    }
}

impl DocumentStore for MemoryStore {
    fn document(&self, identifier: &str) -> Option<Value> {
        let versions = self.versions(identifier)?;
        let version = match self.date {
            Some(date) => versions.iter().rev().find(|v| v.date <= date)?,
            None => versions.last()?,
        };
        Some(version.document.clone())
    }

    fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .branch_documents(DEFAULT_BRANCH)
            .into_iter()
            .flat_map(|docs| docs.keys().cloned())
            .collect();
        if let Some(branch) = self.branch.as_deref()
            && branch != DEFAULT_BRANCH
            && let Some(docs) = self.branch_documents(branch)
        {
            ids.extend(docs.keys().cloned());
            ids.sort();
            ids.dedup();
        }
        ids
    }

    fn set_date(&mut self, date: Option<i64>) -> Option<i64> {
        std::mem::replace(&mut self.date, date)
    }

    fn set_branch(&mut self, branch: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.branch, branch)
    }
}

/// An XML element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    /// Character data preceding the children
    pub text: String,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        XmlNode {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Declares `prefix` on this element unless it is already declared.
    pub fn add_namespace(&mut self, prefix: &str, uri: &str) {
        let name = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{}", prefix)
        };
        if self.attribute(&name).is_none() {
            self.attributes.push((name, uri.to_string()));
        }
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Concatenated character data of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut text = self.text.clone();
        for child in &self.children {
            text.push_str(&child.text_content());
        }
        text
    }

    /// Serialized element; without children only the start tag and the
    /// text are kept.
    pub fn to_xml(&self, children: bool) -> String {
        let mut out = format!("<{}", self.name);
        for (name, value) in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", name, escape_xml(value)));
        }
        let empty = self.text.is_empty() && (!children || self.children.is_empty());
        if empty {
            out.push_str("/>");
            return out;
        }
        out.push('>');
        out.push_str(&escape_xml(&self.text));
        if children {
            for child in &self.children {
                out.push_str(&child.to_xml(true));
            }
        }
        out.push_str(&format!("</{}>", self.name));
        out
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Access to the XML record behind an identifier.
pub trait XmlReader {
    fn node(&self, identifier: &str) -> Option<XmlNode>;

    /// Whether elements named `element` belong to the configured filter
    /// `filter`.
    fn in_filter(&self, element: &str, filter: &str) -> bool;

    /// Namespace declarations (`prefix`, `uri`) that a serialized record
    /// needs to stand on its own.
    fn namespaces(&self, _identifier: &str) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryXml {
    nodes: HashMap<String, XmlNode>,
    filters: HashMap<String, HashSet<String>>,
    namespaces: Vec<(String, String)>,
}

impl MemoryXml {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: impl Into<String>, node: XmlNode) {
        self.nodes.insert(identifier.into(), node);
    }

    pub fn add_filter(&mut self, filter: impl Into<String>, elements: &[&str]) {
        self.filters
            .entry(filter.into())
            .or_default()
            .extend(elements.iter().map(|e| e.to_string()));
    }

    pub fn add_namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.namespaces.push((prefix.into(), uri.into()));
    }
}

impl XmlReader for MemoryXml {
    fn node(&self, identifier: &str) -> Option<XmlNode> {
        self.nodes.get(identifier).cloned()
    }

    fn in_filter(&self, element: &str, filter: &str) -> bool {
        self.filters
            .get(filter)
            .is_some_and(|elements| elements.contains(element))
    }

    fn namespaces(&self, _identifier: &str) -> Vec<(String, String)> {
        self.namespaces.clone()
    }
}
