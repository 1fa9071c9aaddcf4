//! unq: a template-driven query language for JSON documents.
//!
//! A query is written as a JSON template whose keys and string values are
//! small expressions. [`compile`] turns the template into a [`Query`]; a
//! [`Runner`] then feeds documents through it and renders one result.
//!
//! ```
//! use unq_lang::{compile, convert, run, RunOptions, Value};
//!
//! let template = convert::from_json(serde_json::json!({"title": "."}));
//! let query = compile(&template).unwrap();
//! let document = convert::from_json(serde_json::json!({"title": "Act"}));
//!
//! let result = run(&query, vec![document], RunOptions::default()).unwrap();
//! assert_eq!(result.get("title"), Some(&Value::from("Act")));
//! ```
pub mod ast;
pub mod compiler;
pub mod context;
pub mod convert;
pub mod csv;
pub mod evaluator;
pub mod interpreter;
pub mod lexer;
pub mod output;
pub mod parser;
pub mod path;
pub mod store;
pub mod timefmt;
pub mod value;

#[cfg(feature = "cli")]
pub mod cli;

pub use ast::{Condition, Expr, Template, Token};
pub use compiler::{Query, compile};
pub use context::RunOptions;
pub use evaluator::QueryError;
pub use interpreter::{Runner, run};
pub use lexer::Lexer;
pub use output::{to_json, to_json_pretty};
pub use parser::{ParseError, Parser};
pub use store::{DocumentStore, MemoryStore, MemoryXml, XmlNode, XmlReader};
pub use value::Value;
