//! # Template query language: abstract syntax tree
//!
//! A template is a JSON document whose keys and string values are written in
//! a small query language. Compilation turns it into a [`Template`] tree:
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Value expressions (field access, arithmetic, string
//!   functions, casts, aggregates, calls, XML access)
//! - **[conditions]** - Comparisons, type tests and boolean combinators
//! - **[operators]** - Operator and ordering enums shared by the above
//! - **[template]** - Structural nodes: objects, arrays, values, context
//!   modifiers, `||` alternations and conditional gates
//!
//! ## Example
//!
//! ```text
//! {
//!     "title": ".",
//!     "cast:actors[]": ["name @ascending"],
//!     "#if": "year > 1990",
//!     "count": "$count"
//! }
//! ```
//!
//! `title` copies a field, `cast` collects actor names from every document in
//! sorted order, the `#if` gate skips old documents, and `count` counts the
//! documents that passed.
pub mod conditions;
pub mod expressions;
pub mod operators;
pub mod template;
pub mod tokens;

pub use conditions::Condition;
pub use expressions::{Expr, Subpath};
pub use operators::{BinOp, CastType, ChangeOp, CompareOp, JsonOp, Order, Pattern, TextOp, TypeTest};
pub use template::{ArrowOp, ContextMode, ContextModifier, FieldTemplate, Key, ObjectTemplate, Template};
pub use tokens::Token;
