//! CLI support for unq
//!
//! Provides programmatic access to the `unq` commands so they can be
//! embedded in other tools and tested without spawning a process.

mod check;
mod run;

pub use check::execute_check;
pub use run::{Input, InputFormat, RunCommand, execute_run, read_input};

use std::io;

use thiserror::Error;

use crate::csv::CsvError;
use crate::{ParseError, QueryError};

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    /// Malformed template expression
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// Evaluation failed on one input document
    #[error("In file: {file}, Error executing query: {source}")]
    Query { file: String, source: QueryError },
    /// Template or input is not JSON
    #[error("Invalid JSON in {file}: {source}")]
    Json {
        file: String,
        source: serde_json::Error,
    },
    /// Input is not CSV
    #[error("Invalid CSV in {file}: {source}")]
    Csv { file: String, source: CsvError },
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Input or template file does not exist
    #[error("File not found: {0}")]
    MissingFile(String),
    /// No input provided
    #[error("No input provided. Pass input files or pipe JSON to stdin.")]
    NoInput,
}

/// Parses and compiles a template given as JSON text.
fn compile_template(source: &str) -> Result<crate::Query, CliError> {
    let json: serde_json::Value = serde_json::from_str(source).map_err(|source| CliError::Json {
        file: "template".to_string(),
        source,
    })?;
    Ok(crate::compile(&crate::convert::from_json(json))?)
}
