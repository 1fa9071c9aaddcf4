//! Run a template over input files

use std::path::Path;

use super::{CliError, compile_template};
use crate::output::JsonPrinter;
use crate::{RunOptions, Runner, Value, convert, csv};

/// An input document source
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    /// File name reported by `$filename` and in errors
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum InputFormat {
    /// One or more concatenated JSON documents per input
    #[default]
    Json,
    /// One array-of-records document per input
    Csv { delim: String, headers: bool },
}

/// Options for the run command
#[derive(Debug, Clone, Default)]
pub struct RunCommand {
    /// Template as JSON text
    pub template: String,
    pub inputs: Vec<Input>,
    pub format: InputFormat,
    pub options: RunOptions,
    /// Pretty-print the output
    pub pretty: bool,
}

/// Reads an input file.
pub fn read_input(path: &str) -> Result<Input, CliError> {
    if !Path::new(path).exists() {
        return Err(CliError::MissingFile(path.to_string()));
    }
    Ok(Input {
        name: path.to_string(),
        text: std::fs::read_to_string(path)?,
    })
}

fn documents(input: &Input, format: &InputFormat) -> Result<Vec<Value>, CliError> {
    match format {
        InputFormat::Json => convert::parse_documents(&input.text).map_err(|source| CliError::Json {
            file: input.name.clone(),
            source,
        }),
        InputFormat::Csv { delim, headers } => csv::parse_csv(&input.text, delim, *headers)
            .map(|records| vec![records])
            .map_err(|source| CliError::Csv {
                file: input.name.clone(),
                source,
            }),
    }
}

/// Runs the template over every input document and returns the printed
/// result.
pub fn execute_run(command: &RunCommand) -> Result<String, CliError> {
    if command.inputs.is_empty() {
        return Err(CliError::NoInput);
    }
    let query = compile_template(&command.template)?;
    let mut runner = Runner::new(&query, command.options.clone());

    for input in &command.inputs {
        for document in documents(input, &command.format)? {
            runner
                .process_document(document, &input.name)
                .map_err(|source| CliError::Query {
                    file: input.name.clone(),
                    source,
                })?;
        }
    }
    log::debug!("processed {} documents", runner.documents());

    let result = runner.render().map_err(|source| CliError::Query {
        file: String::new(),
        source,
    })?;
    Ok(JsonPrinter::new(command.pretty).print(&result))
}
