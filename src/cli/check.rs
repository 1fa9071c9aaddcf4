//! Validate a template without running it

use super::{CliError, compile_template};

/// Compiles `template` and reports the outcome.
pub fn execute_check(template: &str) -> Result<String, CliError> {
    compile_template(template)?;
    Ok("Template is valid".to_string())
}
