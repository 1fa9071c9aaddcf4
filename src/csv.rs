//! CSV input.
//!
//! With a header row every record becomes an object keyed by the header
//! cells; without one every record becomes an array. Cells that look like
//! numbers become numbers. Quoted cells may hold the delimiter, line breaks
//! and doubled quotes (`""`).

use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CsvError {
    #[error("Unterminated quoted cell starting on line {0}")]
    UnterminatedQuote(usize),
}

/// Parses CSV text into an array of records.
///
/// # Examples
///
/// ```
/// use unq_lang::csv::parse_csv;
/// use unq_lang::Value;
///
/// let records = parse_csv("name,age\nAnn,31\n", ",", true).unwrap();
/// assert_eq!(
///     records,
///     Value::Array(vec![Value::Object(vec![
///         ("name".to_string(), Value::from("Ann")),
///         ("age".to_string(), Value::Integer(31)),
///     ])])
/// );
/// ```
pub fn parse_csv(text: &str, delim: &str, header: bool) -> Result<Value, CsvError> {
    let delim = if delim.is_empty() { "," } else { delim };
    let mut rows = split_records(text, delim)?.into_iter();

    let names: Option<Vec<String>> = if header { rows.next() } else { None };
    let records = rows
        .filter(|row| !(row.len() == 1 && row[0].is_empty()))
        .map(|row| match &names {
            Some(names) => Value::Object(
                names
                    .iter()
                    .cloned()
                    .zip(row.into_iter().map(|cell| cell_value(&cell)))
                    .collect(),
            ),
            None => Value::Array(row.iter().map(|cell| cell_value(cell)).collect()),
        })
        .collect();
    Ok(Value::Array(records))
}

fn cell_value(cell: &str) -> Value {
    let trimmed = cell.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Integer(i);
    }
    if !trimmed.is_empty()
        && trimmed.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && let Ok(f) = trimmed.parse::<f64>()
    {
        return Value::Float(f);
    }
    Value::String(cell.to_string())
}

fn split_records(text: &str, delim: &str) -> Result<Vec<Vec<String>>, CsvError> {
    let mut records = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut line = 1;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if c == '"' && cell.is_empty() {
            let start_line = line;
            rest = &rest[1..];
            loop {
                let Some(q) = rest.chars().next() else {
                    return Err(CsvError::UnterminatedQuote(start_line));
                };
                rest = &rest[q.len_utf8()..];
                if q == '"' {
                    if rest.starts_with('"') {
                        cell.push('"');
                        rest = &rest[1..];
                    } else {
                        break;
                    }
                } else {
                    if q == '\n' {
                        line += 1;
                    }
                    cell.push(q);
                }
            }
        } else if let Some(after) = rest.strip_prefix(delim) {
            row.push(std::mem::take(&mut cell));
            rest = after;
        } else if c == '\n' || c == '\r' {
            rest = &rest[1..];
            if c == '\r' && rest.starts_with('\n') {
                rest = &rest[1..];
            }
            line += 1;
            row.push(std::mem::take(&mut cell));
            records.push(std::mem::take(&mut row));
        } else {
            cell.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        records.push(row);
    }
    Ok(records)
}
