//! JSON output serialization for query results.
//!
//! Objects are printed in member insertion order, so a rendered template
//! keeps the field order of the template that produced it. Pretty output
//! uses 4-space indentation.
//!
//! # Examples
//!
//! ```
//! use unq_lang::Value;
//! use unq_lang::output::{to_json, to_json_pretty};
//!
//! let value = Value::Object(vec![
//!     ("b".to_string(), Value::Integer(1)),
//!     ("a".to_string(), Value::Float(2.0)),
//! ]);
//!
//! assert_eq!(to_json(&value), r#"{"b":1,"a":2.0}"#);
//! assert_eq!(to_json_pretty(&value), "{\n    \"b\": 1,\n    \"a\": 2.0\n}");
//! ```

use crate::value::Value;

pub struct JsonPrinter {
    pretty: bool,
}

impl JsonPrinter {
    pub fn new(pretty: bool) -> Self {
        JsonPrinter { pretty }
    }

    pub fn print(&self, value: &Value) -> String {
        let mut out = String::new();
        self.print_value(value, 0, &mut out);
        out
    }

    fn print_value(&self, value: &Value, indent: usize, out: &mut String) {
        match value {
            Value::Null => out.push_str("null"),
            Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Integer(n) => out.push_str(&n.to_string()),
            Value::Float(n) => out.push_str(&format_float(*n)),
            Value::String(s) => self.print_string(s, out),
            Value::Array(arr) => self.print_array(arr, indent, out),
            Value::Object(obj) => self.print_object(obj, indent, out),
        }
    }

    fn print_array(&self, arr: &[Value], indent: usize, out: &mut String) {
        if arr.is_empty() {
            out.push_str("[]");
            return;
        }

        out.push('[');
        for (i, v) in arr.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.newline(indent + 1, out);
            self.print_value(v, indent + 1, out);
        }
        self.newline(indent, out);
        out.push(']');
    }

    fn print_object(&self, obj: &[(String, Value)], indent: usize, out: &mut String) {
        if obj.is_empty() {
            out.push_str("{}");
            return;
        }

        out.push('{');
        for (i, (k, v)) in obj.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.newline(indent + 1, out);
            self.print_string(k, out);
            out.push(':');
            if self.pretty {
                out.push(' ');
            }
            self.print_value(v, indent + 1, out);
        }
        self.newline(indent, out);
        out.push('}');
    }

    fn newline(&self, level: usize, out: &mut String) {
        if self.pretty {
            out.push('\n');
            out.push_str(&"    ".repeat(level));
        }
    }

    fn print_string(&self, s: &str, out: &mut String) {
        out.push('"');
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
        }
        out.push('"');
    }
}

/// Floats always carry a fraction or exponent so they read back as floats.
/// Non-finite values have no JSON form and print as null.
fn format_float(n: f64) -> String {
    if !n.is_finite() {
        return "null".to_string();
    }
    let text = n.to_string();
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{}.0", text)
    }
}

/// Converts a Value to compact JSON.
pub fn to_json(value: &Value) -> String {
    JsonPrinter::new(false).print(value)
}

/// Converts a Value to pretty-printed JSON with 4-space indentation.
pub fn to_json_pretty(value: &Value) -> String {
    JsonPrinter::new(true).print(value)
}
