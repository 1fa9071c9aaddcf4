use std::cmp::Ordering;

use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use thiserror::Error;

use crate::{
    ast::{BinOp, CastType, ChangeOp, Condition, Expr, JsonOp, Pattern, Subpath, TextOp, TypeTest},
    convert, csv,
    interpreter::{Data, Interpreter},
    path::{escape_field_name, last_index, last_key},
    timefmt,
    value::Value,
};

/// Calls nested deeper than this are reported instead of overflowing the
/// stack.
const MAX_CALL_DEPTH: usize = 64;

/// Error raised while evaluating a query against a document.
///
/// Missing fields, type mismatches, division by zero and out of range
/// indexes are not errors; they produce null.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct QueryError {
    pub message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        QueryError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;

/// Running state of one aggregate for one data object.
#[derive(Debug, Clone)]
pub(crate) enum Aggregate {
    Count(i64),
    Sum(Value),
    Avg { sum: f64, count: i64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Aggregate {
    fn for_expr(expr: &Expr) -> Self {
        match expr {
            Expr::Sum { .. } => Aggregate::Sum(Value::Integer(0)),
            Expr::Avg { .. } => Aggregate::Avg { sum: 0.0, count: 0 },
            Expr::MinMax { max: true, .. } => Aggregate::Max(None),
            Expr::MinMax { max: false, .. } => Aggregate::Min(None),
            _ => Aggregate::Count(0),
        }
    }

    fn add(&mut self, sample: Value) {
        let wanted = if matches!(self, Aggregate::Max(_)) {
            Ordering::Greater
        } else {
            Ordering::Less
        };
        match self {
            Aggregate::Count(n) => *n += 1,
            Aggregate::Sum(total) => {
                if let Some(n) = Num::of(&sample) {
                    let sum = arithmetic(BinOp::Add, total, &n.into());
                    if !sum.is_null() {
                        *total = sum;
                    }
                }
            }
            Aggregate::Avg { sum, count } => {
                if let Some(n) = Num::of(&sample) {
                    *sum += n.as_f64();
                    *count += 1;
                }
            }
            Aggregate::Min(current) | Aggregate::Max(current) => {
                let Some(n) = Num::of(&sample) else {
                    return;
                };
                let sample: Value = n.into();
                if current
                    .as_ref()
                    .is_none_or(|c| compare_numbers(&sample, c) == Some(wanted))
                {
                    *current = Some(sample);
                }
            }
        }
    }

    fn result(&self) -> Value {
        match self {
            Aggregate::Count(n) => Value::Integer(*n),
            Aggregate::Sum(total) => total.clone(),
            Aggregate::Avg { count: 0, .. } => Value::Null,
            Aggregate::Avg { sum, count } => Value::Float(sum / *count as f64),
            Aggregate::Min(v) | Aggregate::Max(v) => v.clone().unwrap_or(Value::Null),
        }
    }
}

/// A number taken from a value; numeric strings count.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Integer(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .map(Num::Int)
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(Num::Float))
            }
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

impl From<Num> for Value {
    fn from(n: Num) -> Value {
        match n {
            Num::Int(i) => Value::Integer(i),
            Num::Float(f) => Value::Float(f),
        }
    }
}

/// `+ - * / mod` on two values. `+` concatenates when either side is a
/// string. Division and remainder by zero give 0; anything non-numeric
/// gives null.
pub(crate) fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    if op == BinOp::Add
        && (matches!(left, Value::String(_)) || matches!(right, Value::String(_)))
    {
        return Value::String(format!("{}{}", left.to_text(), right.to_text()));
    }
    let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) else {
        return Value::Null;
    };
    match (a, b) {
        (Num::Int(a), Num::Int(b)) => int_arithmetic(op, a, b),
        (Num::Float(a), Num::Float(b)) => float_arithmetic(op, a, b),
        (a, b) => decimal_arithmetic(op, a, b).unwrap_or_else(|| float_arithmetic(op, a.as_f64(), b.as_f64())),
    }
}

fn int_arithmetic(op: BinOp, a: i64, b: i64) -> Value {
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Subtract => a.checked_sub(b),
        BinOp::Multiply => a.checked_mul(b),
        BinOp::Divide if b == 0 => Some(0),
        BinOp::Divide => match a.checked_rem(b) {
            Some(0) => a.checked_div(b),
            Some(_) => return Value::Float(a as f64 / b as f64),
            None => None,
        },
        BinOp::Modulo if b == 0 => Some(0),
        BinOp::Modulo => a.checked_rem(b),
    };
    match result {
        Some(n) => Value::Integer(n),
        None => float_arithmetic(op, a as f64, b as f64),
    }
}

fn float_arithmetic(op: BinOp, a: f64, b: f64) -> Value {
    match op {
        BinOp::Add => Value::Float(a + b),
        BinOp::Subtract => Value::Float(a - b),
        BinOp::Multiply => Value::Float(a * b),
        BinOp::Divide | BinOp::Modulo if b == 0.0 => Value::Integer(0),
        BinOp::Divide => Value::Float(a / b),
        BinOp::Modulo => Value::Float(a % b),
    }
}

/// Mixed integer and float operands go through `Decimal`; integral results
/// such as `2 * 0.5` come out as integers.
fn decimal_arithmetic(op: BinOp, a: Num, b: Num) -> Option<Value> {
    let decimal = |n: Num| match n {
        Num::Int(i) => Decimal::from_i64(i),
        Num::Float(f) => Decimal::from_f64(f),
    };
    let (a, b) = (decimal(a)?, decimal(b)?);
    let result = match op {
        BinOp::Add => a.checked_add(b)?,
        BinOp::Subtract => a.checked_sub(b)?,
        BinOp::Multiply => a.checked_mul(b)?,
        BinOp::Divide | BinOp::Modulo if b.is_zero() => return Some(Value::Integer(0)),
        BinOp::Divide => a.checked_div(b)?,
        BinOp::Modulo => a.checked_rem(b)?,
    };
    if result.is_integer()
        && let Some(i) = result.to_i64()
    {
        return Some(Value::Integer(i));
    }
    result.to_f64().map(Value::Float)
}

/// Numeric comparison; `None` when either side is not a number.
pub(crate) fn compare_numbers(left: &Value, right: &Value) -> Option<Ordering> {
    match (Num::of(left)?, Num::of(right)?) {
        (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
        (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

/// Comparison between values whose type is only known at run time:
/// numbers numerically, strings lexically.
fn compare_runtime(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => compare_numbers(left, right).or_else(|| {
            (left.is_literal() && right.is_literal()).then(|| left.to_text().cmp(&right.to_text()))
        }),
    }
}

/// Value equality where integers and floats with the same value are equal.
pub(crate) fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            compare_numbers(a, b) == Some(Ordering::Equal)
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| b.get(k).is_some_and(|w| json_equal(v, w)))
        }
        _ => a == b,
    }
}

fn type_matches(value: &Value, test: TypeTest) -> bool {
    match test {
        TypeTest::Array => value.is_array(),
        TypeTest::Object => value.is_object(),
        TypeTest::Literal => !value.is_null() && value.is_literal(),
        TypeTest::String => matches!(value, Value::String(_)),
        TypeTest::Int => matches!(value, Value::Integer(_)),
        TypeTest::Float => matches!(value, Value::Float(_)),
        TypeTest::Number => matches!(value, Value::Integer(_) | Value::Float(_)),
        TypeTest::Bool => matches!(value, Value::Boolean(_)),
    }
}

fn as_bool(value: &Value) -> bool {
    match value {
        Value::Boolean(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
    }
}

/// The first `parts` `/`-separated segments of an identifier.
fn identifier_prefix(identifier: &str, parts: usize) -> String {
    if parts == 0 {
        return identifier.to_string();
    }
    let mut seen = 0;
    for (i, c) in identifier.char_indices() {
        if c == '/' && i > 0 {
            seen += 1;
            if seen == parts {
                return identifier[..i].to_string();
            }
        }
    }
    identifier.to_string()
}

fn read_file(name: &str) -> Option<String> {
    match std::fs::read_to_string(name) {
        Ok(text) => Some(text),
        Err(e) => {
            log::warn!("failed opening file {}: {}", name, e);
            None
        }
    }
}

impl<'a> Interpreter<'a> {
    // ========================================================================
    // Expressions
    // ========================================================================

    /// Evaluates an expression at the current position.
    pub(crate) fn eval(&mut self, expr: &'a Expr) -> Result<Value> {
        let value = match expr {
            Expr::Str(s) => Value::String(s.clone()),
            Expr::Int(i) => Value::Integer(*i),
            Expr::Float(f) => Value::Float(*f),
            Expr::Bool(b) => Value::Boolean(*b),

            Expr::Field(_) | Expr::DynamicField(_) => {
                let path = self.field_path(expr)?;
                self.ctx.value(&path)
            }
            Expr::ChangePath { op, arg } => {
                if *op != ChangeOp::PrevId && arg.is_field() {
                    let path = self.field_path(expr)?;
                    return Ok(self.ctx.value(&path));
                }
                self.eval_moved(*op, arg)?
            }
            Expr::Subfield { arg, sub } => self.eval_subfield(expr, arg, sub)?,

            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                arithmetic(*op, &left, &right)
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                if self.test(cond)? {
                    self.eval(then)?
                } else {
                    self.eval(otherwise)?
                }
            }
            Expr::Call { id, name, args } => self.call(*id, name, args)?,

            Expr::Var(name) => self.ctx.var(name).clone(),
            Expr::File(file) => {
                let name = self.eval(file)?.to_text();
                self.load_json(&name)
            }
            Expr::Csv {
                file,
                delim,
                header,
            } => {
                let name = self.eval(file)?.to_text();
                let delim = match delim {
                    Some(d) => self.eval(d)?.to_text(),
                    None => ",".to_string(),
                };
                let header = match header {
                    Some(h) => self.eval(h)?.is_truthy(),
                    None => true,
                };
                self.load_csv(&name, &delim, header)
            }
            Expr::Prev(default) => {
                let prev = self.previous_value();
                if prev.is_null() {
                    self.eval(default)?
                } else {
                    prev
                }
            }

            Expr::Path => Value::String(self.ctx.path().to_string()),
            Expr::Index => match last_index(self.ctx.path()) {
                Some(i) => Value::Integer(i as i64),
                None => Value::Null,
            },
            Expr::Key => Value::String(last_key(self.ctx.path()).unwrap_or_default()),
            Expr::Reskey => Value::String(self.ctx.reskey().to_string()),
            Expr::Filename => Value::String(self.ctx.filename().to_string()),
            Expr::Env(name) => {
                let name = self.eval(name)?.to_text();
                std::env::var(&name).map(Value::String).unwrap_or(Value::Null)
            }
            Expr::Identifier(parts) => {
                Value::String(identifier_prefix(self.ctx.identifier(), *parts))
            }

            Expr::Xml { children } => match self.ctx.xml_record() {
                Some(node) => Value::String(node.to_xml(*children)),
                None => Value::Null,
            },
            Expr::Node => match self.ctx.xml_node() {
                Some(node) => Value::String(node.name),
                None => Value::Null,
            },
            Expr::Attr(name) => self
                .ctx
                .xml_node()
                .and_then(|node| node.attribute(name).map(Value::from))
                .unwrap_or(Value::Null),
            Expr::Child(name) => self
                .ctx
                .xml_node()
                .and_then(|node| node.child(name).map(|c| Value::String(c.to_xml(true))))
                .unwrap_or(Value::Null),
            Expr::InFilter(filter) => Value::Boolean(
                self.ctx
                    .xml_node()
                    .is_some_and(|node| self.ctx.in_filter(&node.name, filter)),
            ),
            Expr::Text(arg) => self.eval_text(arg)?,

            Expr::ChangeCase { arg, lower } => match self.eval(arg)? {
                Value::Null => Value::Null,
                v if *lower => Value::String(v.to_text().to_lowercase()),
                v => Value::String(v.to_text().to_uppercase()),
            },
            Expr::Size(arg) => Value::Integer(self.eval(arg)?.size() as i64),
            Expr::Length(arg) => match self.eval(arg)? {
                Value::Null => Value::Null,
                v => Value::Integer(v.to_text().chars().count() as i64),
            },
            Expr::Cast { arg, to } => {
                let value = self.eval(arg)?;
                cast(value, *to)
            }
            Expr::Substr { arg, start, len } => {
                let text = self.eval(arg)?;
                if text.is_null() {
                    return Ok(Value::Null);
                }
                let chars: Vec<char> = text.to_text().chars().collect();
                let start = self.eval(start)?.to_int().max(0) as usize;
                if start >= chars.len() {
                    return Ok(Value::String(String::new()));
                }
                let end = match len {
                    Some(len) => {
                        let len = self.eval(len)?.to_int().max(0) as usize;
                        start.saturating_add(len).min(chars.len())
                    }
                    None => chars.len(),
                };
                Value::String(chars[start..end].iter().collect())
            }
            Expr::Find {
                arg,
                needle,
                case_sensitive,
            } => {
                let mut text = self.eval(arg)?.to_text();
                let mut needle = self.eval(needle)?.to_text();
                if !case_sensitive {
                    text = text.to_lowercase();
                    needle = needle.to_lowercase();
                }
                let text: Vec<char> = text.chars().collect();
                let needle: Vec<char> = needle.chars().collect();
                if needle.is_empty() {
                    return Ok(Value::Array(Vec::new()));
                }
                Value::Array(
                    text.windows(needle.len())
                        .enumerate()
                        .filter(|(_, w)| *w == needle.as_slice())
                        .map(|(i, _)| Value::Integer(i as i64))
                        .collect(),
                )
            }
            Expr::Split { arg, delim } => {
                let text = self.eval(arg)?;
                let delim = self.eval(delim)?.to_text();
                if text.is_null() {
                    return Ok(Value::Null);
                }
                let text = text.to_text();
                if delim.is_empty() {
                    Value::Array(text.chars().map(|c| Value::String(c.to_string())).collect())
                } else {
                    Value::Array(text.split(delim.as_str()).map(Value::from).collect())
                }
            }
            Expr::Join { arg, delim } => {
                let value = self.eval(arg)?;
                let delim = self.eval(delim)?.to_text();
                match value {
                    Value::Null => Value::Null,
                    Value::Array(items) => Value::String(
                        items.iter().map(Value::to_text).collect::<Vec<_>>().join(&delim),
                    ),
                    other => Value::String(other.to_text()),
                }
            }
            Expr::Replace { arg, from, to, all } => {
                let text = self.eval(arg)?;
                let from = self.eval(from)?.to_text();
                let to = self.eval(to)?.to_text();
                match text {
                    Value::Null => Value::Null,
                    text if from.is_empty() => Value::String(text.to_text()),
                    text if *all => Value::String(text.to_text().replace(&from, &to)),
                    text => Value::String(text.to_text().replacen(&from, &to, 1)),
                }
            }
            Expr::ToTime { arg, format } => {
                let text = self.eval(arg)?;
                let format = match format {
                    Some(f) => Some(self.eval(f)?.to_text()),
                    None => None,
                };
                if text.is_null() {
                    return Ok(Value::Null);
                }
                timefmt::parse_time(&text.to_text(), format.as_deref())
                    .map(Value::Integer)
                    .unwrap_or(Value::Null)
            }
            Expr::TimeToString { arg, format } => {
                let time = self.eval(arg)?;
                let format = match format {
                    Some(f) => Some(self.eval(f)?.to_text()),
                    None => None,
                };
                let Some(epoch) = Num::of(&time).map(|n| match n {
                    Num::Int(i) => i,
                    Num::Float(f) => f as i64,
                }) else {
                    return Ok(Value::Null);
                };
                timefmt::format_time(epoch, format.as_deref())
                    .map(Value::String)
                    .unwrap_or(Value::Null)
            }

            Expr::Count { id } | Expr::Sum { id, .. } | Expr::Avg { id, .. } | Expr::MinMax { id, .. } => {
                self.aggregate(*id, expr)?
            }
        };
        Ok(value)
    }

    /// Path of a field expression relative to the current position.
    fn field_path(&mut self, expr: &'a Expr) -> Result<String> {
        Ok(match expr {
            Expr::Field(name) => self.field_name(name),
            Expr::DynamicField(arg) => self.eval(arg)?.to_text(),
            Expr::ChangePath {
                op: ChangeOp::Root,
                arg,
            } => format!("/{}", self.field_path(arg)?),
            Expr::ChangePath { op: ChangeOp::Up, arg } => {
                format!("../{}", self.field_path(arg)?)
            }
            Expr::Subfield { arg, sub } => {
                let base = self.field_path(arg)?;
                match sub {
                    Subpath::Member(member) => format!("{}.{}", base, self.member_name(member)?),
                    Subpath::Index(index) => format!("{}[{}]", base, self.eval(index)?.to_int()),
                    Subpath::All => base,
                }
            }
            other => self.eval(other)?.to_text(),
        })
    }

    /// `.` names the member under the current result key when the current
    /// value has one, and the current value otherwise.
    fn field_name(&self, name: &str) -> String {
        if name != "." {
            return name.to_string();
        }
        let key = self.ctx.reskey();
        match self.ctx.lookup("") {
            Some(current) if !key.is_empty() && current.get(key).is_some() => escape_field_name(key),
            _ => String::new(),
        }
    }

    fn member_name(&mut self, member: &'a Expr) -> Result<String> {
        match member {
            Expr::Field(name) => Ok(name.clone()),
            other => Ok(escape_field_name(&self.eval(other)?.to_text())),
        }
    }

    /// Evaluates `arg` at the root, the enclosing value, or the position
    /// saved by the innermost frame.
    fn eval_moved(&mut self, op: ChangeOp, arg: &'a Expr) -> Result<Value> {
        match op {
            ChangeOp::PrevId => {
                let pushed = self.ctx.push_last_frame();
                let result = self.eval(arg);
                self.ctx.pop_frame(pushed);
                result
            }
            ChangeOp::Root | ChangeOp::Up => {
                let path = if op == ChangeOp::Root {
                    String::new()
                } else {
                    self.ctx.full_path("..")
                };
                self.ctx.push_path(path);
                let result = self.eval(arg);
                self.ctx.pop_path();
                result
            }
        }
    }

    fn eval_subfield(&mut self, expr: &'a Expr, arg: &'a Expr, sub: &'a Subpath) -> Result<Value> {
        if expr.is_field() {
            let path = self.field_path(expr)?;
            return Ok(self.ctx.value(&path));
        }
        let value = if arg.is_field() {
            let path = self.field_path(arg)?;
            self.ctx.value(&path)
        } else {
            self.eval(arg)?
        };
        Ok(match sub {
            Subpath::All => match value {
                Value::Array(_) | Value::Null => value,
                other => Value::Array(vec![other]),
            },
            Subpath::Member(member) => {
                let name = self.member_name(member)?;
                value.lookup(&name).cloned().unwrap_or(Value::Null)
            }
            Subpath::Index(index) => match self.eval(index)?.as_int() {
                Some(i) if i >= 0 => value.at(i as usize).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            },
        })
    }

    fn eval_text(&mut self, arg: &'a Expr) -> Result<Value> {
        let node = match arg {
            Expr::Xml { .. } => self.ctx.xml_node(),
            Expr::Child(name) => self.ctx.xml_node().and_then(|n| n.child(name).cloned()),
            other => {
                return Ok(match self.eval(other)? {
                    Value::Null => Value::Null,
                    v => Value::String(v.to_text()),
                });
            }
        };
        Ok(node
            .map(|n| Value::String(n.text_content()))
            .unwrap_or(Value::Null))
    }

    fn aggregate(&mut self, id: usize, expr: &'a Expr) -> Result<Value> {
        let key = (id, self.current_data());
        if !self.rendering {
            let sample = match expr {
                Expr::Sum { arg, .. } | Expr::Avg { arg, .. } | Expr::MinMax { arg, .. } => {
                    self.eval(arg)?
                }
                _ => Value::Null,
            };
            self.aggregates
                .entry(key)
                .or_insert_with(|| Aggregate::for_expr(expr))
                .add(sample);
        }
        Ok(match self.aggregates.get(&key) {
            Some(state) => state.result(),
            None => Aggregate::for_expr(expr).result(),
        })
    }

    fn call(&mut self, id: usize, name: &str, args: &'a [Expr]) -> Result<Value> {
        let Some(function) = self.ctx.func(name) else {
            log::debug!("call of undefined function {}", name);
            return Ok(Value::Null);
        };
        if args.len() != function.params.len() {
            return Ok(Value::Null);
        }
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(QueryError::new(format!(
                "Function calls nested too deep in ${}",
                name
            )));
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        for (param, value) in function.params.iter().zip(values) {
            self.ctx.add_var(param, value);
        }

        // Calls computing a key get fresh state every time.
        let key = (id, self.current_data());
        let stored = if self.in_key {
            None
        } else {
            self.calls.remove(&key)
        };
        let mut data = match stored {
            Some(data) => data,
            None => self.make_data(function.body),
        };
        self.call_depth += 1;
        let result = self.run_call(&mut data);
        self.call_depth -= 1;
        if !self.in_key {
            self.calls.insert(key, data);
        }

        for param in &function.params {
            self.ctx.pop_var(param);
        }
        result
    }

    fn run_call(&mut self, data: &mut Data<'a>) -> Result<Value> {
        if !self.rendering {
            self.process(data)?;
        }
        self.render(data)
    }

    fn load_json(&self, name: &str) -> Value {
        if name.is_empty() {
            return Value::Null;
        }
        let Some(text) = read_file(name) else {
            return Value::Null;
        };
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => convert::from_json(json),
            Err(e) => {
                log::warn!("file {} is not valid JSON: {}", name, e);
                Value::Null
            }
        }
    }

    fn load_csv(&self, name: &str, delim: &str, header: bool) -> Value {
        if name.is_empty() {
            return Value::Null;
        }
        let Some(text) = read_file(name) else {
            return Value::Null;
        };
        match csv::parse_csv(&text, delim, header) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("file {} is not valid CSV: {}", name, e);
                Value::Null
            }
        }
    }

    /// File name behind a `$file` or `$csv` expression.
    pub(crate) fn file_name(&mut self, expr: &'a Expr) -> Result<Option<String>> {
        match expr {
            Expr::File(file) | Expr::Csv { file, .. } => Ok(Some(self.eval(file)?.to_text())),
            _ => Ok(None),
        }
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    pub(crate) fn test(&mut self, cond: &'a Condition) -> Result<bool> {
        Ok(match cond {
            Condition::And(a, b) => self.test(a)? && self.test(b)?,
            Condition::Or(a, b) => self.test(a)? || self.test(b)?,
            Condition::Not(c) => !self.test(c)?,
            Condition::Exists(expr) => self.exists(expr)?,
            Condition::Type { expr, test } => type_matches(&self.eval(expr)?, *test),
            Condition::Text { op, lhs, rhs } => {
                let l = self.eval(lhs)?.to_text();
                let r = self.eval(rhs)?.to_text();
                match op {
                    TextOp::Equal => l == r,
                    TextOp::NotEqual => l != r,
                    TextOp::Contains => l.contains(&r),
                    TextOp::StartsWith => l.starts_with(&r),
                    TextOp::EndsWith => l.ends_with(&r),
                }
            }
            Condition::Matches { lhs, rhs, pattern } => {
                let text = self.eval(lhs)?.to_text();
                match pattern {
                    Some(pattern) => pattern.is_match(&text),
                    None => {
                        let source = self.eval(rhs)?.to_text();
                        match Pattern::new(&source) {
                            Ok(pattern) => pattern.is_match(&text),
                            Err(e) => {
                                log::warn!("invalid regular expression {:?}: {}", source, e);
                                false
                            }
                        }
                    }
                }
            }
            Condition::Number { op, lhs, rhs } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                compare_numbers(&l, &r).is_some_and(|o| op.holds(o))
            }
            Condition::Bool { equal, lhs, rhs } => {
                let l = as_bool(&self.eval(lhs)?);
                let r = as_bool(&self.eval(rhs)?);
                (l == r) == *equal
            }
            Condition::Json { op, lhs, rhs } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                let contained = || match &r {
                    Value::Array(items) => items.iter().any(|item| json_equal(item, &l)),
                    _ => false,
                };
                match op {
                    JsonOp::Equal => json_equal(&l, &r),
                    JsonOp::NotEqual => !json_equal(&l, &r),
                    JsonOp::In => contained(),
                    JsonOp::NotIn => !contained(),
                }
            }
            Condition::Compare { op, lhs, rhs } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                compare_runtime(&l, &r).is_some_and(|o| op.holds(o))
            }
        })
    }

    fn exists(&mut self, expr: &'a Expr) -> Result<bool> {
        if expr.is_field() {
            let path = self.field_path(expr)?;
            return Ok(self.ctx.meta(&path).exists());
        }
        Ok(match expr {
            Expr::Var(name) => !self.ctx.var(name).is_empty(),
            Expr::File(file) => {
                let name = self.eval(file)?.to_text();
                std::path::Path::new(&name).is_file()
            }
            other => !self.eval(other)?.is_null(),
        })
    }
}

fn cast(value: Value, to: CastType) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match to {
        CastType::String => Value::String(value.to_text()),
        CastType::Int => Value::Integer(value.to_int()),
        CastType::Float => Value::Float(value.to_float()),
        CastType::Bool => match &value {
            Value::String(s) if s == "false" || s == "0" => Value::Boolean(false),
            other => Value::Boolean(other.is_truthy()),
        },
        CastType::Number => match &value {
            Value::Integer(_) | Value::Float(_) => value,
            other => {
                let text = other.to_text();
                let text = text.trim();
                if text.contains('.') {
                    text.parse::<f64>().map(Value::Float).unwrap_or(Value::Null)
                } else {
                    text.parse::<i64>().map(Value::Integer).unwrap_or(Value::Null)
                }
            }
        },
    }
}
