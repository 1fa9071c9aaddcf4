use crate::ast::*;
use crate::lexer::Lexer;
use crate::path::{escape_field_name, unescape_field_name};
use crate::timefmt;
use thiserror::Error;

/// Syntax error in a template key or value.
///
/// `marked` is the parsed text with `/*error*/` inserted at `position`
/// (a character offset).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Error at: {marked}\n{message}")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
    pub marked: String,
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Allocates ids for shared continuations, aggregates and calls.
/// One counter is used for a whole template.
#[derive(Debug, Default)]
pub struct NodeIds {
    next: usize,
}

impl NodeIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> usize {
        self.next += 1;
        self.next
    }

    /// Number of ids handed out so far.
    pub fn count(&self) -> usize {
        self.next
    }
}

/// A parsed member value: the value itself and an optional separate
/// condition gating the whole field (`"x > 10"`).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedValue {
    pub value: Template,
    pub cond: Option<Condition>,
}

/// Context modifier chain parsed from a key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyContext {
    pub modifier: Option<Template>,
    /// `name[]` shorthand: the field collects one entry per element
    pub collects: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Chain {
    /// Right after the key name
    Start,
    /// Right after a plain key name that doubles as the first path
    KeyPath,
    /// First modifier of an `||` alternative
    OrStart,
    /// Later modifiers of an `||` alternative
    Or,
    None,
}

pub struct Parser<'c> {
    lexer: Lexer,
    positions: Vec<usize>,
    ids: &'c mut NodeIds,
    key_start: Option<usize>,
}

impl<'c> Parser<'c> {
    pub fn new(input: &str, ids: &'c mut NodeIds) -> Self {
        Parser {
            lexer: Lexer::new(input),
            positions: Vec::new(),
            ids,
            key_start: None,
        }
    }

    pub fn is_eos(&self) -> bool {
        self.lexer.is_eof()
    }

    fn peek(&self) -> Token {
        self.lexer.peek()
    }

    fn next(&mut self) -> Token {
        self.lexer.next_token()
    }

    fn is_next(&self, s: &str) -> bool {
        self.peek().is(s)
    }

    fn if_next(&mut self, s: &str) -> bool {
        if self.is_next(s) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        if self.if_next(s) {
            Ok(())
        } else {
            Err(self.error(format!("Expected '{}'", s)))
        }
    }

    pub fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.lexer.position(), message)
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> ParseError {
        let end = self.lexer.input().chars().count();
        ParseError {
            position,
            message: message.into(),
            marked: format!(
                "{}/*error*/{}",
                self.lexer.slice(0, position),
                self.lexer.slice(position, end)
            ),
        }
    }

    fn push_position(&mut self) {
        self.positions.push(self.lexer.position());
    }

    fn pop_position(&mut self) {
        self.positions.pop();
    }

    fn restore_position(&mut self) {
        if let Some(position) = self.positions.pop() {
            self.lexer.set_position(position);
        }
    }

    /// Parses `( f )`. When the input ends inside the parentheses the error
    /// points at the opening one.
    fn parens<T>(&mut self, what: &str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let open = self.lexer.position();
        self.expect("(")?;
        let result = f(self).and_then(|value| {
            self.expect(")")?;
            Ok(value)
        });
        match result {
            Err(_) if self.is_eos() => {
                Err(self.error_at(open, format!("Unterminated '(' in {}", what)))
            }
            other => other,
        }
    }

    fn pattern(&self, source: &str) -> Result<Pattern> {
        Pattern::new(source).map_err(|e| self.error(format!("Invalid regular expression: {}", e)))
    }

    fn quoted_or_word(&mut self) -> String {
        let token = self.next();
        token.unquoted().unwrap_or_else(|| token.text())
    }

    // ========================================================================
    // Keys and context modifiers
    // ========================================================================

    /// Parses a field key specifier.
    pub fn key(&mut self) -> Result<Key> {
        if self.if_next("$") {
            let expr = self.parens("key", |p| p.expression(0))?;
            return Ok(Key::Param(expr));
        }
        if matches!(self.peek(), Token::Dollar(_)) {
            return Ok(Key::Param(self.expression(0)?));
        }
        if self.if_next("{") {
            let token = self.next();
            if token.is("}") {
                return Ok(Key::Regex(self.pattern(".*")?));
            }
            let Some(source) = token.unquoted() else {
                return Err(self.error("Expected quotes (\")"));
            };
            self.expect("}")?;
            return Ok(Key::Regex(self.pattern(&source)?));
        }
        if self.if_next("#") {
            let directive = self.next().text();
            return match directive.as_str() {
                "if" => Ok(Key::Cond),
                "func" => {
                    let name = self.word("function name")?;
                    let mut params = Vec::new();
                    if self.is_next("(") {
                        params = self.parens("#func", |p| {
                            let mut params = Vec::new();
                            if !p.is_next(")") {
                                loop {
                                    params.push(p.word("parameter name")?);
                                    if !p.if_next(",") {
                                        break;
                                    }
                                }
                            }
                            Ok(params)
                        })?;
                    }
                    Ok(Key::Func { name, params })
                }
                "var" => Ok(Key::Variable(self.word("variable name")?)),
                "assign" => Ok(Key::Assign(self.word("variable name")?)),
                "exists" => Ok(Key::Exists),
                "notexists" => Ok(Key::NotExists),
                "return" => Ok(Key::Return),
                "returnif" => Ok(Key::ReturnIf),
                other => Err(self.error(format!("Unknown directive \"{}\"", other))),
            };
        }
        let token = self.peek();
        if matches!(token.quote(), Some('"') | Some('\'')) {
            self.next();
            return Ok(Key::Name(token.unquoted().unwrap_or_default()));
        }
        let start = self.lexer.position();
        let name = self.path_id()?;
        if !name.is_empty() {
            self.key_start = Some(start);
        }
        Ok(Key::Name(unescape_field_name(&name)))
    }

    fn word(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Token::Word(w) => {
                self.next();
                Ok(w)
            }
            _ => Err(self.error(format!("Expected {}", what))),
        }
    }

    /// Parses what follows the key: the context modifier chain.
    ///
    /// A plain name directly followed by `[`, `.` or `?` is also the first
    /// path of the chain, so `x[]` iterates over the elements of `x`.
    pub fn key_context(&mut self, key: &Key) -> Result<KeyContext> {
        let shorthand = matches!(key, Key::Name(_))
            && (self.is_next("[") || self.is_next(".") || self.is_next("?"));
        let result = match self.key_start {
            Some(start) if shorthand => {
                self.lexer.set_position(start);
                let modifier = self.context_mod(true, Chain::KeyPath)?;
                let collects = matches!(
                    &modifier,
                    Some(Template::ContextMod(m)) if m.mode == ContextMode::Array
                );
                KeyContext { modifier, collects }
            }
            _ => KeyContext {
                modifier: self.context_mod(true, Chain::Start)?,
                collects: false,
            },
        };
        if !self.is_eos() {
            return Err(self.error(format!("Unexpected token \"{}\" in key", self.peek().text())));
        }
        Ok(result)
    }

    fn context_mod(&mut self, frame: bool, chain: Chain) -> Result<Option<Template>> {
        let mut or_start = matches!(chain, Chain::Start | Chain::KeyPath);
        let in_or = matches!(chain, Chain::OrStart | Chain::Or);

        if self.is_eos() || self.is_next("||") {
            return Ok(None);
        }
        let next = self.peek();
        let mut check = matches!(chain, Chain::OrStart | Chain::KeyPath);
        if next.is(":") || next.is("->") {
            check = true;
        } else if next.is("[") || next.is("{") || next.text().starts_with('.') {
            check = chain != Chain::Start;
        }
        if !check {
            return Err(self.error(format!("Unexpected token \"{}\" in key", next.text())));
        }
        if next.is(":") {
            if in_or {
                return Ok(None);
            }
            or_start = true;
            self.next();
        }

        let mut modifier = ContextModifier {
            mode: ContextMode::None,
            arrow: ArrowOp::None,
            path: String::new(),
            expr: None,
            new_frame: false,
            inner: Box::new(Template::Placeholder),
        };

        if self.if_next("{") {
            let source = if self.if_next("}") {
                ".*".to_string()
            } else {
                let source = self.quoted_or_word();
                self.expect("}")?;
                source
            };
            modifier.mode = ContextMode::Regex(self.pattern(&source)?);
        } else if self.if_next("**") {
            modifier.mode = ContextMode::AllPaths;
        } else if self.if_next("$") {
            modifier.mode = ContextMode::Eval;
            modifier.expr = Some(self.parens("context modifier", |p| p.expression(0))?);
        } else if matches!(self.peek(), Token::Dollar(_)) {
            modifier.mode = ContextMode::Eval;
            modifier.expr = Some(self.expression(0)?);
        } else if self.if_next("->") {
            modifier.mode = ContextMode::Arrow;
            self.arrow_target(&mut modifier)?;
            modifier.new_frame = frame;
        } else if self.if_next("[") {
            if self.if_next("]") {
                modifier.mode = ContextMode::Array;
            } else {
                match self.next() {
                    Token::Number(n) if !n.contains('.') => {
                        modifier.path = format!("[{}]", n);
                        self.expect("]")?;
                    }
                    _ => return Err(self.error("Expect a number")),
                }
            }
        } else {
            let id = self.path_id()?;
            modifier.path = self.path_with_brackets(id)?;
            if modifier.path.is_empty() && !self.is_next("[") {
                modifier.mode = ContextMode::Reskey;
            }
            if self.if_next("[") {
                modifier.mode = ContextMode::Array;
                self.expect("]")?;
            }
        }

        let cond = if self.if_next("?") {
            Some(self.condition(0, None)?)
        } else {
            None
        };
        let rest = if in_or { Chain::Or } else { Chain::None };
        let mut inner = self
            .context_mod(modifier.mode != ContextMode::Arrow, rest)?
            .unwrap_or(Template::Placeholder);
        if let Some(cond) = cond {
            inner = Template::WithCond {
                inner: Box::new(inner),
                cond,
            };
        }
        modifier.inner = Box::new(inner);
        let mut result = Template::ContextMod(modifier);

        if or_start && self.if_next("||") {
            let shared = Template::Shared {
                id: self.ids.next_id(),
                inner: Box::new(Template::Placeholder),
            };
            let mut alternatives = vec![result.replace(&shared)];
            loop {
                let alternative = self
                    .context_mod(true, Chain::OrStart)?
                    .unwrap_or(Template::Placeholder);
                alternatives.push(alternative.replace(&shared));
                if !self.if_next("||") {
                    break;
                }
            }
            result = Template::Or(alternatives);
            if let Some(rest) = self.context_mod(true, Chain::None)? {
                result = result.replace(&rest);
            }
        }
        Ok(Some(result))
    }

    fn arrow_target(&mut self, modifier: &mut ContextModifier) -> Result<()> {
        if self.if_next("$") {
            modifier.expr = Some(self.parens("arrow", |p| p.expression(0))?);
            return Ok(());
        }
        let token = self.peek();
        modifier.arrow = match &token {
            Token::Dollar(name) => ArrowOp::from_token(name),
            _ => ArrowOp::None,
        };
        match modifier.arrow {
            ArrowOp::None => {
                let id = self.path_id()?;
                modifier.path = self.path_with_brackets(id)?;
            }
            ArrowOp::Other | ArrowOp::File => {
                modifier.expr = Some(self.expression(0)?);
            }
            ArrowOp::Date | ArrowOp::Branch => {
                self.next();
                let what = token.text();
                modifier.expr = Some(self.parens(&what, |p| p.expression(0))?);
            }
            ArrowOp::Var => {
                self.next();
                modifier.path = self.parens("$var", |p| p.word("variable name"))?;
            }
            _ => {
                self.next();
                if self.is_next("(") {
                    modifier.path = self.parens("arrow", |p| {
                        let id = p.path_id()?;
                        p.path_with_brackets(id)
                    })?;
                }
            }
        }
        Ok(())
    }

    /// A single path component. Quoted strings keep their quotes so arrows
    /// can tell a literal identifier from a field path.
    fn path_id(&mut self) -> Result<String> {
        let token = self.peek();
        match &token {
            Token::Word(t) | Token::Number(t) => {
                self.next();
                Ok(t.clone())
            }
            Token::Quoted(raw) => {
                self.next();
                if token.quote() == Some('`') {
                    Ok(escape_field_name(&token.unquoted().unwrap_or_default()))
                } else {
                    Ok(raw.clone())
                }
            }
            Token::Eof => Ok(String::new()),
            t if t.is("?") || t.is(":") || t.is("->") || t.is("||") || t.is("[") => {
                Ok(String::new())
            }
            t => Err(self.error(format!("Expected identifier or path, found \"{}\"", t.text()))),
        }
    }

    /// Extends `path` with following `.name` and `[n]` parts. Anything
    /// else is left for the caller.
    fn path_with_brackets(&mut self, path: String) -> Result<String> {
        let mut result = path;
        loop {
            self.push_position();
            if self.if_next(".") {
                let component = match self.peek() {
                    Token::Word(t) | Token::Number(t) => {
                        self.next();
                        Some(t)
                    }
                    token if token.quote() == Some('`') => {
                        self.next();
                        Some(escape_field_name(&token.unquoted().unwrap_or_default()))
                    }
                    _ => None,
                };
                match component {
                    Some(c) => {
                        self.pop_position();
                        result = format!("{}.{}", result, c);
                    }
                    None => {
                        self.restore_position();
                        return Ok(result);
                    }
                }
            } else if self.if_next("[") {
                match self.next() {
                    Token::Number(n) if !n.contains('.') && self.is_next("]") => {
                        self.next();
                        self.pop_position();
                        result = format!("{}[{}]", result, n);
                    }
                    _ => {
                        self.restore_position();
                        return Ok(result);
                    }
                }
            } else {
                self.pop_position();
                return Ok(result);
            }
        }
    }

    // ========================================================================
    // Values and conditions
    // ========================================================================

    /// Parses a member value: expression, optional `? condition`, optional
    /// separate condition, optional `@ordering`.
    pub fn value(&mut self) -> Result<Option<ParsedValue>> {
        if self.is_eos() {
            return Ok(None);
        }
        let expr = self.expression(0)?;

        let mut filter = None;
        if self.if_next("?") {
            filter = Some(if self.starts_comparison() {
                self.condition(0, Some(expr.clone()))?
            } else {
                self.condition(0, None)?
            });
        }
        let mut cond = None;
        if !self.is_eos() && !self.is_next("@") {
            cond = Some(self.base_condition(Some(expr.clone()))?);
        }

        let mut order = Order::None;
        let mut order_num = 0;
        if self.if_next("@") {
            let token = self.next().text();
            order = Order::from_token(&token).ok_or_else(|| {
                self.error(format!("Error parsing value. Unknown sort order: {}", token))
            })?;
            if self.is_next("(") {
                order_num = self.parens("ordering", |p| match p.next() {
                    Token::Number(n) => n.parse::<i64>().map_err(|_| p.error("Expected integer")),
                    _ => Err(p.error("Expected integer")),
                })?;
            }
        }
        if !self.is_eos() {
            return Err(self.error("Could not parse text at the end"));
        }

        let mut value = Template::Value {
            expr,
            order,
            order_num,
        };
        if let Some(cond) = filter {
            value = Template::WithCond {
                inner: Box::new(value),
                cond,
            };
        }
        Ok(Some(ParsedValue { value, cond }))
    }

    /// Parses a whole condition string, e.g. an `#if` value.
    pub fn full_condition(&mut self) -> Result<Condition> {
        let cond = self.condition(0, None)?;
        if !self.is_eos() {
            return Err(self.error("Could not parse text at the end"));
        }
        Ok(cond)
    }

    /// Next token is a comparison operator without a left operand.
    fn starts_comparison(&mut self) -> bool {
        let token = self.peek();
        if token.is("!") {
            self.push_position();
            self.next();
            let result = self.is_next("=");
            self.restore_position();
            return result;
        }
        ["=", "==", "!=", ">", "<", ">=", "<=", "contains", "starts_with", "ends_with", "matches", "in", "not_in"]
            .iter()
            .any(|op| token.is(op))
            || TypeTest::from_token(&token.text()).is_some()
    }

    /// Precedence climbing over `!` (3), `&` (2) and `|` (1).
    pub fn condition(&mut self, prec: u8, lhs: Option<Expr>) -> Result<Condition> {
        let mut result = if lhs.is_none() && self.if_next("(") {
            let inner = self.expression(0)?;
            if self.if_next(")") {
                self.base_condition(Some(inner))?
            } else {
                let cond = self.condition(0, Some(inner))?;
                self.expect(")")?;
                cond
            }
        } else if lhs.is_none() && prec <= 3 && self.if_next("!") {
            Condition::Not(Box::new(self.condition(3, None)?))
        } else {
            self.base_condition(lhs)?
        };

        while !self.is_eos() {
            let next = self.peek();
            if next.is("&") && prec <= 2 {
                self.next();
                let rhs = self.condition(2, None)?;
                result = Condition::And(Box::new(result), Box::new(rhs));
            } else if next.is("|") && prec <= 1 {
                self.next();
                let rhs = self.condition(1, None)?;
                result = Condition::Or(Box::new(result), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(result)
    }

    fn base_condition(&mut self, lhs: Option<Expr>) -> Result<Condition> {
        let lhs = match lhs {
            Some(lhs) => lhs,
            None => {
                if self.if_next("(") {
                    let cond = self.condition(0, None)?;
                    self.expect(")")?;
                    return Ok(cond);
                }
                self.expression(0)?
            }
        };

        let op_position = self.lexer.position();
        let mut op = self.next().text();
        if op == "!" {
            if self.if_next("=") {
                op = "!=".to_string();
            } else {
                return Ok(Condition::Exists(lhs));
            }
        } else if op == "==" {
            op = "=".to_string();
        }
        if let Some(test) = TypeTest::from_token(&op) {
            return Ok(Condition::Type { expr: lhs, test });
        }
        if op.is_empty() {
            return Err(self.error("Expected condition operator"));
        }

        let rhs = self.expression(0)?;
        if (lhs.is_aggregate() && !rhs.is_literal()) || (rhs.is_aggregate() && !lhs.is_literal()) {
            return Err(self.error("Aggregates can only be compared with literals"));
        }

        if lhs.is_string() && rhs.is_string() {
            let text_op = match op.as_str() {
                "=" => Some(TextOp::Equal),
                "!=" => Some(TextOp::NotEqual),
                "contains" => Some(TextOp::Contains),
                "starts_with" => Some(TextOp::StartsWith),
                "ends_with" => Some(TextOp::EndsWith),
                _ => None,
            };
            if let Some(op) = text_op {
                return Ok(Condition::Text { op, lhs, rhs });
            }
            if op == "matches" {
                let pattern = match &rhs {
                    Expr::Str(source) => Some(self.pattern(source)?),
                    _ => None,
                };
                return Ok(Condition::Matches { lhs, rhs, pattern });
            }
        }
        let compare = CompareOp::from_token(&op);
        if (lhs.is_int() && rhs.is_int()) || (lhs.is_double() && rhs.is_double()) {
            if let Some(op) = compare {
                return Ok(Condition::Number { op, lhs, rhs });
            }
        }
        if lhs.is_bool() && rhs.is_bool() && (op == "=" || op == "!=") {
            return Ok(Condition::Bool {
                equal: op == "=",
                lhs,
                rhs,
            });
        }

        let json_op = match op.as_str() {
            "=" => Some(JsonOp::Equal),
            "!=" => Some(JsonOp::NotEqual),
            "in" => Some(JsonOp::In),
            "not_in" => Some(JsonOp::NotIn),
            _ => None,
        };
        if let Some(op) = json_op {
            return Ok(Condition::Json { op, lhs, rhs });
        }
        if let Some(op) = compare {
            return Ok(Condition::Compare { op, lhs, rhs });
        }
        Err(self.error_at(op_position, "Error parsing condition"))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Precedence climbing: `+ -` (0), `* / mod` (1), postfix `.x` and
    /// `[i]` (3).
    pub fn expression(&mut self, prec: u8) -> Result<Expr> {
        let mut result = if self.if_next("(") {
            let inner = self.expression(0)?;
            self.expect(")")?;
            inner
        } else {
            self.base_expression()?
        };

        while !self.is_eos() {
            let next = self.peek();
            let op = match next.text().as_str() {
                "+" if prec == 0 => Some(BinOp::Add),
                "-" if prec == 0 => Some(BinOp::Subtract),
                "*" if prec <= 1 => Some(BinOp::Multiply),
                "/" if prec <= 1 => Some(BinOp::Divide),
                "mod" if prec <= 1 => Some(BinOp::Modulo),
                _ => None,
            };
            if let Some(op) = op {
                self.next();
                let rhs_prec = if matches!(op, BinOp::Add | BinOp::Subtract) { 1 } else { 2 };
                let right = self.expression(rhs_prec)?;
                result = Expr::Binary {
                    op,
                    left: Box::new(result),
                    right: Box::new(right),
                };
            } else if (next.is("[") || next.is(".")) && prec <= 3 {
                self.next();
                let sub = if next.is("[") {
                    if self.if_next("]") {
                        Subpath::All
                    } else {
                        let index = self.expression(0)?;
                        self.expect("]")?;
                        Subpath::Index(Box::new(index))
                    }
                } else {
                    Subpath::Member(Box::new(self.expression(4)?))
                };
                result = Expr::Subfield {
                    arg: Box::new(result),
                    sub,
                };
            } else {
                break;
            }
        }
        Ok(result)
    }

    fn one_arg(&mut self, what: &str) -> Result<Box<Expr>> {
        Ok(Box::new(self.parens(what, |p| p.expression(0))?))
    }

    fn two_args(&mut self, what: &str) -> Result<(Box<Expr>, Box<Expr>)> {
        self.parens(what, |p| {
            let a = p.expression(0)?;
            p.expect(",")?;
            let b = p.expression(0)?;
            Ok((Box::new(a), Box::new(b)))
        })
    }

    fn arg_with_optional(&mut self, what: &str) -> Result<(Box<Expr>, Option<Box<Expr>>)> {
        self.parens(what, |p| {
            let a = p.expression(0)?;
            let b = if p.if_next(",") {
                Some(Box::new(p.expression(0)?))
            } else {
                None
            };
            Ok((Box::new(a), b))
        })
    }

    fn name_arg(&mut self, what: &str) -> Result<String> {
        self.parens(what, |p| Ok(p.quoted_or_word()))
    }

    fn base_expression(&mut self) -> Result<Expr> {
        let start = self.lexer.position();
        let token = self.next();
        let text = token.text();

        let expr = match &token {
            Token::Eof => return Err(self.error("Expected expression")),
            Token::Punct('[') => {
                let current = Box::new(Expr::Field(".".to_string()));
                if self.if_next("]") {
                    Expr::Subfield {
                        arg: current,
                        sub: Subpath::All,
                    }
                } else {
                    let index = self.expression(0)?;
                    self.expect("]")?;
                    Expr::Subfield {
                        arg: current,
                        sub: Subpath::Index(Box::new(index)),
                    }
                }
            }
            Token::Punct('.') => Expr::Field(".".to_string()),
            Token::Dollar(_) => self.dollar_expression(&text)?,
            Token::Quoted(_) if token.quote() == Some('`') => {
                let name = escape_field_name(&token.unquoted().unwrap_or_default());
                Expr::Field(self.path_with_brackets(name)?)
            }
            Token::Quoted(_) => Expr::Str(token.unquoted().unwrap_or_default()),
            Token::Number(n) => self.number(n, false)?,
            Token::Word(w) if w == "true" || w == "false" => Expr::Bool(w == "true"),
            Token::Word(w) => Expr::Field(self.path_with_brackets(w.clone())?),
            Token::Range => {
                let arg = if self.if_next("/") {
                    self.base_expression()?
                } else {
                    Expr::Field(".".to_string())
                };
                Expr::ChangePath {
                    op: ChangeOp::Up,
                    arg: Box::new(arg),
                }
            }
            Token::Symbol(s) if s == "/" => Expr::ChangePath {
                op: ChangeOp::Root,
                arg: Box::new(self.base_expression()?),
            },
            Token::Symbol(s) if s == "<<" => Expr::ChangePath {
                op: ChangeOp::PrevId,
                arg: Box::new(self.base_expression()?),
            },
            Token::Symbol(s) if s == "-" => match self.next() {
                Token::Number(n) => self.number(&n, true)?,
                _ => return Err(self.error("Expected number")),
            },
            _ => return Err(self.error_at(start, "Expected expression")),
        };
        Ok(expr)
    }

    fn number(&self, text: &str, negative: bool) -> Result<Expr> {
        let sign = if negative { "-" } else { "" };
        let literal = format!("{}{}", sign, text);
        if text.contains('.') {
            literal
                .parse::<f64>()
                .map(Expr::Float)
                .map_err(|_| self.error(format!("Invalid number: {}", literal)))
        } else {
            literal
                .parse::<i64>()
                .map(Expr::Int)
                .map_err(|_| self.error(format!("Invalid number: {}", literal)))
        }
    }

    fn dollar_expression(&mut self, token: &str) -> Result<Expr> {
        let expr = match token {
            "$" => Expr::DynamicField(self.one_arg("$(..)")?),
            "$if" => self.parens(token, |p| {
                let cond = p.condition(0, None)?;
                p.expect(",")?;
                let then = p.expression(0)?;
                p.expect(",")?;
                let otherwise = p.expression(0)?;
                Ok(Expr::If {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                })
            })?,
            "$call" => {
                let name = self.parens(token, |p| p.word("function name"))?;
                Expr::Call {
                    id: self.ids.next_id(),
                    name,
                    args: Vec::new(),
                }
            }
            "$var" => Expr::Var(self.parens(token, |p| p.word("variable name"))?),
            "$file" => Expr::File(self.one_arg(token)?),
            "$csv" => self.parens(token, |p| {
                let file = Box::new(p.expression(0)?);
                let mut delim = None;
                let mut header = None;
                if p.if_next(",") {
                    delim = Some(Box::new(p.expression(0)?));
                    if p.if_next(",") {
                        header = Some(Box::new(p.expression(0)?));
                    }
                }
                Ok(Expr::Csv {
                    file,
                    delim,
                    header,
                })
            })?,
            "$prev" => Expr::Prev(self.one_arg(token)?),
            "$lower" | "$upper" => Expr::ChangeCase {
                arg: self.one_arg(token)?,
                lower: token == "$lower",
            },
            "$path" => Expr::Path,
            "$index" => Expr::Index,
            "$key" => Expr::Key,
            "$reskey" => Expr::Reskey,
            "$filename" => Expr::Filename,
            "$env" => Expr::Env(self.one_arg(token)?),
            "$identifier" => {
                let mut parts = 0;
                if self.is_next("(") {
                    parts = self.parens(token, |p| match p.next() {
                        Token::Number(n) => n.parse::<usize>().map_err(|_| p.error("Expected integer")),
                        _ => Err(p.error("Expected integer")),
                    })?;
                }
                Expr::Identifier(parts)
            }
            "$xml" => Expr::Xml { children: true },
            "$xml_no_children" => Expr::Xml { children: false },
            "$node" => Expr::Node,
            "$attr" => Expr::Attr(self.name_arg(token)?),
            "$child" => Expr::Child(self.name_arg(token)?),
            "$in_filter" => Expr::InFilter(self.name_arg(token)?),
            "$text" => Expr::Text(self.one_arg(token)?),
            "$size" => Expr::Size(self.one_arg(token)?),
            "$length" => Expr::Length(self.one_arg(token)?),
            "$string" | "$int" | "$float" | "$bool" | "$number" => {
                let to = match token {
                    "$string" => CastType::String,
                    "$int" => CastType::Int,
                    "$float" => CastType::Float,
                    "$bool" => CastType::Bool,
                    _ => CastType::Number,
                };
                Expr::Cast {
                    arg: self.one_arg(token)?,
                    to,
                }
            }
            "$count" => Expr::Count {
                id: self.ids.next_id(),
            },
            "$sum" => {
                let arg = self.one_arg(token)?;
                Expr::Sum {
                    id: self.ids.next_id(),
                    arg,
                }
            }
            "$avg" => {
                let arg = self.one_arg(token)?;
                Expr::Avg {
                    id: self.ids.next_id(),
                    arg,
                }
            }
            "$min" | "$max" => {
                let arg = self.one_arg(token)?;
                Expr::MinMax {
                    id: self.ids.next_id(),
                    max: token == "$max",
                    arg,
                }
            }
            "$substr" => self.parens(token, |p| {
                let arg = Box::new(p.expression(0)?);
                p.expect(",")?;
                let start = Box::new(p.expression(0)?);
                let len = if p.if_next(",") {
                    Some(Box::new(p.expression(0)?))
                } else {
                    None
                };
                Ok(Expr::Substr { arg, start, len })
            })?,
            "$find" | "$ifind" => {
                let (arg, needle) = self.two_args(token)?;
                Expr::Find {
                    arg,
                    needle,
                    case_sensitive: token == "$find",
                }
            }
            "$split" => {
                let (arg, delim) = self.two_args(token)?;
                Expr::Split { arg, delim }
            }
            "$join" => {
                let (arg, delim) = self.two_args(token)?;
                Expr::Join { arg, delim }
            }
            "$replace" | "$replace_all" => self.parens(token, |p| {
                let arg = Box::new(p.expression(0)?);
                p.expect(",")?;
                let from = Box::new(p.expression(0)?);
                p.expect(",")?;
                let to = Box::new(p.expression(0)?);
                Ok(Expr::Replace {
                    arg,
                    from,
                    to,
                    all: token == "$replace_all",
                })
            })?,
            "$toTime" => {
                let (arg, format) = self.arg_with_optional(token)?;
                Expr::ToTime { arg, format }
            }
            "$timeToString" => {
                let (arg, format) = self.arg_with_optional(token)?;
                Expr::TimeToString { arg, format }
            }
            "$D" => {
                let literal = self.quoted_or_word();
                let epoch = timefmt::parse_date(&literal)
                    .ok_or_else(|| self.error(format!("Invalid date: {}", literal)))?;
                Expr::Int(epoch)
            }
            _ => {
                let name = token.trim_start_matches('$').to_string();
                let mut args = Vec::new();
                if self.is_next("(") {
                    args = self.parens(token, |p| {
                        let mut args = Vec::new();
                        if !p.is_next(")") {
                            loop {
                                args.push(p.expression(0)?);
                                if !p.if_next(",") {
                                    break;
                                }
                            }
                        }
                        Ok(args)
                    })?;
                }
                Expr::Call {
                    id: self.ids.next_id(),
                    name,
                    args,
                }
            }
        };
        Ok(expr)
    }
}
