use regex::Regex;

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    /// Addition or string concatenation (`+`)
    Add,
    /// Subtraction (`-`)
    Subtract,
    /// Multiplication (`*`)
    Multiply,
    /// Division (`/`)
    Divide,
    /// Remainder (`mod`)
    Modulo,
}

/// Ordering comparisons shared by number and run-time comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `<=`
    LessEqual,
    /// `>=`
    GreaterEqual,
}

impl CompareOp {
    pub fn from_token(op: &str) -> Option<Self> {
        Some(match op {
            "=" => CompareOp::Equal,
            "!=" => CompareOp::NotEqual,
            "<" => CompareOp::Less,
            ">" => CompareOp::Greater,
            "<=" => CompareOp::LessEqual,
            ">=" => CompareOp::GreaterEqual,
            _ => return None,
        })
    }

    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Equal => ordering == Equal,
            CompareOp::NotEqual => ordering != Equal,
            CompareOp::Less => ordering == Less,
            CompareOp::Greater => ordering == Greater,
            CompareOp::LessEqual => ordering != Greater,
            CompareOp::GreaterEqual => ordering != Less,
        }
    }
}

/// String tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextOp {
    Equal,
    NotEqual,
    Contains,
    StartsWith,
    EndsWith,
}

/// Tests on whole values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JsonOp {
    Equal,
    NotEqual,
    /// Left value is an element of the right array
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypeTest {
    Array,
    Object,
    Literal,
    String,
    Int,
    Float,
    Number,
    Bool,
}

impl TypeTest {
    pub fn from_token(op: &str) -> Option<Self> {
        Some(match op {
            "is_array" => TypeTest::Array,
            "is_object" => TypeTest::Object,
            "is_literal" => TypeTest::Literal,
            "is_string" => TypeTest::String,
            "is_int" => TypeTest::Int,
            "is_float" => TypeTest::Float,
            "is_number" => TypeTest::Number,
            "is_bool" => TypeTest::Bool,
            _ => return None,
        })
    }
}

/// Sort order attached to a value with `@ascending` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    None,
    Ascending,
    Descending,
    UniqueAscending,
    UniqueDescending,
}

impl Order {
    pub fn from_token(op: &str) -> Option<Self> {
        Some(match op {
            "ascending" => Order::Ascending,
            "descending" => Order::Descending,
            "unique_ascending" => Order::UniqueAscending,
            "unique_descending" => Order::UniqueDescending,
            _ => return None,
        })
    }

    pub fn is_descending(self) -> bool {
        matches!(self, Order::Descending | Order::UniqueDescending)
    }

    pub fn is_unique(self) -> bool {
        matches!(self, Order::UniqueAscending | Order::UniqueDescending)
    }
}

/// Path changes performed by `/`, `..` and `<<`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangeOp {
    /// `/path`: from the root of the current document
    Root,
    /// `../path`: from the enclosing value
    Up,
    /// `<<expr`: in the context saved by the last frame
    PrevId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CastType {
    String,
    Int,
    Float,
    Bool,
    /// Int or float, depending on the text
    Number,
}

/// A regular expression that must match a whole string.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Pattern {
            source: source.to_string(),
            regex: Regex::new(&format!("^(?:{})$", source))?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
