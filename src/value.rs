/// A document value as seen by the query language.
///
/// Objects keep their members in insertion order, which is also the order
/// in which they are printed. Equality on objects ignores member order.
///
/// # Examples
///
/// ```
/// use unq_lang::Value;
///
/// let mut object = Value::Object(Vec::new());
/// object.insert("title", Value::String("Act".to_string()));
/// assert_eq!(object.get("title"), Some(&Value::String("Act".to_string())));
/// assert_eq!(object.get("missing"), None);
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// JSON null
    Null,

    /// JSON boolean (true/false)
    Boolean(bool),

    /// Floating-point number
    Float(f64),

    /// Integer number (preserved separately from floats)
    Integer(i64),

    /// UTF-8 string
    String(String),

    /// Array of values
    Array(Vec<Value>),

    /// Object members in insertion order
    Object(Vec<(String, Value)>),
}

pub(crate) static NULL: Value = Value::Null;

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Object(a), Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| other.get(k).is_some_and(|o| o == v))
            }
            _ => false,
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Anything that is neither an array nor an object.
    pub fn is_literal(&self) -> bool {
        !self.is_array() && !self.is_object()
    }

    /// Check if the value is truthy (for conditions)
    pub fn is_truthy(&self) -> bool {
        use Value::*;
        match self {
            Null => false,
            Boolean(b) => *b,
            Float(n) => *n != 0.0,
            Integer(n) => *n != 0,
            String(s) => !s.is_empty(),
            Array(arr) => !arr.is_empty(),
            Object(obj) => !obj.is_empty(),
        }
    }

    /// Null, or an empty array or object.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Array(arr) => arr.is_empty(),
            Value::Object(obj) => obj.is_empty(),
            _ => false,
        }
    }

    /// Member lookup on objects.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(members) => members.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Element lookup on arrays.
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Array(items) => items.get(index),
            _ => None,
        }
    }

    /// Sets a member, replacing an existing one with the same key.
    /// Does nothing on non-objects.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Object(members) = self {
            let key = key.into();
            match members.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => members.push((key, value)),
            }
        }
    }

    /// Value at a field path such as `actors[1].name`, relative to this one.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in crate::path::split_path(path)? {
            current = match segment {
                crate::path::Segment::Field(name) => current.get(&name)?,
                crate::path::Segment::Index(i) => current.at(i)?,
            };
        }
        Some(current)
    }

    /// Array length, 0 for everything else.
    pub fn size(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            _ => 0,
        }
    }

    /// Member names of an object in insertion order.
    pub fn member_names(&self) -> Vec<String> {
        match self {
            Value::Object(members) => members.iter().map(|(k, _)| k.clone()).collect(),
            _ => Vec::new(),
        }
    }

    /// Numeric view used by number comparisons. Strings are parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Integer view used by number comparisons. Strings are parsed.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Coerce to an integer, 0 when there is nothing sensible to take.
    pub fn to_int(&self) -> i64 {
        match self {
            Value::Integer(n) => *n,
            Value::Float(n) => *n as i64,
            Value::Boolean(b) => i64::from(*b),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Coerce to a float, 0.0 when there is nothing sensible to take.
    pub fn to_float(&self) -> f64 {
        match self {
            Value::Boolean(b) => f64::from(u8::from(*b)),
            _ => self.as_number().unwrap_or(0.0),
        }
    }

    /// Text used for string operations and string comparisons.
    ///
    /// Null becomes the empty string, containers become compact JSON.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Integer(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Array(_) | Value::Object(_) => crate::output::to_json(self),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}
