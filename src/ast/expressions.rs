use crate::ast::{BinOp, CastType, ChangeOp, Condition};

/// Value expression.
///
/// Aggregates and calls carry an `id` allocated at compile time; run-time
/// state for them is keyed by that id and the data object evaluating them.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    /// `"text"` or `'text'`
    Str(String),
    /// `42`, `-1`
    Int(i64),
    /// `3.5`
    Float(f64),
    /// `true`, `false`
    Bool(bool),

    // Document access
    /// Field path relative to the current position; `""` is the current value
    ///
    /// # Examples
    /// ```text
    /// .
    /// title
    /// actors[0].name
    /// ```
    Field(String),

    /// `$(expr)`: field whose path is computed
    DynamicField(Box<Expr>),

    /// `/path`, `../path`, `<<expr`
    ChangePath { op: ChangeOp, arg: Box<Expr> },

    /// Postfix access on a computed value
    ///
    /// # Examples
    /// ```text
    /// $var(person).name
    /// $var(list)[0]
    /// []
    /// ```
    Subfield { arg: Box<Expr>, sub: Subpath },

    /// `a + b`, `a mod b`, ...
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `$if(cond, then, else)`
    If {
        cond: Box<Condition>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    /// `$name(args..)` or `$call(name)`: user function defined with `#func`
    Call {
        id: usize,
        name: String,
        args: Vec<Expr>,
    },

    /// `$var(name)`
    Var(String),
    /// `$file(name)`: contents of a JSON file
    File(Box<Expr>),
    /// `$csv(name[, delim[, header]])`: contents of a CSV file
    Csv {
        file: Box<Expr>,
        delim: Option<Box<Expr>>,
        header: Option<Box<Expr>>,
    },
    /// `$prev(default)`: value stored by the previous document
    Prev(Box<Expr>),

    // Context information
    /// `$path`
    Path,
    /// `$index`
    Index,
    /// `$key`
    Key,
    /// `$reskey`
    Reskey,
    /// `$filename`
    Filename,
    /// `$env(name)`
    Env(Box<Expr>),
    /// `$identifier` or `$identifier(n)`; 0 means the whole identifier
    Identifier(usize),

    // XML records
    /// `$xml`, `$xml_no_children`
    Xml { children: bool },
    /// `$node`
    Node,
    /// `$attr(name)`
    Attr(String),
    /// `$child(name)`
    Child(String),
    /// `$in_filter(name)`
    InFilter(String),
    /// `$text(xml)`
    Text(Box<Expr>),

    // Functions
    /// `$lower(s)`, `$upper(s)`
    ChangeCase { arg: Box<Expr>, lower: bool },
    /// `$size(array)`
    Size(Box<Expr>),
    /// `$length(s)`
    Length(Box<Expr>),
    /// `$string(x)`, `$int(x)`, `$float(x)`, `$bool(x)`, `$number(x)`
    Cast { arg: Box<Expr>, to: CastType },
    /// `$substr(s, start[, len])`
    Substr {
        arg: Box<Expr>,
        start: Box<Expr>,
        len: Option<Box<Expr>>,
    },
    /// `$find(s, needle)`, `$ifind(s, needle)`: every match position
    Find {
        arg: Box<Expr>,
        needle: Box<Expr>,
        case_sensitive: bool,
    },
    /// `$split(s, delim)`
    Split { arg: Box<Expr>, delim: Box<Expr> },
    /// `$join(array, delim)`
    Join { arg: Box<Expr>, delim: Box<Expr> },
    /// `$replace(s, from, to)`, `$replace_all(s, from, to)`
    Replace {
        arg: Box<Expr>,
        from: Box<Expr>,
        to: Box<Expr>,
        all: bool,
    },
    /// `$toTime(s[, format])`
    ToTime {
        arg: Box<Expr>,
        format: Option<Box<Expr>>,
    },
    /// `$timeToString(t[, format])`
    TimeToString {
        arg: Box<Expr>,
        format: Option<Box<Expr>>,
    },

    // Aggregates
    /// `$count`
    Count { id: usize },
    /// `$sum(x)`
    Sum { id: usize, arg: Box<Expr> },
    /// `$avg(x)`
    Avg { id: usize, arg: Box<Expr> },
    /// `$min(x)`, `$max(x)`
    MinMax {
        id: usize,
        max: bool,
        arg: Box<Expr>,
    },
}

/// What a `Subfield` selects.
#[derive(Debug, Clone, PartialEq)]
pub enum Subpath {
    /// `.name` or `.(expr)`
    Member(Box<Expr>),
    /// `[expr]`
    Index(Box<Expr>),
    /// `[]`: every element
    All,
}

#[derive(Clone, Copy)]
struct Caps {
    string: bool,
    int: bool,
    double: bool,
    boolean: bool,
}

const ANY: Caps = Caps { string: true, int: true, double: true, boolean: true };
const JSON: Caps = Caps { string: false, int: false, double: false, boolean: false };
const STRING: Caps = Caps { string: true, ..JSON };
const INT: Caps = Caps { int: true, ..JSON };
const DOUBLE: Caps = Caps { double: true, ..JSON };
const NUMBER: Caps = Caps { int: true, double: true, ..JSON };
const BOOL: Caps = Caps { boolean: true, ..JSON };

fn any_opt(e: &Option<Box<Expr>>, pred: &dyn Fn(&Expr) -> bool) -> bool {
    e.as_ref().is_some_and(|e| e.any(pred))
}

impl Expr {
    /// Pre-order search over this expression, its operands and the
    /// expressions inside nested conditions.
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        use Expr::*;
        if pred(self) {
            return true;
        }
        match self {
            DynamicField(e) | File(e) | Prev(e) | Env(e) | Text(e) | Size(e) | Length(e) => {
                e.any(pred)
            }
            ChangePath { arg, .. } | ChangeCase { arg, .. } | Cast { arg, .. } => arg.any(pred),
            Sum { arg, .. } | Avg { arg, .. } | MinMax { arg, .. } => arg.any(pred),
            Subfield { arg, sub } => {
                arg.any(pred)
                    || match sub {
                        Subpath::Member(e) | Subpath::Index(e) => e.any(pred),
                        Subpath::All => false,
                    }
            }
            Binary { left, right, .. } => left.any(pred) || right.any(pred),
            If {
                cond,
                then,
                otherwise,
            } => cond.any_expr(pred) || then.any(pred) || otherwise.any(pred),
            Call { args, .. } => args.iter().any(|e| e.any(pred)),
            Csv {
                file,
                delim,
                header,
            } => file.any(pred) || any_opt(delim, pred) || any_opt(header, pred),
            Substr { arg, start, len } => arg.any(pred) || start.any(pred) || any_opt(len, pred),
            Find { arg, needle, .. } => arg.any(pred) || needle.any(pred),
            Split { arg, delim } | Join { arg, delim } => arg.any(pred) || delim.any(pred),
            Replace { arg, from, to, .. } => arg.any(pred) || from.any(pred) || to.any(pred),
            ToTime { arg, format } | TimeToString { arg, format } => {
                arg.any(pred) || any_opt(format, pred)
            }
            Str(_) | Int(_) | Float(_) | Bool(_) | Field(_) | Var(_) | Path | Index | Key
            | Reskey | Filename | Identifier(_) | Xml { .. } | Node | Attr(_) | Child(_)
            | InFilter(_) | Count { .. } => false,
        }
    }

    /// Needs every document to be seen: aggregates, `$prev` and calls.
    pub fn is_aggregate(&self) -> bool {
        self.any(&|e| {
            matches!(
                e,
                Expr::Count { .. }
                    | Expr::Sum { .. }
                    | Expr::Avg { .. }
                    | Expr::MinMax { .. }
                    | Expr::Prev(_)
                    | Expr::Call { .. }
            )
        })
    }

    pub fn uses_prev(&self) -> bool {
        self.any(&|e| matches!(e, Expr::Prev(_)))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Str(_) | Expr::Int(_) | Expr::Float(_) | Expr::Bool(_))
    }

    /// Resolves to a path in the current document.
    pub fn is_field(&self) -> bool {
        match self {
            Expr::Field(_) | Expr::DynamicField(_) => true,
            Expr::ChangePath { op, arg } => *op != ChangeOp::PrevId && arg.is_field(),
            Expr::Subfield { arg, sub } => *sub != Subpath::All && arg.is_field(),
            _ => false,
        }
    }

    pub fn is_string(&self) -> bool {
        self.caps().string
    }

    pub fn is_int(&self) -> bool {
        self.caps().int
    }

    pub fn is_double(&self) -> bool {
        self.caps().double
    }

    pub fn is_bool(&self) -> bool {
        self.caps().boolean
    }

    fn caps(&self) -> Caps {
        use Expr::*;
        match self {
            Str(_) | Path | Key | Reskey | Filename | Env(_) | Identifier(_) | Xml { .. }
            | Node | Attr(_) | Child(_) | Text(_) | ChangeCase { .. } | Substr { .. }
            | Join { .. } | Replace { .. } | TimeToString { .. } => STRING,
            Int(_) | Index | Size(_) | Length(_) | Count { .. } | ToTime { .. } => INT,
            Float(_) | Avg { .. } => DOUBLE,
            Sum { .. } | MinMax { .. } => NUMBER,
            Bool(_) | InFilter(_) => BOOL,
            Field(_) | DynamicField(_) | ChangePath { .. } | Subfield { .. } | Prev(_) => ANY,
            Var(_) | Call { .. } | File(_) | Csv { .. } | Find { .. } | Split { .. } => JSON,
            Cast { to, .. } => match to {
                CastType::String => STRING,
                CastType::Int => INT,
                CastType::Float => DOUBLE,
                CastType::Bool => BOOL,
                CastType::Number => NUMBER,
            },
            If {
                then, otherwise, ..
            } => {
                let (a, b) = (then.caps(), otherwise.caps());
                Caps {
                    string: a.string || b.string,
                    int: a.int || b.int,
                    double: a.double || b.double,
                    boolean: a.boolean || b.boolean,
                }
            }
            Binary { op, left, right } => {
                let (l, r) = (left.caps(), right.caps());
                let numeric = |c: Caps| c.int || c.double;
                Caps {
                    string: *op == BinOp::Add && (l.string || r.string),
                    int: l.int && r.int,
                    double: (l.double || r.double || *op == BinOp::Divide) && numeric(l) && numeric(r),
                    boolean: false,
                }
            }
        }
    }
}
