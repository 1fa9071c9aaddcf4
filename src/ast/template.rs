use crate::ast::{Condition, Expr, Order, Pattern};

/// Structural node of a compiled template.
///
/// Templates are immutable once compiled; every run creates its own data
/// objects from them. `Shared` nodes carry an id so that the branches of an
/// `||` alternation can reach the same data object.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// `{ "key": ... }`
    Object(ObjectTemplate),

    /// `[ ... ]`: every matching alternative adds an entry
    Array(Vec<Template>),

    /// A value expression with an optional ordering
    Value {
        expr: Expr,
        order: Order,
        order_num: i64,
    },

    /// Evaluates `inner` somewhere else: a sub path, each array element,
    /// another document, ...
    ContextMod(ContextModifier),

    /// `a||b`: every alternative is processed, the first non-null renders
    Or(Vec<Template>),

    /// Continuation reached from several `||` branches
    Shared { id: usize, inner: Box<Template> },

    /// `value ? cond`
    WithCond {
        inner: Box<Template>,
        cond: Condition,
    },

    /// A condition used as a field gate (`#if`, `"x > 3"`)
    CondWrapper(Condition),

    /// Hole in a context modifier chain, filled in by `replace`
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectTemplate {
    pub fields: Vec<FieldTemplate>,
    /// Some field value carries an ordering
    pub ordered: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldTemplate {
    pub key: Key,
    pub value: Template,
}

/// Field key specifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// Literal member name
    Name(String),
    /// `$expr` or `$(expr)`: name computed per document
    Param(Expr),
    /// `{"re"}`: one field per matching member of the current value
    Regex(Pattern),
    /// `#if` and value conditions
    Cond,
    /// `#func name(params)`
    Func { name: String, params: Vec<String> },
    /// `#var name`
    Variable(String),
    /// `#assign name`
    Assign(String),
    /// `#exists`
    Exists,
    /// `#notexists`
    NotExists,
    /// `#return`
    Return,
    /// `#returnif`
    ReturnIf,
}

impl Key {
    /// Dynamic keys are kept apart from literal ones and rendered after
    /// them, ordered by key.
    pub fn is_sorted(&self) -> bool {
        matches!(self, Key::Param(_) | Key::Regex(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextMode {
    /// Plain path
    None,
    /// `path[]`: each element
    Array,
    /// `{"re"}`: each matching member
    Regex(Pattern),
    /// `**`: every descendant
    AllPaths,
    /// `$(expr)`: computed path
    Eval,
    /// empty path: the result key
    Reskey,
    /// `->target`
    Arrow,
}

/// Targets of `->`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ArrowOp {
    /// Identifiers read from a field or computed by an expression
    #[default]
    None,
    /// `$self`
    Itself,
    /// `$parent`
    Parent,
    /// `$ancestors`
    Ancestors,
    /// `$ancestors_and_self`
    AncestorsAndSelf,
    /// `$children`
    Children,
    /// `$descendants`
    Descendants,
    /// `$descendants_and_self`
    DescendantsAndSelf,
    /// `$all`
    All,
    /// `$var(name)`
    Var,
    /// `$file(..)`, `$csv(..)`
    File,
    /// `$date(..)`
    Date,
    /// `$branch(..)`
    Branch,
    /// any other `$` expression, evaluated to a local document
    Other,
}

impl ArrowOp {
    pub fn from_token(token: &str) -> Self {
        match token {
            "$self" => ArrowOp::Itself,
            "$parent" => ArrowOp::Parent,
            "$ancestors" => ArrowOp::Ancestors,
            "$ancestors_and_self" => ArrowOp::AncestorsAndSelf,
            "$children" => ArrowOp::Children,
            "$descendants" => ArrowOp::Descendants,
            "$descendants_and_self" => ArrowOp::DescendantsAndSelf,
            "$all" => ArrowOp::All,
            "$var" => ArrowOp::Var,
            "$file" | "$csv" => ArrowOp::File,
            "$date" => ArrowOp::Date,
            "$branch" => ArrowOp::Branch,
            t if t.starts_with('$') && t.len() > 1 => ArrowOp::Other,
            _ => ArrowOp::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextModifier {
    pub mode: ContextMode,
    pub arrow: ArrowOp,
    /// Path for `None`/`Array` modes, variable name for `->$var`,
    /// field path or quoted identifier for plain arrows
    pub path: String,
    pub expr: Option<Expr>,
    /// Outermost modifier of a chain: saves a frame for `<<`
    pub new_frame: bool,
    pub inner: Box<Template>,
}

impl Template {
    /// Copy of this template with the placeholder at the end of the chain
    /// replaced by `value`.
    pub fn replace(&self, value: &Template) -> Template {
        match self {
            Template::Placeholder => value.clone(),
            Template::ContextMod(m) => Template::ContextMod(ContextModifier {
                inner: Box::new(m.inner.replace(value)),
                ..m.clone()
            }),
            Template::WithCond { inner, cond } => Template::WithCond {
                inner: Box::new(inner.replace(value)),
                cond: cond.clone(),
            },
            Template::Shared { id, inner } => Template::Shared {
                id: *id,
                inner: Box::new(inner.replace(value)),
            },
            Template::Or(alternatives) => {
                Template::Or(alternatives.iter().map(|t| t.replace(value)).collect())
            }
            other => other.clone(),
        }
    }

    pub fn is_ordered(&self) -> bool {
        match self {
            Template::Value { order, .. } => *order != Order::None,
            Template::Object(o) => o.ordered,
            Template::ContextMod(m) => m.inner.is_ordered(),
            Template::WithCond { inner, .. } | Template::Shared { inner, .. } => {
                inner.is_ordered()
            }
            _ => false,
        }
    }

    pub fn order_number(&self) -> i64 {
        match self {
            Template::Value { order_num, .. } => *order_num,
            Template::ContextMod(m) => m.inner.order_number(),
            Template::WithCond { inner, .. } | Template::Shared { inner, .. } => {
                inner.order_number()
            }
            _ => 0,
        }
    }

    /// Contains an aggregate that must be re-evaluated for every document.
    pub fn is_aggregate(&self) -> bool {
        match self {
            Template::Value { expr, .. } => expr.is_aggregate(),
            Template::ContextMod(m) => m.inner.is_aggregate(),
            Template::Shared { inner, .. } => inner.is_aggregate(),
            Template::WithCond { inner, cond } => cond.is_aggregate() || inner.is_aggregate(),
            Template::Or(alternatives) => alternatives.iter().any(Template::is_aggregate),
            Template::CondWrapper(cond) => cond.is_aggregate(),
            Template::Object(_) | Template::Array(_) | Template::Placeholder => false,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Template::Array(_))
    }
}

impl ObjectTemplate {
    /// Adds a field. A condition becomes a gate placed before the value.
    pub fn add(&mut self, key: Key, value: Option<Template>, cond: Option<Template>) {
        if let Some(cond) = cond {
            self.fields.push(FieldTemplate {
                key: Key::Cond,
                value: cond,
            });
        }
        if let Some(value) = value {
            if value.is_ordered() {
                self.ordered = true;
            }
            self.fields.push(FieldTemplate { key, value });
        }
    }
}
