use crate::ast::{CompareOp, Expr, JsonOp, Pattern, TextOp, TypeTest};

/// Boolean condition.
///
/// The comparison variant is picked at parse time from what the operands
/// can produce: strings get `Text`, numbers `Number`, booleans `Bool`, and
/// everything else `Json` (equality and membership) or `Compare`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `a & b`
    And(Box<Condition>, Box<Condition>),
    /// `a | b`
    Or(Box<Condition>, Box<Condition>),
    /// `!a`
    Not(Box<Condition>),

    /// `x !`: the expression resolves to something
    Exists(Expr),

    /// `x is_array`, `x is_int`, ...
    Type { expr: Expr, test: TypeTest },

    /// `x = "a"`, `x contains "b"`, `x starts_with y`, ...
    Text { op: TextOp, lhs: Expr, rhs: Expr },

    /// `x matches "re"`; literal patterns are compiled once
    Matches {
        lhs: Expr,
        rhs: Expr,
        pattern: Option<Pattern>,
    },

    /// `x > 10`, `$count = 3`, ...
    Number { op: CompareOp, lhs: Expr, rhs: Expr },

    /// `x = true`
    Bool { equal: bool, lhs: Expr, rhs: Expr },

    /// `x = $var(y)`, `x in $var(list)`, ...
    Json { op: JsonOp, lhs: Expr, rhs: Expr },

    /// Ordering comparison between operands of unknown type, decided at
    /// run time
    Compare { op: CompareOp, lhs: Expr, rhs: Expr },
}

impl Condition {
    /// True if any expression inside the condition satisfies `pred`.
    pub fn any_expr(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        match self {
            Condition::And(a, b) | Condition::Or(a, b) => a.any_expr(pred) || b.any_expr(pred),
            Condition::Not(c) => c.any_expr(pred),
            Condition::Exists(e) | Condition::Type { expr: e, .. } => e.any(pred),
            Condition::Text { lhs, rhs, .. }
            | Condition::Matches { lhs, rhs, .. }
            | Condition::Number { lhs, rhs, .. }
            | Condition::Bool { lhs, rhs, .. }
            | Condition::Json { lhs, rhs, .. }
            | Condition::Compare { lhs, rhs, .. } => lhs.any(pred) || rhs.any(pred),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.any_expr(&|e| e.is_aggregate())
    }
}
