//! Fluent constructors for [`Expr`].

use super::{AggregateFunc, BinaryOp, Expr, OuterRef, Value};
use crate::plan::QueryPlan;

/// Literal value.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// AND of all expressions. A single expression is returned as is.
pub fn and_all(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    let mut exprs: Vec<Expr> = exprs.into_iter().collect();
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::And(exprs)
    }
}

/// OR of all expressions. A single expression is returned as is.
pub fn or_all(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    let mut exprs: Vec<Expr> = exprs.into_iter().collect();
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::Or(exprs)
    }
}

fn aggregate(func: AggregateFunc, arg: Option<Expr>, distinct: bool) -> Expr {
    Expr::Aggregate {
        func,
        arg: arg.map(Box::new),
        distinct,
    }
}

pub fn count(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFunc::Count, Some(expr.into()), false)
}

pub fn count_distinct(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFunc::Count, Some(expr.into()), true)
}

/// `COUNT(*)`
pub fn count_star() -> Expr {
    aggregate(AggregateFunc::Count, None, false)
}

pub fn sum(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFunc::Sum, Some(expr.into()), false)
}

pub fn avg(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFunc::Avg, Some(expr.into()), false)
}

pub fn min(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFunc::Min, Some(expr.into()), false)
}

pub fn max(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFunc::Max, Some(expr.into()), false)
}

/// True when `plan` yields at least one row.
pub fn exists(plan: QueryPlan) -> Expr {
    Expr::Exists {
        plan: Box::new(plan),
        negated: false,
    }
}

pub fn not_exists(plan: QueryPlan) -> Expr {
    Expr::Exists {
        plan: Box::new(plan),
        negated: true,
    }
}

// =============================================================================
// Correlated subqueries
// =============================================================================

/// A scalar subquery evaluated once per row of the enclosing statement.
///
/// The subplan is built independently of where it will be used. Its single
/// link to the enclosing statement is an [`OuterRef`] in its filters; the
/// compiler replaces that binding with the enclosing row's column.
#[derive(Debug, Clone)]
pub struct Correlated(QueryPlan);

impl Correlated {
    pub fn new(plan: QueryPlan) -> Self {
        Self(plan)
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.0
    }

    /// Distinct outer bindings used by the subplan.
    pub fn outer_bindings(&self) -> Vec<&OuterRef> {
        self.0.outer_refs()
    }
}

impl From<Correlated> for Expr {
    fn from(c: Correlated) -> Self {
        Expr::Correlated(Box::new(c.0))
    }
}

// =============================================================================
// CASE
// =============================================================================

/// Builder for a conditional expression.
#[derive(Debug, Clone, Default)]
#[must_use = "Case has no effect until finished with otherwise() or end()"]
pub struct Case {
    whens: Vec<(Expr, Expr)>,
}

impl Case {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, predicate: Expr, result: impl Into<Expr>) -> Self {
        self.whens.push((predicate, result.into()));
        self
    }

    /// Finish with a default result.
    pub fn otherwise(self, default: impl Into<Expr>) -> Expr {
        Expr::Case {
            whens: self.whens,
            default: Some(Box::new(default.into())),
        }
    }

    /// Finish without a default; unmatched rows yield NULL.
    pub fn end(self) -> Expr {
        Expr::Case {
            whens: self.whens,
            default: None,
        }
    }
}

// =============================================================================
// Operators
// =============================================================================

/// Extension trait for building expressions fluently.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self.into_expr()),
            right: Box::new(other.into()),
        }
    }

    fn eq(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    fn ne(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ne, other)
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    fn lte(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Lte, other)
    }

    fn gt(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    fn gte(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Gte, other)
    }

    fn add(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Add, other)
    }

    fn sub(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Sub, other)
    }

    fn mul(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Mul, other)
    }

    fn div(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Div, other)
    }

    fn concat(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Concat, other)
    }

    /// SQL `LIKE` with a caller-supplied pattern.
    fn like(self, pattern: impl Into<String>) -> Expr {
        self.binary(BinaryOp::Like, Value::Text(pattern.into()))
    }

    /// Substring match. `%` and `_` in `needle` keep their pattern meaning.
    fn contains(self, needle: &str) -> Expr {
        self.like(format!("%{needle}%"))
    }

    fn startswith(self, prefix: &str) -> Expr {
        self.like(format!("{prefix}%"))
    }

    fn and(self, other: Expr) -> Expr {
        match self.into_expr() {
            Expr::And(mut children) => {
                children.push(other);
                Expr::And(children)
            }
            left => Expr::And(vec![left, other]),
        }
    }

    fn or(self, other: Expr) -> Expr {
        match self.into_expr() {
            Expr::Or(mut children) => {
                children.push(other);
                Expr::Or(children)
            }
            left => Expr::Or(vec![left, other]),
        }
    }

    fn not(self) -> Expr {
        Expr::Not(Box::new(self.into_expr()))
    }

    #[allow(clippy::wrong_self_convention)]
    fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: false,
        }
    }

    #[allow(clippy::wrong_self_convention)]
    fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: true,
        }
    }

    fn in_list(self, values: impl IntoIterator<Item = impl Into<Expr>>) -> Expr {
        Expr::InList {
            expr: Box::new(self.into_expr()),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    fn not_in_list(self, values: impl IntoIterator<Item = impl Into<Expr>>) -> Expr {
        Expr::InList {
            expr: Box::new(self.into_expr()),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}
