//! Expression AST: the algebra queries are written in.
//!
//! Expressions are plain immutable values. Building one never touches
//! storage: field references are validated against the schema when they are
//! created ([`crate::plan::QueryPlan::f`]), and subplans inside
//! [`Expr::Correlated`] and [`Expr::Exists`] stay unexecuted until the
//! enclosing plan is compiled.
//!
//! ```ignore
//! use quarry::expr::{avg, lit, Case, ExprExt};
//!
//! let label = Case::new()
//!     .when(plan.f("rating")?.eq(5), lit("super cool"))
//!     .when(plan.f("rating")?.eq(4), lit("pretty cool"))
//!     .otherwise(lit("not cool"));
//! ```

mod builder;
mod value;

pub use builder::{
    and_all, avg, count, count_distinct, count_star, exists, lit, max, min, not_exists, or_all,
    sum, Case, Correlated, ExprExt,
};
pub use value::Value;

use serde::Serialize;

use crate::error::QueryResult;
use crate::plan::QueryPlan;
use crate::schema::{Field, Relation, ScalarType, Schema};

// =============================================================================
// References
// =============================================================================

/// A validated reference to a field reachable from a root entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRef {
    root: String,
    path: String,
    hops: Vec<Relation>,
    field: Field,
}

impl FieldRef {
    /// Resolve `path` from `root`, failing with `UnknownPath` if any segment
    /// is undeclared.
    pub fn resolve(schema: &Schema, root: &str, path: &str) -> QueryResult<Self> {
        let resolved = schema.resolve(root, path)?;
        Ok(Self {
            root: root.to_string(),
            path: path.to_string(),
            hops: resolved.hops,
            field: resolved.field,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// The dotted path as written.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Relations traversed from the root.
    pub fn hops(&self) -> &[Relation] {
        &self.hops
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn column(&self) -> &str {
        &self.field.name
    }

    pub fn ty(&self) -> ScalarType {
        self.field.ty
    }

    /// Whether the field belongs to the root entity itself.
    pub fn is_local(&self) -> bool {
        self.hops.is_empty()
    }
}

/// The outer binding of a correlated subplan: a field of the enclosing
/// statement's root entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OuterRef {
    field: String,
}

impl OuterRef {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl From<OuterRef> for Expr {
    fn from(r: OuterRef) -> Self {
        Expr::Outer(r)
    }
}

// =============================================================================
// Operators
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Like,
    /// String concatenation.
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AggregateFunc {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn sql_name(self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

// =============================================================================
// Expression
// =============================================================================

/// A query expression.
#[derive(Debug, Clone, Serialize)]
pub enum Expr {
    /// Field of the root entity or of an entity reached through relations.
    Field(FieldRef),
    /// Reference to an annotation of the plan the expression is used in.
    Alias(String),
    /// Literal, always sent as a bound parameter.
    Literal(Value),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },
    /// Ordered `(predicate, result)` pairs; the first true predicate wins.
    Case {
        whens: Vec<(Expr, Expr)>,
        default: Option<Box<Expr>>,
    },
    /// `arg` is `None` for `COUNT(*)`.
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    /// Outer binding inside a correlated subplan.
    Outer(OuterRef),
    /// Scalar subquery over a single-column subplan.
    Correlated(Box<QueryPlan>),
    Exists {
        plan: Box<QueryPlan>,
        negated: bool,
    },
}

impl Expr {
    /// Direct sub-expressions. Nested subplans are not included.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Field(_)
            | Expr::Alias(_)
            | Expr::Literal(_)
            | Expr::Outer(_)
            | Expr::Correlated(_)
            | Expr::Exists { .. } => Vec::new(),
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::And(children) | Expr::Or(children) => children.iter().collect(),
            Expr::Not(inner) => vec![inner.as_ref()],
            Expr::IsNull { expr, .. } => vec![expr.as_ref()],
            Expr::InList { expr, values, .. } => {
                let mut out = vec![expr.as_ref()];
                out.extend(values);
                out
            }
            Expr::Case { whens, default } => {
                let mut out = Vec::with_capacity(whens.len() * 2 + 1);
                for (pred, result) in whens {
                    out.push(pred);
                    out.push(result);
                }
                out.extend(default.as_deref());
                out
            }
            Expr::Aggregate { arg, .. } => arg.as_deref().into_iter().collect(),
        }
    }

    /// Pre-order walk. Does not descend into nested subplans.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expr::Aggregate { .. })
    }

    /// Whether an aggregate call appears anywhere in this expression.
    /// Annotation aliases are not followed.
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= e.is_aggregate());
        found
    }

    pub fn field_refs(&self) -> Vec<&FieldRef> {
        let mut refs = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Field(r) = e {
                refs.push(r);
            }
        });
        refs
    }

    pub fn outer_refs(&self) -> Vec<&OuterRef> {
        let mut refs = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Outer(r) = e {
                refs.push(r);
            }
        });
        refs
    }

    /// Annotation aliases referenced by this expression.
    pub fn aliases(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Alias(name) = e {
                names.push(name.as_str());
            }
        });
        names
    }

    /// Nested subplans (scalar subqueries and existence tests).
    pub fn subplans(&self) -> Vec<&QueryPlan> {
        let mut plans = Vec::new();
        self.visit(&mut |e| match e {
            Expr::Correlated(plan) | Expr::Exists { plan, .. } => plans.push(plan.as_ref()),
            _ => {}
        });
        plans
    }
}

impl From<FieldRef> for Expr {
    fn from(r: FieldRef) -> Self {
        Expr::Field(r)
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

macro_rules! literal_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Expr {
            fn from(v: $ty) -> Self {
                Expr::Literal(Value::from(v))
            }
        })*
    };
}

literal_from!(bool, i32, i64, f64, &str, String);
