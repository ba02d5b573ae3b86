//! Lowering plan expressions to SQL expressions.

use crate::error::{QueryError, QueryResult};
use crate::expr::{BinaryOp, Expr, FieldRef, Value};
use crate::plan::QueryPlan;
use crate::sql::expr::{lit_int, param, star};
use crate::sql::{BinaryOperator, Dialect, Expr as SqlExpr, ExprExt as _, UnaryOperator};

use super::scope::{Aliases, Outer, Role, Scope};
use super::select::{self, Mode};

/// Lowers the expressions of one plan inside one statement scope.
pub(crate) struct Lowerer<'a> {
    pub plan: &'a QueryPlan,
    pub scope: Scope,
    pub aliases: &'a mut Aliases,
    pub dialect: Dialect,
}

impl<'a> Lowerer<'a> {
    pub fn new(plan: &'a QueryPlan, scope: Scope, aliases: &'a mut Aliases, dialect: Dialect) -> Self {
        Self {
            plan,
            scope,
            aliases,
            dialect,
        }
    }

    pub fn lower(&mut self, expr: &Expr, role: Role) -> QueryResult<SqlExpr> {
        self.lower_at(expr, role, 0)
    }

    fn lower_at(&mut self, expr: &Expr, role: Role, depth: usize) -> QueryResult<SqlExpr> {
        let plan: &'a QueryPlan = self.plan;

        Ok(match expr {
            Expr::Field(r) => self.field(r, role)?,

            Expr::Alias(name) => {
                // Annotations can only reference earlier annotations, so a
                // chain longer than the annotation list is a cycle.
                let inner = plan
                    .annotation(name)
                    .filter(|_| depth <= plan.annotations().len())
                    .ok_or_else(|| QueryError::unknown_path(plan.root().name(), name.as_str()))?;
                self.lower_at(inner, role, depth + 1)?
            }

            Expr::Literal(value) => param(value.clone()),

            Expr::Binary { op, left, right } => {
                let left = self.lower_at(left, role, depth)?;
                let right = self.lower_at(right, role, depth)?;
                left.binary(binary_operator(*op), right)
            }

            Expr::And(children) => match self.lower_all(children, role, depth)? {
                parts if parts.is_empty() => lit_int(1).eq(lit_int(1)),
                parts => fold(parts, BinaryOperator::And),
            },

            Expr::Or(children) => match self.lower_all(children, role.guarded(), depth)? {
                parts if parts.is_empty() => lit_int(1).eq(lit_int(0)),
                parts => fold(parts, BinaryOperator::Or),
            },

            Expr::Not(inner) => SqlExpr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(self.lower_at(inner, role.guarded(), depth)?),
            },

            Expr::IsNull { expr, negated } => SqlExpr::IsNull {
                expr: Box::new(self.lower_at(expr, role.guarded(), depth)?),
                negated: *negated,
            },

            Expr::InList {
                expr,
                values,
                negated,
            } => {
                let role = if *negated { role.guarded() } else { role };
                SqlExpr::In {
                    expr: Box::new(self.lower_at(expr, role, depth)?),
                    values: self.lower_all(values, role, depth)?,
                    negated: *negated,
                }
            }

            Expr::Case { whens, default } => {
                let role = role.guarded();
                if whens.is_empty() {
                    // `CASE ELSE x END` is not valid SQL.
                    return match default {
                        Some(d) => self.lower_at(d, role, depth),
                        None => Ok(param(Value::Null)),
                    };
                }
                let mut when_clauses = Vec::with_capacity(whens.len());
                for (pred, result) in whens {
                    when_clauses.push((
                        self.lower_at(pred, role, depth)?,
                        self.lower_at(result, role, depth)?,
                    ));
                }
                let else_clause = match default {
                    Some(d) => Some(Box::new(self.lower_at(d, role, depth)?)),
                    None => None,
                };
                SqlExpr::Case {
                    when_clauses,
                    else_clause,
                }
            }

            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => {
                // A path aggregated inside a predicate must not drop rows
                // before grouping.
                let inner_role = if matches!(role, Role::Filter | Role::Guarded) {
                    Role::Annotation
                } else {
                    role
                };
                let args = match arg {
                    Some(a) => vec![self.lower_at(a, inner_role, depth)?],
                    None => vec![star()],
                };
                SqlExpr::Function {
                    name: func.sql_name().to_string(),
                    args,
                    distinct: *distinct,
                }
            }

            Expr::Outer(r) => {
                let outer = self.scope.outer().ok_or_else(|| {
                    QueryError::UnsupportedCorrelation(format!(
                        "outer reference `{}` used outside a correlated subquery",
                        r.field()
                    ))
                })?;
                let field = outer
                    .entity
                    .field(r.field())
                    .ok_or_else(|| QueryError::unknown_path(outer.entity.name(), r.field()))?;
                crate::sql::expr::table_col(&outer.name, &field.name)
            }

            Expr::Correlated(sub) => {
                let query = self.subquery(sub, Mode::Scalar)?;
                SqlExpr::Subquery(Box::new(query))
            }

            Expr::Exists { plan: sub, negated } => {
                let query = self.subquery(sub, Mode::Exists)?;
                SqlExpr::Exists {
                    subquery: Box::new(query),
                    negated: *negated,
                }
            }
        })
    }

    fn lower_all(&mut self, exprs: &[Expr], role: Role, depth: usize) -> QueryResult<Vec<SqlExpr>> {
        exprs
            .iter()
            .map(|e| self.lower_at(e, role, depth))
            .collect()
    }

    fn field(&mut self, r: &FieldRef, role: Role) -> QueryResult<SqlExpr> {
        if r.root() != self.scope.root().name() {
            return Err(QueryError::unknown_path(self.scope.root().name(), r.path()));
        }
        if r.is_local() {
            return Ok(self.scope.root_column(r.column()));
        }
        let alias = self.scope.join_path(self.aliases, r.hops(), role)?;
        Ok(crate::sql::expr::table_col(&alias, r.column()))
    }

    /// Lower a nested subplan correlated to this scope's root.
    fn subquery(&mut self, sub: &QueryPlan, mode: Mode) -> QueryResult<crate::sql::Query> {
        let bindings = sub.outer_refs();
        if bindings.len() > 1 {
            let names: Vec<&str> = bindings.iter().map(|b| b.field()).collect();
            return Err(QueryError::UnsupportedCorrelation(format!(
                "subquery on `{}` binds {} outer fields ({}); at most one is supported",
                sub.root().name(),
                names.len(),
                names.join(", ")
            )));
        }
        let outer = Outer {
            name: self.scope.correlation_name(),
            entity: self.scope.root().clone(),
        };
        let built = select::build(sub, mode, Some(outer), self.aliases, self.dialect)?;
        Ok(built.query)
    }
}

fn fold(parts: Vec<SqlExpr>, op: BinaryOperator) -> SqlExpr {
    let mut iter = parts.into_iter();
    let first = iter.next().unwrap_or_else(|| lit_int(1));
    iter.fold(first, |acc, e| acc.binary(op, e))
}

fn binary_operator(op: BinaryOp) -> BinaryOperator {
    match op {
        BinaryOp::Eq => BinaryOperator::Eq,
        BinaryOp::Ne => BinaryOperator::Ne,
        BinaryOp::Lt => BinaryOperator::Lt,
        BinaryOp::Lte => BinaryOperator::Lte,
        BinaryOp::Gt => BinaryOperator::Gt,
        BinaryOp::Gte => BinaryOperator::Gte,
        BinaryOp::Add => BinaryOperator::Plus,
        BinaryOp::Sub => BinaryOperator::Minus,
        BinaryOp::Mul => BinaryOperator::Mul,
        BinaryOp::Div => BinaryOperator::Div,
        BinaryOp::Like => BinaryOperator::Like,
        BinaryOp::Concat => BinaryOperator::Concat,
    }
}
