//! UPDATE, DELETE and INSERT lowering.
//!
//! Root columns are written unqualified. Filters that need a join, an
//! aggregate or pagination are moved into a `pk IN (SELECT ...)` subquery so
//! the outer statement never joins.

use crate::error::{QueryError, QueryResult};
use crate::expr::{Expr, Value};
use crate::plan::QueryPlan;
use crate::schema::Entity;
use crate::sql::expr::{col, param};
use crate::sql::{Delete, Dialect, ExprExt as _, Insert, Query, SqlDialect, Update};

use super::lower::Lowerer;
use super::scope::{Aliases, Role, Scope};
use super::select::{self, Mode};
use super::{ColumnSource, CompiledStatement, OutputColumn};

pub(crate) fn update(
    plan: &QueryPlan,
    assignments: &[(&str, Expr)],
    dialect: Dialect,
) -> QueryResult<CompiledStatement> {
    let root = plan.root().clone();
    let mut aliases = Aliases::default();
    let keyed = key_subquery(plan, &mut aliases, dialect)?;

    let scope = Scope::dml(plan.schema().clone(), root.clone());
    let mut lowerer = Lowerer::new(plan, scope, &mut aliases, dialect);

    let mut stmt = Update::table(root.table());
    for (column, value) in assignments {
        let field = root
            .field(column)
            .ok_or_else(|| QueryError::unknown_path(root.name(), *column))?;
        if plan.expr_aggregates(value) {
            return Err(QueryError::AmbiguousGrouping(format!(
                "assignment to `{column}` uses an aggregate"
            )));
        }
        stmt = stmt.set(field.name.clone(), lowerer.lower(value, Role::Filter)?);
    }

    match keyed {
        Some(sub) => stmt = stmt.filter(col(root.pk()).in_subquery(sub)),
        None => {
            for filter in plan.filters() {
                stmt = stmt.filter(lowerer.lower(filter, Role::Filter)?);
            }
        }
    }

    Ok(CompiledStatement::new(stmt.render(dialect), Vec::new()))
}

pub(crate) fn delete(plan: &QueryPlan, dialect: Dialect) -> QueryResult<CompiledStatement> {
    let root = plan.root().clone();
    let mut aliases = Aliases::default();
    let keyed = key_subquery(plan, &mut aliases, dialect)?;

    let mut stmt = Delete::from(root.table());
    match keyed {
        Some(sub) => stmt = stmt.filter(col(root.pk()).in_subquery(sub)),
        None => {
            let scope = Scope::dml(plan.schema().clone(), root.clone());
            let mut lowerer = Lowerer::new(plan, scope, &mut aliases, dialect);
            for filter in plan.filters() {
                stmt = stmt.filter(lowerer.lower(filter, Role::Filter)?);
            }
        }
    }

    Ok(CompiledStatement::new(stmt.render(dialect), Vec::new()))
}

pub(crate) fn insert(
    entity: &Entity,
    values: &[(&str, Value)],
    dialect: Dialect,
) -> QueryResult<CompiledStatement> {
    let mut columns = Vec::with_capacity(values.len());
    for (name, _) in values {
        let field = entity
            .field(name)
            .ok_or_else(|| QueryError::unknown_path(entity.name(), *name))?;
        columns.push(field.name.clone());
    }

    let stmt = Insert::into(entity.table())
        .columns(columns)
        .values(values.iter().map(|(_, v)| param(v.clone())))
        .returning([entity.pk()]);

    let output = if dialect.supports_returning() {
        let ty = entity.field(entity.pk()).map(|f| f.ty);
        vec![OutputColumn {
            key: entity.pk().to_string(),
            source: ColumnSource::Root,
            ty,
        }]
    } else {
        Vec::new()
    };

    Ok(CompiledStatement::new(stmt.render(dialect), output))
}

/// `SELECT pk ...` over the plan when its filters cannot be applied to the
/// target table directly.
fn key_subquery(
    plan: &QueryPlan,
    aliases: &mut Aliases,
    dialect: Dialect,
) -> QueryResult<Option<Query>> {
    let paginated = plan.limit_value().is_some() || plan.offset_value().is_some();
    let needs_select = paginated
        || plan
            .filters()
            .iter()
            .any(|f| plan.expr_aggregates(f) || reaches_relations(plan, f, 0));
    if !needs_select {
        return Ok(None);
    }

    let mut keyed = plan.project([plan.root().pk()])?;
    if !paginated {
        keyed = keyed.clear_ordering();
    }
    let built = select::build(&keyed, Mode::Rows, None, aliases, dialect)?;
    Ok(Some(built.query))
}

/// Whether `expr` references a field through a relation, following aliases.
fn reaches_relations(plan: &QueryPlan, expr: &Expr, depth: usize) -> bool {
    if depth > plan.annotations().len() {
        return false;
    }
    if expr.field_refs().iter().any(|r| !r.is_local()) {
        return true;
    }
    expr.aliases().into_iter().any(|a| {
        plan.annotation(a)
            .is_some_and(|inner| reaches_relations(plan, inner, depth + 1))
    })
}
