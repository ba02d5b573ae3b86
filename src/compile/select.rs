//! SELECT construction: output columns, joins, grouping and pagination.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::expr::{Expr, FieldRef};
use crate::plan::{Direction, LoadStrategy, ProjectionKind, QueryPlan};
use crate::schema::Entity;
use crate::sql::expr::{count_star, lit_int};
use crate::sql::{
    Dialect, Expr as SqlExpr, FromItem, OrderByExpr, Query, SelectExpr,
};

use super::lower::Lowerer;
use super::scope::{Aliases, Outer, Role, Scope};
use super::{ColumnSource, OutputColumn, ResultShape};

/// What the statement is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Full row fetch in the plan's result shape.
    Rows,
    /// Single-column scalar subquery.
    Scalar,
    /// `SELECT 1 ...` existence test.
    Exists,
    /// `SELECT COUNT(*) ...`
    Count,
}

pub(crate) struct Select {
    pub query: Query,
    pub columns: Vec<OutputColumn>,
    pub shape: ResultShape,
}

/// A planned output column before lowering.
struct Output {
    column: OutputColumn,
    expr: Expr,
    role: Role,
    select_alias: Option<String>,
}

/// Build the statement for `plan`.
pub(crate) fn build(
    plan: &QueryPlan,
    mode: Mode,
    outer: Option<Outer>,
    aliases: &mut Aliases,
    dialect: Dialect,
) -> QueryResult<Select> {
    let root = plan.root().clone();
    let (outputs, shape) = outputs(plan, mode)?;

    let grouped = plan.has_aggregates()
        || plan.filters().iter().any(|f| plan.expr_aggregates(f))
        || plan.ordering().iter().any(|o| plan.expr_aggregates(&o.expr));
    if grouped {
        check_grouping(plan, &outputs)?;
    }

    let alias = aliases.fresh();
    let scope = Scope::select(plan.schema().clone(), root, alias, outer);
    let mut lowerer = Lowerer::new(plan, scope, aliases, dialect);

    let mut select_list = Vec::with_capacity(outputs.len());
    let mut group_by = Vec::new();
    for out in &outputs {
        let expr = lowerer.lower(&out.expr, out.role)?;
        if grouped && !plan.expr_aggregates(&out.expr) {
            group_by.push(expr.clone());
        }
        select_list.push(SelectExpr {
            expr,
            alias: out.select_alias.clone(),
        });
    }

    let mut where_parts = Vec::new();
    let mut having_parts = Vec::new();
    for filter in plan.filters() {
        if plan.expr_aggregates(filter) {
            having_parts.push(lowerer.lower(filter, Role::Annotation)?);
        } else {
            where_parts.push(lowerer.lower(filter, Role::Filter)?);
        }
    }

    let mut order_by = Vec::new();
    for key in plan.ordering() {
        let expr = lowerer.lower(&key.expr, Role::Output)?;
        order_by.push(match key.direction {
            Direction::Asc => OrderByExpr::asc(expr),
            Direction::Desc => OrderByExpr::desc(expr),
        });
    }

    let Lowerer { scope, aliases, .. } = lowerer;

    let mut query = Query::new().select(select_list).from(scope.table_ref());
    query.joins = scope.joins();
    for part in where_parts {
        query = query.filter(part);
    }
    query = query.group_by(group_by);
    for part in having_parts {
        query = query.having(part);
    }
    query = query.order_by(order_by);
    if let Some(n) = plan.limit_value() {
        query = query.limit(n);
    }
    if let Some(n) = plan.offset_value() {
        query = query.offset(n);
    }
    if plan.is_distinct() {
        query = query.distinct();
    }

    let paginated = plan.limit_value().is_some() || plan.offset_value().is_some();
    let wrap = grouped || plan.is_distinct() || paginated;

    let query = match mode {
        Mode::Rows | Mode::Scalar => query,
        Mode::Exists => reduce(query, wrap, paginated, lit_int(1), aliases),
        Mode::Count => reduce(query, wrap, paginated, count_star(), aliases),
    };

    Ok(Select {
        query,
        columns: outputs.into_iter().map(|o| o.column).collect(),
        shape,
    })
}

/// Replace the output of `query` with a single `column`. Grouped, distinct
/// and paginated queries are wrapped in a derived table so the column is
/// computed over their rows.
fn reduce(
    mut query: Query,
    wrap: bool,
    paginated: bool,
    column: SqlExpr,
    aliases: &mut Aliases,
) -> Query {
    if !paginated {
        query.order_by.clear();
    }
    if wrap {
        Query::new()
            .select(vec![column])
            .from(FromItem::Derived {
                query: Box::new(query),
                alias: aliases.fresh(),
            })
    } else {
        query.select = vec![SelectExpr::new(column)];
        query
    }
}

// =============================================================================
// Output columns
// =============================================================================

fn outputs(plan: &QueryPlan, mode: Mode) -> QueryResult<(Vec<Output>, ResultShape)> {
    let root = plan.root();
    let entity = root.name().to_string();

    if mode == Mode::Scalar {
        let names = plan
            .projection()
            .map(|p| p.names.as_slice())
            .unwrap_or_default();
        if names.len() != 1 {
            return Err(QueryError::UnsupportedCorrelation(format!(
                "subquery on `{entity}` must project exactly one column, found {}",
                names.len()
            )));
        }
        let out = named_output(plan, &names[0])?;
        let shape = ResultShape::Mapping {
            keys: names.to_vec(),
        };
        return Ok((vec![out], shape));
    }

    match plan.projection() {
        None => {
            let mut outs = root_fields(plan, root, root.fields().iter().map(|f| f.name.as_str()))?;
            outs.extend(joined_fields(plan)?);
            for annotation in plan.annotations() {
                outs.push(annotation_output(plan, &annotation.alias)?);
            }
            Ok((outs, ResultShape::Record { entity }))
        }

        Some(p) if p.kind == ProjectionKind::Mapping => {
            let outs = p
                .names
                .iter()
                .map(|name| named_output(plan, name))
                .collect::<QueryResult<Vec<_>>>()?;
            Ok((
                outs,
                ResultShape::Mapping {
                    keys: p.names.as_ref().clone(),
                },
            ))
        }

        Some(p) => {
            // Narrowed records always carry their key and the columns their
            // declared relations are re-associated on.
            let mut fields: Vec<&str> = vec![root.pk()];
            for (name, strategy) in plan.relations() {
                if *strategy == LoadStrategy::None {
                    continue;
                }
                if let Some(rel) = root.relation(name) {
                    fields.push(&rel.local_column);
                }
            }
            let mut annotations = Vec::new();
            for name in p.names.iter() {
                if plan.annotation(name).is_some() {
                    annotations.push(name.as_str());
                } else if let Some(f) = root.field(name) {
                    fields.push(&f.name);
                }
            }
            let mut seen = HashSet::new();
            fields.retain(|f| seen.insert(*f));

            let mut outs = root_fields(plan, root, fields.iter().copied())?;
            outs.extend(joined_fields(plan)?);
            for alias in annotations {
                outs.push(annotation_output(plan, alias)?);
            }
            let shape = ResultShape::NarrowedRecord {
                entity,
                fields: fields.iter().map(|f| f.to_string()).collect(),
            };
            Ok((outs, shape))
        }
    }
}

fn root_fields<'f>(
    plan: &QueryPlan,
    root: &Entity,
    names: impl Iterator<Item = &'f str>,
) -> QueryResult<Vec<Output>> {
    names
        .map(|name| {
            let r = FieldRef::resolve(plan.schema(), root.name(), name)?;
            Ok(Output {
                column: OutputColumn {
                    key: r.column().to_string(),
                    source: ColumnSource::Root,
                    ty: Some(r.ty()),
                },
                expr: Expr::Field(r),
                role: Role::Output,
                select_alias: None,
            })
        })
        .collect()
}

/// Columns of every relation declared with the `join` strategy.
fn joined_fields(plan: &QueryPlan) -> QueryResult<Vec<Output>> {
    let mut outs = Vec::new();
    for (name, strategy) in plan.relations() {
        if *strategy != LoadStrategy::Join {
            continue;
        }
        let rel = plan
            .root()
            .relation(name)
            .ok_or_else(|| QueryError::unknown_path(plan.root().name(), name.as_str()))?;
        let target: Arc<Entity> = plan.schema().entity(&rel.target)?.clone();
        for field in target.fields() {
            let r = FieldRef::resolve(
                plan.schema(),
                plan.root().name(),
                &format!("{name}.{}", field.name),
            )?;
            outs.push(Output {
                column: OutputColumn {
                    key: field.name.clone(),
                    source: ColumnSource::Joined {
                        relation: name.clone(),
                    },
                    ty: Some(field.ty),
                },
                expr: Expr::Field(r),
                role: Role::Strategy,
                select_alias: None,
            });
        }
    }
    Ok(outs)
}

fn annotation_output(plan: &QueryPlan, alias: &str) -> QueryResult<Output> {
    let expr = plan
        .annotation(alias)
        .ok_or_else(|| QueryError::unknown_path(plan.root().name(), alias))?;
    let ty = match expr {
        Expr::Field(r) => Some(r.ty()),
        _ => None,
    };
    Ok(Output {
        column: OutputColumn {
            key: alias.to_string(),
            source: ColumnSource::Annotation,
            ty,
        },
        expr: Expr::Alias(alias.to_string()),
        role: Role::Annotation,
        select_alias: Some(alias.to_string()),
    })
}

/// A projected name: an annotation alias or a field path.
fn named_output(plan: &QueryPlan, name: &str) -> QueryResult<Output> {
    if plan.annotation(name).is_some() {
        return annotation_output(plan, name);
    }
    let r = FieldRef::resolve(plan.schema(), plan.root().name(), name)?;
    let source = if r.is_local() {
        ColumnSource::Root
    } else {
        ColumnSource::Path
    };
    Ok(Output {
        column: OutputColumn {
            key: name.to_string(),
            source,
            ty: Some(r.ty()),
        },
        expr: Expr::Field(r),
        role: Role::Output,
        select_alias: Some(name.to_string()),
    })
}

// =============================================================================
// Grouping
// =============================================================================

/// Every non-aggregate output is part of the group key. Aggregate outputs,
/// HAVING predicates and order keys may only reference bare fields that
/// are in the key.
fn check_grouping(plan: &QueryPlan, outputs: &[Output]) -> QueryResult<()> {
    let mut grouped_fields = HashSet::new();
    let mut grouped_aliases = HashSet::new();
    for out in outputs {
        if plan.expr_aggregates(&out.expr) {
            continue;
        }
        if let Expr::Alias(a) = &out.expr {
            grouped_aliases.insert(a.clone());
        }
        if let Some(r) = plain_field(plan, &out.expr, 0) {
            grouped_fields.insert(field_key(r));
        }
    }

    let ungrouped = |expr: &Expr| -> Option<String> {
        let mut bare = Vec::new();
        bare_fields(plan, expr, 0, &mut bare);
        bare.into_iter().find(|b| !grouped_fields.contains(b))
    };

    for out in outputs {
        if plan.expr_aggregates(&out.expr) {
            if let Some(field) = ungrouped(&out.expr) {
                return Err(QueryError::AmbiguousGrouping(format!(
                    "`{}` mixes an aggregate with `{field}`, which is not in the group key",
                    out.column.key
                )));
            }
        }
    }

    for filter in plan.filters() {
        if plan.expr_aggregates(filter) {
            if let Some(field) = ungrouped(filter) {
                return Err(QueryError::AmbiguousGrouping(format!(
                    "aggregate filter references `{field}`, which is not in the group key"
                )));
            }
        }
    }

    for key in plan.ordering() {
        if let Expr::Alias(a) = &key.expr {
            if grouped_aliases.contains(a) {
                continue;
            }
        }
        if let Some(field) = ungrouped(&key.expr) {
            return Err(QueryError::AmbiguousGrouping(format!(
                "order key `{field}` is neither aggregated nor in the group key"
            )));
        }
    }

    Ok(())
}

/// Canonical name of a field reference: relation hops plus column.
fn field_key(r: &FieldRef) -> String {
    let mut key: Vec<&str> = r.hops().iter().map(|h| h.name.as_str()).collect();
    key.push(r.column());
    key.join(".")
}

/// The field an expression is, following annotation aliases.
fn plain_field<'p>(plan: &'p QueryPlan, expr: &'p Expr, depth: usize) -> Option<&'p FieldRef> {
    match expr {
        Expr::Field(r) => Some(r),
        Expr::Alias(a) if depth <= plan.annotations().len() => {
            plain_field(plan, plan.annotation(a)?, depth + 1)
        }
        _ => None,
    }
}

/// Fields referenced outside any aggregate call.
fn bare_fields(plan: &QueryPlan, expr: &Expr, depth: usize, out: &mut Vec<String>) {
    match expr {
        Expr::Aggregate { .. } => {}
        Expr::Field(r) => out.push(field_key(r)),
        Expr::Alias(a) => {
            if depth <= plan.annotations().len() {
                if let Some(inner) = plan.annotation(a) {
                    bare_fields(plan, inner, depth + 1, out);
                }
            }
        }
        Expr::Correlated(sub) | Expr::Exists { plan: sub, .. } => {
            for r in sub.outer_refs() {
                if let Some(f) = plan.root().field(r.field()) {
                    out.push(f.name.clone());
                }
            }
        }
        other => {
            for child in other.children() {
                bare_fields(plan, child, depth, out);
            }
        }
    }
}
