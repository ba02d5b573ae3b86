//! Secondary statements for relations loaded with the `batched` strategy.

use crate::error::{QueryError, QueryResult};
use crate::expr::Value;
use crate::plan::{LoadStrategy, QueryPlan};
use crate::schema::Cardinality;
use crate::sql::expr::{param, table_col};
use crate::sql::{Dialect, Expr as SqlExpr, ExprExt as _, OrderByExpr, Query, TableRef};

use super::{ColumnSource, CompiledStatement, OutputColumn};

const ALIAS: &str = "t0";

/// A relation fetch keyed by values taken from the primary result.
///
/// The statement selects every field of the target, filtered by
/// `remote_key IN (...)` and ordered by the target's primary key. The key
/// list is only known after the primary statement ran, so the statement is
/// rendered on demand by [`BatchFetch::render`].
#[derive(Debug, Clone)]
pub struct BatchFetch {
    pub relation: String,
    pub cardinality: Cardinality,
    pub target: String,
    /// Column of the primary result holding the join key.
    pub local_key: String,
    pub local_index: usize,
    /// Column of the secondary result the rows are grouped by.
    pub remote_key: String,
    pub key_index: usize,
    pub columns: Vec<OutputColumn>,
    query: Query,
    key_column: SqlExpr,
    dialect: Dialect,
}

impl BatchFetch {
    /// Render the statement for one chunk of keys.
    pub fn render(&self, keys: &[Value]) -> CompiledStatement {
        let values = keys.iter().cloned().map(param).collect();
        let query = self
            .query
            .clone()
            .filter(self.key_column.clone().in_list(values));
        CompiledStatement::new(query.render(self.dialect), self.columns.clone())
    }
}

/// One fetch per relation declared `batched`, in relation name order.
pub(crate) fn build(
    plan: &QueryPlan,
    primary: &[OutputColumn],
    dialect: Dialect,
) -> QueryResult<Vec<BatchFetch>> {
    let root = plan.root();
    let mut fetches = Vec::new();

    for (name, strategy) in plan.relations() {
        if *strategy != LoadStrategy::Batched {
            continue;
        }
        let rel = root
            .relation(name)
            .ok_or_else(|| QueryError::unknown_path(root.name(), name.as_str()))?;
        let target = plan.schema().entity(&rel.target)?;

        let local_index = primary
            .iter()
            .position(|c| c.source == ColumnSource::Root && c.key == rel.local_column)
            .ok_or_else(|| QueryError::unknown_path(root.name(), rel.local_column.as_str()))?;
        let key_index = target
            .fields()
            .iter()
            .position(|f| f.name == rel.remote_column)
            .ok_or_else(|| QueryError::unknown_path(target.name(), rel.remote_column.as_str()))?;

        let columns: Vec<OutputColumn> = target
            .fields()
            .iter()
            .map(|f| OutputColumn {
                key: f.name.clone(),
                source: ColumnSource::Root,
                ty: Some(f.ty),
            })
            .collect();

        let select: Vec<SqlExpr> = target
            .fields()
            .iter()
            .map(|f| table_col(ALIAS, &f.name))
            .collect();
        let query = Query::new()
            .select(select)
            .from(TableRef::new(target.table()).with_alias(ALIAS))
            .order_by(vec![OrderByExpr::asc(table_col(ALIAS, target.pk()))]);

        fetches.push(BatchFetch {
            relation: name.clone(),
            cardinality: rel.cardinality,
            target: target.name().to_string(),
            local_key: rel.local_column.clone(),
            local_index,
            remote_key: rel.remote_column.clone(),
            key_index,
            columns,
            query,
            key_column: table_col(ALIAS, &rel.remote_column),
            dialect,
        });
    }

    Ok(fetches)
}
