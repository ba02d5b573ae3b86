//! Statement execution and batched relation loading.
//!
//! The loader runs the primary statement, then one secondary statement per
//! `batched` relation keyed by the distinct join keys of the primary rows,
//! and attaches each secondary row to every primary row sharing its key.
//! The attachment is an in-memory equi-join, so a record's related rows are
//! exactly those a per-record query would return.

mod cancel;
mod stats;

pub use cancel::CancelHandle;
pub use stats::{LoadStats, LoadStatsSnapshot};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, instrument};

use crate::compile::{BatchFetch, CompiledQuery, CompiledStatement, OutputColumn};
use crate::error::QueryResult;
use crate::expr::Value;
use crate::schema::Cardinality;
use crate::storage::{Row, Storage};

/// Primary rows plus the related rows attached to each of them.
#[derive(Debug, Clone, Default)]
pub struct RawRowSet {
    pub columns: Vec<OutputColumn>,
    pub rows: Vec<Row>,
    /// One entry per batched relation, in relation name order.
    pub relations: Vec<AttachedRelation>,
}

impl RawRowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Secondary rows of one relation, grouped per primary row.
#[derive(Debug, Clone)]
pub struct AttachedRelation {
    pub relation: String,
    pub cardinality: Cardinality,
    pub target: String,
    pub columns: Vec<OutputColumn>,
    /// `per_row[i]` holds the related rows of primary row `i`, ordered by
    /// the target's primary key.
    pub per_row: Vec<Vec<Row>>,
}

/// Executes compiled queries against a [`Storage`].
#[derive(Debug, Clone)]
pub struct Loader {
    batch_size: usize,
    concurrent: bool,
    stats: Arc<LoadStats>,
}

impl Loader {
    pub fn new(batch_size: usize, concurrent: bool, stats: Arc<LoadStats>) -> Self {
        Self {
            batch_size: batch_size.max(1),
            concurrent,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<LoadStats> {
        &self.stats
    }

    /// Run the primary statement and every batched fetch.
    ///
    /// No secondary statement is issued when the primary result is empty or
    /// when the cancel handle fires during the primary statement.
    #[instrument(name = "quarry::load", level = "debug", skip_all, fields(batched = compiled.batched.len()))]
    pub async fn load<S: Storage + ?Sized>(
        &self,
        storage: &S,
        compiled: &CompiledQuery,
        cancel: &CancelHandle,
    ) -> QueryResult<RawRowSet> {
        let rows = query(storage, &compiled.primary, cancel).await?;
        self.stats.record_primary();

        let mut raw = RawRowSet {
            columns: compiled.primary.columns.clone(),
            rows,
            relations: Vec::with_capacity(compiled.batched.len()),
        };
        if raw.rows.is_empty() {
            raw.relations = compiled
                .batched
                .iter()
                .map(|fetch| attach(fetch, &[], Vec::new()))
                .collect();
            return Ok(raw);
        }

        let fetched = if self.concurrent {
            let calls = compiled
                .batched
                .iter()
                .map(|fetch| self.fetch_relation(storage, fetch, &raw.rows, cancel));
            join_all(calls)
                .await
                .into_iter()
                .collect::<QueryResult<Vec<_>>>()?
        } else {
            let mut out = Vec::with_capacity(compiled.batched.len());
            for fetch in &compiled.batched {
                out.push(self.fetch_relation(storage, fetch, &raw.rows, cancel).await?);
            }
            out
        };

        raw.relations = compiled
            .batched
            .iter()
            .zip(fetched)
            .map(|(fetch, related)| attach(fetch, &raw.rows, related))
            .collect();
        Ok(raw)
    }

    /// All secondary rows of one relation, one statement per key chunk.
    async fn fetch_relation<S: Storage + ?Sized>(
        &self,
        storage: &S,
        fetch: &BatchFetch,
        primary: &[Row],
        cancel: &CancelHandle,
    ) -> QueryResult<Vec<Row>> {
        let keys = distinct_keys(primary, fetch.local_index);
        let mut rows = Vec::new();
        for chunk in keys.chunks(self.batch_size) {
            let stmt = fetch.render(chunk);
            rows.extend(query(storage, &stmt, cancel).await?);
            self.stats.record_secondary();
        }
        Ok(rows)
    }
}

/// Run one statement, logging it.
pub(crate) async fn query<S: Storage + ?Sized>(
    storage: &S,
    stmt: &CompiledStatement,
    cancel: &CancelHandle,
) -> QueryResult<Vec<Row>> {
    debug!(sql = %stmt.sql, params = stmt.params.len(), "quarry.query");
    cancel.guard(storage.execute(&stmt.sql, &stmt.params)).await
}

/// Run one write statement, logging it.
pub(crate) async fn write<S: Storage + ?Sized>(
    storage: &S,
    stmt: &CompiledStatement,
) -> QueryResult<u64> {
    debug!(sql = %stmt.sql, params = stmt.params.len(), "quarry.query");
    Ok(storage.execute_write(&stmt.sql, &stmt.params).await?)
}

/// Non-null keys in first-seen order.
fn distinct_keys(rows: &[Row], index: usize) -> Vec<Value> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(index))
        .filter(|key| !key.is_null())
        .filter(|key| seen.insert((*key).clone()))
        .cloned()
        .collect()
}

/// Group secondary rows by their key and hand each primary row its group.
fn attach(fetch: &BatchFetch, primary: &[Row], related: Vec<Row>) -> AttachedRelation {
    let mut groups: HashMap<Value, Vec<Row>> = HashMap::new();
    for row in related {
        let Some(key) = row.get(fetch.key_index).cloned() else {
            continue;
        };
        groups.entry(key).or_default().push(row);
    }

    let per_row = primary
        .iter()
        .map(|row| match row.get(fetch.local_index) {
            Some(key) if !key.is_null() => groups.get(key).cloned().unwrap_or_default(),
            _ => Vec::new(),
        })
        .collect();

    AttachedRelation {
        relation: fetch.relation.clone(),
        cardinality: fetch.cardinality,
        target: fetch.target.clone(),
        columns: fetch.columns.clone(),
        per_row,
    }
}
