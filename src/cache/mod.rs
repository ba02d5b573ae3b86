//! In-memory memo of compiled statements.
//!
//! Compilation is a pure function of the plan and the dialect, so the
//! result can be reused for any structurally equal plan. Entries are keyed
//! by a SHA-256 fingerprint of `(kind, dialect, plan)`.
//!
//! # Key Format
//!
//! ```text
//! sha256(["rows",   "sqlite", <plan>]) -> CompiledQuery
//! sha256(["count",  "sqlite", <plan>]) -> CompiledStatement
//! sha256(["exists", "sqlite", <plan>]) -> CompiledStatement
//! ```

mod hash;
pub use hash::compute_hash;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::compile::{CompiledQuery, CompiledStatement};
use crate::error::QueryResult;
use crate::plan::QueryPlan;
use crate::sql::Dialect;

/// What a cached statement computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Rows,
    Count,
    Exists,
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Thread-safe memo of compiled plans.
#[derive(Debug, Default)]
pub struct CompileCache {
    queries: DashMap<String, Arc<CompiledQuery>>,
    statements: DashMap<String, Arc<CompiledStatement>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CompileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint of a plan compiled for `kind` in `dialect`. `None` when
    /// the plan cannot be serialized, in which case it is never cached.
    pub fn fingerprint(kind: StatementKind, dialect: Dialect, plan: &QueryPlan) -> Option<String> {
        match compute_hash(&(kind, dialect, plan)) {
            Ok(key) => Some(key),
            Err(e) => {
                debug!(error = %e, "quarry.cache.unhashable");
                None
            }
        }
    }

    /// Return the cached row query or compile and remember it.
    pub fn query_or_compile(
        &self,
        dialect: Dialect,
        plan: &QueryPlan,
        compile: impl FnOnce() -> QueryResult<CompiledQuery>,
    ) -> QueryResult<Arc<CompiledQuery>> {
        let Some(key) = Self::fingerprint(StatementKind::Rows, dialect, plan) else {
            return compile().map(Arc::new);
        };
        if let Some(hit) = self.queries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(compile()?);
        self.queries.insert(key, compiled.clone());
        Ok(compiled)
    }

    /// Return the cached single statement or compile and remember it.
    pub fn statement_or_compile(
        &self,
        kind: StatementKind,
        dialect: Dialect,
        plan: &QueryPlan,
        compile: impl FnOnce() -> QueryResult<CompiledStatement>,
    ) -> QueryResult<Arc<CompiledStatement>> {
        let Some(key) = Self::fingerprint(kind, dialect, plan) else {
            return compile().map(Arc::new);
        };
        if let Some(hit) = self.statements.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(compile()?);
        self.statements.insert(key, compiled.clone());
        Ok(compiled)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.queries.len() + self.statements.len(),
        }
    }

    pub fn clear(&self) {
        self.queries.clear();
        self.statements.clear();
    }
}
