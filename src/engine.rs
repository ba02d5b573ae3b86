//! The engine facade: compile, load and materialize against one storage.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::cache::{CacheStats, CompileCache, StatementKind};
use crate::compile::{CompiledQuery, CompiledStatement, Compiler};
use crate::config::EngineSettings;
use crate::error::{QueryError, QueryResult};
use crate::expr::{Expr, ExprExt, Value};
use crate::load::{self, CancelHandle, LoadStats, LoadStatsSnapshot, Loader, RawRowSet};
use crate::materialize::{self, Materialized, Record, Related};
use crate::plan::{Direction, QueryPlan};
use crate::schema::{Cardinality, Registry, Schema};
use crate::storage::Storage;

/// Runs plans against a [`Storage`].
///
/// # Example
///
/// ```ignore
/// let engine = Engine::new(&registry, SqliteStorage::open_in_memory()?, EngineSettings::default())?;
/// let entries = engine.plan("entry")?;
/// let top = entries.filter(entries.f("rating")?.gte(4)).order_by_desc("rating")?;
/// for record in engine.fetch(&top).await?.into_records().unwrap_or_default() {
///     println!("{}", record.get("headline")?);
/// }
/// ```
pub struct Engine<S> {
    schema: Arc<Schema>,
    storage: S,
    settings: EngineSettings,
    compiler: Compiler,
    cache: Option<CompileCache>,
    loader: Loader,
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("entities", &self.schema.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<S: Storage> Engine<S> {
    /// Create an engine over the registry's schema, sealing the registry.
    pub fn new(registry: &Registry, storage: S, settings: EngineSettings) -> QueryResult<Self> {
        Ok(Self::with_schema(registry.schema()?, storage, settings))
    }

    pub fn with_schema(schema: Arc<Schema>, storage: S, settings: EngineSettings) -> Self {
        let loader = Loader::new(
            settings.batch_size,
            settings.concurrent_batches,
            Arc::new(LoadStats::new()),
        );
        Self {
            schema,
            storage,
            compiler: Compiler::new(settings.dialect),
            cache: settings.compile_cache.then(CompileCache::new),
            settings,
            loader,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn stats(&self) -> LoadStatsSnapshot {
        self.loader.stats().snapshot()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(CompileCache::stats)
    }

    /// Start a plan rooted at `entity`.
    pub fn plan(&self, entity: &str) -> QueryResult<QueryPlan> {
        self.schema.plan(entity)
    }

    /// Compile a row fetch, reusing a cached compilation when enabled.
    pub fn compile(&self, plan: &QueryPlan) -> QueryResult<Arc<CompiledQuery>> {
        match &self.cache {
            Some(cache) => {
                cache.query_or_compile(self.compiler.dialect(), plan, || self.compiler.compile(plan))
            }
            None => self.compiler.compile(plan).map(Arc::new),
        }
    }

    fn cached_statement(
        &self,
        kind: StatementKind,
        plan: &QueryPlan,
        compile: impl FnOnce() -> QueryResult<CompiledStatement>,
    ) -> QueryResult<Arc<CompiledStatement>> {
        match &self.cache {
            Some(cache) => cache.statement_or_compile(kind, self.compiler.dialect(), plan, compile),
            None => compile().map(Arc::new),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn fetch(&self, plan: &QueryPlan) -> QueryResult<Materialized> {
        self.fetch_with_cancel(plan, &CancelHandle::new()).await
    }

    /// Fetch, abandoning the storage round trips once `cancel` fires.
    #[instrument(name = "quarry::fetch", level = "debug", skip_all, fields(entity = %plan.root().name()))]
    pub async fn fetch_with_cancel(
        &self,
        plan: &QueryPlan,
        cancel: &CancelHandle,
    ) -> QueryResult<Materialized> {
        let compiled = self.compile(plan)?;
        let raw = self.loader.load(&self.storage, &compiled, cancel).await?;
        debug!(rows = raw.len(), "quarry.fetch.loaded");
        materialize::materialize(&self.schema, raw, &compiled.shape)
    }

    /// Whether the plan selects at least one row.
    pub async fn exists(&self, plan: &QueryPlan) -> QueryResult<bool> {
        let stmt = self.cached_statement(StatementKind::Exists, plan, || {
            self.compiler.compile_exists(plan)
        })?;
        let rows = load::query(&self.storage, &stmt, &CancelHandle::new()).await?;
        self.loader.stats().record_primary();
        Ok(!rows.is_empty())
    }

    /// Number of rows the plan selects.
    pub async fn count(&self, plan: &QueryPlan) -> QueryResult<u64> {
        let stmt = self.cached_statement(StatementKind::Count, plan, || {
            self.compiler.compile_count(plan)
        })?;
        let rows = load::query(&self.storage, &stmt, &CancelHandle::new()).await?;
        self.loader.stats().record_primary();
        let n = rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(u64::try_from(n).unwrap_or(0))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply `assignments` to every row the plan selects.
    #[instrument(name = "quarry::update", level = "debug", skip_all, fields(entity = %plan.root().name()))]
    pub async fn update(&self, plan: &QueryPlan, assignments: &[(&str, Expr)]) -> QueryResult<u64> {
        let stmt = self.compiler.compile_update(plan, assignments)?;
        let changed = load::write(&self.storage, &stmt).await?;
        self.loader.stats().record_write();
        Ok(changed)
    }

    /// Delete every row the plan selects.
    #[instrument(name = "quarry::delete", level = "debug", skip_all, fields(entity = %plan.root().name()))]
    pub async fn delete(&self, plan: &QueryPlan) -> QueryResult<u64> {
        let stmt = self.compiler.compile_delete(plan)?;
        let changed = load::write(&self.storage, &stmt).await?;
        self.loader.stats().record_write();
        Ok(changed)
    }

    /// Insert one row. Returns the new primary key when the dialect can
    /// report it.
    #[instrument(name = "quarry::insert", level = "debug", skip(self, values))]
    pub async fn insert(&self, entity: &str, values: &[(&str, Value)]) -> QueryResult<Option<Value>> {
        let entity = self.schema.entity(entity)?;
        let stmt = self.compiler.compile_insert(entity, values)?;
        self.loader.stats().record_write();

        if stmt.columns.is_empty() {
            load::write(&self.storage, &stmt).await?;
            return Ok(None);
        }
        let rows = load::query(&self.storage, &stmt, &CancelHandle::new()).await?;
        let pk = rows.into_iter().next().and_then(|row| row.into_iter().next());
        Ok(pk.map(|v| match stmt.columns.first().and_then(|c| c.ty) {
            Some(ty) => ty.coerce(v),
            None => v,
        }))
    }

    // =========================================================================
    // Lazy loading
    // =========================================================================

    /// Read a field, fetching it when it is not loaded and lazy refetch is
    /// enabled. Without lazy refetch this is [`Record::get`].
    pub async fn load_field(&self, record: &mut Record, name: &str) -> QueryResult<Value> {
        match record.get(name) {
            Err(QueryError::NotLoaded { .. }) if self.settings.lazy_refetch => {}
            other => return other,
        }

        // `relation.field`: fetch the relation, then read through it.
        if let Some((head, _)) = name.split_once('.') {
            // Boxed: load_related reads the foreign key through load_field.
            Box::pin(self.load_related(record, head)).await?;
            return record.get(name);
        }

        let entity = record.entity().clone();
        let field = entity
            .field(name)
            .ok_or_else(|| QueryError::unknown_path(entity.name(), name))?
            .clone();
        let pk = record.pk()?;

        warn!(entity = %entity.name(), field = %field.name, "quarry.lazy_refetch");
        let plan = self.plan(entity.name())?;
        let plan = plan
            .filter(plan.f(entity.pk())?.eq(pk))
            .project([field.name.as_str()])?;
        let compiled = self.compile(&plan)?;
        let rows = load::query(&self.storage, &compiled.primary, &CancelHandle::new()).await?;
        self.loader.stats().record_refetch();

        let value = rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(|v| field.ty.coerce(v))
            .ok_or_else(|| QueryError::not_loaded(entity.name(), name))?;
        record.set_field(field.name.clone(), value.clone());
        Ok(value)
    }

    /// Related records, fetched with one statement when the relation is not
    /// loaded and lazy refetch is enabled. Loaded relations count as
    /// relation cache hits.
    pub async fn load_related<'r>(
        &self,
        record: &'r mut Record,
        name: &str,
    ) -> QueryResult<&'r Related> {
        if record.related(name).is_ok() {
            self.loader.stats().record_cache_hit();
            return record.related(name);
        }

        let entity = record.entity().clone();
        let rel = entity
            .relation(name)
            .ok_or_else(|| QueryError::unknown_path(entity.name(), name))?
            .clone();
        if !self.settings.lazy_refetch {
            return Err(QueryError::not_loaded(entity.name(), name));
        }

        let key = self.load_field(record, &rel.local_column).await?;
        let related = if key.is_null() {
            match rel.cardinality {
                Cardinality::ToOne => Related::One(None),
                Cardinality::ToMany => Related::Many(Vec::new()),
            }
        } else {
            warn!(entity = %entity.name(), relation = %name, "quarry.lazy_refetch");
            let target = self.schema.entity(&rel.target)?;
            let plan = self.plan(target.name())?;
            let plan = plan
                .filter(plan.f(&rel.remote_column)?.eq(key))
                .order_by(target.pk(), Direction::Asc)?;
            let compiled = self.compile(&plan)?;
            let rows = load::query(&self.storage, &compiled.primary, &CancelHandle::new()).await?;
            self.loader.stats().record_refetch();

            let raw = RawRowSet {
                columns: compiled.primary.columns.clone(),
                rows,
                relations: Vec::new(),
            };
            let records = materialize::materialize(&self.schema, raw, &compiled.shape)?
                .into_records()
                .unwrap_or_default();
            match rel.cardinality {
                Cardinality::ToOne => Related::One(records.into_iter().next().map(Box::new)),
                Cardinality::ToMany => Related::Many(records),
            }
        };

        record.set_related(name, related);
        record.related(name)
    }
}
