//! Plan compiler: lowers a [`QueryPlan`] to parameterized SQL.
//!
//! Compilation is a pure function of the plan and the target dialect:
//!
//! 1. Every relation path referenced by a filter, annotation, projection or
//!    order key becomes one join, shared by all references to the path.
//! 2. Relations declared `join` add their target's columns to the primary
//!    statement; relations declared `batched` produce a [`BatchFetch`]
//!    template instead.
//! 3. Correlated subplans are lowered into nested statements bound to the
//!    enclosing root table.
//! 4. Aggregate annotations group the rows by every non-aggregate output.
//! 5. Literals become bound parameters, numbered in textual order.

mod batch;
mod dml;
mod lower;
mod scope;
mod select;

pub use batch::BatchFetch;

use serde::Serialize;
use tracing::instrument;

use crate::error::QueryResult;
use crate::expr::{Expr, Value};
use crate::plan::QueryPlan;
use crate::schema::{Entity, ScalarType};
use crate::sql::{Dialect, Rendered};

use scope::Aliases;
use select::Mode;

// =============================================================================
// Compiler output
// =============================================================================

/// Where an output column's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnSource {
    /// A field of the root entity.
    Root,
    /// An annotation of the plan.
    Annotation,
    /// A field of a relation loaded with the `join` strategy.
    Joined { relation: String },
    /// A field reached through relations, projected into a mapping.
    Path,
}

/// One column of a statement's result, in select-list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputColumn {
    pub key: String,
    pub source: ColumnSource,
    /// Declared type when the column is a field; `None` for computed values.
    pub ty: Option<ScalarType>,
}

/// Statement text, bound parameters and the result columns it yields.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub columns: Vec<OutputColumn>,
}

impl CompiledStatement {
    pub(crate) fn new(rendered: Rendered, columns: Vec<OutputColumn>) -> Self {
        Self {
            sql: rendered.sql,
            params: rendered.params,
            columns,
        }
    }
}

/// How materialized rows are presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResultShape {
    /// Full records of the root entity.
    Record { entity: String },
    /// Records carrying only `fields` (plus annotations).
    NarrowedRecord { entity: String, fields: Vec<String> },
    /// Plain key/value mappings in `keys` order.
    Mapping { keys: Vec<String> },
}

/// The compiled form of a row-fetching plan.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub primary: CompiledStatement,
    /// One secondary fetch per `batched` relation.
    pub batched: Vec<BatchFetch>,
    pub shape: ResultShape,
}

// =============================================================================
// Compiler
// =============================================================================

/// Compiles plans for one SQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler {
    dialect: Dialect,
}

impl Compiler {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Compile a row fetch.
    #[instrument(name = "quarry::compile", level = "debug", skip_all, fields(entity = %plan.root().name()))]
    pub fn compile(&self, plan: &QueryPlan) -> QueryResult<CompiledQuery> {
        let mut aliases = Aliases::default();
        let built = select::build(plan, Mode::Rows, None, &mut aliases, self.dialect)?;

        // Mappings carry no records to attach relations to.
        let batched = match built.shape {
            ResultShape::Mapping { .. } => Vec::new(),
            _ => batch::build(plan, &built.columns, self.dialect)?,
        };

        Ok(CompiledQuery {
            primary: CompiledStatement::new(built.query.render(self.dialect), built.columns),
            batched,
            shape: built.shape,
        })
    }

    /// Compile a row-limited existence test yielding one constant column.
    #[instrument(name = "quarry::compile_exists", level = "debug", skip_all)]
    pub fn compile_exists(&self, plan: &QueryPlan) -> QueryResult<CompiledStatement> {
        let mut aliases = Aliases::default();
        let built = select::build(plan, Mode::Exists, None, &mut aliases, self.dialect)?;
        let query = built.query.limit(1);
        Ok(CompiledStatement::new(query.render(self.dialect), Vec::new()))
    }

    /// Compile a row count of the plan's result.
    #[instrument(name = "quarry::compile_count", level = "debug", skip_all)]
    pub fn compile_count(&self, plan: &QueryPlan) -> QueryResult<CompiledStatement> {
        let mut aliases = Aliases::default();
        let built = select::build(plan, Mode::Count, None, &mut aliases, self.dialect)?;
        let column = OutputColumn {
            key: "count".into(),
            source: ColumnSource::Annotation,
            ty: Some(ScalarType::Int),
        };
        Ok(CompiledStatement::new(
            built.query.render(self.dialect),
            vec![column],
        ))
    }

    /// Compile an UPDATE of every row the plan selects.
    #[instrument(name = "quarry::compile_update", level = "debug", skip_all)]
    pub fn compile_update(
        &self,
        plan: &QueryPlan,
        assignments: &[(&str, Expr)],
    ) -> QueryResult<CompiledStatement> {
        dml::update(plan, assignments, self.dialect)
    }

    /// Compile a DELETE of every row the plan selects.
    #[instrument(name = "quarry::compile_delete", level = "debug", skip_all)]
    pub fn compile_delete(&self, plan: &QueryPlan) -> QueryResult<CompiledStatement> {
        dml::delete(plan, self.dialect)
    }

    /// Compile a single-row INSERT, returning the new primary key where the
    /// dialect supports `RETURNING`.
    pub fn compile_insert(
        &self,
        entity: &Entity,
        values: &[(&str, Value)],
    ) -> QueryResult<CompiledStatement> {
        dml::insert(entity, values, self.dialect)
    }
}

// =============================================================================
// Tests
// =============================================================================
