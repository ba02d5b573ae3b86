//! # Quarry
//!
//! A lazy, composable relational query engine that compiles query plans to
//! parameterized SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           Schema Registry (entities, relations)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [path resolution]
//! ┌─────────────────────────────────────────────────────────┐
//! │      QueryPlan + Expression AST (immutable, lazy)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compiler]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Parameterized SQL + batched relation fetch templates   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [loader → storage]
//! ┌─────────────────────────────────────────────────────────┐
//! │         Raw rows, related rows joined in memory          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [materializer]
//! ┌─────────────────────────────────────────────────────────┐
//! │                Records and Mappings                      │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod load;
pub mod materialize;
pub mod plan;
pub mod schema;
pub mod sql;
pub mod storage;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::EngineSettings;
    pub use crate::engine::Engine;
    pub use crate::error::{ErrorKind, QueryError, QueryResult};
    pub use crate::expr::{
        and_all, avg, count, count_distinct, count_star, exists, lit, max, min, not_exists,
        or_all, sum, Case, Correlated, Expr, ExprExt, OuterRef, Value,
    };
    pub use crate::load::CancelHandle;
    pub use crate::materialize::{Mapping, Materialized, Record, Related};
    pub use crate::plan::{Direction, LoadStrategy, QueryPlan};
    pub use crate::schema::{Cardinality, Entity, Registry, ScalarType, Schema};
    pub use crate::sql::Dialect;
    pub use crate::storage::{SqliteStorage, StatementLog, Storage, StorageError};
}

pub use engine::Engine;
pub use error::{ErrorKind, QueryError, QueryResult};
pub use plan::QueryPlan;
pub use schema::Registry;
