//! The storage boundary.
//!
//! The engine never talks to a database directly. Every statement goes
//! through a [`Storage`] implementation, which accepts statement text plus
//! positional parameters and returns rows aligned with the statement's
//! output columns. Retry, pooling and transactions belong to the
//! implementation.

mod log;
mod sqlite;

pub use log::{LoggedStatement, StatementLog};
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use thiserror::Error;

use crate::expr::Value;

/// One result row, positionally aligned with the statement's columns.
pub type Row = Vec<Value>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Opaque failure reported by a storage implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend rejected or failed the statement.
    #[error("storage error: {0}")]
    Backend(String),

    /// A returned value has no scalar representation.
    #[error("cannot convert column {index}: {reason}")]
    Conversion { index: usize, reason: String },

    /// The task running the statement died.
    #[error("storage task failed: {0}")]
    TaskFailed(String),
}

/// A collaborator that executes parameterized statements.
///
/// # Example
///
/// ```ignore
/// use quarry::storage::{SqliteStorage, Storage};
///
/// async fn example(storage: &impl Storage) -> StorageResult<()> {
///     let rows = storage.execute("SELECT 1", &[]).await?;
///     assert_eq!(rows.len(), 1);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Storage: Send + Sync {
    /// Run a statement that yields rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> StorageResult<Vec<Row>>;

    /// Run a statement for its effect, returning the affected row count.
    async fn execute_write(&self, sql: &str, params: &[Value]) -> StorageResult<u64>;
}

#[async_trait]
impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    async fn execute(&self, sql: &str, params: &[Value]) -> StorageResult<Vec<Row>> {
        (**self).execute(sql, params).await
    }

    async fn execute_write(&self, sql: &str, params: &[Value]) -> StorageResult<u64> {
        (**self).execute_write(sql, params).await
    }
}
