//! SQLite collaborator over `rusqlite`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use tokio::task;

use super::{Row, Storage, StorageError, StorageResult};
use crate::expr::Value;

/// A single SQLite connection shared behind a mutex.
///
/// Statements run on the blocking thread pool so the async caller is never
/// parked on disk I/O.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path).map_err(backend)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run semicolon-separated statements without parameters, e.g. DDL.
    pub async fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        let sql = sql.to_string();
        self.with_conn(move |conn| conn.execute_batch(&sql).map_err(backend))
            .await
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StorageError::Backend("connection lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))?
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn execute(&self, sql: &str, params: &[Value]) -> StorageResult<Vec<Row>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&sql).map_err(backend)?;
            let width = stmt.column_count();
            let mut rows = stmt
                .query(params_from_iter(params.iter()))
                .map_err(backend)?;

            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(backend)? {
                let mut values = Vec::with_capacity(width);
                for index in 0..width {
                    let raw = row.get_ref(index).map_err(backend)?;
                    values.push(from_sql(index, raw)?);
                }
                out.push(values);
            }
            Ok(out)
        })
        .await
    }

    async fn execute_write(&self, sql: &str, params: &[Value]) -> StorageResult<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&sql).map_err(backend)?;
            let changed = stmt
                .execute(params_from_iter(params.iter()))
                .map_err(backend)?;
            Ok(changed as u64)
        })
        .await
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(n) => ToSqlOutput::Owned(SqlValue::Integer(*n)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn from_sql(index: usize, raw: ValueRef<'_>) -> StorageResult<Value> {
    match raw {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(n) => Ok(Value::Int(n)),
        ValueRef::Real(f) => Ok(Value::Float(f)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| Value::Text(s.to_string()))
            .map_err(|e| StorageError::Conversion {
                index,
                reason: e.to_string(),
            }),
        ValueRef::Blob(_) => Err(StorageError::Conversion {
            index,
            reason: "blob columns are not supported".into(),
        }),
    }
}

fn backend(e: rusqlite::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}
