//! Statement-recording decorator.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{Row, Storage, StorageResult};
use crate::expr::Value;

/// A statement as it was sent to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Wraps a [`Storage`] and records every statement passed through it.
///
/// Used to assert round-trip counts, e.g. that a batched relation costs
/// exactly one extra statement regardless of the number of parent rows.
#[derive(Debug, Default)]
pub struct StatementLog<S> {
    inner: S,
    statements: Mutex<Vec<LoggedStatement>>,
}

impl<S> StatementLog<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Statements recorded so far, oldest first.
    pub fn statements(&self) -> Vec<LoggedStatement> {
        self.statements
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.statements.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut log) = self.statements.lock() {
            log.clear();
        }
    }

    fn record(&self, sql: &str, params: &[Value]) {
        if let Ok(mut log) = self.statements.lock() {
            log.push(LoggedStatement {
                sql: sql.to_string(),
                params: params.to_vec(),
            });
        }
    }
}

#[async_trait]
impl<S: Storage> Storage for StatementLog<S> {
    async fn execute(&self, sql: &str, params: &[Value]) -> StorageResult<Vec<Row>> {
        self.record(sql, params);
        self.inner.execute(sql, params).await
    }

    async fn execute_write(&self, sql: &str, params: &[Value]) -> StorageResult<u64> {
        self.record(sql, params);
        self.inner.execute_write(sql, params).await
    }
}
