//! Caller-driven cancellation of in-flight fetches.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::{QueryError, QueryResult};
use crate::storage::StorageResult;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cloneable token; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent cancel is not lost.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Run a storage call unless cancelled first, abandoning it on cancel.
    pub(crate) async fn guard<T>(
        &self,
        call: impl Future<Output = StorageResult<T>>,
    ) -> QueryResult<T> {
        if self.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(QueryError::Cancelled),
            result = call => result.map_err(QueryError::from),
        }
    }
}
