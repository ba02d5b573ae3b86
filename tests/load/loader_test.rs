#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quarry::config::EngineSettings;
use quarry::error::{ErrorKind, QueryError};
use quarry::expr::{ExprExt, Value};
use quarry::load::CancelHandle;
use quarry::plan::{Direction, LoadStrategy};
use quarry::storage::{Row, Storage, StorageError, StorageResult};
use quarry::Engine;

fn headlines(records: &[quarry::materialize::Record]) -> Vec<Value> {
    records.iter().map(|r| r.get("headline").unwrap()).collect()
}

#[tokio::test]
async fn test_batched_matches_per_record_queries() {
    let engine = common::engine().await;
    let plan = engine
        .plan("blog")
        .unwrap()
        .with_relation("entries", LoadStrategy::Batched)
        .unwrap()
        .order_by("id", Direction::Asc)
        .unwrap();
    let blogs = engine.fetch(&plan).await.unwrap().into_records().unwrap();
    assert_eq!(blogs.len(), 3);
    // One primary plus one batched statement.
    assert_eq!(engine.storage().len(), 2);

    for blog in &blogs {
        let entries = engine.plan("entry").unwrap();
        let naive = entries
            .filter(entries.f("blog_id").unwrap().eq(blog.pk().unwrap()))
            .order_by("id", Direction::Asc)
            .unwrap();
        let naive = engine.fetch(&naive).await.unwrap().into_records().unwrap();
        let batched = blog.related("entries").unwrap().as_many();
        assert_eq!(headlines(batched), headlines(&naive));
    }
}

#[tokio::test]
async fn test_empty_primary_issues_no_secondary() {
    let engine = common::engine().await;
    let plan = engine.plan("blog").unwrap();
    let plan = plan
        .filter(plan.f("name").unwrap().eq("No Such Blog"))
        .with_relation("entries", LoadStrategy::Batched)
        .unwrap();

    let result = engine.fetch(&plan).await.unwrap();
    assert!(result.is_empty());
    assert_eq!(engine.storage().len(), 1);
    assert_eq!(engine.stats().secondary, 0);
}

#[tokio::test]
async fn test_keys_are_chunked_by_batch_size() {
    let engine = common::engine_with(EngineSettings::default().with_batch_size(2)).await;
    let plan = engine
        .plan("blog")
        .unwrap()
        .with_relation("entries", LoadStrategy::Batched)
        .unwrap()
        .order_by("id", Direction::Asc)
        .unwrap();

    let blogs = engine.fetch(&plan).await.unwrap().into_records().unwrap();
    let sizes: Vec<usize> = blogs
        .iter()
        .map(|b| b.related("entries").unwrap().len())
        .collect();
    assert_eq!(sizes, vec![5, 0, 1]);

    let stats = engine.stats();
    assert_eq!(stats.primary, 1);
    assert_eq!(stats.secondary, 2);

    let logged = engine.storage().statements();
    assert_eq!(logged.len(), 3);
    assert_eq!(logged[1].params, vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(logged[2].params, vec![Value::Int(3)]);
}

#[tokio::test]
async fn test_null_and_repeated_keys_are_not_bound() {
    let engine = common::engine().await;
    let plan = engine
        .plan("entry")
        .unwrap()
        .with_relation("author", LoadStrategy::Batched)
        .unwrap()
        .order_by("id", Direction::Asc)
        .unwrap();

    let entries = engine.fetch(&plan).await.unwrap().into_records().unwrap();
    let logged = engine.storage().statements();
    assert_eq!(logged.len(), 2);
    assert_eq!(logged[1].params, vec![Value::Int(1), Value::Int(2)]);

    let starr = &entries[3];
    assert_eq!(starr.get("headline").unwrap(), Value::from("Starr"));
    assert!(starr.related("author").unwrap().as_one().is_none());
    assert_eq!(starr.get("author.name").unwrap(), Value::Null);
    assert_eq!(entries[1].get("author.name").unwrap(), Value::from("Paul"));
}

#[tokio::test]
async fn test_concurrent_and_sequential_agree() {
    let mut results = Vec::new();
    for concurrent in [true, false] {
        let engine = common::engine_with(
            EngineSettings::default().with_concurrent_batches(concurrent),
        )
        .await;
        let plan = engine
            .plan("entry")
            .unwrap()
            .with_relation("blog", LoadStrategy::Batched)
            .unwrap()
            .with_relation("author", LoadStrategy::Batched)
            .unwrap()
            .order_by("id", Direction::Asc)
            .unwrap();
        let fetched = engine.fetch(&plan).await.unwrap();
        assert_eq!(engine.stats().secondary, 2);
        results.push(fetched.to_json());
    }
    assert_eq!(results[0], results[1]);
}

// =============================================================================
// Storage failures and cancellation
// =============================================================================

struct SlowStorage {
    delay: Duration,
}

#[async_trait]
impl Storage for SlowStorage {
    async fn execute(&self, _sql: &str, _params: &[Value]) -> StorageResult<Vec<Row>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![vec![Value::Int(1), Value::from("slow"), Value::Null]])
    }

    async fn execute_write(&self, _sql: &str, _params: &[Value]) -> StorageResult<u64> {
        tokio::time::sleep(self.delay).await;
        Ok(0)
    }
}

struct FailingStorage;

#[async_trait]
impl Storage for FailingStorage {
    async fn execute(&self, _sql: &str, _params: &[Value]) -> StorageResult<Vec<Row>> {
        Err(StorageError::Backend("connection reset".into()))
    }

    async fn execute_write(&self, _sql: &str, _params: &[Value]) -> StorageResult<u64> {
        Err(StorageError::Backend("connection reset".into()))
    }
}

#[tokio::test]
async fn test_cancel_abandons_in_flight_fetch() {
    let engine = Engine::with_schema(
        common::schema(),
        SlowStorage {
            delay: Duration::from_secs(30),
        },
        EngineSettings::default(),
    );
    let plan = engine.plan("blog").unwrap();
    let cancel = CancelHandle::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = engine.fetch_with_cancel(&plan, &cancel).await.unwrap_err();
    assert!(matches!(err, QueryError::Cancelled));
    assert_eq!(err.kind(), ErrorKind::Execution);
}

#[tokio::test]
async fn test_cancelled_handle_issues_nothing() {
    let engine = common::engine().await;
    let plan = engine.plan("blog").unwrap();
    let cancel = CancelHandle::new();
    cancel.cancel();

    let err = engine.fetch_with_cancel(&plan, &cancel).await.unwrap_err();
    assert!(matches!(err, QueryError::Cancelled));
    assert!(engine.storage().is_empty());
}

#[tokio::test]
async fn test_storage_error_is_propagated_unchanged() {
    let engine = Engine::with_schema(
        common::schema(),
        Arc::new(FailingStorage),
        EngineSettings::default(),
    );
    let plan = engine.plan("blog").unwrap();

    let err = engine.fetch(&plan).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(matches!(
        err,
        QueryError::Storage(StorageError::Backend(ref msg)) if msg == "connection reset"
    ));
    assert!(engine.delete(&plan).await.is_err());
}
