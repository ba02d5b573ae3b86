#[path = "../common/mod.rs"]
mod common;

use quarry::config::EngineSettings;
use quarry::error::{ErrorKind, QueryError};
use quarry::expr::{ExprExt, Value};
use quarry::materialize::Related;
use quarry::plan::{Direction, LoadStrategy};
use serde_json::json;

#[tokio::test]
async fn test_unloaded_relation_is_an_error_not_a_query() {
    let engine = common::engine().await;
    let plan = engine.plan("entry").unwrap().order_by("id", Direction::Asc).unwrap();
    let mut entries = engine.fetch(&plan).await.unwrap().into_records().unwrap();
    let before = engine.storage().len();

    let err = entries[0].related("blog").unwrap_err();
    assert!(matches!(err, QueryError::NotLoaded { ref name, .. } if name == "blog"));
    assert_eq!(err.kind(), ErrorKind::Materialization);

    let err = engine.load_related(&mut entries[0], "blog").await.unwrap_err();
    assert!(matches!(err, QueryError::NotLoaded { .. }));
    assert!(matches!(
        entries[0].related("tags"),
        Err(QueryError::UnknownPath { .. })
    ));
    assert_eq!(engine.storage().len(), before);
}

#[tokio::test]
async fn test_only_narrows_loaded_fields() {
    let engine = common::engine().await;
    let plan = engine
        .plan("entry")
        .unwrap()
        .only(["headline"])
        .unwrap()
        .order_by("id", Direction::Asc)
        .unwrap();
    let entries = engine.fetch(&plan).await.unwrap().into_records().unwrap();

    let first = &entries[0];
    assert_eq!(first.loaded_fields().collect::<Vec<_>>(), vec!["headline", "id"]);
    assert_eq!(first.get("headline").unwrap(), Value::from("Lennon"));
    assert!(matches!(
        first.get("rating"),
        Err(QueryError::NotLoaded { .. })
    ));
}

#[tokio::test]
async fn test_join_strategy_nests_related_record() {
    let engine = common::engine().await;
    let plan = engine
        .plan("entry")
        .unwrap()
        .with_relation("blog", LoadStrategy::Join)
        .unwrap()
        .with_relation("author", LoadStrategy::Join)
        .unwrap()
        .order_by("id", Direction::Asc)
        .unwrap();
    let entries = engine.fetch(&plan).await.unwrap().into_records().unwrap();
    assert_eq!(engine.storage().len(), 1);
    assert_eq!(entries.len(), 6);

    let brie = &entries[5];
    let blog = brie.related("blog").unwrap().as_one().unwrap();
    assert_eq!(blog.get("name").unwrap(), Value::from("Cheddar Talk"));
    assert_eq!(brie.get("blog.tagline").unwrap(), Value::from("Cheese, mostly."));

    // The outer join keeps Starr, whose author is unset.
    let starr = &entries[3];
    assert!(matches!(starr.related("author").unwrap(), Related::One(None)));
    assert_eq!(starr.get("author.name").unwrap(), Value::Null);
}

#[tokio::test]
async fn test_projection_yields_mappings_in_order() {
    let engine = common::engine().await;
    let plan = engine.plan("entry").unwrap();
    let plan = plan
        .filter(plan.f("rating").unwrap().gte(5))
        .project(["headline", "blog.name", "author.name"])
        .unwrap()
        .order_by("id", Direction::Asc)
        .unwrap();
    let result = engine.fetch(&plan).await.unwrap();

    assert_eq!(
        result.to_json(),
        json!([
            {"headline": "Lennon", "blog.name": "Beatles Blog", "author.name": "Joe"},
            {"headline": "Starr", "blog.name": "Beatles Blog", "author.name": null},
        ])
    );
    let rows = result.into_mappings().unwrap();
    assert_eq!(rows[0].keys(), ["headline", "blog.name", "author.name"]);
    assert!(rows[0].get("rating").is_err());
}

#[tokio::test]
async fn test_lazy_refetch_is_opt_in_and_counted() {
    let engine =
        common::engine_with(EngineSettings::default().with_lazy_refetch(true)).await;
    let plan = engine
        .plan("entry")
        .unwrap()
        .only(["headline"])
        .unwrap()
        .order_by("id", Direction::Asc)
        .unwrap();
    let mut entries = engine.fetch(&plan).await.unwrap().into_records().unwrap();
    engine.storage().clear();

    let rating = engine.load_field(&mut entries[1], "rating").await.unwrap();
    assert_eq!(rating, Value::Int(4));
    assert!(entries[1].is_loaded("rating"));
    assert_eq!(engine.stats().refetches, 1);

    // Loaded fields are read from the record.
    engine.load_field(&mut entries[1], "rating").await.unwrap();
    assert_eq!(engine.stats().refetches, 1);

    // Needs blog_id first, then the blog itself.
    let blog = engine.load_related(&mut entries[1], "blog").await.unwrap();
    assert_eq!(
        blog.as_one().unwrap().get("name").unwrap(),
        Value::from("Beatles Blog")
    );
    assert_eq!(engine.stats().refetches, 3);

    engine.load_related(&mut entries[1], "blog").await.unwrap();
    let stats = engine.stats();
    assert_eq!(stats.refetches, 3);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(engine.storage().len(), 3);
}

#[tokio::test]
async fn test_lazy_dotted_field_fetches_through_relation() {
    let plan = |engine: &common::TestEngine| {
        engine
            .plan("entry")
            .unwrap()
            .only(["headline"])
            .unwrap()
            .order_by("id", Direction::Asc)
            .unwrap()
    };

    let strict = common::engine().await;
    let mut entries = strict.fetch(&plan(&strict)).await.unwrap().into_records().unwrap();
    assert!(matches!(
        strict.load_field(&mut entries[0], "blog.name").await,
        Err(QueryError::NotLoaded { .. })
    ));

    let lazy =
        common::engine_with(EngineSettings::default().with_lazy_refetch(true)).await;
    let mut entries = lazy.fetch(&plan(&lazy)).await.unwrap().into_records().unwrap();
    let name = lazy.load_field(&mut entries[0], "blog.name").await.unwrap();
    assert_eq!(name, Value::from("Beatles Blog"));
    // blog_id, then the blog.
    assert_eq!(lazy.stats().refetches, 2);

    // Starr has no author.
    let author = lazy.load_field(&mut entries[3], "author.name").await.unwrap();
    assert_eq!(author, Value::Null);
}

#[tokio::test]
async fn test_batched_relation_counts_as_cache_hit() {
    let engine =
        common::engine_with(EngineSettings::default().with_lazy_refetch(true)).await;
    let plan = engine
        .plan("blog")
        .unwrap()
        .with_relation("entries", LoadStrategy::Batched)
        .unwrap()
        .order_by("id", Direction::Asc)
        .unwrap();
    let mut blogs = engine.fetch(&plan).await.unwrap().into_records().unwrap();

    for blog in blogs.iter_mut() {
        engine.load_related(blog, "entries").await.unwrap();
    }
    let stats = engine.stats();
    assert_eq!(stats.cache_hits, 3);
    assert_eq!(stats.refetches, 0);
    assert_eq!(stats.statements(), 2);
}

#[tokio::test]
async fn test_lazy_to_many_on_empty_parent() {
    let engine =
        common::engine_with(EngineSettings::default().with_lazy_refetch(true)).await;
    let plan = engine.plan("blog").unwrap();
    let plan = plan.filter(plan.f("name").unwrap().eq("Empty Blog"));
    let mut blogs = engine.fetch(&plan).await.unwrap().into_records().unwrap();

    let entries = engine.load_related(&mut blogs[0], "entries").await.unwrap();
    assert!(entries.is_empty());
    assert_eq!(blogs[0].get("tagline").unwrap(), Value::Null);
}
