#[path = "../common/mod.rs"]
mod common;

use quarry::compile::Compiler;
use quarry::error::QueryError;
use quarry::expr::{count_star, exists, not_exists, Correlated, ExprExt, OuterRef, Value};
use quarry::plan::{Direction, QueryPlan};
use quarry::sql::Dialect;

fn latest_headline(entries: &QueryPlan) -> Correlated {
    let latest = entries
        .filter(entries.f("blog_id").unwrap().eq(OuterRef::new("id")))
        .order_by_desc("pub_date")
        .unwrap()
        .limit(1)
        .project(["headline"])
        .unwrap();
    Correlated::new(latest)
}

#[tokio::test]
async fn test_latest_headline_per_blog() {
    let engine = common::engine().await;
    let entries = engine.plan("entry").unwrap();
    let blogs = engine
        .plan("blog")
        .unwrap()
        .annotate("latest", latest_headline(&entries))
        .unwrap()
        .order_by("id", Direction::Asc)
        .unwrap();

    let blogs = engine.fetch(&blogs).await.unwrap().into_records().unwrap();
    let latest: Vec<Value> = blogs.iter().map(|b| b.get("latest").unwrap()).collect();
    assert_eq!(
        latest,
        vec![Value::from("Epstein"), Value::Null, Value::from("Brie")]
    );
    // One statement, no per-row round trips.
    assert_eq!(engine.storage().len(), 1);
}

#[tokio::test]
async fn test_correlated_count_in_projection() {
    let engine = common::engine().await;
    let entries = engine.plan("entry").unwrap();
    let per_blog = entries
        .filter(entries.f("blog_id").unwrap().eq(OuterRef::new("id")))
        .annotate("n", count_star())
        .unwrap()
        .project(["n"])
        .unwrap();
    let blogs = engine
        .plan("blog")
        .unwrap()
        .annotate("entry_count", Correlated::new(per_blog))
        .unwrap()
        .project(["name", "entry_count"])
        .unwrap()
        .order_by("id", Direction::Asc)
        .unwrap();

    let rows = engine.fetch(&blogs).await.unwrap().into_mappings().unwrap();
    let counts: Vec<Option<i64>> = rows
        .iter()
        .map(|m| m.get("entry_count").unwrap().as_i64())
        .collect();
    assert_eq!(counts, vec![Some(5), Some(0), Some(1)]);
}

#[tokio::test]
async fn test_exists_and_not_exists_filters() {
    let engine = common::engine().await;
    let entries = engine.plan("entry").unwrap();
    let linked = entries.filter(entries.f("blog_id").unwrap().eq(OuterRef::new("id")));

    let blogs = engine.plan("blog").unwrap();
    let with_top_rated = blogs.filter(exists(
        linked.filter(linked.f("rating").unwrap().eq(5)),
    ));
    let empty = blogs.filter(not_exists(linked.clone()));

    let names = |records: Vec<quarry::materialize::Record>| -> Vec<Value> {
        records.iter().map(|r| r.get("name").unwrap()).collect()
    };

    let top = engine.fetch(&with_top_rated).await.unwrap().into_records().unwrap();
    assert_eq!(names(top), vec![Value::from("Beatles Blog")]);

    let none = engine.fetch(&empty).await.unwrap().into_records().unwrap();
    assert_eq!(names(none), vec![Value::from("Empty Blog")]);
}

#[test]
fn test_subplan_is_reusable_across_outer_plans() {
    let schema = common::schema();
    let entries = schema.plan("entry").unwrap();
    let sub = latest_headline(&entries);

    let blogs = schema.plan("blog").unwrap();
    let a = blogs.annotate("latest", sub.clone()).unwrap();
    let b = blogs
        .filter(blogs.f("name").unwrap().contains("Blog"))
        .annotate("latest", sub)
        .unwrap();

    let compiler = Compiler::new(Dialect::Postgres);
    let a = compiler.compile(&a).unwrap().primary;
    let b = compiler.compile(&b).unwrap().primary;
    assert!(a.sql.contains("\"t1\".\"blog_id\" = \"t0\".\"id\""));
    assert!(b.sql.contains("\"t1\".\"blog_id\" = \"t0\".\"id\""));
    assert!(a.params.is_empty());
    assert_eq!(b.params, vec![Value::from("%Blog%")]);
}

#[test]
fn test_binding_to_unknown_outer_field() {
    let schema = common::schema();
    let entries = schema.plan("entry").unwrap();
    let sub = entries
        .filter(entries.f("blog_id").unwrap().eq(OuterRef::new("owner_id")))
        .project(["headline"])
        .unwrap();
    let blogs = schema
        .plan("blog")
        .unwrap()
        .annotate("x", Correlated::new(sub))
        .unwrap();

    assert!(matches!(
        Compiler::default().compile(&blogs),
        Err(QueryError::UnknownPath { ref path, .. }) if path == "owner_id"
    ));
}

#[test]
fn test_subplan_must_project_one_column() {
    let schema = common::schema();
    let entries = schema.plan("entry").unwrap();
    let sub = entries.filter(entries.f("blog_id").unwrap().eq(OuterRef::new("id")));
    let blogs = schema
        .plan("blog")
        .unwrap()
        .annotate("x", Correlated::new(sub))
        .unwrap();

    assert!(matches!(
        Compiler::default().compile(&blogs),
        Err(QueryError::UnsupportedCorrelation(_))
    ));
}

#[test]
fn test_outer_binding_outside_subplan_is_rejected() {
    let schema = common::schema();
    let blogs = schema.plan("blog").unwrap();
    let blogs = blogs.filter(blogs.f("id").unwrap().eq(OuterRef::new("id")));

    assert!(matches!(
        Compiler::default().compile(&blogs),
        Err(QueryError::UnsupportedCorrelation(_))
    ));
}
