#[path = "../common/mod.rs"]
mod common;

use quarry::compile::Compiler;
use quarry::error::{ErrorKind, QueryError};
use quarry::expr::{avg, count, max, sum, ExprExt, Value};
use quarry::plan::Direction;
use quarry::sql::Dialect;

#[tokio::test]
async fn test_average_rating_per_blog() {
    let engine = common::engine().await;
    let plan = engine.plan("entry").unwrap();
    let plan = plan
        .project(["blog_id"])
        .unwrap()
        .annotate("avg_rating", avg(plan.f("rating").unwrap()))
        .unwrap()
        .order_by("blog_id", Direction::Asc)
        .unwrap();

    let rows = engine.fetch(&plan).await.unwrap().into_mappings().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("blog_id").unwrap(), &Value::Int(1));
    assert_eq!(rows[0].get("avg_rating").unwrap().as_f64(), Some(3.4));
    assert_eq!(rows[1].get("blog_id").unwrap(), &Value::Int(3));
    assert_eq!(rows[1].get("avg_rating").unwrap().as_f64(), Some(3.0));
}

#[tokio::test]
async fn test_count_over_to_many_keeps_empty_groups() {
    let engine = common::engine().await;
    let plan = engine.plan("blog").unwrap();
    let plan = plan
        .annotate("n", count(plan.f("entries").unwrap()))
        .unwrap()
        .order_by("id", Direction::Asc)
        .unwrap();

    let blogs = engine.fetch(&plan).await.unwrap().into_records().unwrap();
    let counts: Vec<Option<i64>> = blogs
        .iter()
        .map(|b| b.get("n").unwrap().as_i64())
        .collect();
    assert_eq!(counts, vec![Some(5), Some(0), Some(1)]);
}

#[tokio::test]
async fn test_aggregate_filter_becomes_having() {
    let engine = common::engine().await;
    let plan = engine.plan("blog").unwrap();
    let plan = plan
        .annotate("n", count(plan.f("entries").unwrap()))
        .unwrap();
    let plan = plan.filter(plan.f("n").unwrap().gt(1));

    let sql = engine.compile(&plan).unwrap().primary.sql.clone();
    assert!(sql.contains("\nHAVING "), "{sql}");
    assert!(!sql.contains("\nWHERE "), "{sql}");

    let blogs = engine.fetch(&plan).await.unwrap().into_records().unwrap();
    assert_eq!(blogs.len(), 1);
    assert_eq!(blogs[0].get("name").unwrap(), Value::from("Beatles Blog"));
}

#[tokio::test]
async fn test_row_filter_and_aggregate_filter_together() {
    let engine = common::engine().await;
    let plan = engine.plan("author").unwrap();
    let plan = plan
        .annotate("total", sum(plan.f("entries.rating").unwrap()))
        .unwrap()
        .annotate("best", max(plan.f("entries.rating").unwrap()))
        .unwrap();
    let plan = plan
        .filter(plan.f("name").unwrap().ne("Nobody"))
        .filter(plan.f("total").unwrap().gte(10));

    let sql = engine.compile(&plan).unwrap().primary.sql.clone();
    assert!(sql.contains("\nWHERE "));
    assert!(sql.contains("\nHAVING "));

    // Joe: Lennon 5 + Harrison 2 + Brie 3.
    let authors = engine.fetch(&plan).await.unwrap().into_records().unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].get("name").unwrap(), Value::from("Joe"));
    assert_eq!(authors[0].get("total").unwrap().as_i64(), Some(10));
    assert_eq!(authors[0].get("best").unwrap().as_i64(), Some(5));
}

#[test]
fn test_order_by_ungrouped_field_is_ambiguous() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let plan = plan
        .project(["blog_id"])
        .unwrap()
        .annotate("avg_rating", avg(plan.f("rating").unwrap()))
        .unwrap()
        .order_by("headline", Direction::Asc)
        .unwrap();

    let err = Compiler::new(Dialect::Sqlite).compile(&plan).unwrap_err();
    assert!(matches!(err, QueryError::AmbiguousGrouping(_)));
    assert_eq!(err.kind(), ErrorKind::Compile);
}

#[test]
fn test_order_by_aggregate_alias_is_allowed() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let plan = plan
        .project(["blog_id"])
        .unwrap()
        .annotate("avg_rating", avg(plan.f("rating").unwrap()))
        .unwrap()
        .order_by_desc("avg_rating")
        .unwrap();

    let sql = Compiler::new(Dialect::Postgres)
        .compile(&plan)
        .unwrap()
        .primary
        .sql;
    assert!(sql.contains("GROUP BY \"t0\".\"blog_id\""));
    assert!(sql.contains("ORDER BY AVG(\"t0\".\"rating\") DESC"));
}

#[test]
fn test_mixed_aggregate_with_ungrouped_field_is_ambiguous() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let plan = plan
        .project(["blog_id"])
        .unwrap()
        .annotate(
            "odd",
            avg(plan.f("rating").unwrap()).add(plan.f("rating").unwrap()),
        )
        .unwrap();

    assert!(matches!(
        Compiler::default().compile(&plan),
        Err(QueryError::AmbiguousGrouping(_))
    ));
}
