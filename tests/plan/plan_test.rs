#[path = "../common/mod.rs"]
mod common;

use quarry::error::QueryError;
use quarry::expr::{avg, count, Expr, ExprExt};
use quarry::plan::{Direction, LoadStrategy, ProjectionKind};

#[test]
fn test_builders_leave_receiver_untouched() {
    let schema = common::schema();
    let base = schema.plan("entry").unwrap();
    let filtered = base.filter(base.f("rating").unwrap().gt(3));
    let limited = filtered.limit(2).order_by_desc("pub_date").unwrap();

    assert!(base.filters().is_empty());
    assert_eq!(filtered.filters().len(), 1);
    assert_eq!(filtered.limit_value(), None);
    assert_eq!(limited.limit_value(), Some(2));
    assert_eq!(limited.filters().len(), 1);
    assert!(filtered.ordering().is_empty());
}

#[test]
fn test_sibling_plans_do_not_see_each_other() {
    let schema = common::schema();
    let base = schema.plan("entry").unwrap();
    let shared = base.filter(base.f("rating").unwrap().gt(1));
    let a = shared.filter(shared.f("headline").unwrap().eq("Lennon"));
    let b = shared.filter(shared.f("headline").unwrap().eq("Starr"));

    assert_eq!(a.filters().len(), 2);
    assert_eq!(b.filters().len(), 2);
    assert_eq!(shared.filters().len(), 1);
}

#[test]
fn test_unknown_path_fails_at_build_time() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    assert!(matches!(
        plan.f("blog.owner"),
        Err(QueryError::UnknownPath { .. })
    ));
    assert!(plan.order_by("nope", Direction::Asc).is_err());
    assert!(plan.project(["blog.nope"]).is_err());
    assert!(schema.plan("missing").is_err());
}

#[test]
fn test_join_strategy_requires_to_one() {
    let schema = common::schema();
    let blogs = schema.plan("blog").unwrap();
    let err = blogs.with_relation("entries", LoadStrategy::Join).unwrap_err();
    assert!(matches!(err, QueryError::InvalidStrategy { ref relation, .. } if relation == "entries"));

    let batched = blogs.with_relation("entries", LoadStrategy::Batched).unwrap();
    assert_eq!(batched.strategy("entries"), LoadStrategy::Batched);

    let cleared = batched.with_relation("entries", LoadStrategy::None).unwrap();
    assert_eq!(cleared.strategy("entries"), LoadStrategy::None);
    assert!(cleared.relations().is_empty());
    assert_eq!(batched.strategy("entries"), LoadStrategy::Batched);
}

#[test]
fn test_duplicate_alias() {
    let schema = common::schema();
    let plan = schema.plan("blog").unwrap();
    let plan = plan.annotate("n", count(plan.f("entries").unwrap())).unwrap();

    assert!(matches!(
        plan.annotate("n", count(plan.f("entries").unwrap())),
        Err(QueryError::DuplicateAlias(_))
    ));
    assert!(matches!(
        plan.annotate("name", count(plan.f("entries").unwrap())),
        Err(QueryError::DuplicateAlias(_))
    ));
    assert!(matches!(
        plan.annotate("entries", count(plan.f("entries").unwrap())),
        Err(QueryError::DuplicateAlias(_))
    ));
}

#[test]
fn test_annotation_alias_is_referencable() {
    let schema = common::schema();
    let plan = schema.plan("blog").unwrap();
    let plan = plan.annotate("n", count(plan.f("entries").unwrap())).unwrap();

    assert!(matches!(plan.f("n").unwrap(), Expr::Alias(ref a) if a == "n"));
    assert!(plan.has_aggregates());
    assert!(plan.order_by_desc("n").is_ok());
}

#[test]
fn test_annotate_after_project_extends_projection() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let grouped = plan
        .project(["blog_id"])
        .unwrap()
        .annotate("avg_rating", avg(plan.f("rating").unwrap()))
        .unwrap();

    let projection = grouped.projection().unwrap();
    assert_eq!(projection.kind, ProjectionKind::Mapping);
    assert_eq!(
        projection.names.as_slice(),
        ["blog_id".to_string(), "avg_rating".to_string()]
    );
}

#[test]
fn test_only_rejects_relation_paths() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    assert!(plan.only(["headline"]).is_ok());
    assert!(plan.only(["blog.name"]).is_err());
}

#[test]
fn test_exclude_negates() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let plan = plan.exclude(plan.f("rating").unwrap().eq(5));
    assert!(matches!(plan.filters()[0], Expr::Not(_)));
}

#[test]
fn test_plans_are_shareable_across_threads() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let plan = plan.filter(plan.f("rating").unwrap().gt(2));

    let handles: Vec<_> = (0..4u64)
        .map(|i| {
            let plan = plan.clone();
            std::thread::spawn(move || plan.limit(i).filters().len())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 1);
    }
}
