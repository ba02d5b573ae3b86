#[path = "../common/mod.rs"]
mod common;

use quarry::compile::{ColumnSource, Compiler, ResultShape};
use quarry::expr::{ExprExt, Value};
use quarry::plan::{Direction, LoadStrategy, QueryPlan};
use quarry::sql::Dialect;

fn joins(sql: &str) -> usize {
    sql.matches(" JOIN ").count()
}

#[test]
fn test_same_path_joined_once() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let plan = plan
        .filter(plan.f("blog.name").unwrap().eq("Beatles Blog"))
        .filter(plan.f("blog.tagline").unwrap().is_not_null())
        .annotate("blog_name", plan.f("blog.name").unwrap())
        .unwrap()
        .order_by("blog.name", quarry::plan::Direction::Asc)
        .unwrap();

    let sql = Compiler::new(Dialect::Postgres).compile(&plan).unwrap().primary.sql;
    assert_eq!(joins(&sql), 1, "{sql}");
}

#[test]
fn test_distinct_paths_get_distinct_joins() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let plan = plan
        .filter(plan.f("blog.name").unwrap().eq("Beatles Blog"))
        .filter(plan.f("author.name").unwrap().eq("Joe"));

    let sql = Compiler::new(Dialect::Sqlite).compile(&plan).unwrap().primary.sql;
    assert_eq!(joins(&sql), 2, "{sql}");
    assert!(sql.contains("\"blog\" AS \"t1\""));
    assert!(sql.contains("\"author\" AS \"t2\""));
}

#[test]
fn test_multi_hop_path_reuses_prefix() {
    let schema = common::schema();
    let plan = schema.plan("author").unwrap();
    let plan = plan
        .filter(plan.f("entries.blog.name").unwrap().eq("Cheddar Talk"))
        .filter(plan.f("entries.rating").unwrap().gt(2));

    let sql = Compiler::new(Dialect::Sqlite).compile(&plan).unwrap().primary.sql;
    assert_eq!(joins(&sql), 2, "{sql}");
}

#[test]
fn test_nullable_to_one_output_is_left_join() {
    let schema = common::schema();
    let plan = schema
        .plan("entry")
        .unwrap()
        .project(["headline", "author.name"])
        .unwrap();

    let compiled = Compiler::new(Dialect::Sqlite).compile(&plan).unwrap();
    assert!(compiled.primary.sql.contains("LEFT OUTER JOIN \"author\""));
    assert_eq!(compiled.primary.columns[1].source, ColumnSource::Path);
    assert_eq!(
        compiled.shape,
        ResultShape::Mapping {
            keys: vec!["headline".into(), "author.name".into()]
        }
    );
}

#[test]
fn test_filter_on_nullable_to_one_is_inner_join() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let plan = plan
        .filter(plan.f("author.name").unwrap().eq("Joe"))
        .project(["headline", "author.name"])
        .unwrap();

    let sql = Compiler::new(Dialect::Sqlite).compile(&plan).unwrap().primary.sql;
    assert!(sql.contains("INNER JOIN \"author\""));
    assert!(!sql.contains("LEFT OUTER JOIN"));
}

#[test]
fn test_parameters_numbered_in_text_order() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let plan = plan
        .filter(plan.f("rating").unwrap().gte(2))
        .filter(plan.f("headline").unwrap().startswith("L"))
        .filter(plan.f("id").unwrap().in_list([1, 2, 3]));

    let pg = Compiler::new(Dialect::Postgres).compile(&plan).unwrap().primary;
    assert!(pg.sql.contains("$1") && pg.sql.contains("$5"));
    assert!(!pg.sql.contains("$6"));
    assert_eq!(
        pg.params,
        vec![
            Value::Int(2),
            Value::from("L%"),
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
        ]
    );

    let tsql = Compiler::new(Dialect::TSql).compile(&plan).unwrap().primary;
    assert!(tsql.sql.contains("@p1") && tsql.sql.contains("@p5"));
    assert_eq!(tsql.params, pg.params);
}

#[test]
fn test_batched_relation_has_no_join() {
    let schema = common::schema();
    let plan = schema
        .plan("blog")
        .unwrap()
        .with_relation("entries", LoadStrategy::Batched)
        .unwrap();

    let compiled = Compiler::new(Dialect::Sqlite).compile(&plan).unwrap();
    assert_eq!(joins(&compiled.primary.sql), 0);
    assert_eq!(compiled.batched.len(), 1);
    assert_eq!(compiled.batched[0].relation, "entries");
    assert_eq!(compiled.batched[0].target, "entry");

    let stmt = compiled.batched[0].render(&[Value::Int(1), Value::Int(3)]);
    assert!(stmt.sql.contains("\"t0\".\"blog_id\" IN (?, ?)"));
    assert!(stmt.sql.ends_with("ORDER BY \"t0\".\"id\" ASC"));
}

#[test]
fn test_projection_skips_batched_relations() {
    let schema = common::schema();
    let plan = schema
        .plan("blog")
        .unwrap()
        .with_relation("entries", LoadStrategy::Batched)
        .unwrap()
        .project(["name"])
        .unwrap();

    let compiled = Compiler::new(Dialect::Sqlite).compile(&plan).unwrap();
    assert!(compiled.batched.is_empty());
}

#[test]
fn test_narrowed_record_keeps_keys() {
    let schema = common::schema();
    let plan = schema
        .plan("entry")
        .unwrap()
        .with_relation("blog", LoadStrategy::Batched)
        .unwrap()
        .only(["headline"])
        .unwrap();

    let compiled = Compiler::new(Dialect::Sqlite).compile(&plan).unwrap();
    let keys: Vec<&str> = compiled
        .primary
        .columns
        .iter()
        .map(|c| c.key.as_str())
        .collect();
    assert_eq!(keys, vec!["id", "blog_id", "headline"]);
    assert_eq!(
        compiled.shape,
        ResultShape::NarrowedRecord {
            entity: "entry".into(),
            fields: vec!["id".into(), "blog_id".into(), "headline".into()],
        }
    );
}

#[test]
fn test_mysql_quoting_and_pagination() {
    let schema = common::schema();
    let plan = schema
        .plan("entry")
        .unwrap()
        .order_by_desc("rating")
        .unwrap()
        .offset(2);

    let sql = Compiler::new(Dialect::MySql).compile(&plan).unwrap().primary.sql;
    assert!(sql.contains("FROM `entry` AS `t0`"));
    assert!(sql.contains("ORDER BY `t0`.`rating` DESC"));
    assert!(sql.contains("OFFSET 2"));
}

#[test]
fn test_compilation_is_deterministic() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let plan = plan
        .filter(plan.f("blog.name").unwrap().eq("Beatles Blog"))
        .filter(plan.f("author.name").unwrap().ne("Paul"));

    let compiler = Compiler::new(Dialect::DuckDb);
    let a = compiler.compile(&plan).unwrap().primary;
    let b = compiler.compile(&plan).unwrap().primary;
    assert_eq!(a, b);
}

#[test]
fn test_concat_follows_dialect() {
    let schema = common::schema();
    let plan = schema.plan("entry").unwrap();
    let plan = plan
        .annotate(
            "byline",
            plan.f("headline").unwrap().concat(" @ ").concat(plan.f("blog.name").unwrap()),
        )
        .unwrap()
        .project(["byline"])
        .unwrap();

    let sqlite = Compiler::new(Dialect::Sqlite).compile(&plan).unwrap().primary.sql;
    assert!(sqlite.contains("(\"t0\".\"headline\" || ?) || \"t1\".\"name\""), "{sqlite}");

    let mysql = Compiler::new(Dialect::MySql).compile(&plan).unwrap().primary.sql;
    assert!(mysql.contains("CONCAT(CONCAT(`t0`.`headline`, ?), `t1`.`name`)"), "{mysql}");
}

// =============================================================================
// Nullable to-one paths outside conjunctive filters
// =============================================================================

async fn entry_ids(engine: &common::TestEngine, plan: &QueryPlan) -> Vec<i64> {
    let plan = plan.order_by("id", Direction::Asc).unwrap();
    engine
        .fetch(&plan)
        .await
        .unwrap()
        .into_records()
        .unwrap()
        .iter()
        .filter_map(|r| r.pk().unwrap().as_i64())
        .collect()
}

#[tokio::test]
async fn test_or_across_nullable_relation_keeps_unrelated_rows() {
    let engine = common::engine().await;
    let entries = engine.plan("entry").unwrap();
    let plan = entries.filter(
        entries
            .f("author.name")
            .unwrap()
            .eq("Joe")
            .or(entries.f("rating").unwrap().eq(5)),
    );

    let sql = engine.compile(&plan).unwrap().primary.sql.clone();
    assert!(sql.contains("LEFT OUTER JOIN \"author\""), "{sql}");
    assert_eq!(entry_ids(&engine, &plan).await, vec![1, 3, 4, 6]);
}

#[tokio::test]
async fn test_exclude_across_nullable_relation() {
    let engine = common::engine().await;
    let entries = engine.plan("entry").unwrap();
    let plan = entries.exclude(entries.f("author.name").unwrap().eq("Joe"));

    // Starr has no author, so NOT (NULL = 'Joe') is unknown and drops it;
    // the outer join must not drop anything else.
    assert_eq!(entry_ids(&engine, &plan).await, vec![2, 5]);

    let plan = entries.exclude(
        entries
            .f("author.name")
            .unwrap()
            .eq("Joe")
            .and(entries.f("author").unwrap().is_not_null()),
    );
    assert_eq!(entry_ids(&engine, &plan).await, vec![2, 4, 5]);
}

#[tokio::test]
async fn test_null_test_on_nullable_relation() {
    let engine = common::engine().await;
    let entries = engine.plan("entry").unwrap();

    let by_field = entries.filter(entries.f("author.name").unwrap().is_null());
    assert_eq!(entry_ids(&engine, &by_field).await, vec![4]);

    let by_relation = entries.filter(entries.f("author").unwrap().is_null());
    assert_eq!(entry_ids(&engine, &by_relation).await, vec![4]);
}

#[tokio::test]
async fn test_conjunctive_reference_still_inner_joins() {
    let engine = common::engine().await;
    let entries = engine.plan("entry").unwrap();
    let plan = entries
        .filter(entries.f("author.name").unwrap().ne("Paul"))
        .filter(
            entries
                .f("author.name")
                .unwrap()
                .eq("Joe")
                .or(entries.f("rating").unwrap().eq(5)),
        );

    let sql = engine.compile(&plan).unwrap().primary.sql.clone();
    assert_eq!(joins(&sql), 1);
    assert!(sql.contains("INNER JOIN \"author\""), "{sql}");
    assert_eq!(entry_ids(&engine, &plan).await, vec![1, 3, 6]);
}

#[tokio::test]
async fn test_annotation_on_nullable_relation_keeps_rows() {
    let engine = common::engine().await;
    let entries = engine.plan("entry").unwrap();
    let plan = entries
        .annotate("who", entries.f("author.name").unwrap())
        .unwrap();

    assert_eq!(entry_ids(&engine, &plan).await, vec![1, 2, 3, 4, 5, 6]);
    let records = engine
        .fetch(&plan.order_by("id", Direction::Asc).unwrap())
        .await
        .unwrap()
        .into_records()
        .unwrap();
    assert_eq!(records[3].get("who").unwrap(), Value::Null);
}
