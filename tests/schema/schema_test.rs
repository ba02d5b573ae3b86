#[path = "../common/mod.rs"]
mod common;

use quarry::error::{ErrorKind, QueryError};
use quarry::schema::{Cardinality, Entity, Registry, ScalarType};

#[test]
fn test_registration_seals_on_first_read() {
    let registry = common::registry();
    assert!(!registry.is_sealed());

    registry.entity("entry").unwrap();
    assert!(registry.is_sealed());

    let err = registry
        .register(Entity::builder("tag").field("id", ScalarType::Int).build())
        .unwrap_err();
    assert!(matches!(err, QueryError::LateRegistration(ref name) if name == "tag"));
    assert_eq!(err.kind(), ErrorKind::Build);
}

#[test]
fn test_plan_construction_seals() {
    let registry = common::registry();
    registry.plan("blog").unwrap();
    assert!(registry.is_sealed());
}

#[test]
fn test_resolve_multi_hop_path() {
    let schema = common::schema();
    let path = schema.resolve("entry", "blog.entries.author.name").unwrap();

    assert_eq!(path.hop_names(), vec!["blog", "entries", "author"]);
    assert_eq!(path.owner.name(), "author");
    assert_eq!(path.field.name, "name");
    assert!(path.is_to_many());
}

#[test]
fn test_relation_keys() {
    let schema = common::schema();
    let blog = schema.relation("entry", "blog").unwrap();
    assert_eq!(blog.cardinality, Cardinality::ToOne);
    assert_eq!(blog.local_column, "blog_id");
    assert_eq!(blog.remote_column, "id");

    let entries = schema.relation("blog", "entries").unwrap();
    assert_eq!(entries.cardinality, Cardinality::ToMany);
    assert_eq!(entries.local_column, "id");
    assert_eq!(entries.remote_column, "blog_id");
}

#[test]
fn test_pk_alias_and_relation_terminal() {
    let schema = common::schema();
    assert_eq!(schema.resolve("blog", "pk").unwrap().field.name, "id");

    let via_relation = schema.resolve("entry", "author").unwrap();
    assert_eq!(via_relation.owner.name(), "author");
    assert_eq!(via_relation.field.name, "id");
}

#[test]
fn test_unknown_segment() {
    let schema = common::schema();
    let err = schema.resolve("entry", "blog.nope").unwrap_err();
    assert!(matches!(
        err,
        QueryError::UnknownPath { ref entity, ref path } if entity == "entry" && path == "blog.nope"
    ));
    // A field cannot be traversed like a relation.
    assert!(schema.resolve("entry", "headline.length").is_err());
}

#[test]
fn test_dangling_relation_target_fails_at_seal() {
    let registry = Registry::new();
    registry
        .register(
            Entity::builder("entry")
                .field("id", ScalarType::Int)
                .field("blog_id", ScalarType::Int)
                .to_one("blog", "blog", "blog_id")
                .build(),
        )
        .unwrap();
    assert!(matches!(
        registry.schema(),
        Err(QueryError::UnknownPath { .. })
    ));
}

#[test]
fn test_self_reference_is_plain_data() {
    let registry = Registry::new();
    registry
        .register(
            Entity::builder("person")
                .field("id", ScalarType::Int)
                .nullable_field("parent_id", ScalarType::Int)
                .to_one("parent", "person", "parent_id")
                .to_many("children", "person", "parent_id")
                .build(),
        )
        .unwrap();
    let schema = registry.schema().unwrap();
    let path = schema.resolve("person", "parent.parent.children.id").unwrap();
    assert_eq!(path.hops.len(), 3);
    assert_eq!(path.owner.name(), "person");
}
