//! Shared blog/author/entry fixture on in-memory SQLite.
#![allow(dead_code)]

use std::sync::Arc;

use quarry::config::EngineSettings;
use quarry::schema::{Entity, Registry, ScalarType, Schema};
use quarry::storage::{SqliteStorage, StatementLog};
use quarry::Engine;

pub type TestEngine = Engine<StatementLog<SqliteStorage>>;

const DDL: &str = "
CREATE TABLE blog (id INTEGER PRIMARY KEY, name TEXT NOT NULL, tagline TEXT);
CREATE TABLE author (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE entry (
    id INTEGER PRIMARY KEY,
    headline TEXT NOT NULL,
    rating INTEGER NOT NULL,
    pub_date TEXT NOT NULL,
    blog_id INTEGER NOT NULL REFERENCES blog (id),
    author_id INTEGER REFERENCES author (id)
);

INSERT INTO blog (id, name, tagline) VALUES
    (1, 'Beatles Blog', 'All the latest Beatles news.'),
    (2, 'Empty Blog', NULL),
    (3, 'Cheddar Talk', 'Cheese, mostly.');

INSERT INTO author (id, name) VALUES (1, 'Joe'), (2, 'Paul');

INSERT INTO entry (id, headline, rating, pub_date, blog_id, author_id) VALUES
    (1, 'Lennon', 5, '2024-01-01', 1, 1),
    (2, 'McCartney', 4, '2024-02-01', 1, 2),
    (3, 'Harrison', 2, '2024-03-01', 1, 1),
    (4, 'Starr', 5, '2024-04-01', 1, NULL),
    (5, 'Epstein', 1, '2024-05-01', 1, 2),
    (6, 'Brie', 3, '2024-01-15', 3, 1);
";

pub fn entities() -> Vec<Entity> {
    vec![
        Entity::builder("blog")
            .field("id", ScalarType::Int)
            .field("name", ScalarType::Text)
            .nullable_field("tagline", ScalarType::Text)
            .to_many("entries", "entry", "blog_id")
            .build(),
        Entity::builder("author")
            .field("id", ScalarType::Int)
            .field("name", ScalarType::Text)
            .to_many("entries", "entry", "author_id")
            .build(),
        Entity::builder("entry")
            .field("id", ScalarType::Int)
            .field("headline", ScalarType::Text)
            .field("rating", ScalarType::Int)
            .field("pub_date", ScalarType::Text)
            .field("blog_id", ScalarType::Int)
            .nullable_field("author_id", ScalarType::Int)
            .to_one("blog", "blog", "blog_id")
            .to_one("author", "author", "author_id")
            .build(),
    ]
}

pub fn registry() -> Registry {
    let registry = Registry::new();
    for entity in entities() {
        registry.register(entity).unwrap();
    }
    registry
}

pub fn schema() -> Arc<Schema> {
    registry().schema().unwrap()
}

pub async fn storage() -> SqliteStorage {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.execute_batch(DDL).await.unwrap();
    storage
}

pub async fn engine() -> TestEngine {
    engine_with(EngineSettings::default()).await
}

pub async fn engine_with(settings: EngineSettings) -> TestEngine {
    let storage = StatementLog::new(storage().await);
    Engine::new(&registry(), storage, settings).unwrap()
}
