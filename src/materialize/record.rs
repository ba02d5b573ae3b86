//! Materialized entity records.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value as Json};

use crate::error::{QueryError, QueryResult};
use crate::expr::Value;
use crate::schema::Entity;

/// Related records loaded for one relation.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// A to-one relation; `None` when the key is null or matches nothing.
    One(Option<Box<Record>>),
    /// A to-many relation, ordered by the target's primary key.
    Many(Vec<Record>),
}

impl Related {
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Related::One(r) => r.as_deref(),
            Related::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> &[Record] {
        match self {
            Related::One(_) => &[],
            Related::Many(rs) => rs,
        }
    }

    /// Number of related records.
    pub fn len(&self) -> usize {
        match self {
            Related::One(r) => usize::from(r.is_some()),
            Related::Many(rs) => rs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_json(&self) -> Json {
        match self {
            Related::One(None) => Json::Null,
            Related::One(Some(r)) => r.to_json(),
            Related::Many(rs) => Json::Array(rs.iter().map(Record::to_json).collect()),
        }
    }
}

/// One row of an entity, with the fields, annotations and relations its
/// result shape loaded.
///
/// Reading anything the shape did not load fails with
/// [`QueryError::NotLoaded`]; nothing is fetched implicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: Arc<Entity>,
    fields: BTreeMap<String, Value>,
    annotations: BTreeMap<String, Value>,
    related: BTreeMap<String, Related>,
}

impl Record {
    pub(crate) fn new(entity: Arc<Entity>) -> Self {
        Self {
            entity,
            fields: BTreeMap::new(),
            annotations: BTreeMap::new(),
            related: BTreeMap::new(),
        }
    }

    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// Read a field, annotation, or a field of a loaded to-one relation
    /// (`"blog.name"`). A null to-one relation reads as null.
    pub fn get(&self, path: &str) -> QueryResult<Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        if let Some(rest) = rest {
            return match self.related(head)? {
                Related::One(Some(r)) => r.get(rest),
                Related::One(None) => Ok(Value::Null),
                Related::Many(_) => Err(QueryError::unknown_path(self.entity.name(), path)),
            };
        }

        if let Some(v) = self.annotations.get(head) {
            return Ok(v.clone());
        }
        let field = self
            .entity
            .field(head)
            .ok_or_else(|| QueryError::unknown_path(self.entity.name(), head))?;
        self.fields
            .get(&field.name)
            .cloned()
            .ok_or_else(|| QueryError::not_loaded(self.entity.name(), head))
    }

    pub fn pk(&self) -> QueryResult<Value> {
        self.get(self.entity.pk())
    }

    /// Related records of a relation loaded by `join` or `batched`.
    pub fn related(&self, name: &str) -> QueryResult<&Related> {
        if self.entity.relation(name).is_none() {
            return Err(QueryError::unknown_path(self.entity.name(), name));
        }
        self.related
            .get(name)
            .ok_or_else(|| QueryError::not_loaded(self.entity.name(), name))
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.fields.contains_key(name)
            || self.annotations.contains_key(name)
            || self.related.contains_key(name)
    }

    /// Names of the loaded fields, in name order.
    pub fn loaded_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn annotations(&self) -> &BTreeMap<String, Value> {
        &self.annotations
    }

    pub(crate) fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub(crate) fn set_annotation(&mut self, alias: impl Into<String>, value: Value) {
        self.annotations.insert(alias.into(), value);
    }

    pub(crate) fn set_related(&mut self, name: impl Into<String>, related: Related) {
        self.related.insert(name.into(), related);
    }

    /// Loaded state as a JSON object: fields and annotations by name, and
    /// loaded relations nested under their names.
    pub fn to_json(&self) -> Json {
        let mut obj = Map::new();
        for (k, v) in self.fields.iter().chain(&self.annotations) {
            obj.insert(k.clone(), v.to_json());
        }
        for (k, r) in &self.related {
            obj.insert(k.clone(), r.to_json());
        }
        Json::Object(obj)
    }
}
