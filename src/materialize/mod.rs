//! Turning raw rows into records and mappings.

mod record;

pub use record::{Record, Related};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Value as Json};

use crate::compile::{ColumnSource, OutputColumn, ResultShape};
use crate::error::{QueryError, QueryResult};
use crate::expr::Value;
use crate::load::{AttachedRelation, RawRowSet};
use crate::schema::{Cardinality, Entity, Schema};
use crate::storage::Row;

/// One row of a projected plan, keyed in projection order.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    keys: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Mapping {
    pub fn get(&self, key: &str) -> QueryResult<&Value> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| QueryError::not_loaded("mapping", key))
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys.iter().map(String::as_str).zip(&self.values)
    }

    pub fn to_json(&self) -> Json {
        let obj: JsonMap<String, Json> = self
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect();
        Json::Object(obj)
    }
}

/// The output of a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Records(Vec<Record>),
    Mappings(Vec<Mapping>),
}

impl Materialized {
    pub fn len(&self) -> usize {
        match self {
            Materialized::Records(rs) => rs.len(),
            Materialized::Mappings(ms) => ms.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Option<&[Record]> {
        match self {
            Materialized::Records(rs) => Some(rs),
            Materialized::Mappings(_) => None,
        }
    }

    pub fn mappings(&self) -> Option<&[Mapping]> {
        match self {
            Materialized::Mappings(ms) => Some(ms),
            Materialized::Records(_) => None,
        }
    }

    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            Materialized::Records(rs) => Some(rs),
            Materialized::Mappings(_) => None,
        }
    }

    pub fn into_mappings(self) -> Option<Vec<Mapping>> {
        match self {
            Materialized::Mappings(ms) => Some(ms),
            Materialized::Records(_) => None,
        }
    }

    /// Every row as JSON, records and mappings alike.
    pub fn to_json(&self) -> Json {
        match self {
            Materialized::Records(rs) => Json::Array(rs.iter().map(Record::to_json).collect()),
            Materialized::Mappings(ms) => Json::Array(ms.iter().map(Mapping::to_json).collect()),
        }
    }
}

/// Build the output of `raw` in `shape`, one value per row in row order.
pub fn materialize(schema: &Schema, raw: RawRowSet, shape: &ResultShape) -> QueryResult<Materialized> {
    match shape {
        ResultShape::Mapping { keys } => {
            let keys = Arc::new(keys.clone());
            let mappings = raw
                .rows
                .into_iter()
                .map(|row| Mapping {
                    keys: keys.clone(),
                    values: coerce_row(&raw.columns, row),
                })
                .collect();
            Ok(Materialized::Mappings(mappings))
        }
        ResultShape::Record { entity } | ResultShape::NarrowedRecord { entity, .. } => {
            let root = schema.entity(entity)?.clone();
            let mut records = Vec::with_capacity(raw.rows.len());
            for (i, row) in raw.rows.into_iter().enumerate() {
                let mut record = primary_record(schema, &root, &raw.columns, row)?;
                for attached in &raw.relations {
                    let rows = attached.per_row.get(i).map(Vec::as_slice).unwrap_or_default();
                    record.set_related(attached.relation.clone(), related(schema, attached, rows)?);
                }
                records.push(record);
            }
            Ok(Materialized::Records(records))
        }
    }
}

/// A record of `entity` from a row holding exactly its fields, in column order.
pub(crate) fn plain_record(
    entity: &Arc<Entity>,
    columns: &[OutputColumn],
    row: Row,
) -> Record {
    let mut record = Record::new(entity.clone());
    for (column, value) in columns.iter().zip(row) {
        record.set_field(column.key.clone(), coerce(column, value));
    }
    record
}

fn primary_record(
    schema: &Schema,
    root: &Arc<Entity>,
    columns: &[OutputColumn],
    row: Row,
) -> QueryResult<Record> {
    let mut record = Record::new(root.clone());
    let mut joined: BTreeMap<&str, Vec<(&OutputColumn, Value)>> = BTreeMap::new();

    for (column, value) in columns.iter().zip(row) {
        let value = coerce(column, value);
        match &column.source {
            ColumnSource::Root | ColumnSource::Path => record.set_field(column.key.clone(), value),
            ColumnSource::Annotation => record.set_annotation(column.key.clone(), value),
            ColumnSource::Joined { relation } => {
                joined.entry(relation.as_str()).or_default().push((column, value))
            }
        }
    }

    for (name, values) in joined {
        let rel = root
            .relation(name)
            .ok_or_else(|| QueryError::unknown_path(root.name(), name))?;
        let target = schema.entity(&rel.target)?;
        // An outer join that matched nothing yields a null primary key.
        let matched = values
            .iter()
            .any(|(c, v)| c.key == target.pk() && !v.is_null());
        let nested = matched.then(|| {
            let mut nested = Record::new(target.clone());
            for (column, value) in values {
                nested.set_field(column.key.clone(), value);
            }
            Box::new(nested)
        });
        record.set_related(name, Related::One(nested));
    }

    Ok(record)
}

fn related(schema: &Schema, attached: &AttachedRelation, rows: &[Row]) -> QueryResult<Related> {
    let target = schema.entity(&attached.target)?;
    let mut records = rows
        .iter()
        .cloned()
        .map(|row| plain_record(target, &attached.columns, row));
    Ok(match attached.cardinality {
        Cardinality::ToOne => Related::One(records.next().map(Box::new)),
        Cardinality::ToMany => Related::Many(records.collect()),
    })
}

fn coerce_row(columns: &[OutputColumn], row: Row) -> Vec<Value> {
    columns
        .iter()
        .zip(row)
        .map(|(column, value)| coerce(column, value))
        .collect()
}

fn coerce(column: &OutputColumn, value: Value) -> Value {
    match column.ty {
        Some(ty) => ty.coerce(value),
        None => value,
    }
}
