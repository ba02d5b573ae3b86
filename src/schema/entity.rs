//! Entity, field and relation definitions.

use serde::{Deserialize, Serialize};

use crate::expr::Value;

/// Scalar column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Bool,
    Int,
    Float,
    Text,
}

impl ScalarType {
    /// Normalize a value read back from storage to this type.
    ///
    /// Stores without a native boolean return 0/1 integers; stores may also
    /// return integral floats for float columns.
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (ScalarType::Bool, Value::Int(n)) => Value::Bool(n != 0),
            (ScalarType::Float, Value::Int(n)) => Value::Float(n as f64),
            (_, v) => v,
        }
    }
}

/// A column of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: ScalarType,
    pub nullable: bool,
}

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cardinality::ToOne => f.write_str("to-one"),
            Cardinality::ToMany => f.write_str("to-many"),
        }
    }
}

/// A named association to another entity.
///
/// The join is the equi-join `local.local_column = target.remote_column`.
/// Targets are referenced by name, so self-references and cycles between
/// entities are plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    pub local_column: String,
    pub remote_column: String,
}

/// Join key declared before the target entity is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingKey {
    Column(String),
    OwnPk,
    TargetPk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingRelation {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    pub local: PendingKey,
    pub remote: PendingKey,
}

/// A registered record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    name: String,
    table: String,
    pk: String,
    fields: Vec<Field>,
    relations: Vec<Relation>,
    pub(crate) pending: Vec<PendingRelation>,
}

impl Entity {
    /// Start building an entity. The table name defaults to the entity name
    /// and the primary key to `id`.
    pub fn builder(name: impl Into<String>) -> EntityBuilder {
        EntityBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the primary key field.
    pub fn pk(&self) -> &str {
        &self.pk
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Look up a field by name. `pk` resolves to the primary key field.
    pub fn field(&self, name: &str) -> Option<&Field> {
        let name = if name == "pk" { self.pk.as_str() } else { name };
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Whether `name` is taken by a field, a relation, or the `pk` alias.
    pub fn declares(&self, name: &str) -> bool {
        name == "pk" || self.field(name).is_some() || self.relation(name).is_some()
    }

    pub(crate) fn set_relations(&mut self, relations: Vec<Relation>) {
        self.relations = relations;
        self.pending.clear();
    }
}

/// Builder for [`Entity`].
#[derive(Debug, Clone)]
#[must_use = "EntityBuilder has no effect until build() is called"]
pub struct EntityBuilder {
    name: String,
    table: Option<String>,
    pk: String,
    fields: Vec<Field>,
    relations: Vec<PendingRelation>,
}

impl EntityBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            pk: "id".into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Override the table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Set the primary key field (default `id`).
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.pk = name.into();
        self
    }

    /// Add a non-nullable field.
    pub fn field(mut self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
            nullable: false,
        });
        self
    }

    /// Add a nullable field.
    pub fn nullable_field(mut self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
            nullable: true,
        });
        self
    }

    /// To-one relation through a local foreign key referencing the target's
    /// primary key.
    pub fn to_one(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        local_fk: impl Into<String>,
    ) -> Self {
        self.relations.push(PendingRelation {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::ToOne,
            local: PendingKey::Column(local_fk.into()),
            remote: PendingKey::TargetPk,
        });
        self
    }

    /// To-many relation through a foreign key on the target referencing this
    /// entity's primary key.
    pub fn to_many(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        remote_fk: impl Into<String>,
    ) -> Self {
        self.relations.push(PendingRelation {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::ToMany,
            local: PendingKey::OwnPk,
            remote: PendingKey::Column(remote_fk.into()),
        });
        self
    }

    /// Relation with explicit join columns on both sides.
    pub fn relation(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        cardinality: Cardinality,
        local_column: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Self {
        self.relations.push(PendingRelation {
            name: name.into(),
            target: target.into(),
            cardinality,
            local: PendingKey::Column(local_column.into()),
            remote: PendingKey::Column(remote_column.into()),
        });
        self
    }

    pub fn build(self) -> Entity {
        let pk = self.pk;
        let relations = self
            .relations
            .into_iter()
            .map(|mut r| {
                if r.local == PendingKey::OwnPk {
                    r.local = PendingKey::Column(pk.clone());
                }
                r
            })
            .collect();
        Entity {
            table: self.table.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            pk,
            fields: self.fields,
            relations: Vec::new(),
            pending: relations,
        }
    }
}
