//! Process-wide schema registry and the sealed, read-only [`Schema`] view.
//!
//! Entities are registered during an initialization phase. The first read
//! seals the registry: relations are resolved and validated once, the
//! result is published as an `Arc<Schema>`, and any later `register` call
//! fails with [`QueryError::LateRegistration`]. Reads after sealing take no
//! locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::{Lazy, OnceCell};

use super::entity::{Cardinality, Entity, Field, PendingKey, Relation};
use crate::error::{QueryError, QueryResult};
use crate::plan::QueryPlan;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// Entity registry with a one-time initialization phase.
#[derive(Debug, Default)]
pub struct Registry {
    pending: Mutex<Vec<Entity>>,
    sealed: OnceCell<Arc<Schema>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Register an entity. Fails once the registry has been sealed.
    pub fn register(&self, entity: Entity) -> QueryResult<()> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        // Checked under the lock so a concurrent seal either sees this
        // entity or this call sees the seal.
        if self.sealed.get().is_some() {
            return Err(QueryError::LateRegistration(entity.name().to_string()));
        }
        if pending.iter().any(|e| e.name() == entity.name()) {
            return Err(QueryError::DuplicateEntity(entity.name().to_string()));
        }
        pending.push(entity);
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }

    /// Seal the registry (on first call) and return the read-only schema.
    pub fn schema(&self) -> QueryResult<Arc<Schema>> {
        self.sealed
            .get_or_try_init(|| {
                let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                let schema = Schema::from_entities(pending.iter().cloned())?;
                tracing::debug!(entities = schema.len(), "quarry.registry.sealed");
                Ok(schema)
            })
            .cloned()
    }

    pub fn entity(&self, name: &str) -> QueryResult<Arc<Entity>> {
        self.schema()?.entity(name).cloned()
    }

    /// Resolve a dotted path from `root`.
    pub fn resolve(&self, root: &str, path: &str) -> QueryResult<ResolvedPath> {
        self.schema()?.resolve(root, path)
    }

    /// Start a plan rooted at `entity`.
    pub fn plan(&self, entity: &str) -> QueryResult<QueryPlan> {
        QueryPlan::new(self.schema()?, entity)
    }
}

/// The outcome of resolving a dotted path.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    /// Relations traversed, in order from the root.
    pub hops: Vec<Relation>,
    /// Entity owning the terminal field.
    pub owner: Arc<Entity>,
    /// Terminal field. A path ending in a relation resolves to the target's
    /// primary key.
    pub field: Field,
}

impl ResolvedPath {
    pub fn hop_names(&self) -> Vec<String> {
        self.hops.iter().map(|r| r.name.clone()).collect()
    }

    /// Whether any hop fans out.
    pub fn is_to_many(&self) -> bool {
        self.hops.iter().any(|r| r.cardinality == Cardinality::ToMany)
    }
}

/// Sealed, read-only entity catalog.
#[derive(Debug)]
pub struct Schema {
    entities: HashMap<String, Arc<Entity>>,
}

impl Schema {
    /// Validate a set of entities and resolve their relations.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> QueryResult<Arc<Self>> {
        let mut by_name: HashMap<String, Entity> = HashMap::new();
        for entity in entities {
            if by_name.contains_key(entity.name()) {
                return Err(QueryError::DuplicateEntity(entity.name().to_string()));
            }
            by_name.insert(entity.name().to_string(), entity);
        }

        for entity in by_name.values() {
            if entity.field(entity.pk()).is_none() {
                return Err(QueryError::unknown_path(entity.name(), entity.pk()));
            }
        }

        let mut resolved: HashMap<String, Vec<Relation>> = HashMap::new();
        for entity in by_name.values() {
            let mut relations = Vec::with_capacity(entity.pending.len());
            for pending in &entity.pending {
                if entity.field(&pending.name).is_some() || pending.name == "pk" {
                    return Err(QueryError::DuplicateAlias(pending.name.clone()));
                }
                let target = by_name
                    .get(&pending.target)
                    .ok_or_else(|| QueryError::unknown_path(entity.name(), &pending.name))?;
                let local = key_column(entity, &pending.local, target);
                let remote = key_column(target, &pending.remote, target);
                if entity.field(&local).is_none() {
                    return Err(QueryError::unknown_path(entity.name(), local));
                }
                if target.field(&remote).is_none() {
                    return Err(QueryError::unknown_path(target.name(), remote));
                }
                relations.push(Relation {
                    name: pending.name.clone(),
                    target: pending.target.clone(),
                    cardinality: pending.cardinality,
                    local_column: local,
                    remote_column: remote,
                });
            }
            resolved.insert(entity.name().to_string(), relations);
        }

        let entities = by_name
            .into_iter()
            .map(|(name, mut entity)| {
                if let Some(relations) = resolved.remove(&name) {
                    entity.set_relations(relations);
                }
                (name, Arc::new(entity))
            })
            .collect();

        Ok(Arc::new(Schema { entities }))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity(&self, name: &str) -> QueryResult<&Arc<Entity>> {
        self.entities
            .get(name)
            .ok_or_else(|| QueryError::unknown_path(name, ""))
    }

    /// Resolve a dotted path (`blog.owner.name`) starting at `root`.
    pub fn resolve(&self, root: &str, path: &str) -> QueryResult<ResolvedPath> {
        let mut current = self.entity(root)?;
        let segments: Vec<&str> = path.split('.').collect();
        let mut hops = Vec::new();

        for (i, segment) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();
            if let Some(relation) = current.relation(segment) {
                hops.push(relation.clone());
                current = self.entity(&relation.target)?;
                if is_last {
                    let field = current
                        .field(current.pk())
                        .cloned()
                        .ok_or_else(|| QueryError::unknown_path(root, path))?;
                    return Ok(ResolvedPath {
                        hops,
                        owner: current.clone(),
                        field,
                    });
                }
            } else if is_last {
                let field = current
                    .field(segment)
                    .cloned()
                    .ok_or_else(|| QueryError::unknown_path(root, path))?;
                return Ok(ResolvedPath {
                    hops,
                    owner: current.clone(),
                    field,
                });
            } else {
                return Err(QueryError::unknown_path(root, path));
            }
        }

        Err(QueryError::unknown_path(root, path))
    }

    /// Look up a relation declared directly on `root`.
    pub fn relation(&self, root: &str, name: &str) -> QueryResult<&Relation> {
        self.entity(root)?
            .relation(name)
            .ok_or_else(|| QueryError::unknown_path(root, name))
    }

    /// Start a plan rooted at `entity`.
    pub fn plan(self: &Arc<Self>, entity: &str) -> QueryResult<QueryPlan> {
        QueryPlan::new(self.clone(), entity)
    }
}

fn key_column(owner: &Entity, key: &PendingKey, target: &Entity) -> String {
    match key {
        PendingKey::Column(c) => c.clone(),
        PendingKey::OwnPk => owner.pk().to_string(),
        PendingKey::TargetPk => target.pk().to_string(),
    }
}
