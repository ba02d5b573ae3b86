//! Lazy, immutable query plans.
//!
//! A [`QueryPlan`] only describes a query. Every builder method takes
//! `&self` and returns a derived plan; the receiver is never modified, and
//! the derived plan shares all unchanged state with it (persistent lists for
//! filters, annotations and order keys, a copy-on-write map for relation
//! strategies). Nothing reaches storage until the plan is handed to
//! [`crate::engine::Engine`].
//!
//! ```ignore
//! let rated = schema.plan("entry")?
//!     .filter(plan.f("blog.name")?.eq("Beatles"))
//!     .annotate("label", label)?
//!     .order_by("rating", Direction::Desc)?
//!     .limit(10);
//! ```

mod plist;

pub use plist::PList;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::error::{QueryError, QueryResult};
use crate::expr::{Expr, ExprExt, FieldRef, OuterRef};
use crate::schema::{Cardinality, Entity, Relation, Schema};

// =============================================================================
// Plan components
// =============================================================================

/// How a relation is loaded alongside the root records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStrategy {
    /// Not loaded; reading it is a `NotLoaded` error unless lazy refetch is on.
    None,
    /// Joined into the primary statement. To-one relations only.
    Join,
    /// Fetched by a secondary statement keyed by the primary result.
    Batched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionKind {
    /// Plain key/value mappings.
    Mapping,
    /// Records restricted to a field subset.
    Narrowed,
}

/// Output narrowing declared by `project` or `only`.
#[derive(Debug, Clone, Serialize)]
pub struct Projection {
    pub kind: ProjectionKind,
    pub names: Arc<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub alias: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderKey {
    pub expr: Expr,
    pub direction: Direction,
}

// =============================================================================
// QueryPlan
// =============================================================================

/// An immutable description of a query rooted at one entity.
#[derive(Debug, Clone)]
#[must_use = "plans are lazy; pass them to an Engine to execute"]
pub struct QueryPlan {
    schema: Arc<Schema>,
    root: Arc<Entity>,
    filters: PList<Expr>,
    annotations: PList<Annotation>,
    projection: Option<Projection>,
    ordering: PList<OrderKey>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
    relations: Arc<BTreeMap<String, LoadStrategy>>,
}

impl QueryPlan {
    pub fn new(schema: Arc<Schema>, entity: &str) -> QueryResult<Self> {
        let root = schema.entity(entity)?.clone();
        Ok(Self {
            schema,
            root,
            filters: PList::new(),
            annotations: PList::new(),
            projection: None,
            ordering: PList::new(),
            limit: None,
            offset: None,
            distinct: false,
            relations: Arc::new(BTreeMap::new()),
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn root(&self) -> &Arc<Entity> {
        &self.root
    }

    pub fn filters(&self) -> Vec<&Expr> {
        self.filters.to_vec()
    }

    pub fn annotations(&self) -> Vec<&Annotation> {
        self.annotations.to_vec()
    }

    pub fn annotation(&self, alias: &str) -> Option<&Expr> {
        self.annotations
            .iter()
            .find(|a| a.alias == alias)
            .map(|a| &a.expr)
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn ordering(&self) -> Vec<&OrderKey> {
        self.ordering.to_vec()
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Declared relation strategies, keyed by relation name.
    pub fn relations(&self) -> &BTreeMap<String, LoadStrategy> {
        &self.relations
    }

    pub fn strategy(&self, relation: &str) -> LoadStrategy {
        self.relations
            .get(relation)
            .copied()
            .unwrap_or(LoadStrategy::None)
    }

    /// Whether an annotation (directly or through aliases) aggregates.
    pub fn is_aggregate_alias(&self, alias: &str) -> bool {
        self.alias_aggregates(alias, 0)
    }

    fn alias_aggregates(&self, alias: &str, depth: usize) -> bool {
        if depth > self.annotations.len() {
            return false;
        }
        self.annotation(alias).is_some_and(|expr| {
            expr.contains_aggregate()
                || expr
                    .aliases()
                    .into_iter()
                    .any(|a| self.alias_aggregates(a, depth + 1))
        })
    }

    /// Whether `expr` aggregates, following annotation aliases.
    pub fn expr_aggregates(&self, expr: &Expr) -> bool {
        expr.contains_aggregate()
            || expr
                .aliases()
                .into_iter()
                .any(|a| self.is_aggregate_alias(a))
    }

    /// Whether any annotation aggregates, which makes the plan grouped.
    pub fn has_aggregates(&self) -> bool {
        self.annotations
            .iter()
            .any(|a| self.is_aggregate_alias(&a.alias))
    }

    /// Distinct outer bindings referenced by this plan's own expressions.
    pub fn outer_refs(&self) -> Vec<&OuterRef> {
        let mut refs: Vec<&OuterRef> = Vec::new();
        for expr in self.expressions() {
            for r in expr.outer_refs() {
                if !refs.contains(&r) {
                    refs.push(r);
                }
            }
        }
        refs
    }

    /// Every expression held by the plan: filters, annotations, order keys.
    pub fn expressions(&self) -> Vec<&Expr> {
        let mut exprs = self.filters.to_vec();
        exprs.extend(self.annotations.iter().map(|a| &a.expr));
        exprs.extend(self.ordering.iter().map(|o| &o.expr));
        exprs
    }

    // -------------------------------------------------------------------------
    // Expression helpers
    // -------------------------------------------------------------------------

    /// Reference a field path or an annotation alias of this plan.
    pub fn f(&self, path: &str) -> QueryResult<Expr> {
        if self.annotation(path).is_some() {
            return Ok(Expr::Alias(path.to_string()));
        }
        FieldRef::resolve(&self.schema, self.root.name(), path).map(Expr::Field)
    }

    fn relation(&self, name: &str) -> QueryResult<&Relation> {
        self.root
            .relation(name)
            .ok_or_else(|| QueryError::unknown_path(self.root.name(), name))
    }

    // -------------------------------------------------------------------------
    // Builders
    // -------------------------------------------------------------------------

    /// Add a predicate. Filters are ANDed; their order never affects the
    /// result set.
    pub fn filter(&self, expr: Expr) -> Self {
        Self {
            filters: self.filters.push(expr),
            ..self.clone()
        }
    }

    /// Add a negated predicate.
    pub fn exclude(&self, expr: Expr) -> Self {
        self.filter(expr.not())
    }

    /// Add a computed output column. If a projection is set, the alias
    /// joins it.
    pub fn annotate(&self, alias: &str, expr: impl Into<Expr>) -> QueryResult<Self> {
        if self.annotation(alias).is_some() || self.root.declares(alias) {
            return Err(QueryError::DuplicateAlias(alias.to_string()));
        }
        let projection = self.projection.as_ref().map(|p| {
            let mut names = p.names.as_ref().clone();
            names.push(alias.to_string());
            Projection {
                kind: p.kind,
                names: Arc::new(names),
            }
        });
        Ok(Self {
            annotations: self.annotations.push(Annotation {
                alias: alias.to_string(),
                expr: expr.into(),
            }),
            projection,
            ..self.clone()
        })
    }

    /// Narrow the output to plain mappings over `names` (field paths or
    /// annotation aliases). Aggregate annotations among them group the rows
    /// by the remaining names.
    pub fn project<I, S>(&self, names: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        for name in &names {
            self.f(name)?;
        }
        Ok(Self {
            projection: Some(Projection {
                kind: ProjectionKind::Mapping,
                names: Arc::new(names),
            }),
            ..self.clone()
        })
    }

    /// Narrow records to a subset of root fields and annotations. The
    /// primary key is always loaded.
    pub fn only<I, S>(&self, names: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        for name in &names {
            if self.annotation(name).is_none() && self.root.field(name).is_none() {
                return Err(QueryError::unknown_path(self.root.name(), name.as_str()));
            }
        }
        Ok(Self {
            projection: Some(Projection {
                kind: ProjectionKind::Narrowed,
                names: Arc::new(names),
            }),
            ..self.clone()
        })
    }

    /// Append an order key (field path or annotation alias).
    pub fn order_by(&self, key: &str, direction: Direction) -> QueryResult<Self> {
        Ok(self.order_by_expr(self.f(key)?, direction))
    }

    pub fn order_by_desc(&self, key: &str) -> QueryResult<Self> {
        self.order_by(key, Direction::Desc)
    }

    /// Append an arbitrary order expression.
    pub fn order_by_expr(&self, expr: Expr, direction: Direction) -> Self {
        Self {
            ordering: self.ordering.push(OrderKey { expr, direction }),
            ..self.clone()
        }
    }

    pub fn clear_ordering(&self) -> Self {
        Self {
            ordering: PList::new(),
            ..self.clone()
        }
    }

    /// Last call wins.
    pub fn limit(&self, n: u64) -> Self {
        Self {
            limit: Some(n),
            ..self.clone()
        }
    }

    /// Last call wins.
    pub fn offset(&self, n: u64) -> Self {
        Self {
            offset: Some(n),
            ..self.clone()
        }
    }

    pub fn distinct(&self) -> Self {
        Self {
            distinct: true,
            ..self.clone()
        }
    }

    /// Declare how a relation of the root entity is loaded.
    ///
    /// `Join` is only valid for to-one relations. `None` removes any earlier
    /// declaration.
    pub fn with_relation(&self, name: &str, strategy: LoadStrategy) -> QueryResult<Self> {
        let relation = self.relation(name)?;
        if strategy == LoadStrategy::Join && relation.cardinality == Cardinality::ToMany {
            return Err(QueryError::InvalidStrategy {
                relation: name.to_string(),
                reason: format!(
                    "join loading needs a to-one relation, `{name}` is {}",
                    relation.cardinality
                ),
            });
        }

        let mut relations = self.relations.as_ref().clone();
        match strategy {
            LoadStrategy::None => relations.remove(name),
            _ => relations.insert(name.to_string(), strategy),
        };
        Ok(Self {
            relations: Arc::new(relations),
            ..self.clone()
        })
    }
}

impl Serialize for QueryPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("QueryPlan", 9)?;
        s.serialize_field("root", self.root.name())?;
        s.serialize_field("filters", &self.filters)?;
        s.serialize_field("annotations", &self.annotations)?;
        s.serialize_field("projection", &self.projection)?;
        s.serialize_field("ordering", &self.ordering)?;
        s.serialize_field("limit", &self.limit)?;
        s.serialize_field("offset", &self.offset)?;
        s.serialize_field("distinct", &self.distinct)?;
        s.serialize_field("relations", self.relations.as_ref())?;
        s.end()
    }
}
