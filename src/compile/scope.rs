//! Statement scopes: table aliases, join paths and outer bindings.

use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::schema::{Cardinality, Entity, Relation, Schema};
use crate::sql::expr::{col, table_col};
use crate::sql::{Expr as SqlExpr, ExprExt as _, Join, JoinType, TableRef};

/// Generates `t0, t1, ...`, shared by a statement and every statement
/// nested in it.
#[derive(Debug, Default)]
pub(crate) struct Aliases {
    next: usize,
}

impl Aliases {
    pub fn fresh(&mut self) -> String {
        let alias = format!("t{}", self.next);
        self.next += 1;
        alias
    }
}

/// Why a relation path is being joined. Decides the join kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    /// Referenced by a WHERE predicate in a conjunctive position.
    Filter,
    /// Referenced under OR, NOT, a null test or a CASE inside a predicate,
    /// where a missing related row can still satisfy it.
    Guarded,
    /// Referenced by an annotation, or by a predicate inside an aggregate.
    Annotation,
    /// Referenced by a projection or an order key.
    Output,
    /// Reached only through a declared `join` strategy.
    Strategy,
}

impl Role {
    /// The role of a path nested under a non-conjunctive operator.
    pub fn guarded(self) -> Self {
        match self {
            Role::Filter => Role::Guarded,
            other => other,
        }
    }
}

/// The enclosing statement a correlated subquery binds to.
#[derive(Debug, Clone)]
pub(crate) struct Outer {
    pub name: String,
    pub entity: Arc<Entity>,
}

#[derive(Debug)]
struct JoinNode {
    path: Vec<String>,
    alias: String,
    parent: String,
    kind: JoinType,
    relation: Relation,
    table: String,
}

/// One SELECT (or DML) statement's view of its tables.
#[derive(Debug)]
pub(crate) struct Scope {
    schema: Arc<Schema>,
    root: Arc<Entity>,
    qualifier: Option<String>,
    joins: Vec<JoinNode>,
    allow_joins: bool,
    outer: Option<Outer>,
}

impl Scope {
    /// Scope of a SELECT whose root table is aliased `alias`.
    pub fn select(
        schema: Arc<Schema>,
        root: Arc<Entity>,
        alias: String,
        outer: Option<Outer>,
    ) -> Self {
        Self {
            schema,
            root,
            qualifier: Some(alias),
            joins: Vec::new(),
            allow_joins: true,
            outer,
        }
    }

    /// Scope of an UPDATE/DELETE: root columns are unqualified and nothing
    /// can be joined.
    pub fn dml(schema: Arc<Schema>, root: Arc<Entity>) -> Self {
        Self {
            schema,
            root,
            qualifier: None,
            joins: Vec::new(),
            allow_joins: false,
            outer: None,
        }
    }

    pub fn root(&self) -> &Arc<Entity> {
        &self.root
    }

    pub fn outer(&self) -> Option<&Outer> {
        self.outer.as_ref()
    }

    /// The name nested statements use to reach this scope's root table.
    pub fn correlation_name(&self) -> String {
        self.qualifier
            .clone()
            .unwrap_or_else(|| self.root.table().to_string())
    }

    pub fn root_column(&self, column: &str) -> SqlExpr {
        match &self.qualifier {
            Some(q) => table_col(q, column),
            None => col(column),
        }
    }

    /// The FROM item for the root table.
    pub fn table_ref(&self) -> TableRef {
        let table = TableRef::new(self.root.table());
        match &self.qualifier {
            Some(q) => table.with_alias(q),
            None => table,
        }
    }

    /// Join every hop of `hops` (once per distinct path) and return the
    /// alias of the last table.
    pub fn join_path(
        &mut self,
        aliases: &mut Aliases,
        hops: &[Relation],
        role: Role,
    ) -> QueryResult<String> {
        let mut parent = match (&self.qualifier, self.allow_joins) {
            (Some(q), true) => q.clone(),
            _ => {
                let path: Vec<&str> = hops.iter().map(|r| r.name.as_str()).collect();
                return Err(QueryError::unknown_path(self.root.name(), path.join(".")));
            }
        };

        let mut owner = self.root.clone();
        let mut path = Vec::with_capacity(hops.len());
        let mut outer_joined = false;

        for relation in hops {
            path.push(relation.name.clone());
            let target = self.schema.entity(&relation.target)?.clone();

            let mut kind = join_kind(role, relation, &owner);
            if outer_joined {
                kind = JoinType::Left;
            }
            outer_joined |= kind == JoinType::Left;

            if let Some(i) = self.joins.iter().position(|j| j.path == path) {
                let node = &mut self.joins[i];
                if kind == JoinType::Inner {
                    node.kind = JoinType::Inner;
                }
                parent = node.alias.clone();
            } else {
                let alias = aliases.fresh();
                self.joins.push(JoinNode {
                    path: path.clone(),
                    alias: alias.clone(),
                    parent,
                    kind,
                    relation: relation.clone(),
                    table: target.table().to_string(),
                });
                parent = alias;
            }
            owner = target;
        }

        Ok(parent)
    }

    /// JOIN clauses in the order their paths were first referenced.
    pub fn joins(&self) -> Vec<Join> {
        self.joins
            .iter()
            .map(|node| Join {
                join_type: node.kind,
                table: TableRef::new(&node.table).with_alias(&node.alias),
                on: table_col(&node.parent, &node.relation.local_column)
                    .eq(table_col(&node.alias, &node.relation.remote_column)),
            })
            .collect()
    }
}

fn join_kind(role: Role, relation: &Relation, owner: &Entity) -> JoinType {
    match (relation.cardinality, role) {
        (_, Role::Filter) => JoinType::Inner,
        (Cardinality::ToOne, Role::Annotation | Role::Output | Role::Guarded) => {
            let nullable = owner
                .field(&relation.local_column)
                .is_some_and(|f| f.nullable);
            if nullable {
                JoinType::Left
            } else {
                JoinType::Inner
            }
        }
        (Cardinality::ToMany, _) | (_, Role::Strategy) => JoinType::Left,
    }
}
