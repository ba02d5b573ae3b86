//! Error taxonomy for plan construction, compilation, execution and
//! materialization.
//!
//! Every failure the engine can produce is one [`QueryError`] variant, and
//! every variant belongs to exactly one [`ErrorKind`], so callers can branch
//! on the phase a failure came from without matching every variant.

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for engine operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// The phase an error originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Plan or expression construction, schema registration.
    Build,
    /// Lowering a plan to SQL.
    Compile,
    /// Talking to the storage collaborator.
    Execution,
    /// Reading values off materialized results.
    Materialization,
}

/// Errors produced by the query engine.
#[derive(Error, Debug, Clone)]
pub enum QueryError {
    /// A path segment does not name a field or relation.
    #[error("unknown path `{path}` on entity `{entity}`")]
    UnknownPath { entity: String, path: String },

    /// A load strategy is not valid for the relation's cardinality.
    #[error("invalid load strategy for relation `{relation}`: {reason}")]
    InvalidStrategy { relation: String, reason: String },

    /// An entity was registered after the registry was sealed by first use.
    #[error("entity `{0}` registered after the schema registry was sealed")]
    LateRegistration(String),

    /// Two entities were registered under the same name.
    #[error("entity `{0}` is already registered")]
    DuplicateEntity(String),

    /// An annotation alias collides with another alias or a declared name.
    #[error("alias `{0}` conflicts with an existing annotation, field or relation")]
    DuplicateAlias(String),

    /// A grouped query has an output or order key not derivable from the group key.
    #[error("ambiguous grouping: {0}")]
    AmbiguousGrouping(String),

    /// A correlated subplan cannot be lowered into a nested statement.
    #[error("unsupported correlation: {0}")]
    UnsupportedCorrelation(String),

    /// Opaque failure from the storage collaborator, propagated unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The caller cancelled the fetch.
    #[error("query cancelled")]
    Cancelled,

    /// A field or relation was read that the result shape did not load.
    #[error("`{name}` is not loaded on `{entity}`")]
    NotLoaded { entity: String, name: String },
}

impl QueryError {
    pub fn unknown_path(entity: impl Into<String>, path: impl Into<String>) -> Self {
        Self::UnknownPath {
            entity: entity.into(),
            path: path.into(),
        }
    }

    pub fn not_loaded(entity: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotLoaded {
            entity: entity.into(),
            name: name.into(),
        }
    }

    /// The phase this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::UnknownPath { .. }
            | QueryError::InvalidStrategy { .. }
            | QueryError::LateRegistration(_)
            | QueryError::DuplicateEntity(_)
            | QueryError::DuplicateAlias(_) => ErrorKind::Build,
            QueryError::AmbiguousGrouping(_) | QueryError::UnsupportedCorrelation(_) => {
                ErrorKind::Compile
            }
            QueryError::Storage(_) | QueryError::Cancelled => ErrorKind::Execution,
            QueryError::NotLoaded { .. } => ErrorKind::Materialization,
        }
    }
}
