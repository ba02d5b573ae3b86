//! Schema registry: entities, fields, relations and path resolution.
//!
//! Entities are declared with [`Entity::builder`] and registered once at
//! startup. Relations name their target entity rather than holding it, so
//! cyclic schemas (an entry pointing at its blog, the blog listing its
//! entries) need no reference cycles.
//!
//! ```ignore
//! use quarry::schema::{Entity, Registry, ScalarType};
//!
//! let registry = Registry::new();
//! registry.register(
//!     Entity::builder("blog")
//!         .field("id", ScalarType::Int)
//!         .field("name", ScalarType::Text)
//!         .to_many("entries", "entry", "blog_id")
//!         .build(),
//! )?;
//! let schema = registry.schema()?; // sealed from here on
//! ```

mod entity;
mod registry;

pub use entity::{Cardinality, Entity, EntityBuilder, Field, Relation, ScalarType};
pub use registry::{Registry, ResolvedPath, Schema};
