//! Graph metadata and traversal
//!
//! - [`RelationGraph`]: declared table → relation → (target, cardinality) edges
//! - [`PropagationSchema`]: table → ordered ancestors, validated as a DAG
//! - [`Traverser`]: resolves dot-separated relation paths into records

pub mod propagation;
pub mod relations;
pub mod traverser;

pub use propagation::{AncestorHop, PropagationSchema};
pub use relations::{Cardinality, Relation, RelationGraph};
pub use traverser::Traverser;

use crate::error::RbacError;
use thiserror::Error;

/// Graph-related errors, raised while building metadata at startup
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// Circular dependency detected in the propagation schema
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// Relation declared twice on the same table
    #[error("Duplicate relation: {0}")]
    DuplicateRelation(String),

    /// Malformed schema entry
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

impl From<GraphError> for RbacError {
    fn from(err: GraphError) -> Self {
        RbacError::SchemaConfig(err.to_string())
    }
}
