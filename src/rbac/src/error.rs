//! Error types for the contextual RBAC engine

use thiserror::Error;

/// RBAC engine errors
///
/// `Clone` so that one failed backing lookup can be handed to every caller
/// waiting on the same single-flight key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RbacError {
    /// The role's table scope does not allow a grant on the context's table
    #[error("Cannot grant role: {0}")]
    PermissionGrant(String),

    /// A path segment is not a declared relation of the current table
    #[error("Traversal failed: {0}")]
    Traversal(String),

    /// Unknown permission, role, group or record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cyclic or malformed propagation schema / relation graph
    #[error("Schema configuration error: {0}")]
    SchemaConfig(String),

    /// An expression operand does not produce a boolean
    #[error("Expression type error: {0}")]
    ExpressionType(String),

    /// Backing store lookup or mutation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for RbacError {
    fn from(err: serde_json::Error) -> Self {
        RbacError::InvalidInput(format!("malformed model document: {}", err))
    }
}

/// Result type for RBAC operations
pub type Result<T> = std::result::Result<T, RbacError>;
