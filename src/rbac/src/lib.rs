//! # CretoAI Contextual RBAC Engine
//!
//! Decides whether a user may perform an action on one record of a
//! hierarchical object graph, from role grants scoped to contexts.
//!
//! ## Features
//!
//! - **Contextual grants**: a group holds a role on one record, or globally
//! - **Graph paths**: dot-separated relation paths resolved against declared metadata
//! - **Propagation**: grants inherited along a validated ancestor chain
//! - **Composable checks**: AND/OR/NOT over a closed set of checkers
//! - **Async-first design** using Tokio runtime
//! - **Coherent caching**: TTL caches with single-flight and invalidation on write
//!
//! ## Example
//!
//! ```rust
//! use cretoai_rbac::{
//!     Authorizer, Checker, Context, EngineConfig, InMemoryStore, ModelConfig, Permission,
//!     Record, Role, UserGroup,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryStore::new();
//!     store.put_group(UserGroup::new(1, "editors")).await;
//!     store.put_role(Role::new(1, "editor")).await?;
//!     store.put_permission(Permission::new(1, "write")).await?;
//!     store.put_record(Record::new("articles", 42)).await;
//!
//!     let model = ModelConfig::from_json(r#"{ "actions": { "*": { "edit": { "or": [
//!         { "owner": {} }, { "path": { "action": "write", "paths": [""] } }
//!     ] } } } }"#)?
//!     .build()?;
//!     let authz = Authorizer::with_store(EngineConfig::default(), model, Arc::new(store))?;
//!
//!     authz.assign("write", &["editor"]).await?;
//!     authz.join(7, 1).await?;
//!     authz.grant(1, "editor", &Context::new("articles", 42)).await?;
//!
//!     if authz.can(7, "edit", &Context::new("articles", 42)).await? {
//!         println!("Access granted!");
//!     }
//!
//!     // Expressions can also be composed in code
//!     authz.register("sections", "edit", Checker::owner() | Checker::ancestor("write"))?;
//!
//!     Ok(())
//! }
//! ```

pub mod checkers;
pub mod engine;
pub mod error;
pub mod expression;
pub mod graph;
pub mod resolver;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use checkers::{CheckEnv, CheckRequest, Checker};
pub use engine::{
    Authorizer, EngineConfig, EngineMetrics, MetricsCollector, Model, ModelConfig, ANY_TABLE,
};
pub use error::{RbacError, Result};
pub use expression::{EvaluationMode, Expr};
pub use graph::{Cardinality, GraphError, PropagationSchema, Relation, RelationGraph, Traverser};
pub use resolver::{CacheConfig, CacheStats, GrantResolver, ResolverStats};
pub use store::{GrantStore, InMemoryStore, RecordStore};
pub use types::{
    Context, GrantEntry, GroupId, Permission, PermissionId, Record, Role, RoleGrant, RoleId, UserGroup,
    UserId,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
