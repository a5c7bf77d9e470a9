//! Engine configuration and the declarative model document

use crate::error::{RbacError, Result};
use crate::expression::{EvaluationMode, Expr};
use crate::graph::{PropagationSchema, Relation, RelationGraph};
use crate::resolver::CacheConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Table name under which actions apply to every table
pub const ANY_TABLE: &str = "*";

/// Authorizer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Resolver cache configuration
    pub cache: CacheConfig,

    /// How `And`/`Or` schedule their operands
    pub mode: EvaluationMode,

    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            mode: EvaluationMode::Sequential,
            enable_metrics: true,
        }
    }
}

impl EngineConfig {
    /// Read the configuration from the process environment
    ///
    /// Environment variables:
    /// - `RBAC_CACHE_ENABLED` - `true`/`false` (default: true)
    /// - `RBAC_CACHE_TTL` - Cache TTL in seconds (default: 60)
    /// - `RBAC_CACHE_SIZE` - Entries per cache (default: 10000)
    /// - `RBAC_EVAL_MODE` - `sequential` or `speculative` (default: sequential)
    /// - `RBAC_METRICS` - `true`/`false` (default: true)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("RBAC_CACHE_ENABLED") {
            config.cache.enabled = parse_bool("RBAC_CACHE_ENABLED", &value)?;
        }
        if let Some(value) = lookup("RBAC_CACHE_TTL") {
            let secs: u64 = parse_number("RBAC_CACHE_TTL", &value)?;
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(value) = lookup("RBAC_CACHE_SIZE") {
            config.cache.max_entries = parse_number("RBAC_CACHE_SIZE", &value)?;
        }
        if let Some(value) = lookup("RBAC_EVAL_MODE") {
            config.mode = match value.trim().to_ascii_lowercase().as_str() {
                "sequential" => EvaluationMode::Sequential,
                "speculative" => EvaluationMode::Speculative,
                other => {
                    return Err(RbacError::InvalidInput(format!(
                        "RBAC_EVAL_MODE must be 'sequential' or 'speculative', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(value) = lookup("RBAC_METRICS") {
            config.enable_metrics = parse_bool("RBAC_METRICS", &value)?;
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(RbacError::InvalidInput(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        RbacError::InvalidInput(format!("{} must be a non-negative integer, got '{}'", key, value))
    })
}

/// Declarative model document
///
/// ```json
/// {
///   "relations": {
///     "sections": { "article": { "target": "articles", "cardinality": "one" } },
///     "articles": { "sections": { "target": "sections", "cardinality": "many" } }
///   },
///   "propagation": { "sections": ["articles"] },
///   "actions": {
///     "sections": { "edit": { "or": [{ "owner": {} }, { "ancestor": "write" }] } },
///     "*": { "admin": { "global": "admin" } }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// table → relation name → relation
    #[serde(default)]
    pub relations: BTreeMap<String, BTreeMap<String, Relation>>,

    /// table → ordered ancestor tables
    #[serde(default)]
    pub propagation: BTreeMap<String, Vec<String>>,

    /// table (or `"*"`) → action name → expression document
    #[serde(default)]
    pub actions: BTreeMap<String, BTreeMap<String, Value>>,
}

impl ModelConfig {
    /// Parse a model document
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validate the document into a runtime model
    ///
    /// # Errors
    ///
    /// - `SchemaConfig` for a malformed relation graph or propagation schema
    /// - `ExpressionType` for a malformed action expression
    pub fn build(&self) -> Result<Model> {
        let mut graph = RelationGraph::new();
        for (table, relations) in &self.relations {
            for (name, relation) in relations {
                graph.add_relation(table.clone(), name.clone(), relation.clone())?;
            }
        }

        let schema = PropagationSchema::build(&self.propagation, &graph)?;

        let mut actions = Vec::new();
        for (table, entries) in &self.actions {
            for (action, doc) in entries {
                let expr = Expr::from_json(doc).map_err(|e| match e {
                    RbacError::ExpressionType(msg) => RbacError::ExpressionType(format!(
                        "action '{}' on '{}': {}",
                        action, table, msg
                    )),
                    other => other,
                })?;
                actions.push(ActionBinding {
                    table: table.clone(),
                    action: action.clone(),
                    expr,
                });
            }
        }

        Ok(Model {
            graph,
            schema,
            actions,
        })
    }
}

/// One `(table, action) → expression` registration
#[derive(Debug, Clone, PartialEq)]
pub struct ActionBinding {
    pub table: String,
    pub action: String,
    pub expr: Expr,
}

/// Validated runtime model
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub graph: RelationGraph,
    pub schema: PropagationSchema,
    pub actions: Vec<ActionBinding>,
}

impl Model {
    /// No relations, no propagation, no registered actions
    pub fn empty() -> Self {
        Self::default()
    }

    /// A model over an already validated graph and schema
    pub fn new(graph: RelationGraph, schema: PropagationSchema) -> Self {
        Self {
            graph,
            schema,
            actions: Vec::new(),
        }
    }

    /// Register an action expression, builder style
    pub fn with_action(
        mut self,
        table: impl Into<String>,
        action: impl Into<String>,
        expr: impl Into<Expr>,
    ) -> Self {
        self.actions.push(ActionBinding {
            table: table.into(),
            action: action.into(),
            expr: expr.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::Checker;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.cache.enabled);
        assert_eq!(config.mode, EvaluationMode::Sequential);
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("RBAC_CACHE_ENABLED", "false"),
            ("RBAC_CACHE_TTL", "5"),
            ("RBAC_CACHE_SIZE", "100"),
            ("RBAC_EVAL_MODE", "Speculative"),
            ("RBAC_METRICS", "0"),
        ]))
        .unwrap();

        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl, Duration::from_secs(5));
        assert_eq!(config.cache.max_entries, 100);
        assert_eq!(config.mode, EvaluationMode::Speculative);
        assert!(!config.enable_metrics);
    }

    #[test]
    fn test_invalid_env_values() {
        for pairs in [
            [("RBAC_CACHE_ENABLED", "maybe")],
            [("RBAC_CACHE_TTL", "-1")],
            [("RBAC_CACHE_SIZE", "lots")],
            [("RBAC_EVAL_MODE", "parallel")],
        ] {
            assert!(matches!(
                EngineConfig::from_lookup(lookup(&pairs)),
                Err(RbacError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_model_document() {
        let model = ModelConfig::from_json(
            r#"{
                "relations": {
                    "sections": { "article": { "target": "articles", "cardinality": "one" } },
                    "articles": { "sections": { "target": "sections", "cardinality": "many" } }
                },
                "propagation": { "sections": ["articles"] },
                "actions": {
                    "sections": { "edit": { "or": [{ "owner": {} }, { "ancestor": "write" }] } }
                }
            }"#,
        )
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(model.graph.table_count(), 2);
        assert_eq!(model.schema.ancestors("sections")[0].relation, "article");
        assert_eq!(model.actions.len(), 1);
        assert_eq!(
            model.actions[0].expr,
            Checker::owner() | Checker::ancestor("write")
        );
    }

    #[test]
    fn test_cyclic_schema_refuses_to_build() {
        let config = ModelConfig::from_json(
            r#"{
                "relations": {
                    "a": { "b": { "target": "b", "cardinality": "one" } },
                    "b": { "a": { "target": "a", "cardinality": "one" } }
                },
                "propagation": { "a": ["b"], "b": ["a"] }
            }"#,
        )
        .unwrap();

        assert!(matches!(config.build(), Err(RbacError::SchemaConfig(_))));
    }

    #[test]
    fn test_bad_relation_name() {
        let config = ModelConfig::from_json(
            r#"{ "relations": { "a": { "b.c": { "target": "b", "cardinality": "one" } } } }"#,
        )
        .unwrap();
        assert!(matches!(config.build(), Err(RbacError::SchemaConfig(_))));
    }

    #[test]
    fn test_bad_action_expression() {
        let config = ModelConfig::from_json(r#"{ "actions": { "*": { "edit": { "not": 1 } } } }"#)
            .unwrap();
        assert!(matches!(config.build(), Err(RbacError::ExpressionType(_))));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            ModelConfig::from_json(r#"{ "relatoins": {} }"#),
            Err(RbacError::InvalidInput(_))
        ));
    }
}
