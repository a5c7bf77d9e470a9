//! Declared relationship graph: table → relation name → (target table, cardinality)

use super::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How many records a relation hop yields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// At most one related record (many-to-one, one-to-one)
    One,
    /// Any number of related records (one-to-many, many-to-many)
    Many,
}

/// One declared relation edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Target table name
    pub target: String,

    /// Cardinality of the hop
    pub cardinality: Cardinality,
}

impl Relation {
    pub fn one(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            cardinality: Cardinality::One,
        }
    }

    pub fn many(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            cardinality: Cardinality::Many,
        }
    }
}

/// Arena of table → relation edges
///
/// Built once at startup; traversal resolves path segments against it and
/// never infers structure from live data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationGraph {
    tables: BTreeMap<String, HashMap<String, Relation>>,
}

impl RelationGraph {
    /// Create an empty relation graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a relation, builder style
    ///
    /// # Errors
    ///
    /// Returns an error if the relation is already declared on the table.
    pub fn with_relation(
        mut self,
        table: impl Into<String>,
        name: impl Into<String>,
        relation: Relation,
    ) -> Result<Self, GraphError> {
        self.add_relation(table, name, relation)?;
        Ok(self)
    }

    /// Declare a relation
    pub fn add_relation(
        &mut self,
        table: impl Into<String>,
        name: impl Into<String>,
        relation: Relation,
    ) -> Result<(), GraphError> {
        let table = table.into();
        let name = name.into();

        if name.is_empty() || name.contains('.') {
            return Err(GraphError::InvalidSchema(format!(
                "Invalid relation name '{}' on table '{}'",
                name, table
            )));
        }

        let relations = self.tables.entry(table.clone()).or_default();
        if relations.contains_key(&name) {
            return Err(GraphError::DuplicateRelation(format!("{}.{}", table, name)));
        }
        relations.insert(name, relation);
        Ok(())
    }

    /// A single relation declared on a table
    pub fn relation(&self, table: &str, name: &str) -> Option<&Relation> {
        self.tables.get(table).and_then(|relations| relations.get(name))
    }

    /// Relations from `table` that lead to `target`, sorted by name
    pub fn relations_to(&self, table: &str, target: &str) -> Vec<(&str, &Relation)> {
        let mut found: Vec<(&str, &Relation)> = self
            .tables
            .get(table)
            .map(|relations| {
                relations
                    .iter()
                    .filter(|(_, relation)| relation.target == target)
                    .map(|(name, relation)| (name.as_str(), relation))
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by_key(|(name, _)| *name);
        found
    }

    /// Number of tables with at least one relation
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}
