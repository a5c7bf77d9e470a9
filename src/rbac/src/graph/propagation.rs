//! Propagation schema: table → ordered ancestor tables
//!
//! Each ancestor must be reachable from the previous table of the chain through
//! exactly one declared to-one relation. The union of all chains must form a
//! DAG; a cycle is rejected when the schema is built, so a walk at check time
//! is always bounded by the chain length.

use super::relations::{Cardinality, RelationGraph};
use super::GraphError;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One step up the ancestor chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorHop {
    /// Relation followed from the previous table
    pub relation: String,

    /// Table reached
    pub table: String,
}

/// Validated propagation schema
#[derive(Debug, Clone, Default)]
pub struct PropagationSchema {
    chains: HashMap<String, Vec<AncestorHop>>,
}

impl PropagationSchema {
    /// An empty schema: every record is its own root
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build and validate a schema against the relation graph
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A table lists itself or the same ancestor twice
    /// - An ancestor is not reachable through exactly one to-one relation
    /// - The chains form a cycle across tables
    pub fn build(
        entries: &BTreeMap<String, Vec<String>>,
        graph: &RelationGraph,
    ) -> Result<Self, GraphError> {
        let mut chains = HashMap::new();

        for (table, ancestors) in entries {
            let mut seen: HashSet<&str> = HashSet::new();
            seen.insert(table.as_str());

            let mut hops = Vec::with_capacity(ancestors.len());
            let mut previous = table.as_str();

            for ancestor in ancestors {
                if !seen.insert(ancestor.as_str()) {
                    return Err(GraphError::CircularDependency(format!(
                        "{} -> {}",
                        table, ancestor
                    )));
                }

                let candidates: Vec<_> = graph
                    .relations_to(previous, ancestor)
                    .into_iter()
                    .filter(|(_, relation)| relation.cardinality == Cardinality::One)
                    .collect();

                let relation = match candidates.as_slice() {
                    [(name, _)] => name.to_string(),
                    [] => {
                        return Err(GraphError::InvalidSchema(format!(
                            "No to-one relation from '{}' to ancestor '{}'",
                            previous, ancestor
                        )))
                    }
                    _ => {
                        return Err(GraphError::InvalidSchema(format!(
                            "Ambiguous relations from '{}' to ancestor '{}'",
                            previous, ancestor
                        )))
                    }
                };

                hops.push(AncestorHop {
                    relation,
                    table: ancestor.clone(),
                });
                previous = ancestor.as_str();
            }

            chains.insert(table.clone(), hops);
        }

        let schema = Self { chains };
        schema.detect_cycles()?;
        Ok(schema)
    }

    /// Ancestor hops for a table, nearest first
    pub fn ancestors(&self, table: &str) -> &[AncestorHop] {
        self.chains.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Child → parent edges across all chains
    fn edges(&self) -> HashMap<&str, Vec<&str>> {
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for (table, hops) in &self.chains {
            let mut previous = table.as_str();
            for hop in hops {
                let targets = edges.entry(previous).or_default();
                if !targets.contains(&hop.table.as_str()) {
                    targets.push(hop.table.as_str());
                }
                previous = hop.table.as_str();
            }
        }
        edges
    }

    /// DFS-based cycle detection over the union of chains
    ///
    /// Three states per node: unvisited, on the DFS stack, finished. Meeting
    /// a node that is on the stack closes a cycle.
    fn detect_cycles(&self) -> Result<(), GraphError> {
        let edges = self.edges();
        let mut state: HashMap<&str, u8> = HashMap::new();

        let mut starts: Vec<&str> = edges.keys().copied().collect();
        starts.sort_unstable();

        for start in starts {
            if state.get(start).copied().unwrap_or(0) == 0 {
                let mut path = Vec::new();
                Self::dfs(start, &edges, &mut state, &mut path)?;
            }
        }
        Ok(())
    }

    fn dfs<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        state: &mut HashMap<&'a str, u8>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), GraphError> {
        match state.get(node) {
            Some(1) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(node);
                return Err(GraphError::CircularDependency(cycle.join(" -> ")));
            }
            Some(2) => return Ok(()),
            _ => {}
        }

        state.insert(node, 1);
        path.push(node);

        if let Some(parents) = edges.get(node) {
            for parent in parents {
                Self::dfs(parent, edges, state, path)?;
            }
        }

        state.insert(node, 2);
        path.pop();
        Ok(())
    }
}
