//! Path traversal over the declared relation graph
//!
//! A path such as `"section.article.journal"` is resolved segment by segment.
//! Every segment must be a declared relation of the current table. To-many
//! hops fan out, and the remaining segments are applied to each branch
//! independently, so one path can end on several terminal records.

use super::propagation::AncestorHop;
use super::relations::{Cardinality, RelationGraph};
use crate::error::{RbacError, Result};
use crate::store::RecordStore;
use crate::types::{Context, Record};
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Resolves relation paths against the relation graph and the record store
#[derive(Clone)]
pub struct Traverser {
    graph: Arc<RelationGraph>,
    records: Arc<dyn RecordStore>,
}

impl Traverser {
    /// Create a new traverser
    pub fn new(graph: Arc<RelationGraph>, records: Arc<dyn RecordStore>) -> Self {
        Self { graph, records }
    }

    /// The relation graph paths are resolved against
    pub fn graph(&self) -> &RelationGraph {
        &self.graph
    }

    /// Split a path into segments; the empty path has no segments
    pub fn segments(path: &str) -> Result<Vec<&str>> {
        if path.is_empty() {
            return Ok(Vec::new());
        }

        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(RbacError::Traversal(format!(
                "Empty segment in path '{}'",
                path
            )));
        }
        Ok(segments)
    }

    /// Check a path against the metadata only, starting from `table`
    ///
    /// Returns the terminal table.
    pub fn validate_path(&self, table: &str, path: &str) -> Result<String> {
        let mut current = table.to_string();
        for segment in Self::segments(path)? {
            let relation = self.graph.relation(&current, segment).ok_or_else(|| {
                RbacError::Traversal(format!(
                    "Relation '{}' is not declared on table '{}'",
                    segment, current
                ))
            })?;
            current = relation.target.clone();
        }
        Ok(current)
    }

    /// Resolve `path` from `origin` into its terminal records
    ///
    /// The empty path resolves to the origin itself. Terminals are
    /// de-duplicated by context, first occurrence wins. Read-only.
    pub async fn resolve(&self, path: &str, origin: &Record) -> Result<Vec<(Context, Record)>> {
        let segments = Self::segments(path)?;
        let mut frontier = vec![origin.clone()];

        for segment in segments {
            let hops = frontier.iter().map(|record| self.hop(record, segment));
            let next: Vec<Record> = try_join_all(hops).await?.into_iter().flatten().collect();
            frontier = next;

            if frontier.is_empty() {
                debug!("Path '{}' from {} dead-ends at '{}'", path, origin.context(), segment);
                break;
            }
        }

        let mut seen = HashSet::new();
        Ok(frontier
            .into_iter()
            .filter_map(|record| {
                let context = record.context();
                seen.insert(context.clone()).then_some((context, record))
            })
            .collect())
    }

    /// Follow one ancestor hop; `None` when the parent reference is null
    pub async fn parent(&self, record: &Record, hop: &AncestorHop) -> Result<Option<Record>> {
        let mut parents = self.hop(record, &hop.relation).await?;
        Ok(parents.pop())
    }

    /// Follow one declared relation from one record
    async fn hop(&self, record: &Record, segment: &str) -> Result<Vec<Record>> {
        let relation = self.graph.relation(&record.table, segment).ok_or_else(|| {
            RbacError::Traversal(format!(
                "Relation '{}' is not declared on table '{}'",
                segment, record.table
            ))
        })?;

        let related = self.records.related(record, segment).await?;

        if let Some(stray) = related.iter().find(|r| r.table != relation.target) {
            return Err(RbacError::Traversal(format!(
                "Relation '{}.{}' yielded a '{}' record, expected '{}'",
                record.table, segment, stray.table, relation.target
            )));
        }

        if relation.cardinality == Cardinality::One && related.len() > 1 {
            return Err(RbacError::Traversal(format!(
                "To-one relation '{}.{}' yielded {} records for {}",
                record.table,
                segment,
                related.len(),
                record.context()
            )));
        }

        Ok(related)
    }
}
