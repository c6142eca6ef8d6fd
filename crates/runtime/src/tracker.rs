//! In-memory index from entity fields to the grant arguments reading them.

use crate::Result;
use policy::{Dependencies, FieldRef, Model, dependencies};
use std::collections::{BTreeSet, HashMap};
use storage::{GrantStore, NodeId};

/// Maps columns and object types to the argument nodes whose match rows
/// depend on them.
///
/// Built once from the store, then kept current by the grant and revoke
/// paths. Mutation needs `&mut self`; hosts sharing an engine across threads
/// must serialize writers.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    fields: HashMap<FieldRef, BTreeSet<NodeId>>,
    types: HashMap<String, BTreeSet<NodeId>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay every stored argument node.
    pub fn rebuild(model: &Model, store: &GrantStore) -> Result<Self> {
        let mut tracker = Self::new();
        let nodes = store.argument_nodes()?;
        for node in &nodes {
            tracker.record(node.id, &dependencies(model, &node.expr)?);
        }
        tracing::info!(
            nodes = nodes.len(),
            fields = tracker.fields.len(),
            "rebuilt dependency index"
        );
        Ok(tracker)
    }

    pub fn record(&mut self, node: NodeId, deps: &Dependencies) {
        for field in &deps.fields {
            self.fields.entry(field.clone()).or_default().insert(node);
        }
        if let Some(object_type) = &deps.object_type {
            self.types.entry(object_type.clone()).or_default().insert(node);
        }
    }

    pub fn forget(&mut self, node: NodeId) {
        self.fields.retain(|_, nodes| {
            nodes.remove(&node);
            !nodes.is_empty()
        });
        self.types.retain(|_, nodes| {
            nodes.remove(&node);
            !nodes.is_empty()
        });
    }

    /// Nodes whose matches read `table.column`.
    pub fn dependents_of_field(&self, table: &str, column: &str) -> BTreeSet<NodeId> {
        self.fields
            .get(&FieldRef::new(table, column))
            .cloned()
            .unwrap_or_default()
    }

    /// Nodes selecting a set of `object_type` that can grow or shrink.
    pub fn dependents_of_type(&self, object_type: &str) -> BTreeSet<NodeId> {
        self.types.get(object_type).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(fields: &[(&str, &str)], object_type: Option<&str>) -> Dependencies {
        Dependencies {
            fields: fields.iter().map(|(t, c)| FieldRef::new(*t, *c)).collect(),
            object_type: object_type.map(str::to_string),
        }
    }

    #[test]
    fn test_record_and_lookup() {
        let mut tracker = DependencyTracker::new();
        tracker.record(NodeId(1), &deps(&[("group", "id"), ("group", "parent_id")], Some("group")));
        tracker.record(NodeId(2), &deps(&[("group", "id")], None));

        assert_eq!(
            tracker.dependents_of_field("group", "id"),
            BTreeSet::from([NodeId(1), NodeId(2)])
        );
        assert_eq!(
            tracker.dependents_of_field("group", "parent_id"),
            BTreeSet::from([NodeId(1)])
        );
        assert!(tracker.dependents_of_field("group", "name").is_empty());
        assert_eq!(tracker.dependents_of_type("group"), BTreeSet::from([NodeId(1)]));
        assert!(tracker.dependents_of_type("user").is_empty());
    }

    #[test]
    fn test_forget_drops_empty_entries() {
        let mut tracker = DependencyTracker::new();
        tracker.record(NodeId(1), &deps(&[("user", "id")], Some("user")));
        tracker.record(NodeId(2), &deps(&[("user", "id")], None));

        tracker.forget(NodeId(1));
        assert_eq!(tracker.dependents_of_field("user", "id"), BTreeSet::from([NodeId(2)]));
        assert!(tracker.dependents_of_type("user").is_empty());

        tracker.forget(NodeId(2));
        assert!(tracker.is_empty());
    }
}
