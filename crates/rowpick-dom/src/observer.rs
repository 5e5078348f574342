//! Mutation records
//!
//! The document queues one record per structural or attribute change on
//! connected nodes; the page hands queued batches to mutation observers.

use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationType {
    Attributes,
    ChildList,
}

/// Mutation record
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub mutation_type: MutationType,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub attribute_name: Option<String>,
    pub old_value: Option<String>,
}

impl MutationRecord {
    /// Child list change on `target`
    pub fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            mutation_type: MutationType::ChildList,
            target,
            added_nodes: added,
            removed_nodes: removed,
            attribute_name: None,
            old_value: None,
        }
    }

    /// Attribute change on `target`
    pub fn attributes(target: NodeId, name: &str, old_value: Option<String>) -> Self {
        Self {
            mutation_type: MutationType::Attributes,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: Some(name.to_string()),
            old_value,
        }
    }

    /// Nodes entering or leaving the tree
    pub fn is_structural(&self) -> bool {
        self.mutation_type == MutationType::ChildList
    }
}
