//! DOM Tree (arena-based allocation)
//!
//! Nodes are never freed. A removed subtree stays in the arena detached
//! from the document, so stale ids keep resolving to their last state.

use crate::{DomError, Node, NodeId};

/// Arena-based DOM tree
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<Node>,
}

impl DomTree {
    /// Create a tree containing only the document node
    pub fn new() -> Self {
        Self { nodes: vec![Node::document()] }
    }

    /// Document node
    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Get a mutable node by ID
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    /// Number of nodes in the arena (attached or not)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(Node::element(tag))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(Node::text(text))
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Children of a node in document order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Inclusive ancestor check
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Whether the node is reachable from the document node
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.get(id).is_some() && self.contains(NodeId::ROOT, id)
    }

    /// Detach a node from its parent, returning the old parent
    pub fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|&c| c != id);
        }
        if let Some(n) = self.get_mut(id) {
            n.parent = None;
        }
        Some(parent)
    }

    /// Append a child, moving it from its previous parent if needed
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference` (or at the end)
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        if self.get(parent).is_none() {
            return Err(DomError::NodeNotFound(parent));
        }
        if self.get(child).is_none() {
            return Err(DomError::NodeNotFound(child));
        }
        if child == NodeId::ROOT {
            return Err(DomError::HierarchyRequest("document node cannot be a child"));
        }
        if self.contains(child, parent) {
            return Err(DomError::HierarchyRequest("node cannot be inserted into its own subtree"));
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::HierarchyRequest("reference node is not a child of parent"));
            }
        }

        self.detach(child);

        let p = &mut self.nodes[parent.index()];
        let pos = reference
            .and_then(|r| p.children.iter().position(|&c| c == r))
            .unwrap_or(p.children.len());
        p.children.insert(pos, child);
        self.nodes[child.index()].parent = Some(parent);
        Ok(())
    }

    /// Descendants of a node in document (pre-)order, excluding the node
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}
