//! Document - High-level document API
//!
//! Wraps the arena tree and records a [`MutationRecord`] for every change
//! made to a connected node.

use crate::geometry::{DOMRect, DEFAULT_BOX};
use crate::{DomError, DomTree, ElementData, MutationRecord, NodeId};

/// HTML Document
#[derive(Debug, Clone)]
pub struct Document {
    tree: DomTree,
    html_element: NodeId,
    head_element: NodeId,
    body_element: NodeId,
    mutations: Vec<MutationRecord>,
}

impl Document {
    /// Create a new document with `<html><head></head><body></body></html>`
    pub fn new() -> Self {
        let mut tree = DomTree::new();
        let html = tree.create_element("html");
        let head = tree.create_element("head");
        let body = tree.create_element("body");

        // Fresh nodes on a fresh tree cannot violate hierarchy rules
        let _ = tree.append_child(tree.root(), html);
        let _ = tree.append_child(html, head);
        let _ = tree.append_child(html, body);

        Self {
            tree,
            html_element: html,
            head_element: head,
            body_element: body,
            mutations: Vec::new(),
        }
    }

    /// Access the DOM tree
    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    /// Document node
    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Get <html> element
    pub fn document_element(&self) -> NodeId {
        self.html_element
    }

    /// Get <head> element
    pub fn head(&self) -> NodeId {
        self.head_element
    }

    /// Get <body> element
    pub fn body(&self) -> NodeId {
        self.body_element
    }

    // === Tree structure ===

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.tree.create_element(tag)
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.tree.create_text(text)
    }

    /// Append a child (moving it if it already has a parent)
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` under `parent` before `reference`
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        let old_parent = self.tree.parent(child);
        if let Some(old) = old_parent {
            if self.tree.is_connected(old) {
                self.mutations.push(MutationRecord::child_list(old, Vec::new(), vec![child]));
            }
        }
        self.tree.insert_before(parent, child, reference)?;
        if self.tree.is_connected(parent) {
            self.mutations.push(MutationRecord::child_list(parent, vec![child], Vec::new()));
        }
        Ok(())
    }

    /// Detach a node from the document; it stays readable afterwards
    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        let connected = self.tree.is_connected(node);
        match self.tree.detach(node) {
            Some(parent) => {
                if connected {
                    self.mutations.push(MutationRecord::child_list(parent, Vec::new(), vec![node]));
                }
                Ok(())
            }
            None => Err(DomError::HierarchyRequest("node has no parent")),
        }
    }

    /// Replace `old` with `new` at the same position
    pub fn replace_with(&mut self, old: NodeId, new: NodeId) -> Result<(), DomError> {
        let parent = self.tree.parent(old)
            .ok_or(DomError::HierarchyRequest("node has no parent"))?;
        self.insert_before(parent, new, Some(old))?;
        self.remove(old)
    }

    /// Create an element with attributes and append it to `parent`
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId, DomError> {
        let el = self.create_element(tag);
        for (name, value) in attrs {
            self.set_attribute(el, name, value)?;
        }
        self.append_child(parent, el)?;
        Ok(el)
    }

    /// Create a text node and append it to `parent`
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId, DomError> {
        let node = self.create_text(text);
        self.append_child(parent, node)?;
        Ok(node)
    }

    /// Parent node
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.parent(node)
    }

    /// Parent if it is an element
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|&p| self.element(p).is_some())
    }

    /// Children in document order
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.tree.children(node)
    }

    /// Descendants in document order, excluding `node`
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.descendants(node)
    }

    /// Inclusive ancestor check
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tree.contains(ancestor, node)
    }

    /// Whether the node is currently in the document
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.tree.is_connected(node)
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(text) = self.tree.get(node).and_then(|n| n.as_text()) {
            out.push_str(text);
        }
        for id in self.tree.descendants(node) {
            if let Some(text) = self.tree.get(id).and_then(|n| n.as_text()) {
                out.push_str(text);
            }
        }
        out
    }

    /// Get connected element by ID
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.tree.descendants(self.root())
            .into_iter()
            .find(|&n| self.element(n).is_some_and(|e| e.id.as_deref() == Some(id)))
    }

    // === Elements and attributes ===

    /// Element data, if `node` is an element
    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        self.tree.get(node).and_then(|n| n.as_element())
    }

    fn element_mut(&mut self, node: NodeId) -> Result<&mut ElementData, DomError> {
        match self.tree.get_mut(node) {
            Some(n) => n.as_element_mut().ok_or(DomError::NotAnElement(node)),
            None => Err(DomError::NodeNotFound(node)),
        }
    }

    /// Lowercase tag name
    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    /// Get attribute value
    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|e| e.get_attr(name))
    }

    /// Check if attribute exists
    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.element(node).is_some_and(|e| e.has_attr(name))
    }

    /// Set attribute
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let old = self.element_mut(node)?.set_attr(name, value);
        if old.as_deref() != Some(value) && self.tree.is_connected(node) {
            self.mutations.push(MutationRecord::attributes(node, name, old));
        }
        Ok(())
    }

    /// Remove attribute
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), DomError> {
        let old = self.element_mut(node)?.remove_attr(name);
        if old.is_some() && self.tree.is_connected(node) {
            self.mutations.push(MutationRecord::attributes(node, name, old));
        }
        Ok(())
    }

    /// Check class membership
    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node).is_some_and(|e| e.has_class(class))
    }

    /// Add a class token
    pub fn add_class(&mut self, node: NodeId, class: &str) -> Result<(), DomError> {
        let el = self.element(node).ok_or(DomError::NotAnElement(node))?;
        if el.has_class(class) {
            return Ok(());
        }
        let mut classes = el.classes.clone();
        classes.push(class.to_string());
        self.set_attribute(node, "class", &classes.join(" "))
    }

    /// Remove a class token
    pub fn remove_class(&mut self, node: NodeId, class: &str) -> Result<(), DomError> {
        let el = self.element(node).ok_or(DomError::NotAnElement(node))?;
        if !el.has_class(class) {
            return Ok(());
        }
        let classes: Vec<&str> = el.classes.iter()
            .map(String::as_str)
            .filter(|c| *c != class)
            .collect();
        let value = classes.join(" ");
        self.set_attribute(node, "class", &value)
    }

    /// Add or remove a class token
    pub fn toggle_class(&mut self, node: NodeId, class: &str, force: bool) -> Result<(), DomError> {
        if force {
            self.add_class(node, class)
        } else {
            self.remove_class(node, class)
        }
    }

    // === Form controls ===

    /// `<input type="checkbox">`
    pub fn is_checkbox_input(&self, node: NodeId) -> bool {
        self.element(node).is_some_and(|e| {
            e.tag == "input" && e.get_attr("type").is_some_and(|t| t.eq_ignore_ascii_case("checkbox"))
        })
    }

    /// `checked` property
    pub fn checked(&self, node: NodeId) -> bool {
        self.element(node).is_some_and(|e| e.checked)
    }

    /// Set the `checked` property (does not touch the content attribute)
    pub fn set_checked(&mut self, node: NodeId, checked: bool) -> Result<(), DomError> {
        self.element_mut(node)?.checked = checked;
        Ok(())
    }

    /// `disabled` attribute
    pub fn is_disabled(&self, node: NodeId) -> bool {
        self.has_attribute(node, "disabled")
            || self.get_attribute(node, "aria-disabled") == Some("true")
    }

    // === Layout ===

    /// Assign a layout box
    pub fn set_rect(&mut self, node: NodeId, rect: DOMRect) -> Result<(), DomError> {
        self.element_mut(node)?.rect = Some(rect);
        Ok(())
    }

    /// Layout box; zero for detached or hidden elements
    pub fn bounding_client_rect(&self, node: NodeId) -> DOMRect {
        if !self.is_connected(node) {
            return DOMRect::new();
        }
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if let Some(el) = self.element(current) {
                if el.has_attr("hidden") || is_display_none(el.get_attr("style")) {
                    return DOMRect::new();
                }
            }
            cursor = self.parent(current);
        }
        self.element(node)
            .map(|e| e.rect.unwrap_or(DEFAULT_BOX))
            .unwrap_or_default()
    }

    /// Non-zero rendered extent
    pub fn is_rendered(&self, node: NodeId) -> bool {
        !self.bounding_client_rect(node).is_empty()
    }

    // === Mutations ===

    /// Drain queued mutation records
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    /// Whether any records are queued
    pub fn has_pending_mutations(&self) -> bool {
        !self.mutations.is_empty()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn is_display_none(style: Option<&str>) -> bool {
    style.is_some_and(|s| {
        s.split(';').any(|decl| {
            let mut parts = decl.splitn(2, ':');
            let prop = parts.next().unwrap_or("").trim();
            let value = parts.next().unwrap_or("").trim();
            prop.eq_ignore_ascii_case("display") && value.eq_ignore_ascii_case("none")
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MutationType;

    #[test]
    fn test_mutations_only_for_connected_nodes() {
        let mut doc = Document::new();
        let row = doc.create_element("div");
        doc.set_attribute(row, "role", "row").unwrap();
        assert!(!doc.has_pending_mutations());

        doc.append_child(doc.body(), row).unwrap();
        doc.set_attribute(row, "aria-selected", "true").unwrap();
        let records = doc.take_mutations();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].mutation_type, MutationType::ChildList);
        assert_eq!(records[1].attribute_name.as_deref(), Some("aria-selected"));
    }

    #[test]
    fn test_same_value_attribute_is_not_a_mutation() {
        let mut doc = Document::new();
        let body = doc.body();
        let el = doc.append_element(body, "div", &[("aria-checked", "false")]).unwrap();
        doc.take_mutations();

        doc.set_attribute(el, "aria-checked", "false").unwrap();
        assert!(!doc.has_pending_mutations());
    }

    #[test]
    fn test_class_helpers() {
        let mut doc = Document::new();
        let body = doc.body();
        let el = doc.append_element(body, "div", &[("class", "row")]).unwrap();

        doc.add_class(el, "is-checked").unwrap();
        assert!(doc.has_class(el, "is-checked"));
        doc.toggle_class(el, "is-checked", false).unwrap();
        assert!(!doc.has_class(el, "is-checked"));
        assert_eq!(doc.get_attribute(el, "class"), Some("row"));
    }

    #[test]
    fn test_hidden_ancestor_has_no_extent() {
        let mut doc = Document::new();
        let body = doc.body();
        let group = doc.append_element(body, "div", &[("style", "color: red; display : none")]).unwrap();
        let row = doc.append_element(group, "div", &[]).unwrap();
        assert!(!doc.is_rendered(row));

        doc.remove_attribute(group, "style").unwrap();
        assert!(doc.is_rendered(row));

        doc.set_rect(row, DOMRect::from_xywh(0.0, 0.0, 100.0, 0.0)).unwrap();
        assert!(!doc.is_rendered(row));
    }

    #[test]
    fn test_removed_node_is_readable() {
        let mut doc = Document::new();
        let body = doc.body();
        let row = doc.append_element(body, "div", &[("data-id", "42")]).unwrap();
        doc.append_text(row, "Invoice 42").unwrap();

        doc.remove(row).unwrap();
        assert!(!doc.is_connected(row));
        assert_eq!(doc.get_attribute(row, "data-id"), Some("42"));
        assert_eq!(doc.text_content(row), "Invoice 42");
        assert!(!doc.is_rendered(row));
    }
}
