//! DOM Node
//!
//! Nodes are stored in the tree arena and reference each other by
//! [`NodeId`]. Element data keeps the `id` and class list cached next to
//! the raw attributes since those are the hottest lookups during
//! selector matching.

use crate::NodeId;
use crate::geometry::DOMRect;

/// DOM Node - Core structure
#[derive(Debug, Clone)]
pub struct Node {
    /// Parent node (None if detached or root)
    pub parent: Option<NodeId>,
    /// Children in document order
    pub children: Vec<NodeId>,
    /// Node-specific data
    pub data: NodeData,
}

impl Node {
    /// Create a new element node
    pub fn element(tag: &str) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            data: NodeData::Element(ElementData::new(tag)),
        }
    }

    /// Create a new text node
    pub fn text(content: &str) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            data: NodeData::Text(content.to_string()),
        }
    }

    /// Create a document node
    pub fn document() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            data: NodeData::Document,
        }
    }

    /// Check if this is an element
    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    /// Get element data if this is an element
    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get mutable element data
    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get text content if this is a text node
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Node-specific data
#[derive(Debug, Clone)]
pub enum NodeData {
    /// Document root
    Document,
    /// Element
    Element(ElementData),
    /// Text content
    Text(String),
    /// Comment
    Comment(String),
}

/// Attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Element-specific data
#[derive(Debug, Clone)]
pub struct ElementData {
    /// Lowercase tag name
    pub tag: String,
    /// Attributes in insertion order
    pub attrs: Vec<Attribute>,
    /// Cached id attribute
    pub id: Option<String>,
    /// Cached class list
    pub classes: Vec<String>,
    /// `checked` IDL property of form controls
    pub checked: bool,
    /// Layout box assigned by the host (None = default box)
    pub rect: Option<DOMRect>,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            id: None,
            classes: Vec::new(),
            checked: false,
            rect: None,
        }
    }

    /// Get an attribute value
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Check if attribute exists
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }

    /// Set an attribute, returning the previous value
    pub fn set_attr(&mut self, name: &str, value: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        let old = match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(attr) => Some(std::mem::replace(&mut attr.value, value.to_string())),
            None => {
                self.attrs.push(Attribute { name: name.clone(), value: value.to_string() });
                None
            }
        };
        self.sync_cached(&name);
        old
    }

    /// Remove an attribute, returning the previous value
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|a| a.name == name)?;
        let old = self.attrs.remove(pos);
        self.sync_cached(name);
        Some(old.value)
    }

    /// Check class membership
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn sync_cached(&mut self, name: &str) {
        match name {
            "id" => self.id = self.get_attr("id").map(str::to_string),
            "class" => {
                self.classes = self.get_attr("class")
                    .map(|v| v.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();
            }
            "checked" => self.checked = self.has_attr("checked"),
            _ => {}
        }
    }
}
