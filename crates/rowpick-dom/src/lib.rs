//! rowpick DOM - Host page model
//!
//! Arena DOM tree, structural selectors, event dispatch, timers and
//! in-app history. The selection engine only ever sees a host page
//! through the [`Page`] type defined here.

mod node;
mod tree;
mod document;
mod page;
pub mod selector;
pub mod geometry;
pub mod events;
pub mod timers;
pub mod history;
pub mod observer;

pub use node::{Node, NodeData, ElementData, Attribute};
pub use tree::DomTree;
pub use document::Document;
pub use page::{Page, EventHandler, MutationCallback, NavigationCallback, TimerTask, ObserverId, SubscriptionId};
pub use selector::Selector;
pub use geometry::DOMRect;
pub use events::{Event, EventType, EventPhase, Modifiers, ListenerOptions, ListenerId, DispatchOutcome, LoggedEvent};
pub use timers::{TimerId, TimerQueue};
pub use history::{HistoryManager, HistoryEntry};
pub use observer::{MutationRecord, MutationType};

/// Node identifier (index into arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Document node ID
    pub const ROOT: NodeId = NodeId(0);

    /// Arena index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// DOM error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: &'static str },

    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    #[error("Node is not an element: {0:?}")]
    NotAnElement(NodeId),

    #[error("Hierarchy request error: {0}")]
    HierarchyRequest(&'static str),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
