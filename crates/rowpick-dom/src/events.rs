//! DOM Events
//!
//! Event objects, listener options and the dispatch log.

use crate::NodeId;

/// Event type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Click,
    MouseDown,
    MouseUp,
    PointerDown,
    KeyDown,
    Input,
    Change,
    Custom(u32),
}

impl EventType {
    /// Check if this event type can bubble
    pub fn bubbles(&self) -> bool {
        !matches!(self, EventType::Custom(_))
    }

    /// Check if the default action can be cancelled
    pub fn cancelable(&self) -> bool {
        matches!(self,
            EventType::Click |
            EventType::MouseDown |
            EventType::MouseUp |
            EventType::PointerDown |
            EventType::KeyDown
        )
    }

    /// DOM event name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Click => "click",
            EventType::MouseDown => "mousedown",
            EventType::MouseUp => "mouseup",
            EventType::PointerDown => "pointerdown",
            EventType::KeyDown => "keydown",
            EventType::Input => "input",
            EventType::Change => "change",
            EventType::Custom(_) => "custom",
        }
    }
}

/// Keyboard modifier state carried by pointer and key events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self { shift: false, ctrl: false, alt: false, meta: false };
    pub const SHIFT: Self = Self { shift: true, ctrl: false, alt: false, meta: false };
    pub const CTRL: Self = Self { shift: false, ctrl: true, alt: false, meta: false };

    /// Any modifier held
    pub fn any(&self) -> bool {
        self.shift || self.ctrl || self.alt || self.meta
    }
}

/// Dispatch phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventPhase {
    #[default]
    None,
    Capturing,
    AtTarget,
    Bubbling,
}

/// Event listener ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Listener options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    pub passive: bool,
    pub once: bool,
}

impl ListenerOptions {
    /// Capture phase, may cancel the default action
    pub const fn capturing() -> Self {
        Self { capture: true, passive: false, once: false }
    }

    /// Capture phase, never cancels
    pub const fn capturing_passive() -> Self {
        Self { capture: true, passive: true, once: false }
    }

    /// Bubble phase
    pub const fn bubbling() -> Self {
        Self { capture: false, passive: false, once: false }
    }
}

/// DOM event
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub target: NodeId,
    pub current_target: Option<NodeId>,
    pub phase: EventPhase,
    pub modifiers: Modifiers,
    /// Key name for keyboard events ("Escape", "a", ...)
    pub key: Option<String>,
    /// True only for events produced by real user input
    pub is_trusted: bool,
    pub bubbles: bool,
    pub cancelable: bool,
    default_prevented: bool,
    propagation_stopped: bool,
    immediate_propagation_stopped: bool,
    pub(crate) in_passive_listener: bool,
}

impl Event {
    fn new(event_type: EventType, target: NodeId, is_trusted: bool) -> Self {
        Self {
            event_type,
            target,
            current_target: None,
            phase: EventPhase::None,
            modifiers: Modifiers::NONE,
            key: None,
            is_trusted,
            bubbles: event_type.bubbles(),
            cancelable: event_type.cancelable(),
            default_prevented: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
            in_passive_listener: false,
        }
    }

    /// Event produced by user input
    pub fn user(event_type: EventType, target: NodeId, modifiers: Modifiers) -> Self {
        let mut event = Self::new(event_type, target, true);
        event.modifiers = modifiers;
        event
    }

    /// Event dispatched by script
    pub fn synthetic(event_type: EventType, target: NodeId) -> Self {
        Self::new(event_type, target, false)
    }

    /// Attach a key name
    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    /// Prevent default action
    pub fn prevent_default(&mut self) {
        if self.cancelable && !self.in_passive_listener {
            self.default_prevented = true;
        }
    }

    /// Stop propagation
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Stop propagation and skip remaining listeners on this node
    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_propagation_stopped = true;
    }

    /// Check if default was prevented
    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub(crate) fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub(crate) fn is_immediate_propagation_stopped(&self) -> bool {
        self.immediate_propagation_stopped
    }
}

/// Result of a dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub default_prevented: bool,
    pub listeners_invoked: usize,
}

/// Dispatch log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub event_type: EventType,
    pub target: NodeId,
    pub is_trusted: bool,
    pub modifiers: Modifiers,
}
