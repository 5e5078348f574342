//! Geometry APIs
//!
//! DOMRect and the rendered-extent check used to tell virtualized-out
//! rows from visible ones.

/// Box assigned to elements the host never laid out explicitly
pub const DEFAULT_BOX: DOMRect = DOMRect { x: 0.0, y: 0.0, width: 640.0, height: 32.0 };

/// DOMRect - rectangle geometry
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DOMRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DOMRect {
    /// Create empty rect
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with dimensions
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// No rendered extent in at least one dimension
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}
