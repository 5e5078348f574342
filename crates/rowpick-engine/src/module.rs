//! Page Modules
//!
//! A page module is one feature that attaches to supported pages and
//! detaches from everything else. The feature manager drives modules
//! only through this trait.
//!
//! # Contract
//!
//! - `attach` is idempotent: it tears down anything it installed before
//!   installing again, so repeated calls never stack listeners
//! - `detach` is optional; modules that support it declare
//!   [`ModuleCapabilities::DETACH`]
//! - Errors stay inside the module; the manager logs them and moves on

use rowpick_dom::{DomError, Page};

use crate::profile::PageKind;

/// Optional behaviours a module supports.
///
/// Multiple capabilities can be combined using the `|` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleCapabilities(u32);

impl ModuleCapabilities {
    /// Module can be detached and leaves nothing behind
    pub const DETACH: Self = Self(1 << 0);
    /// Module reports when its container was re-rendered
    pub const REATTACH_CHECK: Self = Self(1 << 1);
    /// No capabilities
    pub const NONE: Self = Self(0);

    /// Check if this capability set contains a specific capability.
    #[inline]
    pub const fn has(self, cap: Self) -> bool {
        (self.0 & cap.0) != 0
    }

    /// Combine two capability sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for ModuleCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl Default for ModuleCapabilities {
    fn default() -> Self {
        Self::NONE
    }
}

/// Page feature driven by the feature manager
pub trait PageModule {
    /// Name used in logs and reports
    fn name(&self) -> &str;

    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::NONE
    }

    /// Whether the module belongs on the current page
    fn should_activate(&self, page: &Page) -> bool;

    /// Install the module; safe to call repeatedly
    fn attach(&mut self, page: &mut Page) -> Result<(), ModuleError>;

    /// Remove everything `attach` installed.
    ///
    /// Only called when [`ModuleCapabilities::DETACH`] is declared.
    fn detach(&mut self, _page: &mut Page) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Whether an attached module must attach again, e.g. because the
    /// host replaced its container.
    ///
    /// Only consulted when [`ModuleCapabilities::REATTACH_CHECK`] is declared.
    fn needs_reattach(&self, _page: &Page) -> bool {
        false
    }
}

/// Module errors
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("No profile registered for page kind {0}")]
    UnknownKind(PageKind),

    #[error("Module {0} is busy")]
    Busy(String),

    #[error("Module {module} failed: {reason}")]
    Failed {
        module: String,
        reason: String,
    },
}
