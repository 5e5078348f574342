//! rowpick Engine
//!
//! Adds bulk row-selection gestures to data-grid pages of a host
//! application the engine does not control. The host stays the single
//! source of truth for what is selected; the engine only replays the
//! input events a person would have produced.
//!
//! Features:
//! - Page profiles for grid, tree and flat list pages
//! - Stable row identities that survive host re-renders
//! - Click to toggle, shift-click range selection, Escape / click-away to clear
//! - Route and mutation watching for single-page navigation
//! - A lifecycle manager with idempotent attach/detach per page module

pub mod profile;
pub mod identity;
pub mod checkbox;
pub mod range;
pub mod gesture;
pub mod watcher;
pub mod module;
pub mod selection_module;
pub mod manager;
pub mod settings;
pub mod messaging;
pub mod logging;

pub use profile::{PageKind, CheckboxKind, RowKind, PageProfile, ProfileRegistry, RoutePredicate};
pub use identity::{RowIdentity, IdentitySource, identify, locate};
pub use checkbox::{StateAdapter, SetMode, SetOutcome};
pub use range::{VisibleRow, RangeOutcome, RangeError, visible_rows, select_range};
pub use gesture::{Gesture, IgnoreReason, SelectionAnchor, GestureContext, classify};
pub use watcher::{RouteWatcher, WatchState, Debouncer};
pub use module::{PageModule, ModuleCapabilities, ModuleError};
pub use selection_module::{RowSelectionModule, ModuleState};
pub use manager::{FeatureManager, ModuleReport, ModuleAction};
pub use settings::{Settings, SettingsStore, MemoryStore, SettingsError, RangeModifier};
pub use messaging::{Message, MessageChannel, InstanceId, MessagingError, publish_enabled};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
