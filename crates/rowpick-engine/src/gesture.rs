//! Gesture Listener
//!
//! One delegated set of listeners per grid container turns raw clicks
//! into selection gestures. Classification order:
//!
//! 1. Untrusted events (including the engine's own bridge events) are ignored
//! 2. Clicks on interactive controls are ignored, as is the checkbox itself
//!    where the host already handles it
//! 3. Clicks outside any row clear the anchor
//! 4. Range-modifier clicks with an anchor select a range
//! 5. Anything else toggles the row and moves the anchor there

use std::cell::RefCell;
use std::rc::Rc;

use rowpick_dom::{Document, DomError, Event, EventType, ListenerId, ListenerOptions, NodeId, Page, Selector};

use crate::checkbox::{SetMode, StateAdapter};
use crate::identity::{identify, RowIdentity};
use crate::profile::{PageProfile, RowKind};
use crate::range::select_range;
use crate::selection_module::ModuleState;
use crate::settings::{RangeModifier, Settings};

/// Elements whose clicks belong to the host
pub const INTERACTIVE_SELECTOR: &str = "a[href], button, input, select, textarea, label, \
    [role=\"button\"], [role=\"link\"], [role=\"menuitem\"], [contenteditable]";

/// Last row the user toggled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionAnchor {
    pub identity: RowIdentity,
    pub row_kind: RowKind,
}

/// Why a click was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Synthetic,
    InteractiveControl,
    NativeCheckbox,
    /// Row without a checkbox
    NoControl,
}

/// Classified click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Ignore(IgnoreReason),
    ClearAnchor,
    Range { row: NodeId },
    Toggle { row: NodeId, control: NodeId },
}

/// Everything the listeners need besides module state
#[derive(Debug)]
pub struct GestureContext {
    pub adapter: StateAdapter,
    pub interactive: Selector,
    pub modifier: RangeModifier,
    pub escape_clears_selection: bool,
}

impl GestureContext {
    pub fn new(adapter: StateAdapter, settings: &Settings) -> Result<Self, DomError> {
        Ok(Self {
            adapter,
            interactive: Selector::parse(INTERACTIVE_SELECTOR)?,
            modifier: settings.range_modifier,
            escape_clears_selection: settings.escape_clears_selection,
        })
    }

    pub fn profile(&self) -> &PageProfile {
        self.adapter.profile()
    }
}

/// Classify a click
pub fn classify(
    doc: &Document,
    ctx: &GestureContext,
    event: &Event,
    anchor: Option<&SelectionAnchor>,
) -> Gesture {
    if !event.is_trusted {
        return Gesture::Ignore(IgnoreReason::Synthetic);
    }

    let profile = ctx.profile();
    let target = event.target;
    match doc.closest(target, &profile.checkbox) {
        Some(_) if profile.native_checkbox_interactive => {
            return Gesture::Ignore(IgnoreReason::NativeCheckbox);
        }
        Some(_) => {}
        None => {
            if doc.closest(target, &ctx.interactive).is_some() {
                return Gesture::Ignore(IgnoreReason::InteractiveControl);
            }
        }
    }

    let Some(row) = doc.closest(target, &profile.row) else {
        return Gesture::ClearAnchor;
    };

    if anchor.is_some() && ctx.modifier.is_held(event.modifiers) {
        return Gesture::Range { row };
    }

    let control = if profile.checkbox.matches(doc, row) {
        Some(row)
    } else {
        doc.select_first(row, &profile.checkbox)
    };
    match control {
        Some(control) => Gesture::Toggle { row, control },
        None => Gesture::Ignore(IgnoreReason::NoControl),
    }
}

/// Install the container listeners plus the document-level Escape handler
pub fn install(
    page: &mut Page,
    container: NodeId,
    ctx: &Rc<GestureContext>,
    state: &Rc<RefCell<ModuleState>>,
) -> Vec<ListenerId> {
    let mut ids = Vec::with_capacity(3);

    // Passive: never interferes with the host's own click handling
    let (c, s) = (ctx.clone(), state.clone());
    ids.push(page.add_event_listener(
        container,
        EventType::Click,
        ListenerOptions::capturing_passive(),
        move |page, event| on_click(page, event, &c, &s),
    ));

    // Suppresses text selection while range-clicking
    let (c, s) = (ctx.clone(), state.clone());
    ids.push(page.add_event_listener(
        container,
        EventType::MouseDown,
        ListenerOptions::capturing(),
        move |page, event| on_mousedown(page, event, &c, &s),
    ));

    let root = page.document().root();
    let (c, s) = (ctx.clone(), state.clone());
    ids.push(page.add_event_listener(
        root,
        EventType::KeyDown,
        ListenerOptions::capturing_passive(),
        move |page, event| on_keydown(page, event, &c, &s),
    ));

    ids
}

/// Anchor of an attached module; None when detached or busy
fn current_anchor(state: &Rc<RefCell<ModuleState>>) -> Option<Option<SelectionAnchor>> {
    let state = state.try_borrow().ok()?;
    state.attached.then(|| state.anchor.clone())
}

fn on_click(page: &mut Page, event: &mut Event, ctx: &GestureContext, state: &Rc<RefCell<ModuleState>>) {
    if !event.is_trusted {
        return;
    }
    let Some(anchor) = current_anchor(state) else {
        return;
    };

    match classify(page.document(), ctx, event, anchor.as_ref()) {
        Gesture::Ignore(reason) => {
            tracing::trace!("Click ignored: {:?}", reason);
        }
        Gesture::ClearAnchor => {
            if anchor.is_some() {
                tracing::debug!("Click outside rows, anchor cleared");
                state.borrow_mut().anchor = None;
            }
        }
        Gesture::Range { row } => {
            let Some(anchor) = anchor else {
                return;
            };
            match select_range(page, &ctx.adapter, &anchor.identity, row) {
                Ok(outcome) => tracing::debug!(
                    "Range applied: {} changed, {} already selected, {} skipped",
                    outcome.changed,
                    outcome.reasserted,
                    outcome.skipped
                ),
                Err(e) => tracing::info!("Range abandoned: {}", e),
            }
        }
        Gesture::Toggle { row, control } => {
            let doc = page.document();
            let next = SelectionAnchor {
                identity: identify(doc, row),
                row_kind: ctx.profile().row_kind(doc, row),
            };
            let desired = !ctx.adapter.get_state(page, control);
            let outcome = ctx.adapter.set_state(page, control, desired, row, SetMode::Toggle);
            tracing::debug!("Row {} toggled to {}: {:?}", next.identity, desired, outcome);
            state.borrow_mut().anchor = Some(next);
        }
    }
}

fn on_mousedown(page: &mut Page, event: &mut Event, ctx: &GestureContext, state: &Rc<RefCell<ModuleState>>) {
    if !event.is_trusted || !ctx.modifier.is_held(event.modifiers) {
        return;
    }
    let Some(anchor) = current_anchor(state) else {
        return;
    };
    if matches!(classify(page.document(), ctx, event, anchor.as_ref()), Gesture::Range { .. }) {
        event.prevent_default();
    }
}

fn on_keydown(page: &mut Page, event: &mut Event, ctx: &GestureContext, state: &Rc<RefCell<ModuleState>>) {
    if !event.is_trusted || event.key.as_deref() != Some("Escape") {
        return;
    }
    let Ok(mut guard) = state.try_borrow_mut() else {
        return;
    };
    if !guard.attached {
        return;
    }
    guard.anchor = None;
    let container = guard.container;
    drop(guard);
    tracing::debug!("Escape pressed, anchor cleared");

    if ctx.escape_clears_selection {
        let scope = container
            .filter(|&c| page.document().is_connected(c))
            .or_else(|| ctx.profile().find_container(page.document()));
        if let Some(scope) = scope {
            let cleared = ctx.adapter.clear_selection(page, scope);
            tracing::debug!("Escape deselected {} rows", cleared);
        }
    }
}
