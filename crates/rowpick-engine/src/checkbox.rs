//! Checkbox State Adapter
//!
//! Reads and writes the selection state of one row's checkbox through the
//! host's own event pathways. The host owns its selection model; writing
//! the visual state alone would desynchronize it, so every write is
//! followed by the event sequence the host listens for, and one deferred
//! check that the host kept the state.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rowpick_dom::{DomError, Event, EventType, NodeId, Page};

use crate::identity::{identify, locate, RowIdentity};
use crate::profile::{CheckboxKind, PageProfile};
use crate::range::visible_rows;

/// Classes hosts use to mark a checked custom widget
pub const CHECKED_CLASSES: &[&str] = &["is-checked", "checked", "selected"];

/// Class written when checking a custom widget
pub const CHECKED_CLASS: &str = "is-checked";

/// Default delay before verifying a write
pub const DEFAULT_REASSERT_DELAY_MS: u64 = 50;

/// Write mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Single-row toggle; no-op when the state already matches
    Toggle,
    /// Range fill; rows already selected are re-asserted
    RangeAssert,
}

/// Result of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Unchanged,
    Changed,
    /// Visual state rewritten on an already-selected row
    Reasserted,
    /// Disabled control, left alone
    Skipped,
    Failed,
}

/// Get/set the selection state of row checkboxes for one page profile
#[derive(Debug, Clone)]
pub struct StateAdapter {
    profile: Rc<PageProfile>,
    reassert_delay_ms: u64,
    /// Latest write per row; only that write's verification may act
    generations: Rc<RefCell<HashMap<RowIdentity, u64>>>,
}

impl StateAdapter {
    pub fn new(profile: Rc<PageProfile>, reassert_delay_ms: u64) -> Self {
        Self {
            profile,
            reassert_delay_ms,
            generations: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn profile(&self) -> &PageProfile {
        &self.profile
    }

    pub fn reassert_delay_ms(&self) -> u64 {
        self.reassert_delay_ms
    }

    /// Checkbox control of `row`
    pub fn control_for_row(&self, page: &Page, row: NodeId) -> Option<NodeId> {
        let doc = page.document();
        if self.profile.checkbox.matches(doc, row) {
            return Some(row);
        }
        doc.select_first(row, &self.profile.checkbox)
    }

    /// Current checked state of `control`
    pub fn get_state(&self, page: &Page, control: NodeId) -> bool {
        let doc = page.document();
        match self.profile.checkbox_kind {
            CheckboxKind::Native => doc.checked(control),
            CheckboxKind::CustomWidget => match doc.get_attribute(control, "aria-checked") {
                Some("true") => true,
                // Indeterminate counts as unchecked
                Some("false") | Some("mixed") => false,
                _ => CHECKED_CLASSES.iter().any(|class| doc.has_class(control, class)),
            },
        }
    }

    /// Drive `control` to `desired` and notify the host
    pub fn set_state(
        &self,
        page: &mut Page,
        control: NodeId,
        desired: bool,
        row: NodeId,
        mode: SetMode,
    ) -> SetOutcome {
        if page.document().is_disabled(control) {
            tracing::debug!("Checkbox of row {} is disabled", identify(page.document(), row));
            return SetOutcome::Skipped;
        }

        let current = self.get_state(page, control);
        let outcome = match (current == desired, mode) {
            (true, SetMode::Toggle) => return SetOutcome::Unchanged,
            (true, SetMode::RangeAssert) if !desired => return SetOutcome::Unchanged,
            (true, SetMode::RangeAssert) => {
                // Host already has it; refresh the visual state only
                if let Err(e) = self.write_visual(page, control, row, desired) {
                    tracing::warn!("Re-asserting row state failed: {}", e);
                    return SetOutcome::Failed;
                }
                SetOutcome::Reasserted
            }
            (false, _) => {
                if let Err(e) = self.write_visual(page, control, row, desired) {
                    tracing::warn!("Writing row state failed: {}", e);
                    return SetOutcome::Failed;
                }
                self.notify_host(page, control);
                SetOutcome::Changed
            }
        };

        self.schedule_verification(page, control, row, desired);
        outcome
    }

    /// Uncheck every visible checked row under `scope`; returns the count
    pub fn clear_selection(&self, page: &mut Page, scope: NodeId) -> usize {
        let rows = visible_rows(page.document(), scope, &self.profile);
        let mut cleared = 0;
        for row in rows {
            let Some(live) = locate(page.document(), scope, &self.profile, &row.identity) else {
                continue;
            };
            let Some(control) = self.control_for_row(page, live) else {
                continue;
            };
            if self.get_state(page, control)
                && self.set_state(page, control, false, live, SetMode::Toggle) == SetOutcome::Changed
            {
                cleared += 1;
            }
        }
        cleared
    }

    fn write_visual(&self, page: &mut Page, control: NodeId, row: NodeId, desired: bool) -> Result<(), DomError> {
        let doc = page.document_mut();
        match self.profile.checkbox_kind {
            CheckboxKind::Native => doc.set_checked(control, desired)?,
            CheckboxKind::CustomWidget => {
                doc.set_attribute(control, "aria-checked", if desired { "true" } else { "false" })?;
                doc.toggle_class(control, CHECKED_CLASS, desired)?;
            }
        }
        if doc.has_attribute(row, "aria-selected") {
            doc.set_attribute(row, "aria-selected", if desired { "true" } else { "false" })?;
        }
        Ok(())
    }

    /// Event sequence the host's own input handling listens for
    fn notify_host(&self, page: &mut Page, control: NodeId) {
        let sequence: &[EventType] = match self.profile.checkbox_kind {
            // A click would run the default action and toggle back
            CheckboxKind::Native => &[EventType::Input, EventType::Change],
            CheckboxKind::CustomWidget => &[EventType::Click, EventType::Change, EventType::Input],
        };
        for &event_type in sequence {
            if !page.document().is_connected(control) {
                break;
            }
            page.dispatch_event(Event::synthetic(event_type, control));
        }
    }

    fn schedule_verification(&self, page: &mut Page, control: NodeId, row: NodeId, desired: bool) {
        let adapter = self.clone();
        let identity = identify(page.document(), row);
        let scope = self.profile.scope_for(page.document(), row);
        let generation = {
            let mut generations = self.generations.borrow_mut();
            let entry = generations.entry(identity.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        page.set_timeout(self.reassert_delay_ms, move |page| {
            if adapter.finish_write(&identity, generation) {
                adapter.verify(page, control, scope, &identity, desired);
            }
        });
    }

    /// True if `generation` is still the latest write to the row
    fn finish_write(&self, identity: &RowIdentity, generation: u64) -> bool {
        let mut generations = self.generations.borrow_mut();
        if generations.get(identity) != Some(&generation) {
            return false;
        }
        generations.remove(identity);
        true
    }

    /// One-shot check that the host kept the written state
    fn verify(&self, page: &mut Page, control: NodeId, scope: NodeId, identity: &RowIdentity, desired: bool) {
        let (row, control) = if page.document().is_connected(control) {
            let row = page.document().closest(control, &self.profile.row).unwrap_or(control);
            (row, control)
        } else {
            let Some(row) = locate(page.document(), scope, &self.profile, identity) else {
                tracing::debug!("Row {} is gone, nothing to verify", identity);
                return;
            };
            let Some(control) = self.control_for_row(page, row) else {
                return;
            };
            (row, control)
        };

        if self.get_state(page, control) == desired {
            return;
        }

        tracing::warn!("Host did not keep the state of row {}, re-asserting once", identity);
        match self.write_visual(page, control, row, desired) {
            Ok(()) => self.notify_host(page, control),
            Err(e) => tracing::warn!("Re-assertion of row {} failed: {}", identity, e),
        }
    }
}
