//! Range Selection
//!
//! Shift-click selects every visible row between the anchor and the
//! clicked row, inclusive, in either direction. Rows are resolved to
//! identities first and to live elements one at a time, because the host
//! may re-render while the range is being applied.

use rowpick_dom::{Document, NodeId, Page};

use crate::checkbox::{SetMode, SetOutcome, StateAdapter};
use crate::identity::{identify, locate, RowIdentity};
use crate::profile::{PageProfile, RowKind};

/// Range errors; all of them abandon the range without touching the page
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("Click target is not inside a row")]
    TargetNotRow,

    #[error("Anchor {0} is not among the visible rows")]
    AnchorNotVisible(RowIdentity),

    #[error("Target {0} is not among the visible rows")]
    TargetNotVisible(RowIdentity),
}

/// A rendered row
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleRow {
    pub node: NodeId,
    pub identity: RowIdentity,
    pub kind: RowKind,
}

/// Result of applying a range
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeOutcome {
    /// Identities in the range, in display order
    pub rows: Vec<RowIdentity>,
    pub changed: usize,
    pub reasserted: usize,
    /// Rows that vanished or could not be written mid-range
    pub skipped: usize,
}

/// Rows under `scope` with a non-zero rendered extent, in document order
pub fn visible_rows(doc: &Document, scope: NodeId, profile: &PageProfile) -> Vec<VisibleRow> {
    doc.select_all(scope, &profile.row)
        .into_iter()
        .filter(|&row| doc.is_rendered(row))
        .map(|row| VisibleRow {
            node: row,
            identity: identify(doc, row),
            kind: profile.row_kind(doc, row),
        })
        .collect()
}

/// Select every row between `anchor` and the row containing `target`
///
/// The anchor is not moved. Between two child rows of a hierarchical
/// page, parent rows in between are left out of the range.
pub fn select_range(
    page: &mut Page,
    adapter: &StateAdapter,
    anchor: &RowIdentity,
    target: NodeId,
) -> Result<RangeOutcome, RangeError> {
    let profile = adapter.profile();
    let doc = page.document();

    let target_row = doc.closest(target, &profile.row).ok_or(RangeError::TargetNotRow)?;
    let target_id = identify(doc, target_row);
    let scope = profile.scope_for(doc, target_row);

    let mut rows = visible_rows(doc, scope, profile);
    let anchor_kind = rows
        .iter()
        .find(|r| r.identity == *anchor)
        .map(|r| r.kind)
        .ok_or_else(|| RangeError::AnchorNotVisible(anchor.clone()))?;
    let target_kind = rows
        .iter()
        .find(|r| r.identity == target_id)
        .map(|r| r.kind)
        .ok_or_else(|| RangeError::TargetNotVisible(target_id.clone()))?;

    if anchor_kind == RowKind::Child && target_kind == RowKind::Child {
        rows.retain(|r| r.kind == RowKind::Child);
    }

    let from = rows
        .iter()
        .position(|r| r.identity == *anchor)
        .ok_or_else(|| RangeError::AnchorNotVisible(anchor.clone()))?;
    let to = rows
        .iter()
        .position(|r| r.identity == target_id)
        .ok_or_else(|| RangeError::TargetNotVisible(target_id.clone()))?;
    let (lo, hi) = (from.min(to), from.max(to));

    let span: Vec<RowIdentity> = rows[lo..=hi].iter().map(|r| r.identity.clone()).collect();
    tracing::debug!("Range {} -> {} covers {} rows", anchor, target_id, span.len());

    let mut outcome = RangeOutcome { rows: span.clone(), ..Default::default() };
    for identity in &span {
        // The host may have replaced the element since the scan
        let Some(live) = locate(page.document(), scope, adapter.profile(), identity) else {
            tracing::debug!("Row {} disappeared during range selection", identity);
            outcome.skipped += 1;
            continue;
        };
        let Some(control) = adapter.control_for_row(page, live) else {
            tracing::debug!("Row {} has no checkbox", identity);
            outcome.skipped += 1;
            continue;
        };
        match adapter.set_state(page, control, true, live, SetMode::RangeAssert) {
            SetOutcome::Changed => outcome.changed += 1,
            SetOutcome::Reasserted | SetOutcome::Unchanged => outcome.reasserted += 1,
            SetOutcome::Skipped | SetOutcome::Failed => outcome.skipped += 1,
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::PageKind;
    use std::rc::Rc;

    fn list_page(n: usize) -> (Page, Vec<NodeId>) {
        let mut page = Page::new("https://app.example/records/list").unwrap();
        let doc = page.document_mut();
        let body = doc.body();
        let table = doc.append_element(body, "table", &[("class", "list-view")]).unwrap();
        let tbody = doc.append_element(table, "tbody", &[]).unwrap();
        let mut rows = Vec::new();
        for i in 1..=n {
            let id = format!("r{}", i);
            let tr = doc.append_element(tbody, "tr", &[("data-id", id.as_str())]).unwrap();
            let td = doc.append_element(tr, "td", &[]).unwrap();
            doc.append_element(td, "input", &[("type", "checkbox")]).unwrap();
            rows.push(tr);
        }
        (page, rows)
    }

    fn adapter() -> StateAdapter {
        StateAdapter::new(Rc::new(PageProfile::builtin(PageKind::FlatList).unwrap()), 50)
    }

    fn checked_ids(page: &Page, adapter: &StateAdapter, rows: &[NodeId]) -> Vec<String> {
        rows.iter()
            .filter(|&&r| {
                let cb = adapter.control_for_row(page, r).unwrap();
                adapter.get_state(page, cb)
            })
            .map(|&r| identify(page.document(), r).key().to_string())
            .collect()
    }

    #[test]
    fn test_reversed_range() {
        let (mut page, rows) = list_page(8);
        let adapter = adapter();
        let anchor = identify(page.document(), rows[5]);

        let outcome = select_range(&mut page, &adapter, &anchor, rows[1]).unwrap();
        assert_eq!(outcome.rows.len(), 5);
        assert_eq!(outcome.changed, 5);
        assert_eq!(checked_ids(&page, &adapter, &rows), vec!["r2", "r3", "r4", "r5", "r6"]);
    }

    #[test]
    fn test_hidden_rows_are_skipped() {
        let (mut page, rows) = list_page(5);
        page.document_mut().set_attribute(rows[2], "hidden", "").unwrap();
        let adapter = adapter();
        let anchor = identify(page.document(), rows[0]);

        let outcome = select_range(&mut page, &adapter, &anchor, rows[4]).unwrap();
        assert_eq!(outcome.rows.len(), 4);
        assert_eq!(checked_ids(&page, &adapter, &rows), vec!["r1", "r2", "r4", "r5"]);
    }

    #[test]
    fn test_anchor_not_visible_leaves_page_untouched() {
        let (mut page, rows) = list_page(5);
        let adapter = adapter();
        let anchor = identify(page.document(), rows[0]);
        page.document_mut().remove(rows[0]).unwrap();
        page.flush();
        page.clear_event_log();

        let err = select_range(&mut page, &adapter, &anchor, rows[3]).unwrap_err();
        assert_eq!(err, RangeError::AnchorNotVisible(anchor));
        assert!(page.event_log().is_empty());
        assert!(checked_ids(&page, &adapter, &rows[1..]).is_empty());
    }

    #[test]
    fn test_target_outside_rows() {
        let (mut page, rows) = list_page(2);
        let adapter = adapter();
        let anchor = identify(page.document(), rows[0]);
        let body = page.document().body();
        assert_eq!(select_range(&mut page, &adapter, &anchor, body), Err(RangeError::TargetNotRow));
    }

    #[test]
    fn test_anchor_equals_target() {
        let (mut page, rows) = list_page(3);
        let adapter = adapter();
        let anchor = identify(page.document(), rows[1]);
        let cb = adapter.control_for_row(&page, rows[1]).unwrap();
        page.document_mut().set_checked(cb, true).unwrap();

        let outcome = select_range(&mut page, &adapter, &anchor, rows[1]).unwrap();
        assert_eq!(outcome.changed, 0);
        assert_eq!(outcome.reasserted, 1);
        assert!(adapter.get_state(&page, cb));
    }
}
