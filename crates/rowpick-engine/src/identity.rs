//! Row Identity
//!
//! Hosts virtualize and re-render rows, so element handles go stale.
//! A row identity is derived from the most stable signal the row offers
//! and is used to find the row's current element again.

use std::fmt;

use rowpick_dom::{Document, NodeId};

use crate::profile::PageProfile;

/// Host-provided stable key attributes, in priority order
pub const STABLE_KEY_ATTRIBUTES: &[&str] = &[
    "data-id",
    "data-row-id",
    "data-item-id",
    "data-key",
    "data-selection-key",
];

/// Positional attributes; stable only while the row order is
pub const POSITIONAL_ATTRIBUTES: &[&str] = &[
    "aria-rowindex",
    "data-index",
    "data-row-index",
];

/// Length of the text fingerprint, in characters
pub const FINGERPRINT_LEN: usize = 64;

/// Signal an identity was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentitySource {
    DataAttribute,
    IdAttribute,
    Positional,
    TextFingerprint,
}

impl IdentitySource {
    fn prefix(&self) -> &'static str {
        match self {
            IdentitySource::DataAttribute => "key",
            IdentitySource::IdAttribute => "id",
            IdentitySource::Positional => "pos",
            IdentitySource::TextFingerprint => "text",
        }
    }
}

/// Stable row key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowIdentity {
    source: IdentitySource,
    key: String,
}

impl RowIdentity {
    pub fn new(source: IdentitySource, key: &str) -> Self {
        Self { source, key: key.to_string() }
    }

    pub fn source(&self) -> IdentitySource {
        self.source
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Text fingerprints collide for rows with identical content
    pub fn is_weak(&self) -> bool {
        self.source == IdentitySource::TextFingerprint
    }
}

impl fmt::Display for RowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source.prefix(), self.key)
    }
}

/// Derive the identity of `row`
pub fn identify(doc: &Document, row: NodeId) -> RowIdentity {
    let non_empty = |name: &str| doc.get_attribute(row, name).filter(|v| !v.trim().is_empty());

    if let Some(key) = STABLE_KEY_ATTRIBUTES.iter().find_map(|name| non_empty(name)) {
        return RowIdentity::new(IdentitySource::DataAttribute, key.trim());
    }
    if let Some(id) = non_empty("id") {
        return RowIdentity::new(IdentitySource::IdAttribute, id.trim());
    }
    if let Some(index) = POSITIONAL_ATTRIBUTES.iter().find_map(|name| non_empty(name)) {
        return RowIdentity::new(IdentitySource::Positional, index.trim());
    }
    RowIdentity::new(IdentitySource::TextFingerprint, &fingerprint(&doc.text_content(row)))
}

/// Whitespace-collapsed prefix of the row text
fn fingerprint(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(FINGERPRINT_LEN).collect()
}

/// Current element for `identity` within `scope`
///
/// Falls back to the whole document when `scope` itself was re-rendered
/// away. Returns the first match in document order.
pub fn locate(
    doc: &Document,
    scope: NodeId,
    profile: &PageProfile,
    identity: &RowIdentity,
) -> Option<NodeId> {
    let scope = if doc.is_connected(scope) { scope } else { doc.root() };
    doc.select_all(scope, &profile.row)
        .into_iter()
        .find(|&row| identify(doc, row) == *identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::PageKind;

    fn row(doc: &mut Document, attrs: &[(&str, &str)], text: &str) -> NodeId {
        let body = doc.body();
        let mut all = vec![("role", "row")];
        all.extend_from_slice(attrs);
        let row = doc.append_element(body, "div", &all).unwrap();
        doc.append_text(row, text).unwrap();
        row
    }

    #[test]
    fn test_identity_priority() {
        let mut doc = Document::new();
        let keyed = row(&mut doc, &[("data-row-id", "42"), ("id", "row-x"), ("aria-rowindex", "3")], "A");
        let by_id = row(&mut doc, &[("id", "row-y"), ("aria-rowindex", "4")], "B");
        let positional = row(&mut doc, &[("aria-rowindex", "5")], "C");
        let text = row(&mut doc, &[], "  Acme   Corp \n  Seattle ");

        assert_eq!(identify(&doc, keyed), RowIdentity::new(IdentitySource::DataAttribute, "42"));
        assert_eq!(identify(&doc, by_id), RowIdentity::new(IdentitySource::IdAttribute, "row-y"));
        assert_eq!(identify(&doc, positional).source(), IdentitySource::Positional);

        let fp = identify(&doc, text);
        assert_eq!(fp.key(), "Acme Corp Seattle");
        assert!(fp.is_weak());
        assert_eq!(fp.to_string(), "text:Acme Corp Seattle");
    }

    #[test]
    fn test_empty_attributes_are_skipped() {
        let mut doc = Document::new();
        let r = row(&mut doc, &[("data-id", "  "), ("id", "fallback")], "x");
        assert_eq!(identify(&doc, r).source(), IdentitySource::IdAttribute);
    }

    #[test]
    fn test_fingerprint_truncated() {
        let long = "x".repeat(200);
        assert_eq!(fingerprint(&long).chars().count(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_locate_after_rerender() {
        let profile = PageProfile::builtin(PageKind::Grid).unwrap();
        let mut doc = Document::new();
        let first = row(&mut doc, &[("data-id", "r1")], "one");
        let identity = identify(&doc, first);

        doc.remove(first).unwrap();
        assert_eq!(locate(&doc, doc.root(), &profile, &identity), None);

        let again = row(&mut doc, &[("data-id", "r1")], "one");
        assert_ne!(again, first);
        assert_eq!(locate(&doc, doc.root(), &profile, &identity), Some(again));
    }

    #[test]
    fn test_locate_with_detached_scope() {
        let profile = PageProfile::builtin(PageKind::Grid).unwrap();
        let mut doc = Document::new();
        let body = doc.body();
        let old_group = doc.append_element(body, "div", &[("role", "rowgroup")]).unwrap();
        doc.remove(old_group).unwrap();
        let live = row(&mut doc, &[("data-id", "r9")], "nine");

        let identity = RowIdentity::new(IdentitySource::DataAttribute, "r9");
        assert_eq!(locate(&doc, old_group, &profile, &identity), Some(live));
    }
}
