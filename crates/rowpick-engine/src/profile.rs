//! Page Profiles
//!
//! Each supported page kind carries a small set of selectors describing
//! where rows, row checkboxes and the grid container live. Routes are
//! matched against priority-ordered predicates to pick the profile.

use std::fmt;

use rowpick_dom::{Document, DomError, NodeId, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

/// Supported page kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageKind {
    /// Record grid with custom checkbox widgets
    Grid,
    /// Hierarchical grid with parent and child rows
    Tree,
    /// Plain table with native checkboxes
    FlatList,
}

impl PageKind {
    pub const ALL: [PageKind; 3] = [PageKind::Grid, PageKind::Tree, PageKind::FlatList];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Grid => "grid",
            PageKind::Tree => "tree",
            PageKind::FlatList => "flat-list",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a row's checkbox is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckboxKind {
    /// `<input type="checkbox">`; state lives in the `checked` property
    Native,
    /// `role="checkbox"` element; state lives in `aria-checked` and classes
    CustomWidget,
}

/// Row classification on hierarchical pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Plain,
    Parent,
    Child,
}

/// Static selector set for a built-in profile
#[derive(Debug, Clone, Copy)]
pub struct ProfileSpec {
    pub kind: PageKind,
    pub row: &'static str,
    pub checkbox: &'static str,
    pub container: &'static str,
    pub body: Option<&'static str>,
    pub parent_row: Option<&'static str>,
    pub checkbox_kind: CheckboxKind,
    pub native_checkbox_interactive: bool,
}

pub const GRID_SPEC: ProfileSpec = ProfileSpec {
    kind: PageKind::Grid,
    row: r#"[role="row"]:not(.grid-header)"#,
    checkbox: r#"[role="checkbox"]"#,
    container: r#"[role="grid"]"#,
    body: Some(r#"[role="rowgroup"]"#),
    parent_row: None,
    checkbox_kind: CheckboxKind::CustomWidget,
    native_checkbox_interactive: false,
};

pub const TREE_SPEC: ProfileSpec = ProfileSpec {
    kind: PageKind::Tree,
    row: r#"[role="row"]:not(.grid-header)"#,
    checkbox: r#"[role="checkbox"]"#,
    container: r#"[role="treegrid"]"#,
    body: Some(r#"[role="rowgroup"]"#),
    parent_row: Some("[aria-expanded]"),
    checkbox_kind: CheckboxKind::CustomWidget,
    native_checkbox_interactive: false,
};

pub const FLAT_LIST_SPEC: ProfileSpec = ProfileSpec {
    kind: PageKind::FlatList,
    row: "tbody > tr",
    checkbox: r#"input[type="checkbox"]"#,
    container: "table.list-view",
    body: Some("tbody"),
    parent_row: None,
    checkbox_kind: CheckboxKind::Native,
    native_checkbox_interactive: true,
};

/// Compiled selectors for one page kind
#[derive(Debug, Clone)]
pub struct PageProfile {
    pub kind: PageKind,
    pub row: Selector,
    pub checkbox: Selector,
    pub container: Selector,
    /// Scrolling body inside the container; rows outside it are not data rows
    pub body: Option<Selector>,
    pub parent_row: Option<Selector>,
    pub checkbox_kind: CheckboxKind,
    /// The host already handles clicks on the checkbox itself
    pub native_checkbox_interactive: bool,
}

impl PageProfile {
    pub fn compile(spec: &ProfileSpec) -> Result<Self, DomError> {
        Ok(Self {
            kind: spec.kind,
            row: Selector::parse(spec.row)?,
            checkbox: Selector::parse(spec.checkbox)?,
            container: Selector::parse(spec.container)?,
            body: spec.body.map(Selector::parse).transpose()?,
            parent_row: spec.parent_row.map(Selector::parse).transpose()?,
            checkbox_kind: spec.checkbox_kind,
            native_checkbox_interactive: spec.native_checkbox_interactive,
        })
    }

    /// Built-in profile for `kind`
    pub fn builtin(kind: PageKind) -> Result<Self, DomError> {
        let spec = match kind {
            PageKind::Grid => &GRID_SPEC,
            PageKind::Tree => &TREE_SPEC,
            PageKind::FlatList => &FLAT_LIST_SPEC,
        };
        Self::compile(spec)
    }

    /// Parent/child classification; `Plain` on non-hierarchical pages
    pub fn row_kind(&self, doc: &Document, row: NodeId) -> RowKind {
        match &self.parent_row {
            None => RowKind::Plain,
            Some(parent) if parent.matches(doc, row) => RowKind::Parent,
            Some(_) => RowKind::Child,
        }
    }

    /// First container on the page
    pub fn find_container(&self, doc: &Document) -> Option<NodeId> {
        doc.select_first(doc.root(), &self.container)
    }

    /// Nearest enclosing body, container, or the document itself
    pub fn scope_for(&self, doc: &Document, node: NodeId) -> NodeId {
        self.body
            .as_ref()
            .and_then(|body| doc.closest(node, body))
            .or_else(|| doc.closest(node, &self.container))
            .unwrap_or_else(|| doc.root())
    }
}

/// URL test used to pick a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePredicate {
    PathContains(String),
    PathPrefix(String),
    QueryEquals { key: String, value: String },
    FragmentContains(String),
}

impl RoutePredicate {
    pub fn path_contains(s: &str) -> Self {
        RoutePredicate::PathContains(s.to_string())
    }

    pub fn query_equals(key: &str, value: &str) -> Self {
        RoutePredicate::QueryEquals { key: key.to_string(), value: value.to_string() }
    }

    pub fn matches(&self, url: &Url) -> bool {
        match self {
            RoutePredicate::PathContains(s) => url.path().contains(s.as_str()),
            RoutePredicate::PathPrefix(s) => url.path().starts_with(s.as_str()),
            RoutePredicate::QueryEquals { key, value } => url
                .query_pairs()
                .any(|(k, v)| k == key.as_str() && v == value.as_str()),
            RoutePredicate::FragmentContains(s) => {
                url.fragment().is_some_and(|f| f.contains(s.as_str()))
            }
        }
    }
}

/// Profiles plus the priority-ordered routes that select them
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: Vec<PageProfile>,
    routes: Vec<(RoutePredicate, PageKind)>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in profiles and routes
    pub fn with_defaults() -> Result<Self, DomError> {
        let mut registry = Self::new();
        for kind in PageKind::ALL {
            registry.add_profile(PageProfile::builtin(kind)?);
        }
        // First match wins: explicit view parameters beat path segments
        registry.add_route(RoutePredicate::query_equals("view", "tree"), PageKind::Tree);
        registry.add_route(RoutePredicate::query_equals("view", "grid"), PageKind::Grid);
        registry.add_route(RoutePredicate::query_equals("view", "list"), PageKind::FlatList);
        registry.add_route(RoutePredicate::path_contains("/hierarchy"), PageKind::Tree);
        registry.add_route(RoutePredicate::path_contains("/grid"), PageKind::Grid);
        registry.add_route(RoutePredicate::path_contains("/list"), PageKind::FlatList);
        Ok(registry)
    }

    /// Add or replace the profile for its kind
    pub fn add_profile(&mut self, profile: PageProfile) {
        self.profiles.retain(|p| p.kind != profile.kind);
        self.profiles.push(profile);
    }

    /// Append a route at the lowest priority
    pub fn add_route(&mut self, predicate: RoutePredicate, kind: PageKind) {
        self.routes.push((predicate, kind));
    }

    pub fn profile(&self, kind: PageKind) -> Option<&PageProfile> {
        self.profiles.iter().find(|p| p.kind == kind)
    }

    /// Page kind for `url`, first matching route wins
    pub fn kind_for(&self, url: &Url) -> Option<PageKind> {
        self.routes
            .iter()
            .find(|(predicate, _)| predicate.matches(url))
            .map(|(_, kind)| *kind)
    }

    /// Profile for `url`
    pub fn resolve(&self, url: &Url) -> Option<&PageProfile> {
        self.kind_for(url).and_then(|kind| self.profile(kind))
    }
}
