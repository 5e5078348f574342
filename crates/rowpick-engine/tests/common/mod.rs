//! Shared fixtures: host pages and a stand-in host application that owns
//! the selection model and only learns about changes through events.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use rowpick_dom::{EventType, ListenerOptions, NodeId, Page, Selector};
use rowpick_engine::{
    FeatureManager, ModuleState, PageKind, PageModule, ProfileRegistry, RowSelectionModule, Settings,
};

pub const GRID_URL: &str = "https://app.example/records/grid";
pub const TREE_URL: &str = "https://app.example/accounts/hierarchy";
pub const LIST_URL: &str = "https://app.example/records/list";

/// Stand-in host application
#[derive(Clone, Default)]
pub struct Host {
    pub selected: Rc<RefCell<BTreeSet<String>>>,
    /// Change events the host handled
    pub changes: Rc<Cell<u32>>,
    /// Rows whose changes the host refuses and reverts shortly after
    locked: Rc<RefCell<BTreeSet<String>>>,
    /// One-shot re-renders: change on key -> rows to replace
    rerender_on: Rc<RefCell<HashMap<String, Vec<String>>>>,
}

impl Host {
    pub fn install(page: &mut Page) -> Self {
        let host = Host::default();
        let h = host.clone();
        let root = page.document().root();
        page.add_event_listener(root, EventType::Change, ListenerOptions::bubbling(), move |page, event| {
            h.on_change(page, event.target);
        });
        host
    }

    pub fn selected(&self) -> Vec<String> {
        self.selected.borrow().iter().cloned().collect()
    }

    pub fn lock(&self, key: &str) {
        self.locked.borrow_mut().insert(key.to_string());
    }

    /// When `key` changes, replace the elements of `rows` with fresh copies
    pub fn rerender_after(&self, key: &str, rows: &[&str]) {
        self.rerender_on
            .borrow_mut()
            .insert(key.to_string(), rows.iter().map(|s| s.to_string()).collect());
    }

    fn on_change(&self, page: &mut Page, control: NodeId) {
        let doc = page.document();
        let Some(row) = closest_keyed(page, control) else {
            return;
        };
        let Some(key) = doc.get_attribute(row, "data-id").map(str::to_string) else {
            return;
        };
        let checked = if doc.is_checkbox_input(control) {
            doc.checked(control)
        } else {
            doc.get_attribute(control, "aria-checked") == Some("true")
        };
        self.changes.set(self.changes.get() + 1);

        if self.locked.borrow().contains(&key) {
            // Async re-render from the unchanged model
            page.set_timeout(10, move |page| {
                if let Some(cb) = checkbox_of(page, &key) {
                    let _ = page.document_mut().set_attribute(cb, "aria-checked", "false");
                }
            });
            return;
        }

        if checked {
            self.selected.borrow_mut().insert(key.clone());
        } else {
            self.selected.borrow_mut().remove(&key);
        }

        let rerender = self.rerender_on.borrow_mut().remove(&key);
        for id in rerender.unwrap_or_default() {
            self.replace_row(page, &id);
        }
    }

    /// Swap a row element for a freshly rendered one, state from the model
    pub fn replace_row(&self, page: &mut Page, key: &str) {
        let Some(old) = row_by_id(page, key) else {
            return;
        };
        let native = page.document().tag_name(old) == Some("tr");
        let attrs: Vec<(String, String)> = page
            .document()
            .element(old)
            .map(|e| e.attrs.iter().map(|a| (a.name.clone(), a.value.clone())).collect())
            .unwrap_or_default();
        let checked = self.selected.borrow().contains(key);

        let doc = page.document_mut();
        let fresh = doc.create_element(if native { "tr" } else { "div" });
        for (name, value) in &attrs {
            doc.set_attribute(fresh, name, value).unwrap();
        }
        if native {
            fill_list_row(page, fresh, key, checked);
        } else {
            fill_grid_row(page, fresh, key, checked);
        }
        page.document_mut().replace_with(old, fresh).unwrap();
    }
}

fn closest_keyed(page: &Page, node: NodeId) -> Option<NodeId> {
    let keyed = Selector::parse("[data-id]").unwrap();
    page.document().closest(node, &keyed)
}

// === Pages ===

fn fill_grid_row(page: &mut Page, row: NodeId, key: &str, checked: bool) {
    let doc = page.document_mut();
    let state = if checked { "true" } else { "false" };
    doc.append_element(row, "span", &[("role", "checkbox"), ("aria-checked", state)]).unwrap();
    let cell = doc.append_element(row, "span", &[("class", "cell")]).unwrap();
    doc.append_text(cell, &format!("Record {}", key)).unwrap();
    let href = format!("/records/{}", key);
    let link = doc.append_element(row, "a", &[("href", href.as_str())]).unwrap();
    doc.append_text(link, "open").unwrap();
}

fn fill_list_row(page: &mut Page, row: NodeId, key: &str, checked: bool) {
    let doc = page.document_mut();
    let td = doc.append_element(row, "td", &[]).unwrap();
    let input = doc.append_element(td, "input", &[("type", "checkbox")]).unwrap();
    doc.set_checked(input, checked).unwrap();
    let cell = doc.append_element(row, "td", &[("class", "cell")]).unwrap();
    doc.append_text(cell, &format!("Record {}", key)).unwrap();
}

/// Header row plus `n` rows r1..rn; returns the container
pub fn build_grid(page: &mut Page, n: usize) -> NodeId {
    let doc = page.document_mut();
    let body = doc.body();
    let grid = doc.append_element(body, "div", &[("role", "grid")]).unwrap();
    let header = doc
        .append_element(grid, "div", &[("role", "row"), ("class", "grid-header")])
        .unwrap();
    doc.append_element(header, "span", &[("role", "checkbox"), ("aria-label", "Select all")]).unwrap();
    let title = doc.append_element(header, "span", &[("class", "title")]).unwrap();
    doc.append_text(title, "Name").unwrap();
    let group = doc.append_element(grid, "div", &[("role", "rowgroup")]).unwrap();
    for i in 1..=n {
        let key = format!("r{}", i);
        let row = page
            .document_mut()
            .append_element(group, "div", &[("role", "row"), ("data-id", key.as_str()), ("aria-selected", "false")])
            .unwrap();
        fill_grid_row(page, row, &key, false);
    }
    page.flush();
    grid
}

pub fn grid_page(n: usize) -> Page {
    let mut page = Page::new(GRID_URL).unwrap();
    build_grid(&mut page, n);
    page
}

/// `table.list-view` with `n` rows r1..rn; returns the table
pub fn build_list(page: &mut Page, n: usize) -> NodeId {
    let doc = page.document_mut();
    let body = doc.body();
    let table = doc.append_element(body, "table", &[("class", "list-view")]).unwrap();
    let tbody = doc.append_element(table, "tbody", &[]).unwrap();
    for i in 1..=n {
        let key = format!("r{}", i);
        let tr = page.document_mut().append_element(tbody, "tr", &[("data-id", key.as_str())]).unwrap();
        fill_list_row(page, tr, &key, false);
    }
    page.flush();
    table
}

pub fn list_page(n: usize) -> Page {
    let mut page = Page::new(LIST_URL).unwrap();
    build_list(&mut page, n);
    page
}

/// Two parents with children:
/// p1 (c11, c12), p2 (c21, c22)
pub fn tree_page() -> Page {
    let mut page = Page::new(TREE_URL).unwrap();
    let doc = page.document_mut();
    let body = doc.body();
    let tree = doc.append_element(body, "div", &[("role", "treegrid")]).unwrap();
    let group = doc.append_element(tree, "div", &[("role", "rowgroup")]).unwrap();
    let layout = [("p1", true), ("c11", false), ("c12", false), ("p2", true), ("c21", false), ("c22", false)];
    for (key, parent) in layout {
        let mut attrs = vec![("role", "row"), ("data-id", key)];
        if parent {
            attrs.push(("aria-expanded", "true"));
            attrs.push(("aria-level", "1"));
        } else {
            attrs.push(("aria-level", "2"));
        }
        let row = page.document_mut().append_element(group, "div", &attrs).unwrap();
        fill_grid_row(&mut page, row, key, false);
    }
    page.flush();
    page
}

// === Lookups ===

pub fn row_by_id(page: &Page, key: &str) -> Option<NodeId> {
    let doc = page.document();
    doc.query_selector(doc.root(), &format!("[data-id=\"{}\"]", key)).unwrap()
}

pub fn cell_of(page: &Page, key: &str) -> NodeId {
    let row = row_by_id(page, key).unwrap();
    page.document().query_selector(row, ".cell").unwrap().unwrap()
}

pub fn checkbox_of(page: &Page, key: &str) -> Option<NodeId> {
    let row = row_by_id(page, key)?;
    page.document()
        .query_selector(row, "[role=\"checkbox\"], input[type=\"checkbox\"]")
        .unwrap()
}

/// Keys of rows whose checkbox currently shows as checked
pub fn visually_selected(page: &Page) -> Vec<String> {
    let doc = page.document();
    let mut keys: Vec<String> = doc
        .query_selector_all(doc.root(), "[data-id]")
        .unwrap()
        .into_iter()
        .filter_map(|row| {
            let key = doc.get_attribute(row, "data-id")?.to_string();
            let cb = checkbox_of(page, &key)?;
            let on = if doc.is_checkbox_input(cb) {
                doc.checked(cb)
            } else {
                doc.get_attribute(cb, "aria-checked") == Some("true")
            };
            on.then_some(key)
        })
        .collect();
    keys.sort();
    keys
}

pub fn keys(list: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = list.iter().map(|s| s.to_string()).collect();
    out.sort();
    out
}

// === Engine ===

/// Manager plus handles on each row module's state
pub struct Engine {
    pub manager: FeatureManager,
    pub states: HashMap<PageKind, Rc<RefCell<ModuleState>>>,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        let registry = Rc::new(ProfileRegistry::with_defaults().unwrap());
        let manager = FeatureManager::new(settings.clone());
        let mut states = HashMap::new();
        for kind in PageKind::ALL {
            let module = RowSelectionModule::new(kind, registry.clone(), &settings).unwrap();
            assert!(!module.name().is_empty());
            states.insert(kind, module.state_handle());
            manager.register(module);
        }
        Self { manager, states }
    }

    pub fn start(page: &mut Page) -> Self {
        let engine = Self::new(Settings::default());
        engine.manager.init(page);
        engine
    }

    pub fn anchor_key(&self, kind: PageKind) -> Option<String> {
        self.states[&kind].borrow().anchor.as_ref().map(|a| a.identity.key().to_string())
    }

    pub fn is_attached(&self, kind: PageKind) -> bool {
        self.states[&kind].borrow().attached
    }
}
