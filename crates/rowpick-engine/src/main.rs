//! rowpick - replay a toggle + shift-click range on a demo list page
//!
//! Usage: rowpick [ROWS] [FROM] [TO]

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use rowpick_dom::{EventType, ListenerOptions, Modifiers, NodeId, Page};
use rowpick_engine::{identify, FeatureManager, Settings};

const DEMO_URL: &str = "https://demo.rowpick.local/records/list";

fn main() -> Result<()> {
    rowpick_engine::logging::init();

    let mut args = std::env::args().skip(1);
    let rows: usize = parse_arg(args.next(), 10).context("ROWS must be a number")?;
    let from: usize = parse_arg(args.next(), 2).context("FROM must be a number")?;
    let to: usize = parse_arg(args.next(), 6).context("TO must be a number")?;
    if from == 0 || to == 0 || from > rows || to > rows {
        bail!("FROM and TO must be between 1 and {}", rows);
    }

    tracing::info!("rowpick v{}", rowpick_engine::VERSION);

    let mut page = Page::new(DEMO_URL)?;
    let cells = build_list(&mut page, rows)?;
    let host = install_host(&mut page);

    let manager = FeatureManager::with_default_modules(Settings::default())?;
    for report in manager.init(&mut page) {
        tracing::debug!("{}: {:?}", report.name, report.action);
    }

    page.user_click(cells[from - 1], Modifiers::NONE);
    page.user_click(cells[to - 1], Modifiers::SHIFT);
    page.run_until_idle(1_000);

    let selected = host.borrow();
    println!("Host selection ({} rows): {}", selected.len(), selected.iter().cloned().collect::<Vec<_>>().join(", "));
    Ok(())
}

fn parse_arg(arg: Option<String>, default: usize) -> Result<usize> {
    match arg {
        Some(raw) => Ok(raw.parse()?),
        None => Ok(default),
    }
}

/// `table.list-view` with one native checkbox per row; returns a text cell per row
fn build_list(page: &mut Page, rows: usize) -> Result<Vec<NodeId>> {
    let doc = page.document_mut();
    let body = doc.body();
    let table = doc.append_element(body, "table", &[("class", "list-view")])?;
    let tbody = doc.append_element(table, "tbody", &[])?;
    let mut cells = Vec::with_capacity(rows);
    for i in 1..=rows {
        let id = format!("rec-{:03}", i);
        let tr = doc.append_element(tbody, "tr", &[("data-id", id.as_str())])?;
        let check = doc.append_element(tr, "td", &[])?;
        doc.append_element(check, "input", &[("type", "checkbox")])?;
        let name = doc.append_element(tr, "td", &[])?;
        doc.append_text(name, &format!("Record {}", i))?;
        cells.push(name);
    }
    Ok(cells)
}

/// Stand-in host application: keeps its own selection, fed by change events
fn install_host(page: &mut Page) -> Rc<RefCell<BTreeSet<String>>> {
    let selected = Rc::new(RefCell::new(BTreeSet::new()));
    let model = selected.clone();
    let root = page.document().root();
    page.add_event_listener(root, EventType::Change, ListenerOptions::bubbling(), move |page, event| {
        let doc = page.document();
        let Some(row) = doc.parent_element(event.target).and_then(|td| doc.parent_element(td)) else {
            return;
        };
        let key = identify(doc, row).key().to_string();
        if doc.checked(event.target) {
            model.borrow_mut().insert(key);
        } else {
            model.borrow_mut().remove(&key);
        }
    });
    selected
}
