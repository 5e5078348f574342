//! Route Watcher
//!
//! Single-page hosts change routes without reloading, and re-render grid
//! containers at will. The watcher listens for history navigation and
//! DOM mutations, compares the URL against the last one it saw, and asks
//! for a debounced re-evaluation when anything relevant changed.

use std::cell::RefCell;
use std::rc::Rc;

use rowpick_dom::{MutationRecord, ObserverId, Page, SubscriptionId, TimerId};

/// Re-evaluation entry point
pub type EvaluateFn = Rc<dyn Fn(&mut Page)>;
/// Whether a DOM change warrants re-evaluation at the same URL
pub type ReattachCheckFn = Rc<dyn Fn(&Page) -> bool>;

/// Cancel-and-reschedule debouncer; only the latest request runs
#[derive(Debug, Clone)]
pub struct Debouncer {
    inner: Rc<RefCell<DebounceState>>,
}

#[derive(Debug, Default)]
struct DebounceState {
    delay_ms: u64,
    timer: Option<TimerId>,
    requests: u64,
    runs: u64,
}

impl Debouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DebounceState { delay_ms, ..Default::default() })),
        }
    }

    /// Replace any pending task with `task`, due `delay_ms` from now
    pub fn schedule(&self, page: &mut Page, task: impl FnOnce(&mut Page) + 'static) {
        let mut state = self.inner.borrow_mut();
        state.requests += 1;
        if let Some(timer) = state.timer.take() {
            page.clear_timeout(timer);
        }
        let inner = self.inner.clone();
        let timer = page.set_timeout(state.delay_ms, move |page| {
            {
                let mut state = inner.borrow_mut();
                state.timer = None;
                state.runs += 1;
            }
            task(page);
        });
        state.timer = Some(timer);
    }

    /// Drop the pending task; false if there was none
    pub fn cancel(&self, page: &mut Page) -> bool {
        match self.inner.borrow_mut().timer.take() {
            Some(timer) => page.clear_timeout(timer),
            None => false,
        }
    }

    pub fn pending(&self) -> bool {
        self.inner.borrow().timer.is_some()
    }

    /// Requests received so far
    pub fn requests(&self) -> u64 {
        self.inner.borrow().requests
    }

    /// Tasks actually run so far
    pub fn runs(&self) -> u64 {
        self.inner.borrow().runs
    }
}

/// Watcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Unwatched,
    Watching,
}

/// Navigation and mutation watcher
pub struct RouteWatcher {
    state: WatchState,
    navigation: Option<SubscriptionId>,
    observer: Option<ObserverId>,
    last_url: Rc<RefCell<String>>,
    debouncer: Debouncer,
}

impl RouteWatcher {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            state: WatchState::Unwatched,
            navigation: None,
            observer: None,
            last_url: Rc::new(RefCell::new(String::new())),
            debouncer: Debouncer::new(debounce_ms),
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Last URL the watcher saw
    pub fn last_url(&self) -> String {
        self.last_url.borrow().clone()
    }

    /// Subscribe to navigation and mutations; no-op while watching
    pub fn start(&mut self, page: &mut Page, evaluate: EvaluateFn, needs_reattach: ReattachCheckFn) {
        if self.state == WatchState::Watching {
            return;
        }
        *self.last_url.borrow_mut() = page.url().to_string();

        let (last_url, debouncer, eval) = (self.last_url.clone(), self.debouncer.clone(), evaluate.clone());
        self.navigation = Some(page.on_navigation(move |page, url| {
            if url_changed(&last_url, url) {
                tracing::debug!("Route changed to {}", url);
                request(page, &debouncer, &eval);
            }
        }));

        let (last_url, debouncer) = (self.last_url.clone(), self.debouncer.clone());
        self.observer = Some(page.observe_mutations(move |page, records: &[MutationRecord]| {
            let url = page.url().to_string();
            if url_changed(&last_url, &url) {
                tracing::debug!("Route changed to {} (seen via DOM)", url);
                request(page, &debouncer, &evaluate);
            } else if records.iter().any(MutationRecord::is_structural) && needs_reattach(page) {
                tracing::debug!("Container re-rendered");
                request(page, &debouncer, &evaluate);
            }
        }));

        self.state = WatchState::Watching;
        tracing::debug!("Watching {}", page.url());
    }

    /// Debounced re-evaluation on explicit request
    pub fn request(&self, page: &mut Page, evaluate: EvaluateFn) {
        *self.last_url.borrow_mut() = page.url().to_string();
        request(page, &self.debouncer, &evaluate);
    }

    /// Unsubscribe everything and drop any pending evaluation
    pub fn stop(&mut self, page: &mut Page) {
        if let Some(id) = self.navigation.take() {
            page.off_navigation(id);
        }
        if let Some(id) = self.observer.take() {
            page.disconnect_observer(id);
        }
        self.debouncer.cancel(page);
        self.state = WatchState::Unwatched;
    }
}

fn url_changed(last_url: &RefCell<String>, url: &str) -> bool {
    let mut last = last_url.borrow_mut();
    if *last == url {
        return false;
    }
    *last = url.to_string();
    true
}

fn request(page: &mut Page, debouncer: &Debouncer, evaluate: &EvaluateFn) {
    let evaluate = evaluate.clone();
    debouncer.schedule(page, move |page| evaluate(page));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, EvaluateFn) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        (count, Rc::new(move |_: &mut Page| c.set(c.get() + 1)))
    }

    #[test]
    fn test_debouncer_coalesces() {
        let mut page = Page::new("https://app.example/").unwrap();
        let debouncer = Debouncer::new(100);
        let hits = Rc::new(RefCell::new(Vec::new()));
        for i in 0..5 {
            let hits = hits.clone();
            debouncer.schedule(&mut page, move |_| hits.borrow_mut().push(i));
            page.advance(30);
        }
        assert!(debouncer.pending());
        page.advance(100);

        assert_eq!(*hits.borrow(), vec![4]);
        assert_eq!(debouncer.requests(), 5);
        assert_eq!(debouncer.runs(), 1);
        assert!(!debouncer.pending());
    }

    #[test]
    fn test_navigation_triggers_debounced_evaluation() {
        let mut page = Page::new("https://app.example/records/grid").unwrap();
        let mut watcher = RouteWatcher::new(100);
        let (count, evaluate) = counter();
        watcher.start(&mut page, evaluate, Rc::new(|_: &Page| false));
        assert_eq!(watcher.state(), WatchState::Watching);

        page.push_state("/records/list").unwrap();
        page.push_state("/records/hierarchy").unwrap();
        assert!(watcher.debouncer().pending());
        page.advance(100);

        assert_eq!(count.get(), 1);
        assert_eq!(watcher.last_url(), "https://app.example/records/hierarchy");
    }

    #[test]
    fn test_same_url_mutations_need_reattach_check() {
        let mut page = Page::new("https://app.example/records/grid").unwrap();
        let mut watcher = RouteWatcher::new(100);
        let (count, evaluate) = counter();
        let wanted = Rc::new(Cell::new(false));
        let w = wanted.clone();
        watcher.start(&mut page, evaluate, Rc::new(move |_: &Page| w.get()));

        let body = page.document().body();
        page.document_mut().append_element(body, "div", &[]).unwrap();
        page.flush();
        page.advance(200);
        assert_eq!(count.get(), 0);

        wanted.set(true);
        page.document_mut().append_element(body, "div", &[]).unwrap();
        page.flush();
        page.advance(200);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_stop_unsubscribes() {
        let mut page = Page::new("https://app.example/records/grid").unwrap();
        let mut watcher = RouteWatcher::new(100);
        let (count, evaluate) = counter();
        watcher.start(&mut page, evaluate.clone(), Rc::new(|_: &Page| true));
        watcher.start(&mut page, evaluate, Rc::new(|_: &Page| true));
        assert_eq!(page.observer_count(), 1);
        assert_eq!(page.navigation_subscriber_count(), 1);

        page.push_state("/records/list").unwrap();
        watcher.stop(&mut page);
        page.advance(500);

        assert_eq!(count.get(), 0);
        assert_eq!(page.observer_count(), 0);
        assert_eq!(page.navigation_subscriber_count(), 0);
        assert_eq!(watcher.state(), WatchState::Unwatched);
    }
}
