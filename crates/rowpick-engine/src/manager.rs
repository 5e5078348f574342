//! Feature Manager
//!
//! Owns the registered page modules and decides, on every evaluation
//! pass, which of them belong on the current page. One module failing
//! never stops the others.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rowpick_dom::Page;

use crate::messaging::Message;
use crate::module::{ModuleCapabilities, ModuleError, PageModule};
use crate::profile::{PageKind, ProfileRegistry};
use crate::selection_module::RowSelectionModule;
use crate::settings::Settings;
use crate::watcher::{EvaluateFn, ReattachCheckFn, RouteWatcher, WatchState};

/// Retry delay when an evaluation request arrives mid-evaluation
const BUSY_RETRY_MS: u64 = 10;

/// What an evaluation pass did to a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleAction {
    Attached,
    Reattached,
    Detached,
    /// Attached and still wanted
    Unchanged,
    /// Not attached and not wanted
    Inactive,
    Failed,
}

/// Per-module result of an evaluation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReport {
    pub name: String,
    pub action: ModuleAction,
    pub error: Option<String>,
}

impl ModuleReport {
    fn new(name: &str, action: ModuleAction) -> Self {
        Self { name: name.to_string(), action, error: None }
    }

    fn failed(name: &str, error: &ModuleError) -> Self {
        Self { name: name.to_string(), action: ModuleAction::Failed, error: Some(error.to_string()) }
    }
}

struct Slot {
    module: Box<dyn PageModule>,
    attached: bool,
}

struct ManagerInner {
    slots: Vec<Slot>,
    settings: Settings,
    watcher: RouteWatcher,
    passes: u64,
}

/// Shared handle on the lifecycle manager
#[derive(Clone)]
pub struct FeatureManager {
    inner: Rc<RefCell<ManagerInner>>,
}

impl FeatureManager {
    pub fn new(settings: Settings) -> Self {
        let watcher = RouteWatcher::new(settings.debounce_ms);
        Self {
            inner: Rc::new(RefCell::new(ManagerInner {
                slots: Vec::new(),
                settings,
                watcher,
                passes: 0,
            })),
        }
    }

    /// Manager with a row selection module per enabled page kind
    pub fn with_default_modules(settings: Settings) -> Result<Self, ModuleError> {
        let registry = Rc::new(ProfileRegistry::with_defaults()?);
        let manager = Self::new(settings.clone());
        for kind in PageKind::ALL {
            if !settings.is_kind_enabled(kind) {
                tracing::info!("Page kind {} disabled in settings", kind);
                continue;
            }
            manager.register(RowSelectionModule::new(kind, registry.clone(), &settings)?);
        }
        Ok(manager)
    }

    pub fn register(&self, module: impl PageModule + 'static) {
        let mut inner = self.inner.borrow_mut();
        tracing::debug!("Registered module {}", module.name());
        inner.slots.push(Slot { module: Box::new(module), attached: false });
    }

    /// Start watching and evaluate the current page
    pub fn init(&self, page: &mut Page) -> Vec<ModuleReport> {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.settings.enabled {
                tracing::info!("Disabled, not starting");
                return Vec::new();
            }
            let (evaluate, needs_reattach) = self.callbacks();
            inner.watcher.start(page, evaluate, needs_reattach);
        }
        self.evaluate(page)
    }

    /// Debounced re-evaluation
    pub fn handle_route_change(&self, page: &mut Page) {
        let (evaluate, _) = self.callbacks();
        match self.inner.try_borrow() {
            Ok(inner) if inner.watcher.state() == WatchState::Watching => inner.watcher.request(page, evaluate),
            Ok(_) => tracing::debug!("Route change ignored while not watching"),
            Err(_) => {
                // Retried through the debouncer so busy-time requests still coalesce
                let weak = self.downgrade();
                page.set_timeout(BUSY_RETRY_MS, move |page| {
                    if let Some(inner) = weak.upgrade() {
                        FeatureManager { inner }.handle_route_change(page);
                    }
                });
            }
        }
    }

    /// Immediate evaluation pass over every module
    pub fn evaluate(&self, page: &mut Page) -> Vec<ModuleReport> {
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            tracing::debug!("Evaluation already running, retrying");
            let this = self.clone();
            page.set_timeout(BUSY_RETRY_MS, move |page| {
                this.evaluate(page);
            });
            return Vec::new();
        };
        let inner = &mut *inner;
        inner.passes += 1;
        let enabled = inner.settings.enabled;

        let mut reports = Vec::with_capacity(inner.slots.len());
        for slot in &mut inner.slots {
            let report = evaluate_slot(slot, page, enabled);
            if let Some(error) = &report.error {
                tracing::warn!("Module {} failed: {}", report.name, error);
            }
            reports.push(report);
        }
        reports
    }

    /// Turn the whole feature on or off
    pub fn set_enabled(&self, page: &mut Page, enabled: bool) -> Vec<ModuleReport> {
        {
            let Ok(mut inner) = self.inner.try_borrow_mut() else {
                let this = self.clone();
                page.set_timeout(BUSY_RETRY_MS, move |page| {
                    this.set_enabled(page, enabled);
                });
                return Vec::new();
            };
            if inner.settings.enabled == enabled && (inner.watcher.state() == WatchState::Watching) == enabled {
                return Vec::new();
            }
            inner.settings.enabled = enabled;
        }
        tracing::info!("{}", if enabled { "Enabled" } else { "Disabled" });
        if enabled {
            self.init(page)
        } else {
            self.shutdown(page)
        }
    }

    /// React to a cross-instance message
    pub fn handle_message(&self, page: &mut Page, message: &Message) -> Vec<ModuleReport> {
        tracing::debug!("Message {:?}", message);
        match message {
            Message::StateChanged => {
                self.handle_route_change(page);
                Vec::new()
            }
            Message::Enabled => self.set_enabled(page, true),
            Message::SettingsChanged { enabled } => self.set_enabled(page, *enabled),
        }
    }

    /// Detach every module and stop watching
    pub fn shutdown(&self, page: &mut Page) -> Vec<ModuleReport> {
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            tracing::warn!("Shutdown requested during evaluation");
            return Vec::new();
        };
        let inner = &mut *inner;
        inner.watcher.stop(page);
        inner.slots.iter_mut().map(|slot| evaluate_slot(slot, page, false)).collect()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.borrow().settings.enabled
    }

    pub fn watch_state(&self) -> WatchState {
        self.inner.borrow().watcher.state()
    }

    /// Names of attached modules
    pub fn attached_modules(&self) -> Vec<String> {
        self.inner
            .borrow()
            .slots
            .iter()
            .filter(|s| s.attached)
            .map(|s| s.module.name().to_string())
            .collect()
    }

    pub fn module_names(&self) -> Vec<String> {
        self.inner.borrow().slots.iter().map(|s| s.module.name().to_string()).collect()
    }

    /// Evaluation passes run so far
    pub fn passes(&self) -> u64 {
        self.inner.borrow().passes
    }

    /// Whether a debounced evaluation is pending
    pub fn evaluation_pending(&self) -> bool {
        self.inner.borrow().watcher.debouncer().pending()
    }

    fn downgrade(&self) -> Weak<RefCell<ManagerInner>> {
        Rc::downgrade(&self.inner)
    }

    /// Watcher hooks; hold the manager weakly
    fn callbacks(&self) -> (EvaluateFn, ReattachCheckFn) {
        let weak = self.downgrade();
        let evaluate: EvaluateFn = Rc::new(move |page: &mut Page| {
            if let Some(inner) = weak.upgrade() {
                FeatureManager { inner }.evaluate(page);
            }
        });
        let weak = self.downgrade();
        let needs_reattach: ReattachCheckFn = Rc::new(move |page: &Page| {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            // Busy means an evaluation is running; ask again afterwards
            let Ok(inner) = inner.try_borrow() else {
                return true;
            };
            inner.slots.iter().any(|slot| {
                slot.attached
                    && slot.module.capabilities().has(ModuleCapabilities::REATTACH_CHECK)
                    && slot.module.needs_reattach(page)
            })
        });
        (evaluate, needs_reattach)
    }
}

impl fmt::Debug for FeatureManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("FeatureManager")
                .field("modules", &inner.slots.len())
                .field("enabled", &inner.settings.enabled)
                .field("watch_state", &inner.watcher.state())
                .field("passes", &inner.passes)
                .finish(),
            Err(_) => f.write_str("FeatureManager { <busy> }"),
        }
    }
}

fn evaluate_slot(slot: &mut Slot, page: &mut Page, enabled: bool) -> ModuleReport {
    let name = slot.module.name().to_string();
    let wanted = enabled && slot.module.should_activate(page);
    let caps = slot.module.capabilities();

    match (wanted, slot.attached) {
        (true, false) => match slot.module.attach(page) {
            Ok(()) => {
                slot.attached = true;
                ModuleReport::new(&name, ModuleAction::Attached)
            }
            Err(e) => ModuleReport::failed(&name, &e),
        },
        (true, true) if caps.has(ModuleCapabilities::REATTACH_CHECK) && slot.module.needs_reattach(page) => {
            match slot.module.attach(page) {
                Ok(()) => ModuleReport::new(&name, ModuleAction::Reattached),
                Err(e) => ModuleReport::failed(&name, &e),
            }
        }
        (true, true) => ModuleReport::new(&name, ModuleAction::Unchanged),
        (false, true) if caps.has(ModuleCapabilities::DETACH) => match slot.module.detach(page) {
            Ok(()) => {
                slot.attached = false;
                ModuleReport::new(&name, ModuleAction::Detached)
            }
            // Still attached; the next pass tries again
            Err(e) => ModuleReport::failed(&name, &e),
        },
        (false, true) => {
            tracing::debug!("Module {} cannot detach, leaving it in place", name);
            ModuleReport::new(&name, ModuleAction::Unchanged)
        }
        (false, false) => ModuleReport::new(&name, ModuleAction::Inactive),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Module that records calls and can be told to fail
    struct Recorder {
        name: &'static str,
        path: &'static str,
        attaches: Rc<Cell<u32>>,
        detaches: Rc<Cell<u32>>,
        fail: bool,
        fail_detach: Rc<Cell<bool>>,
        caps: ModuleCapabilities,
    }

    impl Recorder {
        fn new(name: &'static str, path: &'static str) -> Self {
            Self {
                name,
                path,
                attaches: Rc::new(Cell::new(0)),
                detaches: Rc::new(Cell::new(0)),
                fail: false,
                fail_detach: Rc::new(Cell::new(false)),
                caps: ModuleCapabilities::DETACH,
            }
        }
    }

    impl PageModule for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn capabilities(&self) -> ModuleCapabilities {
            self.caps
        }

        fn should_activate(&self, page: &Page) -> bool {
            page.location().path().starts_with(self.path)
        }

        fn attach(&mut self, _page: &mut Page) -> Result<(), ModuleError> {
            if self.fail {
                return Err(ModuleError::Failed { module: self.name.into(), reason: "boom".into() });
            }
            self.attaches.set(self.attaches.get() + 1);
            Ok(())
        }

        fn detach(&mut self, _page: &mut Page) -> Result<(), ModuleError> {
            if self.fail_detach.get() {
                return Err(ModuleError::Busy(self.name.into()));
            }
            self.detaches.set(self.detaches.get() + 1);
            Ok(())
        }
    }

    /// Module that asks for route changes while the manager evaluates it
    struct Chatty {
        manager: Weak<RefCell<ManagerInner>>,
        requests: u32,
    }

    impl PageModule for Chatty {
        fn name(&self) -> &str {
            "chatty"
        }

        fn should_activate(&self, _page: &Page) -> bool {
            true
        }

        fn attach(&mut self, page: &mut Page) -> Result<(), ModuleError> {
            if let Some(inner) = self.manager.upgrade() {
                let manager = FeatureManager { inner };
                for _ in 0..self.requests {
                    manager.handle_route_change(page);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_failure_isolation() {
        let mut page = Page::new("https://app.example/records").unwrap();
        let manager = FeatureManager::new(Settings::default());
        let mut broken = Recorder::new("broken", "/records");
        broken.fail = true;
        let healthy = Recorder::new("healthy", "/records");
        let attaches = healthy.attaches.clone();
        manager.register(broken);
        manager.register(healthy);

        let reports = manager.init(&mut page);
        assert_eq!(reports[0].action, ModuleAction::Failed);
        assert_eq!(reports[0].error.as_deref(), Some("Module broken failed: boom"));
        assert_eq!(reports[1].action, ModuleAction::Attached);
        assert_eq!(attaches.get(), 1);
        assert_eq!(manager.attached_modules(), vec!["healthy".to_string()]);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let mut page = Page::new("https://app.example/records").unwrap();
        let manager = FeatureManager::new(Settings::default());
        let recorder = Recorder::new("p", "/records");
        let attaches = recorder.attaches.clone();
        manager.register(recorder);

        manager.init(&mut page);
        let reports = manager.evaluate(&mut page);
        assert_eq!(reports[0].action, ModuleAction::Unchanged);
        assert_eq!(attaches.get(), 1);
        assert_eq!(manager.passes(), 2);
    }

    #[test]
    fn test_route_change_detaches() {
        let mut page = Page::new("https://app.example/records").unwrap();
        let manager = FeatureManager::with_default_modules(Settings::default()).unwrap();
        let recorder = Recorder::new("p", "/records");
        let detaches = recorder.detaches.clone();
        manager.register(recorder);
        manager.init(&mut page);

        page.push_state("/settings").unwrap();
        assert!(manager.evaluation_pending());
        page.advance(100);

        assert_eq!(detaches.get(), 1);
        assert!(manager.attached_modules().is_empty());
    }

    #[test]
    fn test_failed_detach_is_retried() {
        let mut page = Page::new("https://app.example/records").unwrap();
        let manager = FeatureManager::new(Settings::default());
        let recorder = Recorder::new("p", "/records");
        let (fail_detach, detaches) = (recorder.fail_detach.clone(), recorder.detaches.clone());
        manager.register(recorder);
        manager.init(&mut page);

        fail_detach.set(true);
        page.push_state("/settings").unwrap();
        let reports = manager.evaluate(&mut page);
        assert_eq!(reports[0].action, ModuleAction::Failed);
        assert_eq!(manager.attached_modules(), vec!["p".to_string()]);

        fail_detach.set(false);
        let reports = manager.evaluate(&mut page);
        assert_eq!(reports[0].action, ModuleAction::Detached);
        assert_eq!(detaches.get(), 1);
        assert!(manager.attached_modules().is_empty());
    }

    #[test]
    fn test_busy_route_changes_coalesce() {
        let mut page = Page::new("https://app.example/records").unwrap();
        let manager = FeatureManager::new(Settings::default());
        manager.register(Chatty { manager: manager.downgrade(), requests: 3 });

        manager.init(&mut page);
        assert_eq!(manager.passes(), 1);
        assert_eq!(page.pending_timers(), 3);

        page.run_until_idle(1_000);
        assert_eq!(manager.passes(), 2);
        assert_eq!(manager.inner.borrow().watcher.debouncer().runs(), 1);
    }

    #[test]
    fn test_module_without_detach_left_in_place() {
        let mut page = Page::new("https://app.example/records").unwrap();
        let manager = FeatureManager::new(Settings::default());
        let mut recorder = Recorder::new("sticky", "/records");
        recorder.caps = ModuleCapabilities::NONE;
        let detaches = recorder.detaches.clone();
        manager.register(recorder);
        manager.init(&mut page);

        page.push_state("/elsewhere").unwrap();
        page.advance(100);
        assert_eq!(detaches.get(), 0);
        assert_eq!(manager.attached_modules(), vec!["sticky".to_string()]);
    }

    #[test]
    fn test_disabled_manager_does_nothing() {
        let mut page = Page::new("https://app.example/records").unwrap();
        let settings = Settings { enabled: false, ..Default::default() };
        let manager = FeatureManager::new(settings);
        manager.register(Recorder::new("p", "/records"));

        assert!(manager.init(&mut page).is_empty());
        assert_eq!(manager.watch_state(), WatchState::Unwatched);
        assert_eq!(page.observer_count(), 0);
    }

    #[test]
    fn test_messages_toggle_enabled() {
        let mut page = Page::new("https://app.example/records").unwrap();
        let manager = FeatureManager::new(Settings::default());
        manager.register(Recorder::new("p", "/records"));
        manager.init(&mut page);

        let reports = manager.handle_message(&mut page, &Message::SettingsChanged { enabled: false });
        assert_eq!(reports[0].action, ModuleAction::Detached);
        assert!(!manager.is_enabled());
        assert_eq!(page.observer_count(), 0);

        let reports = manager.handle_message(&mut page, &Message::Enabled);
        assert_eq!(reports[0].action, ModuleAction::Attached);
        assert_eq!(manager.watch_state(), WatchState::Watching);
    }

    #[test]
    fn test_disabled_kinds_not_registered() {
        let settings = Settings { disabled_kinds: vec![PageKind::Tree], ..Default::default() };
        let manager = FeatureManager::with_default_modules(settings).unwrap();
        assert_eq!(
            manager.module_names(),
            vec!["row-selection:grid".to_string(), "row-selection:flat-list".to_string()]
        );
    }
}
