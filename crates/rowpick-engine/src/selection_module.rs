//! Row Selection Module
//!
//! The page module that wires gestures into one page kind's grid
//! container. All mutable state lives in [`ModuleState`], shared with the
//! listeners it installs; nothing else writes to it.

use std::cell::RefCell;
use std::rc::Rc;

use rowpick_dom::{ListenerId, NodeId, Page, TimerId};

use crate::checkbox::StateAdapter;
use crate::gesture::{self, GestureContext, SelectionAnchor};
use crate::module::{ModuleCapabilities, ModuleError, PageModule};
use crate::profile::{PageKind, ProfileRegistry};
use crate::settings::Settings;

/// Per-module state
#[derive(Debug, Default)]
pub struct ModuleState {
    pub attached: bool,
    pub listeners: Vec<ListenerId>,
    pub container: Option<NodeId>,
    /// Path the module was last attached on
    pub current_path: Option<String>,
    pub anchor: Option<SelectionAnchor>,
    /// Pending fallback container poll
    pub poll_timer: Option<TimerId>,
}

/// Selection gestures for one page kind
pub struct RowSelectionModule {
    name: String,
    kind: PageKind,
    registry: Rc<ProfileRegistry>,
    ctx: Rc<GestureContext>,
    state: Rc<RefCell<ModuleState>>,
    poll_ms: u64,
    poll_max_ms: u64,
}

impl RowSelectionModule {
    pub fn new(kind: PageKind, registry: Rc<ProfileRegistry>, settings: &Settings) -> Result<Self, ModuleError> {
        let profile = registry.profile(kind).cloned().ok_or(ModuleError::UnknownKind(kind))?;
        let adapter = StateAdapter::new(Rc::new(profile), settings.reassert_delay_ms);
        let ctx = GestureContext::new(adapter, settings)?;
        Ok(Self {
            name: format!("row-selection:{}", kind),
            kind,
            registry,
            ctx: Rc::new(ctx),
            state: Rc::new(RefCell::new(ModuleState::default())),
            poll_ms: settings.container_poll_ms.max(1),
            poll_max_ms: settings.container_poll_max_ms,
        })
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    /// Shared handle on the module state, for inspection
    pub fn state_handle(&self) -> Rc<RefCell<ModuleState>> {
        self.state.clone()
    }

    pub fn anchor(&self) -> Option<SelectionAnchor> {
        self.state.borrow().anchor.clone()
    }
}

impl PageModule for RowSelectionModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::DETACH | ModuleCapabilities::REATTACH_CHECK
    }

    fn should_activate(&self, page: &Page) -> bool {
        self.registry.kind_for(page.location()) == Some(self.kind)
    }

    fn attach(&mut self, page: &mut Page) -> Result<(), ModuleError> {
        if self.state.try_borrow_mut().is_err() {
            return Err(ModuleError::Busy(self.name.clone()));
        }
        teardown(page, &self.state);

        let path = page.location().path().to_string();
        {
            let mut state = self.state.borrow_mut();
            if state.current_path.as_deref() != Some(path.as_str()) {
                state.anchor = None;
            }
            state.current_path = Some(path);
            state.attached = true;
        }

        if bind_container(page, &self.ctx, &self.state) {
            tracing::info!("{} attached", self.name);
        } else {
            tracing::debug!("{}: no container yet, polling", self.name);
            let deadline = page.now_ms().saturating_add(self.poll_max_ms);
            schedule_poll(page, self.ctx.clone(), self.state.clone(), self.poll_ms, deadline);
        }
        Ok(())
    }

    fn detach(&mut self, page: &mut Page) -> Result<(), ModuleError> {
        if self.state.try_borrow_mut().is_err() {
            return Err(ModuleError::Busy(self.name.clone()));
        }
        teardown(page, &self.state);
        let mut state = self.state.borrow_mut();
        state.attached = false;
        state.anchor = None;
        state.current_path = None;
        tracing::info!("{} detached", self.name);
        Ok(())
    }

    fn needs_reattach(&self, page: &Page) -> bool {
        let Ok(state) = self.state.try_borrow() else {
            return false;
        };
        if !state.attached {
            return false;
        }
        // Another view of the same page kind; the anchor belongs to the old one
        if state.current_path.as_deref() != Some(page.location().path()) {
            return true;
        }
        match state.container {
            Some(container) => !page.document().is_connected(container),
            None => self.ctx.profile().find_container(page.document()).is_some(),
        }
    }
}

/// Remove listeners and the pending poll
fn teardown(page: &mut Page, state: &Rc<RefCell<ModuleState>>) {
    let mut state = state.borrow_mut();
    for id in state.listeners.drain(..) {
        page.remove_event_listener(id);
    }
    if let Some(timer) = state.poll_timer.take() {
        page.clear_timeout(timer);
    }
    state.container = None;
}

/// Install listeners on the page's container; false when there is none
fn bind_container(page: &mut Page, ctx: &Rc<GestureContext>, state: &Rc<RefCell<ModuleState>>) -> bool {
    let Some(container) = ctx.profile().find_container(page.document()) else {
        return false;
    };
    let listeners = gesture::install(page, container, ctx, state);
    let mut state = state.borrow_mut();
    state.container = Some(container);
    state.listeners = listeners;
    true
}

fn schedule_poll(
    page: &mut Page,
    ctx: Rc<GestureContext>,
    state: Rc<RefCell<ModuleState>>,
    interval_ms: u64,
    deadline_ms: u64,
) {
    let handle = state.clone();
    let timer = page.set_timeout(interval_ms, move |page| {
        {
            let mut s = state.borrow_mut();
            s.poll_timer = None;
            if !s.attached || s.container.is_some() {
                return;
            }
        }
        if bind_container(page, &ctx, &state) {
            tracing::info!("{} container appeared", ctx.profile().kind);
            return;
        }
        if page.now_ms() >= deadline_ms {
            tracing::debug!("{} container never appeared, waiting for DOM changes", ctx.profile().kind);
            return;
        }
        schedule_poll(page, ctx, state, interval_ms, deadline_ms);
    });
    handle.borrow_mut().poll_timer = Some(timer);
}
