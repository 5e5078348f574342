//! Page - the host page boundary
//!
//! Owns the document together with everything script running in the page
//! can reach: event listeners, timers, session history, mutation
//! observers and navigation subscriptions.
//!
//! Callbacks receive `&mut Page`. Handler lists are snapshotted before
//! they run, so a callback may add or remove registrations freely.
//! Mutation and navigation notifications are delivered as microtasks at
//! the end of the outermost task, never inside a running callback.

use std::rc::Rc;

use url::Url;

use crate::events::{DispatchOutcome, Event, EventPhase, EventType, ListenerId, ListenerOptions, LoggedEvent, Modifiers};
use crate::timers::{TimerId, TimerQueue};
use crate::{Document, DomError, HistoryManager, MutationRecord, NodeId};

/// Event listener callback
pub type EventHandler = Rc<dyn Fn(&mut Page, &mut Event)>;
/// Mutation observer callback
pub type MutationCallback = Rc<dyn Fn(&mut Page, &[MutationRecord])>;
/// Navigation callback, receives the new URL
pub type NavigationCallback = Rc<dyn Fn(&mut Page, &str)>;
/// Timer task
pub type TimerTask = Box<dyn FnOnce(&mut Page)>;

/// Mutation observer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Navigation subscription handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Upper bound on microtask rounds per checkpoint
const MAX_MICROTASK_ROUNDS: usize = 32;

struct Registration {
    id: ListenerId,
    node: NodeId,
    event_type: EventType,
    options: ListenerOptions,
    handler: EventHandler,
}

/// A loaded host page
pub struct Page {
    document: Document,
    url: Url,
    history: HistoryManager,
    listeners: Vec<Registration>,
    timers: TimerQueue<TimerTask>,
    observers: Vec<(ObserverId, MutationCallback)>,
    navigation_subscribers: Vec<(SubscriptionId, NavigationCallback)>,
    pending_navigations: Vec<String>,
    event_log: Vec<LoggedEvent>,
    next_handle: u64,
    task_depth: u32,
}

impl Page {
    /// Load a page at `url` with an empty document
    pub fn new(url: &str) -> Result<Self, DomError> {
        let url = parse_url(url)?;
        tracing::debug!("Loading page {}", url);
        Ok(Self {
            document: Document::new(),
            history: HistoryManager::new(url.as_str()),
            url,
            listeners: Vec::new(),
            timers: TimerQueue::new(),
            observers: Vec::new(),
            navigation_subscribers: Vec::new(),
            pending_navigations: Vec::new(),
            event_log: Vec::new(),
            next_handle: 1,
            task_depth: 0,
        })
    }

    /// The document
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The document, mutably
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    // === Location & history ===

    /// Current URL
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Parsed current URL
    pub fn location(&self) -> &Url {
        &self.url
    }

    /// Session history
    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// In-app navigation (history.pushState)
    pub fn push_state(&mut self, url: &str) -> Result<(), DomError> {
        let resolved = self.resolve(url)?;
        self.history.push_state(None, resolved.to_string());
        self.set_location(resolved);
        Ok(())
    }

    /// In-app navigation replacing the current entry (history.replaceState)
    pub fn replace_state(&mut self, url: &str) -> Result<(), DomError> {
        let resolved = self.resolve(url)?;
        self.history.replace_state(None, resolved.to_string());
        self.set_location(resolved);
        Ok(())
    }

    /// history.back(); false when there is nothing to go back to
    pub fn back(&mut self) -> bool {
        self.traverse(-1)
    }

    /// history.forward(); false when there is nothing to go forward to
    pub fn forward(&mut self) -> bool {
        self.traverse(1)
    }

    fn traverse(&mut self, delta: i64) -> bool {
        if !self.history.go(delta) {
            return false;
        }
        match parse_url(&self.history.current().url) {
            Ok(url) => {
                self.set_location(url);
                true
            }
            Err(e) => {
                tracing::warn!("History entry has an invalid URL: {}", e);
                false
            }
        }
    }

    fn set_location(&mut self, url: Url) {
        tracing::debug!("In-app navigation to {}", url);
        self.url = url;
        self.pending_navigations.push(self.url.to_string());
        self.checkpoint();
    }

    /// Full page load: the document and every script registration are
    /// discarded
    pub fn navigate(&mut self, url: &str) -> Result<(), DomError> {
        let resolved = self.resolve(url)?;
        tracing::debug!("Full navigation to {}", resolved);
        self.document = Document::new();
        self.listeners.clear();
        self.timers.clear();
        self.observers.clear();
        self.navigation_subscribers.clear();
        self.pending_navigations.clear();
        self.history.push_state(None, resolved.to_string());
        self.url = resolved;
        Ok(())
    }

    fn resolve(&self, url: &str) -> Result<Url, DomError> {
        self.url.join(url).map_err(|e| DomError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    // === Event listeners ===

    /// Register an event listener on `node`
    pub fn add_event_listener(
        &mut self,
        node: NodeId,
        event_type: EventType,
        options: ListenerOptions,
        handler: impl Fn(&mut Page, &mut Event) + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_handle());
        self.listeners.push(Registration {
            id,
            node,
            event_type,
            options,
            handler: Rc::new(handler),
        });
        id
    }

    /// Remove a listener; false if it was not registered
    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|r| r.id != id);
        self.listeners.len() != before
    }

    /// Whether a listener is registered
    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|r| r.id == id)
    }

    /// Total registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Listeners registered on `node` for `event_type`
    pub fn listeners_on(&self, node: NodeId, event_type: EventType) -> usize {
        self.listeners.iter()
            .filter(|r| r.node == node && r.event_type == event_type)
            .count()
    }

    // === Dispatch ===

    /// Dispatch an event through capture, target and bubble phases, then
    /// run the default action unless it was prevented
    pub fn dispatch_event(&mut self, event: Event) -> DispatchOutcome {
        self.task_depth += 1;
        let outcome = self.dispatch_inner(event);
        self.task_depth -= 1;
        self.checkpoint();
        outcome
    }

    /// Simulated user click: mousedown, mouseup, click
    pub fn user_click(&mut self, target: NodeId, modifiers: Modifiers) -> DispatchOutcome {
        self.dispatch_event(Event::user(EventType::MouseDown, target, modifiers));
        self.dispatch_event(Event::user(EventType::MouseUp, target, modifiers));
        self.dispatch_event(Event::user(EventType::Click, target, modifiers))
    }

    /// Simulated user mousedown only
    pub fn user_mousedown(&mut self, target: NodeId, modifiers: Modifiers) -> DispatchOutcome {
        self.dispatch_event(Event::user(EventType::MouseDown, target, modifiers))
    }

    /// Simulated key press on the body
    pub fn user_key(&mut self, key: &str, modifiers: Modifiers) -> DispatchOutcome {
        let body = self.document.body();
        self.dispatch_event(Event::user(EventType::KeyDown, body, modifiers).with_key(key))
    }

    fn dispatch_inner(&mut self, mut event: Event) -> DispatchOutcome {
        self.event_log.push(LoggedEvent {
            event_type: event.event_type,
            target: event.target,
            is_trusted: event.is_trusted,
            modifiers: event.modifiers,
        });

        let target = event.target;
        let mut path = Vec::new();
        let mut cursor = Some(target);
        while let Some(node) = cursor {
            path.push(node);
            cursor = self.document.parent(node);
        }
        path.reverse();

        let mut invoked = 0;
        let ancestors = &path[..path.len() - 1];

        'phases: {
            event.phase = EventPhase::Capturing;
            for &node in ancestors {
                invoked += self.invoke_listeners(node, &mut event, true);
                if event.is_propagation_stopped() {
                    break 'phases;
                }
            }

            event.phase = EventPhase::AtTarget;
            invoked += self.invoke_listeners(target, &mut event, true);
            if event.is_propagation_stopped() {
                break 'phases;
            }
            invoked += self.invoke_listeners(target, &mut event, false);
            if event.is_propagation_stopped() || !event.bubbles {
                break 'phases;
            }

            event.phase = EventPhase::Bubbling;
            for &node in ancestors.iter().rev() {
                invoked += self.invoke_listeners(node, &mut event, false);
                if event.is_propagation_stopped() {
                    break 'phases;
                }
            }
        }
        event.phase = EventPhase::None;
        event.current_target = None;

        if !event.is_default_prevented() {
            self.run_default_action(&event);
        }

        DispatchOutcome {
            default_prevented: event.is_default_prevented(),
            listeners_invoked: invoked,
        }
    }

    fn invoke_listeners(&mut self, node: NodeId, event: &mut Event, capture: bool) -> usize {
        let batch: Vec<(ListenerId, ListenerOptions, EventHandler)> = self.listeners.iter()
            .filter(|r| r.node == node && r.event_type == event.event_type && r.options.capture == capture)
            .map(|r| (r.id, r.options, Rc::clone(&r.handler)))
            .collect();

        let mut invoked = 0;
        for (id, options, handler) in batch {
            // Removed by an earlier listener in this batch
            if !self.has_listener(id) {
                continue;
            }
            if options.once {
                self.remove_event_listener(id);
            }
            event.current_target = Some(node);
            event.in_passive_listener = options.passive;
            handler(self, event);
            event.in_passive_listener = false;
            invoked += 1;
            if event.is_immediate_propagation_stopped() {
                break;
            }
        }
        invoked
    }

    /// Checkbox activation behaviour
    fn run_default_action(&mut self, event: &Event) {
        let target = event.target;
        if event.event_type != EventType::Click
            || !self.document.is_checkbox_input(target)
            || self.document.is_disabled(target)
        {
            return;
        }
        let checked = !self.document.checked(target);
        if self.document.set_checked(target, checked).is_err() {
            return;
        }
        for follow_up in [EventType::Input, EventType::Change] {
            let mut next = Event::synthetic(follow_up, target);
            next.is_trusted = event.is_trusted;
            self.dispatch_inner(next);
        }
    }

    /// Events dispatched so far
    pub fn event_log(&self) -> &[LoggedEvent] {
        &self.event_log
    }

    /// Forget logged events
    pub fn clear_event_log(&mut self) {
        self.event_log.clear();
    }

    // === Timers ===

    /// Current virtual time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.timers.now()
    }

    /// Schedule `task` to run after `delay_ms`
    pub fn set_timeout(&mut self, delay_ms: u64, task: impl FnOnce(&mut Page) + 'static) -> TimerId {
        self.timers.schedule(delay_ms, Box::new(task))
    }

    /// Cancel a pending timer
    pub fn clear_timeout(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    /// Whether a timer is still pending
    pub fn is_timer_pending(&self, id: TimerId) -> bool {
        self.timers.is_pending(id)
    }

    /// Pending timer count
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Advance the clock by `ms`, running every timer that falls due
    pub fn advance(&mut self, ms: u64) {
        self.checkpoint();
        let until = self.timers.now().saturating_add(ms);
        while let Some((_, task)) = self.timers.pop_due(until) {
            self.task_depth += 1;
            task(self);
            self.task_depth -= 1;
            self.checkpoint();
        }
        self.timers.set_now(until);
    }

    /// Advance until no timers remain or `limit_ms` has elapsed
    pub fn run_until_idle(&mut self, limit_ms: u64) {
        let deadline = self.timers.now().saturating_add(limit_ms);
        while let Some(due) = self.timers.next_due() {
            if due > deadline {
                break;
            }
            let step = due.saturating_sub(self.timers.now());
            self.advance(step);
        }
        self.checkpoint();
    }

    // === Observers ===

    /// Observe every mutation of the document
    pub fn observe_mutations(&mut self, callback: impl Fn(&mut Page, &[MutationRecord]) + 'static) -> ObserverId {
        let id = ObserverId(self.next_handle());
        self.observers.push((id, Rc::new(callback)));
        id
    }

    /// Disconnect a mutation observer
    pub fn disconnect_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Connected mutation observers
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Subscribe to in-app navigation (push/replace/back/forward)
    pub fn on_navigation(&mut self, callback: impl Fn(&mut Page, &str) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_handle());
        self.navigation_subscribers.push((id, Rc::new(callback)));
        id
    }

    /// Drop a navigation subscription
    pub fn off_navigation(&mut self, id: SubscriptionId) -> bool {
        let before = self.navigation_subscribers.len();
        self.navigation_subscribers.retain(|(sid, _)| *sid != id);
        self.navigation_subscribers.len() != before
    }

    /// Active navigation subscriptions
    pub fn navigation_subscriber_count(&self) -> usize {
        self.navigation_subscribers.len()
    }

    /// Deliver queued notifications now if no task is running
    pub fn flush(&mut self) {
        self.checkpoint();
    }

    fn checkpoint(&mut self) {
        if self.task_depth > 0 {
            return;
        }
        self.task_depth += 1;
        for round in 0.. {
            let navigations = std::mem::take(&mut self.pending_navigations);
            let mutations = self.document.take_mutations();
            if navigations.is_empty() && mutations.is_empty() {
                break;
            }
            if round == MAX_MICROTASK_ROUNDS {
                tracing::warn!("Microtask checkpoint did not settle after {} rounds", round);
                break;
            }

            for url in &navigations {
                let subscribers: Vec<NavigationCallback> = self.navigation_subscribers.iter()
                    .map(|(_, cb)| Rc::clone(cb))
                    .collect();
                for callback in subscribers {
                    callback(self, url);
                }
            }

            if !mutations.is_empty() {
                let observers: Vec<MutationCallback> = self.observers.iter()
                    .map(|(_, cb)| Rc::clone(cb))
                    .collect();
                for callback in observers {
                    callback(self, &mutations);
                }
            }
        }
        self.task_depth -= 1;
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("url", &self.url.as_str())
            .field("nodes", &self.document.tree().len())
            .field("listeners", &self.listeners.len())
            .field("timers", &self.timers.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

fn parse_url(url: &str) -> Result<Url, DomError> {
    Url::parse(url).map_err(|e| DomError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
