//! Timer Queue
//!
//! setTimeout-style scheduling on a virtual millisecond clock. The clock
//! only moves when the owner advances it, which keeps deferred work
//! deterministic.

use std::collections::{BTreeMap, HashMap};

/// Timer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Timer queue ordered by due time, then by scheduling order
#[derive(Debug)]
pub struct TimerQueue<T> {
    now_ms: u64,
    next_id: u64,
    timers: BTreeMap<(u64, TimerId), T>,
    due_by_id: HashMap<TimerId, u64>,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            next_id: 1,
            timers: BTreeMap::new(),
            due_by_id: HashMap::new(),
        }
    }

    /// Current virtual time
    pub fn now(&self) -> u64 {
        self.now_ms
    }

    /// Schedule a task `delay_ms` from now
    pub fn schedule(&mut self, delay_ms: u64, task: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let due = self.now_ms.saturating_add(delay_ms);
        self.timers.insert((due, id), task);
        self.due_by_id.insert(id, due);
        id
    }

    /// Cancel a timer; false if it already fired or never existed
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.due_by_id.remove(&id) {
            Some(due) => self.timers.remove(&(due, id)).is_some(),
            None => false,
        }
    }

    /// Whether a timer is still pending
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.due_by_id.contains_key(&id)
    }

    /// Pop the earliest task due at or before `until_ms`, moving the clock
    /// to its due time
    pub fn pop_due(&mut self, until_ms: u64) -> Option<(TimerId, T)> {
        let (&(due, id), _) = self.timers.iter().next()?;
        if due > until_ms {
            return None;
        }
        let task = self.timers.remove(&(due, id))?;
        self.due_by_id.remove(&id);
        self.now_ms = self.now_ms.max(due);
        Some((id, task))
    }

    /// Move the clock forward (never backwards)
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    /// Due time of the next timer
    pub fn next_due(&self) -> Option<u64> {
        self.timers.keys().next().map(|&(due, _)| due)
    }

    /// Pending timer count
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Drop every pending timer
    pub fn clear(&mut self) {
        self.timers.clear();
        self.due_by_id.clear();
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
