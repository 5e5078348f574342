//! History
//!
//! In-app session history: pushState / replaceState / back / forward.

/// History entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub url: String,
    pub state: Option<String>,
}

/// History manager
#[derive(Debug, Clone)]
pub struct HistoryManager {
    entries: Vec<HistoryEntry>,
    current: usize,
}

impl HistoryManager {
    pub fn new(initial_url: &str) -> Self {
        Self {
            entries: vec![HistoryEntry {
                url: initial_url.to_string(),
                state: None,
            }],
            current: 0,
        }
    }

    /// Get current entry
    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.current]
    }

    /// Push a new state
    pub fn push_state(&mut self, state: Option<String>, url: String) {
        // Remove forward history
        self.entries.truncate(self.current + 1);

        self.entries.push(HistoryEntry { url, state });
        self.current = self.entries.len() - 1;
    }

    /// Replace current state
    pub fn replace_state(&mut self, state: Option<String>, url: String) {
        self.entries[self.current] = HistoryEntry { url, state };
    }

    /// Go back; false at the first entry
    pub fn back(&mut self) -> bool {
        self.go(-1)
    }

    /// Go forward; false at the last entry
    pub fn forward(&mut self) -> bool {
        self.go(1)
    }

    /// Go by delta; false if out of range
    pub fn go(&mut self, delta: i64) -> bool {
        let target = self.current as i64 + delta;
        if delta == 0 || target < 0 || target >= self.entries.len() as i64 {
            return false;
        }
        self.current = target as usize;
        true
    }

    /// History length
    pub fn length(&self) -> usize {
        self.entries.len()
    }
}
