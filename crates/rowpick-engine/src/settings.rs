//! Settings
//!
//! User-facing options, persisted as JSON in a key-value store shared by
//! every engine instance.

use std::collections::HashMap;

use rowpick_dom::Modifiers;
use serde::{Deserialize, Serialize};

use crate::checkbox::DEFAULT_REASSERT_DELAY_MS;
use crate::profile::PageKind;

/// Storage key for the settings blob
pub const SETTINGS_KEY: &str = "rowpick.settings";

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Stored settings are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Settings store rejected the write: {0}")]
    Store(String),
}

/// Modifier key that turns a click into a range click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeModifier {
    #[default]
    Shift,
    Ctrl,
    Alt,
    Meta,
}

impl RangeModifier {
    pub fn is_held(&self, modifiers: Modifiers) -> bool {
        match self {
            RangeModifier::Shift => modifiers.shift,
            RangeModifier::Ctrl => modifiers.ctrl,
            RangeModifier::Alt => modifiers.alt,
            RangeModifier::Meta => modifiers.meta,
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Master switch
    pub enabled: bool,
    /// Quiet period before a route or DOM change triggers re-evaluation
    pub debounce_ms: u64,
    /// Delay before checking that the host kept a written state
    pub reassert_delay_ms: u64,
    /// Fallback container poll interval
    pub container_poll_ms: u64,
    /// Give up polling for a container after this long
    pub container_poll_max_ms: u64,
    pub range_modifier: RangeModifier,
    /// Escape also deselects the visible rows, not just the anchor
    pub escape_clears_selection: bool,
    /// Page kinds the engine leaves alone
    pub disabled_kinds: Vec<PageKind>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 100,
            reassert_delay_ms: DEFAULT_REASSERT_DELAY_MS,
            container_poll_ms: 250,
            container_poll_max_ms: 5_000,
            range_modifier: RangeModifier::Shift,
            escape_clears_selection: false,
            disabled_kinds: Vec::new(),
        }
    }
}

impl Settings {
    /// Read settings; defaults when nothing is stored
    pub fn load(store: &dyn SettingsStore) -> Result<Self, SettingsError> {
        match store.get(SETTINGS_KEY) {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Self::default()),
        }
    }

    /// Read settings, falling back to defaults on a corrupt value
    pub fn load_or_default(store: &dyn SettingsStore) -> Self {
        Self::load(store).unwrap_or_else(|e| {
            tracing::warn!("Ignoring stored settings: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, store: &mut dyn SettingsStore) -> Result<(), SettingsError> {
        let raw = serde_json::to_string(self)?;
        store.set(SETTINGS_KEY, raw)
    }

    pub fn is_kind_enabled(&self, kind: PageKind) -> bool {
        !self.disabled_kinds.contains(&kind)
    }
}

/// Key-value store holding settings
pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), SettingsError>;
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}
