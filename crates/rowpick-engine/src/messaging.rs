//! Cross-Instance Messaging
//!
//! Every open tab runs its own engine instance. Instances talk through a
//! broadcast channel carrying JSON-encoded messages: state changes, the
//! enable signal, and settings changes.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::settings::{Settings, SettingsError, SettingsStore};

/// Message between engine instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// Something on the page changed; re-evaluate
    StateChanged,
    /// The feature was switched on
    Enabled,
    SettingsChanged { enabled: bool },
}

impl Message {
    pub fn to_json(&self) -> Result<String, MessagingError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, MessagingError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Messaging errors
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Malformed message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Unknown or closed instance {0:?}")]
    UnknownInstance(InstanceId),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

/// Engine instance handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

#[derive(Debug, Default)]
struct Inbox {
    pending: VecDeque<String>,
}

/// Broadcast channel between instances
#[derive(Debug, Default)]
pub struct MessageChannel {
    instances: HashMap<InstanceId, Inbox>,
    next_id: u64,
}

impl MessageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the channel
    pub fn subscribe(&mut self) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        self.instances.insert(id, Inbox::default());
        id
    }

    /// Leave the channel; queued messages are dropped
    pub fn close(&mut self, id: InstanceId) -> bool {
        self.instances.remove(&id).is_some()
    }

    /// Deliver `message` to every open instance except the sender;
    /// returns the number of recipients
    pub fn post(&mut self, from: Option<InstanceId>, message: &Message) -> Result<usize, MessagingError> {
        if let Some(sender) = from {
            if !self.instances.contains_key(&sender) {
                return Err(MessagingError::UnknownInstance(sender));
            }
        }
        let raw = message.to_json()?;
        let mut delivered = 0;
        for (id, inbox) in &mut self.instances {
            if Some(*id) == from {
                continue;
            }
            inbox.pending.push_back(raw.clone());
            delivered += 1;
        }
        tracing::trace!("Posted {} to {} instances", raw, delivered);
        Ok(delivered)
    }

    /// Take queued messages for `id`; undecodable ones are dropped
    pub fn drain(&mut self, id: InstanceId) -> Vec<Message> {
        let Some(inbox) = self.instances.get_mut(&id) else {
            return Vec::new();
        };
        inbox
            .pending
            .drain(..)
            .filter_map(|raw| match Message::from_json(&raw) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!("Dropping message {}: {}", raw, e);
                    None
                }
            })
            .collect()
    }

    /// Queue a raw payload, as another extension version might send
    pub fn post_raw(&mut self, to: InstanceId, raw: &str) -> Result<(), MessagingError> {
        let inbox = self.instances.get_mut(&to).ok_or(MessagingError::UnknownInstance(to))?;
        inbox.pending.push_back(raw.to_string());
        Ok(())
    }

    pub fn open_instances(&self) -> usize {
        self.instances.len()
    }
}

/// Persist the enabled flag and tell every other instance
pub fn publish_enabled(
    store: &mut dyn SettingsStore,
    channel: &mut MessageChannel,
    from: Option<InstanceId>,
    enabled: bool,
) -> Result<usize, MessagingError> {
    let mut settings = Settings::load_or_default(store);
    settings.enabled = enabled;
    settings.save(store)?;
    channel.post(from, &Message::SettingsChanged { enabled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemoryStore;

    #[test]
    fn test_wire_format() {
        assert_eq!(Message::StateChanged.to_json().unwrap(), r#"{"type":"stateChanged"}"#);
        assert_eq!(
            Message::SettingsChanged { enabled: false }.to_json().unwrap(),
            r#"{"type":"settingsChanged","enabled":false}"#
        );
        assert_eq!(Message::from_json(r#"{"type":"enabled"}"#).unwrap(), Message::Enabled);
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let mut channel = MessageChannel::new();
        let a = channel.subscribe();
        let b = channel.subscribe();
        let c = channel.subscribe();
        channel.close(c);

        assert_eq!(channel.post(Some(a), &Message::StateChanged).unwrap(), 1);
        assert!(channel.drain(a).is_empty());
        assert_eq!(channel.drain(b), vec![Message::StateChanged]);
        assert!(channel.drain(b).is_empty());
        assert!(matches!(channel.post(Some(c), &Message::Enabled), Err(MessagingError::UnknownInstance(_))));
    }

    #[test]
    fn test_closed_instances_are_forgotten() {
        let mut channel = MessageChannel::new();
        let tab = channel.subscribe();
        for _ in 0..5 {
            let transient = channel.subscribe();
            channel.post(Some(tab), &Message::StateChanged).unwrap();
            assert!(channel.close(transient));
        }

        assert_eq!(channel.open_instances(), 1);
        assert!(!channel.close(InstanceId(3)));
        assert!(channel.drain(InstanceId(3)).is_empty());
        assert!(matches!(channel.post_raw(InstanceId(3), "{}"), Err(MessagingError::UnknownInstance(_))));
    }

    #[test]
    fn test_malformed_messages_dropped() {
        let mut channel = MessageChannel::new();
        let a = channel.subscribe();
        channel.post_raw(a, r#"{"type":"selectAll"}"#).unwrap();
        channel.post_raw(a, r#"{"type":"enabled"}"#).unwrap();
        assert_eq!(channel.drain(a), vec![Message::Enabled]);
    }

    #[test]
    fn test_publish_enabled() {
        let mut store = MemoryStore::new();
        let mut channel = MessageChannel::new();
        let popup = channel.subscribe();
        let tab = channel.subscribe();

        assert_eq!(publish_enabled(&mut store, &mut channel, Some(popup), false).unwrap(), 1);
        assert!(!Settings::load(&store).unwrap().enabled);
        assert_eq!(channel.drain(tab), vec![Message::SettingsChanged { enabled: false }]);
    }
}
