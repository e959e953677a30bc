/// In-memory backend and settings store
///
/// A scripted stand-in for the real crypto/transport backend, used by the
/// integration tests and the demo binary. Message delivery is simulated by
/// pushing messages into per-contact queues; the engine observes them through
/// the normal `MessengerBackend` contract.
use crate::backend::MessengerBackend;
use crate::error::{EngineError, Result};
use crate::settings::SettingsStore;
use crate::types::{ChatMessage, Contact, Direction, MessageKind, WEB_CHANNEL_ID, WEB_CHANNEL_NAME};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SELF_ID: &str = "me";

#[derive(Default)]
struct BackendInner {
    contacts: Vec<Contact>,
    messages: HashMap<String, Vec<ChatMessage>>,
    pending_inbound: i64,
    signal: i64,
    failing: HashSet<String>,
    list_contacts_calls: usize,
    list_messages_calls: usize,
}

#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<BackendInner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-seeded with the reserved public/web channel, mirroring a
    /// real backend's contact listing
    pub fn with_web_channel() -> Self {
        let backend = Self::new();
        backend.add_remote_contact(WEB_CHANNEL_ID, WEB_CHANNEL_NAME);
        backend
    }

    /// Add (or rename) a contact as if the backend discovered it
    pub fn add_remote_contact(&self, id: &str, display_name: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.contacts.iter_mut().find(|c| c.id == id) {
            existing.display_name = display_name.to_string();
        } else {
            inner.contacts.push(Contact {
                id: id.to_string(),
                display_name: display_name.to_string(),
                last_seen: Some(Utc::now().timestamp()),
            });
        }
    }

    pub fn remove_remote_contact(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.contacts.retain(|c| c.id != id);
        inner.messages.remove(id);
    }

    /// Simulate an inbound message arriving now
    pub fn push_incoming(&self, contact_id: &str, text: &str) -> String {
        self.push_incoming_at(contact_id, text, Utc::now().timestamp())
    }

    /// Simulate an inbound message with an explicit timestamp
    pub fn push_incoming_at(&self, contact_id: &str, text: &str, timestamp: i64) -> String {
        self.push_message(contact_id, text, timestamp, Direction::Received, MessageKind::Text)
    }

    /// Simulate an inbound media message
    pub fn push_incoming_kind(&self, contact_id: &str, kind: MessageKind, timestamp: i64) -> String {
        self.push_message(contact_id, "", timestamp, Direction::Received, kind)
    }

    fn push_message(
        &self,
        contact_id: &str,
        text: &str,
        timestamp: i64,
        direction: Direction,
        kind: MessageKind,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let (sender, recipient) = match direction {
            Direction::Received => (contact_id.to_string(), SELF_ID.to_string()),
            Direction::Sent => (SELF_ID.to_string(), contact_id.to_string()),
        };
        let message = ChatMessage {
            id: id.clone(),
            text: text.to_string(),
            sender_id: sender,
            recipient_id: recipient,
            timestamp,
            direction,
            read: false,
            kind,
        };
        let mut inner = self.inner.lock().unwrap();
        inner
            .messages
            .entry(contact_id.to_string())
            .or_default()
            .push(message);
        if direction == Direction::Received {
            inner.signal += 1;
        }
        id
    }

    pub fn set_pending_inbound(&self, count: i64) {
        self.inner.lock().unwrap().pending_inbound = count;
    }

    pub fn bump_signal(&self, by: i64) {
        self.inner.lock().unwrap().signal += by;
    }

    /// Make message fetches for a contact fail until healed
    pub fn fail_contact(&self, contact_id: &str) {
        self.inner.lock().unwrap().failing.insert(contact_id.to_string());
    }

    pub fn heal_contact(&self, contact_id: &str) {
        self.inner.lock().unwrap().failing.remove(contact_id);
    }

    pub fn list_contacts_calls(&self) -> usize {
        self.inner.lock().unwrap().list_contacts_calls
    }

    pub fn list_messages_calls(&self) -> usize {
        self.inner.lock().unwrap().list_messages_calls
    }

    pub fn message_count(&self, contact_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .messages
            .get(contact_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessengerBackend for MemoryBackend {
    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        let mut inner = self.inner.lock().unwrap();
        inner.list_contacts_calls += 1;
        Ok(inner.contacts.clone())
    }

    async fn list_messages(&self, contact_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let mut inner = self.inner.lock().unwrap();
        inner.list_messages_calls += 1;
        if inner.failing.contains(contact_id) {
            return Err(EngineError::Backend(format!(
                "simulated fetch failure for {}",
                contact_id
            )));
        }
        let mut messages = inner.messages.get(contact_id).cloned().unwrap_or_default();
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn send_message(&self, contact_id: &str, text: &str) -> Result<()> {
        let known = {
            let inner = self.inner.lock().unwrap();
            inner.contacts.iter().any(|c| c.id == contact_id)
        };
        if !known {
            return Err(EngineError::UnknownContact(contact_id.to_string()));
        }
        self.push_message(
            contact_id,
            text,
            Utc::now().timestamp(),
            Direction::Sent,
            MessageKind::Text,
        );
        Ok(())
    }

    async fn send_file(&self, contact_id: &str, path: &Path, kind: MessageKind) -> Result<()> {
        self.push_message(
            contact_id,
            &path.display().to_string(),
            Utc::now().timestamp(),
            Direction::Sent,
            kind,
        );
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        for messages in inner.messages.values_mut() {
            let before = messages.len();
            messages.retain(|m| m.id != message_id);
            if messages.len() != before {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn clear_messages(&self, contact_id: &str) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.messages.remove(contact_id).map(|m| m.len()).unwrap_or(0))
    }

    async fn delete_contact_and_messages(&self, contact_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.contacts.retain(|c| c.id != contact_id);
        inner.messages.remove(contact_id);
        Ok(())
    }

    async fn add_contact(&self, contact_id: &str, nickname: &str) -> Result<()> {
        self.add_remote_contact(contact_id, nickname);
        Ok(())
    }

    async fn rename_contact(&self, contact_id: &str, nickname: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.contacts.iter_mut().find(|c| c.id == contact_id) {
            Some(contact) => {
                contact.display_name = nickname.to_string();
                Ok(())
            }
            None => Err(EngineError::UnknownContact(contact_id.to_string())),
        }
    }

    async fn pending_inbound_count(&self) -> Result<i64> {
        Ok(self.inner.lock().unwrap().pending_inbound)
    }

    async fn new_message_signal(&self) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        let signal = inner.signal;
        inner.signal = 0;
        Ok(signal)
    }
}

#[derive(Default)]
struct SettingsInner {
    bools: HashMap<String, bool>,
    strings: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
}

/// Settings store held entirely in memory; nothing survives a restart
#[derive(Default)]
pub struct MemorySettings {
    inner: Mutex<SettingsInner>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.inner.lock().unwrap().bools.get(key).copied().unwrap_or(default)
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.inner.lock().unwrap().bools.insert(key.to_string(), value);
        Ok(())
    }

    fn get_string(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().strings.get(key).cloned()
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_string_list(&self, key: &str) -> Vec<String> {
        self.inner.lock().unwrap().lists.get(key).cloned().unwrap_or_default()
    }

    fn set_string_list(&self, key: &str, values: &[String]) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .lists
            .insert(key.to_string(), values.to_vec());
        Ok(())
    }
}
