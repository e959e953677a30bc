/// Block/mute state and timestamp-based message hiding
///
/// Blocking is a point-in-time visibility cutover: received messages stamped
/// strictly after the block timestamp are hidden from counting and display,
/// while earlier history stays visible. Muting only suppresses notification
/// emission. Both persist immediately and are reloaded at engine start.
use crate::error::Result;
use crate::settings::SettingsStore;
use crate::types::{ChatMessage, Direction};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

const KEY_BLOCKED: &str = "blocked_contacts";
const KEY_BLOCKED_AT: &str = "blocked_at";
const KEY_MUTED: &str = "muted_contacts";

pub struct PrivacyPolicy {
    settings: Arc<dyn SettingsStore>,
    blocked: HashSet<String>,
    blocked_at: HashMap<String, i64>,
    muted: HashSet<String>,
}

impl PrivacyPolicy {
    /// Load persisted state. A contact counts as blocked only when both the
    /// set entry and the timestamp exist; strays from a torn write are
    /// dropped on load.
    pub fn load(settings: Arc<dyn SettingsStore>) -> Self {
        let mut blocked: HashSet<String> =
            settings.get_string_list(KEY_BLOCKED).into_iter().collect();
        let mut blocked_at: HashMap<String, i64> = settings
            .get_string(KEY_BLOCKED_AT)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        let muted: HashSet<String> = settings.get_string_list(KEY_MUTED).into_iter().collect();

        let before = blocked.len() + blocked_at.len();
        blocked.retain(|id| blocked_at.contains_key(id));
        blocked_at.retain(|id, _| blocked.contains(id));
        if blocked.len() + blocked_at.len() != before {
            warn!("dropped inconsistent block entries from settings");
        }

        debug!(
            "privacy state loaded: {} blocked, {} muted",
            blocked.len(),
            muted.len()
        );
        Self {
            settings,
            blocked,
            blocked_at,
            muted,
        }
    }

    pub fn is_blocked(&self, contact_id: &str) -> bool {
        self.blocked.contains(contact_id)
    }

    pub fn is_muted(&self, contact_id: &str) -> bool {
        self.muted.contains(contact_id)
    }

    /// Block timestamp for a contact, if blocked
    pub fn block_cutoff(&self, contact_id: &str) -> Option<i64> {
        self.blocked_at.get(contact_id).copied()
    }

    /// Record a block at the given instant (unix seconds)
    pub fn block(&mut self, contact_id: &str, now: i64) -> Result<()> {
        self.blocked.insert(contact_id.to_string());
        self.blocked_at.insert(contact_id.to_string(), now);
        self.persist_blocked()
    }

    /// Remove both the set entry and the timestamp. Returns true if the
    /// contact was blocked.
    pub fn unblock(&mut self, contact_id: &str) -> Result<bool> {
        let was = self.blocked.remove(contact_id);
        self.blocked_at.remove(contact_id);
        if was {
            self.persist_blocked()?;
        }
        Ok(was)
    }

    pub fn mute(&mut self, contact_id: &str) -> Result<()> {
        if self.muted.insert(contact_id.to_string()) {
            self.persist_muted()?;
        }
        Ok(())
    }

    pub fn unmute(&mut self, contact_id: &str) -> Result<bool> {
        let was = self.muted.remove(contact_id);
        if was {
            self.persist_muted()?;
        }
        Ok(was)
    }

    /// Drop received messages stamped strictly after the contact's block
    /// cutover. No-op for unblocked contacts.
    pub fn apply_cutover(&self, contact_id: &str, messages: &mut Vec<ChatMessage>) {
        if let Some(cutoff) = self.block_cutoff(contact_id) {
            messages.retain(|m| m.direction != Direction::Received || m.timestamp <= cutoff);
        }
    }

    fn persist_blocked(&self) -> Result<()> {
        let mut ids: Vec<String> = self.blocked.iter().cloned().collect();
        ids.sort();
        self.settings.set_string_list(KEY_BLOCKED, &ids)?;
        let json = serde_json::to_string(&self.blocked_at)?;
        self.settings.set_string(KEY_BLOCKED_AT, &json)
    }

    fn persist_muted(&self) -> Result<()> {
        let mut ids: Vec<String> = self.muted.iter().cloned().collect();
        ids.sort();
        self.settings.set_string_list(KEY_MUTED, &ids)
    }
}
