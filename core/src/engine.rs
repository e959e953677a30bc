/// Sync engine: shared state bag, poller, and user-initiated operations
///
/// All derived chat state (contacts, unread counters, previews, the displayed
/// conversation, selection) lives in one in-memory bag behind a tokio RwLock;
/// the reconciliation cycle and user actions both operate on it. Consumers
/// subscribe to a broadcast channel of `ChatEvent` for change notifications.
use crate::backend::MessengerBackend;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::notify::{self, NotificationSink};
use crate::privacy::PrivacyPolicy;
use crate::reconcile::normalize_newest_first;
use crate::selection::SelectionState;
use crate::settings::SettingsStore;
use crate::types::{ChatEvent, ChatMessage, Contact, ContactDetails, MessageKind, WEB_CHANNEL_ID};
use crate::utils::sanitize_display_name;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const KEY_NOTIFICATIONS: &str = "notifications_enabled";
const KEY_SOUND: &str = "sound_enabled";

/// The shared in-memory state bag
pub(crate) struct EngineState {
    pub contacts: HashMap<String, Contact>,
    pub unread: HashMap<String, u32>,
    pub last_received: HashMap<String, usize>,
    pub previews: HashMap<String, String>,
    pub conversation: Vec<ChatMessage>,
    pub selection: SelectionState,
    pub pending_inbound: i64,
    pub window_focused: bool,
    pub notifications_enabled: bool,
    pub sound_enabled: bool,
    /// False until the first contact reconciliation has populated the map;
    /// the priming pass must not replay the whole roster as new arrivals
    pub primed: bool,
}

/// Clears the in-flight flag even when the poll task is aborted mid-cycle
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncEngine {
    config: EngineConfig,
    backend: Arc<dyn MessengerBackend>,
    sink: Arc<dyn NotificationSink>,
    settings: Arc<dyn SettingsStore>,
    pub(crate) state: Arc<RwLock<EngineState>>,
    pub(crate) privacy: Arc<RwLock<PrivacyPolicy>>,
    events: broadcast::Sender<ChatEvent>,
    in_flight: Arc<AtomicBool>,
    poller: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncEngine {
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn MessengerBackend>,
        settings: Arc<dyn SettingsStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let notifications_enabled = settings.get_bool(KEY_NOTIFICATIONS, true);
        let sound_enabled = settings.get_bool(KEY_SOUND, true);
        let privacy = PrivacyPolicy::load(settings.clone());
        let (events, _) = broadcast::channel(config.event_buffer);

        let state = EngineState {
            contacts: HashMap::new(),
            unread: HashMap::new(),
            last_received: HashMap::new(),
            previews: HashMap::new(),
            conversation: Vec::new(),
            selection: SelectionState::default(),
            pending_inbound: 0,
            window_focused: true,
            notifications_enabled,
            sound_enabled,
            primed: false,
        };

        Self {
            config,
            backend,
            sink,
            settings,
            state: Arc::new(RwLock::new(state)),
            privacy: Arc::new(RwLock::new(privacy)),
            events,
            in_flight: Arc::new(AtomicBool::new(false)),
            poller: Arc::new(Mutex::new(None)),
        }
    }

    // ─── Poller ──────────────────────────────────────────────────────────────

    /// Start the poll timer. Idempotent: an existing timer is cancelled first.
    pub async fn start(&self) {
        let mut slot = self.poller.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }

        let engine = self.clone();
        let period = self.config.poll_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if engine.in_flight.swap(true, Ordering::SeqCst) {
                    debug!("reconciliation still in flight, skipping tick");
                    continue;
                }
                let _guard = InFlightGuard(engine.in_flight.clone());
                if let Err(e) = engine.run_cycle().await {
                    warn!("reconciliation cycle failed: {}", e);
                }
            }
        }));

        info!("poller started (every {}ms)", period.as_millis());
    }

    /// Cancel the poll timer. Safe when already stopped; an in-flight cycle
    /// is dropped and its results discarded.
    pub async fn stop(&self) {
        let mut slot = self.poller.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
            info!("poller stopped");
        }
    }

    /// Run one reconciliation cycle outside the timer. Skipped when a cycle
    /// is already in flight.
    pub async fn reconcile_now(&self) -> Result<()> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("reconciliation already in flight");
            return Ok(());
        }
        let _guard = InFlightGuard(self.in_flight.clone());
        self.run_cycle().await
    }

    // ─── Selection ───────────────────────────────────────────────────────────

    /// Make a contact the active selection: auxiliary views reset, its unread
    /// counter drops to zero, and its conversation is loaded. Selecting the
    /// public/web channel also resets the pending-inbound indicator.
    pub async fn select(&self, contact_id: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if !state.contacts.contains_key(contact_id) {
                return Err(EngineError::UnknownContact(contact_id.to_string()));
            }
            state.selection.select(contact_id);
            state.unread.insert(contact_id.to_string(), 0);
            if contact_id == WEB_CHANNEL_ID {
                state.pending_inbound = 0;
            }
        }
        self.emit(ChatEvent::SelectionChanged {
            contact_id: contact_id.to_string(),
        });
        self.emit(ChatEvent::UnreadChanged {
            contact_id: contact_id.to_string(),
            unread: 0,
        });
        self.load_conversation(contact_id).await
    }

    /// Drop the selection and the displayed conversation
    pub async fn clear_selection(&self) {
        {
            let mut state = self.state.write().await;
            state.selection.clear();
            state.conversation.clear();
        }
        self.emit(ChatEvent::SelectionChanged {
            contact_id: String::new(),
        });
    }

    pub async fn open_profile(&self) {
        self.state.write().await.selection.open_profile();
    }

    pub async fn open_contact_details(&self) {
        self.state.write().await.selection.open_details();
    }

    pub async fn selection(&self) -> SelectionState {
        self.state.read().await.selection.clone()
    }

    /// Presentation layer reports window focus; used by the notification gate
    pub async fn set_window_focused(&self, focused: bool) {
        self.state.write().await.window_focused = focused;
    }

    // ─── User actions (errors propagate to the caller) ───────────────────────

    pub async fn send_message(&self, contact_id: &str, text: &str) -> Result<()> {
        if contact_id == WEB_CHANNEL_ID {
            return Err(EngineError::InboundOnly);
        }
        self.backend.send_message(contact_id, text).await?;
        if self.state.read().await.selection.is_active(contact_id) {
            self.load_conversation(contact_id).await?;
        }
        Ok(())
    }

    pub async fn send_file(&self, contact_id: &str, path: &Path, kind: MessageKind) -> Result<()> {
        if contact_id == WEB_CHANNEL_ID {
            return Err(EngineError::InboundOnly);
        }
        let meta = tokio::fs::metadata(path).await?;
        if meta.len() > self.config.max_attachment_bytes {
            return Err(EngineError::AttachmentTooLarge {
                size: meta.len(),
                limit: self.config.max_attachment_bytes,
            });
        }
        self.backend.send_file(contact_id, path, kind).await?;
        if self.state.read().await.selection.is_active(contact_id) {
            self.load_conversation(contact_id).await?;
        }
        Ok(())
    }

    /// Delete a single message; the displayed conversation is refreshed if
    /// one is open
    pub async fn delete_message(&self, message_id: &str) -> Result<bool> {
        let deleted = self.backend.delete_message(message_id).await?;
        if deleted {
            let active = self
                .state
                .read()
                .await
                .selection
                .active()
                .map(str::to_string);
            if let Some(contact_id) = active {
                self.load_conversation(&contact_id).await?;
            }
        }
        Ok(deleted)
    }

    /// Delete all messages for a contact, keeping the contact. Returns the
    /// number of deleted messages.
    pub async fn clear_chat(&self, contact_id: &str) -> Result<usize> {
        let removed = self.backend.clear_messages(contact_id).await?;
        let was_active = {
            let mut state = self.state.write().await;
            state.unread.remove(contact_id);
            state.last_received.remove(contact_id);
            state.previews.remove(contact_id);
            let was_active = state.selection.is_active(contact_id);
            if was_active {
                state.conversation.clear();
            }
            was_active
        };
        self.emit(ChatEvent::UnreadChanged {
            contact_id: contact_id.to_string(),
            unread: 0,
        });
        if was_active {
            self.emit(ChatEvent::ConversationRefreshed {
                contact_id: contact_id.to_string(),
            });
        }
        info!("cleared {} messages for {}", removed, contact_id);
        Ok(removed)
    }

    /// Delete a contact together with its message history
    pub async fn delete_chat(&self, contact_id: &str) -> Result<()> {
        if contact_id == WEB_CHANNEL_ID {
            return Err(EngineError::InboundOnly);
        }
        self.backend.delete_contact_and_messages(contact_id).await?;
        let was_active = {
            let mut state = self.state.write().await;
            state.contacts.remove(contact_id);
            state.unread.remove(contact_id);
            state.last_received.remove(contact_id);
            state.previews.remove(contact_id);
            let was_active = state.selection.is_active(contact_id);
            if was_active {
                state.selection.clear();
                state.conversation.clear();
            }
            was_active
        };
        self.emit(ChatEvent::ContactsChanged);
        if was_active {
            self.emit(ChatEvent::SelectionChanged {
                contact_id: String::new(),
            });
        }
        Ok(())
    }

    pub async fn add_contact(&self, contact_id: &str, nickname: &str) -> Result<()> {
        let display_name = sanitize_display_name(nickname);
        self.backend.add_contact(contact_id, &display_name).await?;
        {
            let mut state = self.state.write().await;
            state.contacts.insert(
                contact_id.to_string(),
                Contact {
                    id: contact_id.to_string(),
                    display_name,
                    last_seen: Some(Utc::now().timestamp()),
                },
            );
        }
        self.emit(ChatEvent::ContactsChanged);
        Ok(())
    }

    pub async fn rename_contact(&self, contact_id: &str, nickname: &str) -> Result<()> {
        let display_name = sanitize_display_name(nickname);
        self.backend.rename_contact(contact_id, &display_name).await?;
        {
            let mut state = self.state.write().await;
            match state.contacts.get_mut(contact_id) {
                Some(contact) => contact.display_name = display_name,
                None => return Err(EngineError::UnknownContact(contact_id.to_string())),
            }
        }
        self.emit(ChatEvent::ContactsChanged);
        Ok(())
    }

    /// Per-contact statistics for the detail view, computed from a fresh
    /// backend fetch
    pub async fn contact_details(&self, contact_id: &str) -> Result<ContactDetails> {
        let contact = self
            .state
            .read()
            .await
            .contacts
            .get(contact_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownContact(contact_id.to_string()))?;
        let mut messages = self
            .backend
            .list_messages(contact_id, self.config.details_fetch_limit)
            .await?;
        normalize_newest_first(&mut messages);
        Ok(ContactDetails {
            id: contact.id,
            display_name: contact.display_name,
            last_seen: contact.last_seen,
            first_message_at: messages.last().map(|m| m.timestamp),
            last_message_at: messages.first().map(|m| m.timestamp),
            total_messages: messages.len(),
        })
    }

    // ─── Privacy ─────────────────────────────────────────────────────────────

    /// Block a contact from now on. History up to this instant stays visible.
    pub async fn block_contact(&self, contact_id: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        self.privacy.write().await.block(contact_id, now)?;
        info!("blocked {} (cutover {})", contact_id, now);
        Ok(())
    }

    /// Unblock a contact. If it is currently selected the conversation is
    /// reloaded immediately so previously hidden messages appear.
    pub async fn unblock_contact(&self, contact_id: &str) -> Result<bool> {
        let was_blocked = self.privacy.write().await.unblock(contact_id)?;
        if was_blocked && self.state.read().await.selection.is_active(contact_id) {
            self.load_conversation(contact_id).await?;
        }
        Ok(was_blocked)
    }

    pub async fn mute_contact(&self, contact_id: &str) -> Result<()> {
        self.privacy.write().await.mute(contact_id)
    }

    pub async fn unmute_contact(&self, contact_id: &str) -> Result<bool> {
        self.privacy.write().await.unmute(contact_id)
    }

    pub async fn is_blocked(&self, contact_id: &str) -> bool {
        self.privacy.read().await.is_blocked(contact_id)
    }

    pub async fn is_muted(&self, contact_id: &str) -> bool {
        self.privacy.read().await.is_muted(contact_id)
    }

    // ─── Settings ────────────────────────────────────────────────────────────

    pub async fn set_notifications_enabled(&self, enabled: bool) -> Result<()> {
        self.settings.set_bool(KEY_NOTIFICATIONS, enabled)?;
        self.state.write().await.notifications_enabled = enabled;
        Ok(())
    }

    pub async fn set_sound_enabled(&self, enabled: bool) -> Result<()> {
        self.settings.set_bool(KEY_SOUND, enabled)?;
        self.state.write().await.sound_enabled = enabled;
        Ok(())
    }

    pub async fn notifications_enabled(&self) -> bool {
        self.state.read().await.notifications_enabled
    }

    pub async fn sound_enabled(&self) -> bool {
        self.state.read().await.sound_enabled
    }

    // ─── Views ───────────────────────────────────────────────────────────────

    /// Known contacts, public/web channel first, then most recently seen
    pub async fn contacts(&self) -> Vec<Contact> {
        let state = self.state.read().await;
        let mut contacts: Vec<Contact> = state.contacts.values().cloned().collect();
        contacts.sort_by(|a, b| {
            b.is_web_channel()
                .cmp(&a.is_web_channel())
                .then(b.last_seen.cmp(&a.last_seen))
                .then(a.id.cmp(&b.id))
        });
        contacts
    }

    pub async fn contact(&self, contact_id: &str) -> Option<Contact> {
        self.state.read().await.contacts.get(contact_id).cloned()
    }

    pub async fn unread_count(&self, contact_id: &str) -> u32 {
        self.state
            .read()
            .await
            .unread
            .get(contact_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn preview(&self, contact_id: &str) -> Option<String> {
        self.state.read().await.previews.get(contact_id).cloned()
    }

    /// The displayed message list for the active contact, newest first
    pub async fn conversation(&self) -> Vec<ChatMessage> {
        self.state.read().await.conversation.clone()
    }

    pub async fn active_contact(&self) -> Option<String> {
        self.state.read().await.selection.active().map(str::to_string)
    }

    pub async fn pending_inbound(&self) -> i64 {
        self.state.read().await.pending_inbound
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    pub(crate) fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn backend(&self) -> &dyn MessengerBackend {
        self.backend.as_ref()
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn sink(&self) -> &dyn NotificationSink {
        self.sink.as_ref()
    }

    /// Both notification paths (new contact, message delta) go through this
    /// gate so the checks cannot diverge.
    pub(crate) async fn should_notify(&self, contact_id: &str) -> bool {
        let (enabled, selected, focused) = {
            let state = self.state.read().await;
            (
                state.notifications_enabled,
                state.selection.is_active(contact_id),
                state.window_focused,
            )
        };
        let muted = self.privacy.read().await.is_muted(contact_id);
        notify::should_notify(enabled, muted, selected, focused)
    }

    /// Fetch and swap in the full conversation for a contact
    pub(crate) async fn load_conversation(&self, contact_id: &str) -> Result<()> {
        let mut messages = self
            .backend
            .list_messages(contact_id, self.config.conversation_fetch_limit)
            .await?;
        normalize_newest_first(&mut messages);
        self.privacy.read().await.apply_cutover(contact_id, &mut messages);

        {
            let mut state = self.state.write().await;
            // selection may have moved while the fetch was in flight
            if !state.selection.is_active(contact_id) {
                return Ok(());
            }
            state.conversation = messages;
        }
        self.emit(ChatEvent::ConversationRefreshed {
            contact_id: contact_id.to_string(),
        });
        Ok(())
    }
}

impl Clone for SyncEngine {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            backend: self.backend.clone(),
            sink: self.sink.clone(),
            settings: self.settings.clone(),
            state: self.state.clone(),
            privacy: self.privacy.clone(),
            events: self.events.clone(),
            in_flight: self.in_flight.clone(),
            poller: self.poller.clone(),
        }
    }
}
