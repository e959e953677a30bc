/// One reconciliation cycle: contact diffing, per-contact message diffing,
/// unread counting, preview derivation
///
/// The cycle fetches contacts first (cheap, unblocks list rendering), then
/// walks known contacts sequentially. A failing fetch for one contact is
/// logged and never aborts the pass for the others; the next tick is the
/// retry mechanism.
use crate::engine::SyncEngine;
use crate::error::Result;
use crate::notify::{notification_title, render_preview};
use crate::types::{ChatEvent, ChatMessage, Direction};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Backends deliver newest-first, but that ordering is normalized here before
/// any "newest" logic runs. Stable sort, so equal timestamps keep backend
/// order.
pub(crate) fn normalize_newest_first(messages: &mut [ChatMessage]) {
    messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

impl SyncEngine {
    pub(crate) async fn run_cycle(&self) -> Result<()> {
        let signal = match self.backend().new_message_signal().await {
            Ok(count) => count,
            Err(e) => {
                debug!("new-message signal unavailable: {}", e);
                0
            }
        };
        if signal > 0 {
            debug!("{} new messages signalled, refreshing contact list", signal);
        }

        // The first cycle after engine start only establishes baselines:
        // history that predates this engine run is not unread debt.
        let priming = !self.state.read().await.primed;

        self.reconcile_contacts().await?;

        let ids: Vec<String> = {
            let state = self.state.read().await;
            state.contacts.keys().cloned().collect()
        };
        for contact_id in ids {
            if let Err(e) = self.reconcile_messages(&contact_id, priming).await {
                warn!("message reconciliation failed for {}: {}", contact_id, e);
            }
        }

        self.refresh_pending_inbound().await;
        Ok(())
    }

    /// Diff the backend contact list against local state. The id sets are
    /// compared unconditionally; a length mismatch alone would miss a swap of
    /// one contact for another at equal total count.
    async fn reconcile_contacts(&self) -> Result<()> {
        let remote = self.backend().list_contacts().await?;

        let fresh: Vec<_> = remote
            .into_iter()
            .map(|mut contact| {
                // display_name equal to the id marks an unsaved contact and
                // must survive untouched
                if contact.display_name != contact.id {
                    contact.display_name =
                        crate::utils::sanitize_display_name(&contact.display_name);
                }
                contact
            })
            .collect();

        let (added, removed, primed) = {
            let mut state = self.state.write().await;
            let remote_ids: HashSet<&str> = fresh.iter().map(|c| c.id.as_str()).collect();

            if state.contacts.len() != fresh.len() {
                debug!(
                    "contact count changed: {} -> {}",
                    state.contacts.len(),
                    fresh.len()
                );
            }

            let added: Vec<String> = fresh
                .iter()
                .filter(|c| !state.contacts.contains_key(&c.id))
                .map(|c| c.id.clone())
                .collect();
            let removed: Vec<String> = state
                .contacts
                .keys()
                .filter(|id| !remote_ids.contains(id.as_str()))
                .cloned()
                .collect();

            for contact_id in &removed {
                state.contacts.remove(contact_id);
                state.unread.remove(contact_id);
                state.last_received.remove(contact_id);
                state.previews.remove(contact_id);
                if state.selection.is_active(contact_id) {
                    state.selection.clear();
                    state.conversation.clear();
                }
            }
            for contact in fresh {
                state.contacts.insert(contact.id.clone(), contact);
            }

            let primed = state.primed;
            state.primed = true;
            (added, removed, primed)
        };

        if !added.is_empty() || !removed.is_empty() {
            self.emit(ChatEvent::ContactsChanged);
        }

        // The priming pass only populates the map; everything it sees was
        // already known to the backend before this engine started.
        if primed {
            for contact_id in &added {
                self.welcome_new_contact(contact_id).await;
            }
        }
        Ok(())
    }

    /// Side effects for a newly appeared contact: eager 1-message preview,
    /// unread bump, and a "New message" notification through the shared gate
    async fn welcome_new_contact(&self, contact_id: &str) {
        if self.privacy.read().await.is_blocked(contact_id) {
            debug!("new contact {} is blocked, skipping announcement", contact_id);
            return;
        }
        info!("new contact detected: {}", contact_id);

        let mut peeked = match self.backend().list_messages(contact_id, 1).await {
            Ok(messages) => messages,
            Err(e) => {
                debug!("preview fetch for new contact {} failed: {}", contact_id, e);
                Vec::new()
            }
        };
        normalize_newest_first(&mut peeked);
        let preview = peeked.first().map(render_preview).unwrap_or_default();
        let peeked_received = peeked
            .iter()
            .filter(|m| m.direction == Direction::Received)
            .count();

        let unread = {
            let mut state = self.state.write().await;
            if !preview.is_empty() {
                state.previews.insert(contact_id.to_string(), preview.clone());
            }
            // the counting pass must not re-count the message the peek covered
            state
                .last_received
                .insert(contact_id.to_string(), peeked_received);
            let counter = state.unread.entry(contact_id.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        self.emit(ChatEvent::UnreadChanged {
            contact_id: contact_id.to_string(),
            unread,
        });

        if self.should_notify(contact_id).await {
            let silent = !self.state.read().await.sound_enabled;
            self.sink().notify("New message", &preview, silent);
        }
    }

    /// Per-contact message pass: fetch, privacy filter, count, preview, and
    /// (for the selected contact) silent conversation refresh
    async fn reconcile_messages(&self, contact_id: &str, priming: bool) -> Result<()> {
        let is_selected = {
            let state = self.state.read().await;
            if !state.contacts.contains_key(contact_id) {
                return Ok(());
            }
            state.selection.is_active(contact_id)
        };
        let limit = if is_selected {
            self.config().conversation_fetch_limit
        } else {
            self.config().background_fetch_limit
        };

        let mut messages = self.backend().list_messages(contact_id, limit).await?;
        normalize_newest_first(&mut messages);
        self.privacy.read().await.apply_cutover(contact_id, &mut messages);

        let received = messages
            .iter()
            .filter(|m| m.direction == Direction::Received)
            .count();
        let newest_received = messages
            .iter()
            .find(|m| m.direction == Direction::Received)
            .cloned();

        let mut delta = 0usize;
        let mut unread_now = 0u32;
        let mut refreshed = false;
        {
            let mut state = self.state.write().await;
            let last = state.last_received.get(contact_id).copied().unwrap_or(0);
            if priming {
                state.last_received.insert(contact_id.to_string(), received);
            } else if received > last {
                delta = received - last;
                let counter = state.unread.entry(contact_id.to_string()).or_insert(0);
                *counter += delta as u32;
                unread_now = *counter;
                state.last_received.insert(contact_id.to_string(), received);
            } else if received < last {
                debug!(
                    "received count for {} shrank: {} -> {}",
                    contact_id, last, received
                );
            }

            if let Some(newest) = messages.first() {
                state
                    .previews
                    .insert(contact_id.to_string(), render_preview(newest));
            }

            // Silent refresh of the open conversation; skipped entirely when
            // the newest id and length are unchanged.
            if is_selected && state.selection.is_active(contact_id) {
                let changed = messages.len() != state.conversation.len()
                    || messages.first().map(|m| m.id.as_str())
                        != state.conversation.first().map(|m| m.id.as_str());
                if changed {
                    state.conversation = messages.clone();
                    refreshed = true;
                }
            }
        }

        if delta > 0 {
            self.emit(ChatEvent::UnreadChanged {
                contact_id: contact_id.to_string(),
                unread: unread_now,
            });
            if self.should_notify(contact_id).await {
                let (display_name, silent) = {
                    let state = self.state.read().await;
                    let name = state
                        .contacts
                        .get(contact_id)
                        .map(|c| c.label())
                        .unwrap_or_default();
                    (name, !state.sound_enabled)
                };
                let body = newest_received.as_ref().map(render_preview).unwrap_or_default();
                self.sink()
                    .notify(&notification_title(&display_name), &body, silent);
            }
        }
        if refreshed {
            self.emit(ChatEvent::ConversationRefreshed {
                contact_id: contact_id.to_string(),
            });
        }
        Ok(())
    }

    /// Best-effort refresh of the public/web channel's pending counter
    async fn refresh_pending_inbound(&self) {
        match self.backend().pending_inbound_count().await {
            Ok(count) => {
                let changed = {
                    let mut state = self.state.write().await;
                    if state.pending_inbound != count {
                        state.pending_inbound = count;
                        true
                    } else {
                        false
                    }
                };
                if changed {
                    self.emit(ChatEvent::PendingInboundChanged { count });
                }
            }
            Err(e) => debug!("pending inbound count unavailable: {}", e),
        }
    }
}
