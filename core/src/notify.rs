/// Notification rendering and delivery sink
///
/// The engine decides whether and what to notify; actual OS-level delivery
/// and audio playback belong to the sink implementation. The decision itself
/// (enablement, mute, selection, focus) lives in one place so the new-contact
/// path and the per-contact delta path cannot diverge.
use crate::types::{ChatMessage, MessageKind};
use crate::utils::sanitize_text;
use tracing::info;

/// Fire-and-forget notification delivery
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, body: &str, silent: bool);
}

/// Sink that writes notifications to the log. Useful as a default and for
/// headless runs.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, title: &str, body: &str, silent: bool) {
        info!("notification: {} — {} (silent: {})", title, body, silent);
    }
}

/// Single gate for notification emission. Notifications fire only when
/// enabled, the contact is not muted, and the conversation is not both
/// selected and focused.
pub(crate) fn should_notify(enabled: bool, muted: bool, selected: bool, focused: bool) -> bool {
    enabled && !muted && (!selected || !focused)
}

/// Type-aware short text for a message: sanitized body for text messages, a
/// fixed label for media kinds.
pub(crate) fn render_preview(message: &ChatMessage) -> String {
    match message.kind {
        MessageKind::Text => sanitize_text(&message.text),
        kind => kind.placeholder().to_string(),
    }
}

/// Notification title for a contact delta; empty display names fall back to
/// "Unknown".
pub(crate) fn notification_title(display_name: &str) -> String {
    if display_name.trim().is_empty() {
        "Unknown".to_string()
    } else {
        display_name.to_string()
    }
}
