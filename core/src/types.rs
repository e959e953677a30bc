/// Shared types for the sync engine
use serde::{Deserialize, Serialize};

/// Reserved contact id for the inbound-only public/web channel.
/// It never appears as a send target and carries a pending-inbound counter
/// instead of a normal unread flow.
pub const WEB_CHANNEL_ID: &str = "web_channel";

/// Display name for the public/web channel
pub const WEB_CHANNEL_NAME: &str = "Web Messages";

/// A remote correspondent, identified by an opaque address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    /// Equal to `id` when the contact was never given a nickname
    pub display_name: String,
    pub last_seen: Option<i64>,
}

impl Contact {
    /// Label for list display. Unsaved contacts (display name equal to the
    /// raw address) fall back to an abbreviated id.
    pub fn label(&self) -> String {
        if self.display_name.is_empty() || self.display_name == self.id {
            abbreviate_id(&self.id)
        } else {
            self.display_name.clone()
        }
    }

    pub fn is_web_channel(&self) -> bool {
        self.id == WEB_CHANNEL_ID
    }
}

fn abbreviate_id(id: &str) -> String {
    if id.chars().count() <= 12 {
        id.to_string()
    } else {
        let prefix: String = id.chars().take(12).collect();
        format!("{}…", prefix)
    }
}

/// Whether a message was sent by us or received from the contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// Payload kind of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
            MessageKind::File => "file",
        }
    }

    /// Fixed preview label for non-text kinds
    pub fn placeholder(&self) -> &'static str {
        match self {
            MessageKind::Text => "",
            MessageKind::Image => "Image",
            MessageKind::Audio => "Audio Message",
            MessageKind::File => "File",
        }
    }
}

/// One message as delivered by the backend. Immutable once fetched; the
/// engine derives sanitized display copies and never writes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub recipient_id: String,
    /// Unix seconds
    pub timestamp: i64,
    pub direction: Direction,
    pub read: bool,
    pub kind: MessageKind,
}

/// Derived per-contact statistics for the contact-detail view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactDetails {
    pub id: String,
    pub display_name: String,
    pub last_seen: Option<i64>,
    pub first_message_at: Option<i64>,
    pub last_message_at: Option<i64>,
    pub total_messages: usize,
}

/// Change events broadcast to presentation-layer subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The contact list gained or lost entries
    ContactsChanged,
    /// The displayed conversation for a contact was replaced
    ConversationRefreshed { contact_id: String },
    /// A contact's unread counter changed
    UnreadChanged { contact_id: String, unread: u32 },
    /// The public/web channel's pending-inbound counter changed
    PendingInboundChanged { count: i64 },
    /// The active selection changed (None encoded as empty string)
    SelectionChanged { contact_id: String },
}
