/// Backend contract consumed by the engine
///
/// The cryptographic/transport side (key exchange, encryption, anonymized
/// delivery) and durable message storage live behind this trait. The engine
/// only holds a derived in-memory view on top of it.
use crate::error::Result;
use crate::types::{ChatMessage, Contact, MessageKind};
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait MessengerBackend: Send + Sync {
    /// Full contact list, including the reserved public/web channel
    async fn list_contacts(&self) -> Result<Vec<Contact>>;

    /// Most recent messages for a contact, newest first
    async fn list_messages(&self, contact_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;

    async fn send_message(&self, contact_id: &str, text: &str) -> Result<()>;

    async fn send_file(&self, contact_id: &str, path: &Path, kind: MessageKind) -> Result<()>;

    /// Returns true if the message existed and was deleted
    async fn delete_message(&self, message_id: &str) -> Result<bool>;

    /// Deletes all messages for a contact, returns the deleted count
    async fn clear_messages(&self, contact_id: &str) -> Result<usize>;

    async fn delete_contact_and_messages(&self, contact_id: &str) -> Result<()>;

    async fn add_contact(&self, contact_id: &str, nickname: &str) -> Result<()>;

    async fn rename_contact(&self, contact_id: &str, nickname: &str) -> Result<()>;

    /// Messages queued on the public/web channel
    async fn pending_inbound_count(&self) -> Result<i64>;

    /// Coarse counter of messages that arrived since the last call; consumed
    /// on read. A positive value hints that a full refresh is warranted.
    async fn new_message_signal(&self) -> Result<i64>;
}
