/// VeilChat sync engine
///
/// Client-side reconciliation of contacts, messages, unread counters and
/// notification decisions against an external messaging backend. The backend
/// (crypto, transport, durable storage) and the presentation layer are
/// collaborators reached through traits; this crate owns the derived
/// in-memory view and the polling/diffing contracts only.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod notify;
pub mod privacy;
mod reconcile;
pub mod selection;
pub mod settings;
pub mod types;
pub mod utils;

pub use backend::MessengerBackend;
pub use config::EngineConfig;
pub use engine::SyncEngine;
pub use error::{EngineError, Result};
pub use memory::{MemoryBackend, MemorySettings};
pub use notify::{LogSink, NotificationSink};
pub use selection::SelectionState;
pub use settings::{SettingsStore, SledSettings};
pub use types::{
    ChatEvent, ChatMessage, Contact, ContactDetails, Direction, MessageKind, WEB_CHANNEL_ID,
    WEB_CHANNEL_NAME,
};
