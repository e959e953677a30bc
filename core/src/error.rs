/// Error types for the sync engine
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown contact: {0}")]
    UnknownContact(String),

    #[error("Operation not permitted on the public inbound channel")]
    InboundOnly,

    #[error("Attachment too large: {size} bytes (limit {limit})")]
    AttachmentTooLarge { size: u64, limit: u64 },
}

pub type Result<T> = std::result::Result<T, EngineError>;
