/// Engine configuration
use std::time::Duration;

/// Tunables for the reconciliation engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between reconciliation cycles
    pub poll_interval: Duration,

    /// Message fetch limit for background (non-selected) contacts
    pub background_fetch_limit: usize,

    /// Message fetch limit for the actively viewed conversation
    pub conversation_fetch_limit: usize,

    /// Message fetch limit when computing contact statistics
    pub details_fetch_limit: usize,

    /// Maximum attachment size accepted by send_file
    pub max_attachment_bytes: u64,

    /// Capacity of the change-notification broadcast channel
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            background_fetch_limit: 10,
            conversation_fetch_limit: 100,
            details_fetch_limit: 1000,
            max_attachment_bytes: 5 * 1024 * 1024,
            event_buffer: 64,
        }
    }
}
