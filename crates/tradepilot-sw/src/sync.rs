//! Background sync placeholder.
//!
//! The tagged registration is acknowledged and nothing is replayed. A real
//! offline outbox would be a separate durable queue, not this handler.

use tracing::debug;

use crate::config::WorkerConfig;

/// A background sync event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub tag: String,
    /// Whether the host will give up after this attempt.
    pub last_chance: bool,
}

impl SyncEvent {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            last_chance: false,
        }
    }
}

/// Result of a sync event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The worker's own tag; acknowledged without work.
    Acknowledged,
    /// Some other tag; nothing to do.
    Ignored,
}

/// Acknowledge the configured sync tag.
pub fn handle_sync(config: &WorkerConfig, event: &SyncEvent) -> SyncOutcome {
    if event.tag == config.sync_tag {
        debug!(tag = %event.tag, last_chance = event.last_chance, "Background sync acknowledged");
        SyncOutcome::Acknowledged
    } else {
        debug!(tag = %event.tag, "Ignoring unknown sync tag");
        SyncOutcome::Ignored
    }
}
