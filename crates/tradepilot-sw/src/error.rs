//! Worker error type.

use thiserror::Error;

/// Errors that can occur in worker operations.
#[derive(Error, Debug, Clone)]
pub enum ServiceWorkerError {
    #[error("Precache failed: {0}")]
    Precache(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Install prompt error: {0}")]
    InstallPrompt(String),
}

impl From<tradepilot_net::NetError> for ServiceWorkerError {
    fn from(err: tradepilot_net::NetError) -> Self {
        Self::Network(err.to_string())
    }
}
