//! Extending an event's lifetime past its handler's return.

use std::future::Future;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::warn;

/// Work an event handler started but did not wait for.
///
/// The handler answers its caller immediately; the host awaits
/// [`ExtendLifetime::settled`] before tearing the worker down.
#[derive(Debug, Default)]
pub struct ExtendLifetime {
    pending: Vec<JoinHandle<()>>,
}

impl ExtendLifetime {
    /// Create an empty lifetime extension.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` and keep the event alive until it finishes.
    pub fn wait_until<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.push(tokio::spawn(future));
    }

    /// Number of outstanding operations.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every outstanding operation.
    pub async fn settled(self) {
        for result in join_all(self.pending).await {
            if let Err(e) = result {
                warn!(error = %e, "Extended operation did not complete");
            }
        }
    }
}
