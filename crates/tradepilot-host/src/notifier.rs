//! Notification host for terminal runs: notifications go to the log.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;
use tradepilot_sw::{NotificationId, NotificationOptions, Notifier, ServiceWorkerError};

/// Logs every notification and remembers which ones are still open.
#[derive(Debug, Default)]
pub struct TracingNotifier {
    open: Mutex<Vec<NotificationId>>,
}

impl TracingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications shown and not yet closed.
    pub fn open(&self) -> Vec<NotificationId> {
        self.open.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<NotificationId, ServiceWorkerError> {
        let id = NotificationId::new();
        let actions: Vec<&str> = options.actions.iter().map(|a| a.action.as_str()).collect();
        info!(?id, title, body = %options.body, icon = %options.icon, ?actions, "Notification shown");

        self.open
            .lock()
            .map_err(|_| ServiceWorkerError::Notification("notifier state poisoned".to_string()))?
            .push(id);
        Ok(id)
    }

    async fn close_notification(&self, id: NotificationId) {
        if let Ok(mut open) = self.open.lock() {
            open.retain(|n| *n != id);
        }
        info!(?id, "Notification closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradepilot_sw::{PushMessage, WorkerConfig};

    #[tokio::test]
    async fn test_show_then_close() {
        let notifier = TracingNotifier::new();
        let options = NotificationOptions::for_push(&WorkerConfig::default(), &PushMessage::empty());

        let id = notifier.show_notification("TradePilot AI", options).await.unwrap();
        assert_eq!(notifier.open(), vec![id]);

        notifier.close_notification(id).await;
        assert!(notifier.open().is_empty());
    }
}
