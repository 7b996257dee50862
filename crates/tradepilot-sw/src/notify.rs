//! Push messages to system notifications, notification clicks to windows.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::clients::{ClientId, SharedClients};
use crate::config::WorkerConfig;
use crate::ServiceWorkerError;

/// Action id that opens the dashboard.
pub const ACTION_EXPLORE: &str = "explore";

/// Action id that only dismisses.
pub const ACTION_CLOSE: &str = "close";

/// Unique identifier for a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(u64);

impl NotificationId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Push ====================

/// An inbound push message. The payload is opaque bytes.
#[derive(Debug, Clone, Default)]
pub struct PushMessage {
    data: Option<Bytes>,
}

impl PushMessage {
    /// A push carrying `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    /// A push without payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The payload as text, if present, non-empty and valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        self.data
            .as_deref()
            .and_then(|d| std::str::from_utf8(d).ok())
            .filter(|t| !t.is_empty())
    }
}

/// A notification action button.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// Data bag attached to a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Arrival time in ms since epoch.
    pub date_of_arrival: u64,
    pub primary_key: u64,
}

/// Options handed to the host's notification API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl NotificationOptions {
    /// Build the notification for a push message.
    pub fn for_push(config: &WorkerConfig, message: &PushMessage) -> Self {
        let defaults = &config.notifications;
        let body = message
            .text()
            .map(str::to_string)
            .unwrap_or_else(|| defaults.default_body.clone());

        let date_of_arrival = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            body,
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
            vibrate: defaults.vibrate.clone(),
            data: NotificationData {
                date_of_arrival,
                primary_key: 1,
            },
            actions: vec![
                NotificationAction {
                    action: ACTION_EXPLORE.to_string(),
                    title: "Explore".to_string(),
                    icon: defaults.icon.clone(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.to_string(),
                    title: "Close".to_string(),
                    icon: defaults.icon.clone(),
                },
            ],
        }
    }
}

/// Host notification API.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Display a notification; resolves once the host has shown it.
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<NotificationId, ServiceWorkerError>;

    /// Close a displayed notification.
    async fn close_notification(&self, id: NotificationId);
}

/// Display a notification for `message`.
///
/// Completes only when the host's display call settles; a display failure
/// is returned to the caller.
pub async fn show_push(
    config: &WorkerConfig,
    notifier: &dyn Notifier,
    message: &PushMessage,
) -> Result<NotificationId, ServiceWorkerError> {
    let options = NotificationOptions::for_push(config, message);
    debug!(body = %options.body, has_payload = message.text().is_some(), "Showing push notification");

    let id = notifier
        .show_notification(&config.notifications.title, options)
        .await?;
    info!(notification = ?id, "Push notification shown");
    Ok(id)
}

// ==================== Click ====================

/// A click on a displayed notification.
#[derive(Debug, Clone)]
pub struct NotificationClick {
    pub notification: NotificationId,
    /// Action button id; `None` when the body was clicked.
    pub action: Option<String>,
}

/// What a click resulted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An existing dashboard window was focused.
    Focused(ClientId),
    /// A new dashboard window was opened.
    Opened(ClientId),
    /// The notification was closed, nothing else.
    Dismissed,
}

/// Close the clicked notification and route `explore` to the dashboard.
pub async fn handle_click(
    config: &WorkerConfig,
    notifier: &dyn Notifier,
    clients: &SharedClients,
    click: &NotificationClick,
) -> Result<ClickOutcome, ServiceWorkerError> {
    notifier.close_notification(click.notification).await;

    if click.action.as_deref() != Some(ACTION_EXPLORE) {
        debug!(action = ?click.action, "Notification dismissed");
        return Ok(ClickOutcome::Dismissed);
    }

    let dashboard = config.dashboard_url()?;
    let mut clients = clients.write().await;
    let outcome = match clients.find_window(&dashboard) {
        Some(id) => {
            clients.focus(id)?;
            ClickOutcome::Focused(id)
        }
        None => ClickOutcome::Opened(clients.open_window(dashboard.clone()).id),
    };

    info!(url = %dashboard, outcome = ?outcome, "Routed notification click");
    Ok(outcome)
}
