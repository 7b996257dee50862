//! A single worker generation and its lifecycle state machine.
//!
//! ```text
//! Uninstalled ──install──→ Installing ──ok──→ InstalledWaiting ──activate──→ Active
//!      ↑                        │
//!      └────────── failed ──────┘
//! ```
//!
//! Events are dispatched through [`EventKind::accepted_in`], which says in
//! which states each kind of event may run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tradepilot_net::{Fetcher, Request};

use crate::cache::SharedCacheStorage;
use crate::clients::SharedClients;
use crate::config::{CacheVersion, WorkerConfig};
use crate::fetch::{FetchHandled, FetchInterceptor};
use crate::gc::{collect_stale, GcReport};
use crate::notify::{
    handle_click, show_push, ClickOutcome, NotificationClick, NotificationId, Notifier, PushMessage,
};
use crate::precache::precache;
use crate::sync::{handle_sync, SyncEvent, SyncOutcome};
use crate::ServiceWorkerError;

/// Unique identifier for a worker generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Not installed, or a previous install failed.
    #[default]
    Uninstalled,
    /// Install event running.
    Installing,
    /// Installed, waiting for activation.
    InstalledWaiting,
    /// Active and handling events.
    Active,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Uninstalled => "uninstalled",
            WorkerState::Installing => "installing",
            WorkerState::InstalledWaiting => "installed-waiting",
            WorkerState::Active => "active",
        };
        f.write_str(name)
    }
}

// ==================== Events ====================

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Push,
    NotificationClick,
    Sync,
}

impl EventKind {
    /// States in which this event may be dispatched.
    pub fn accepted_in(self) -> &'static [WorkerState] {
        match self {
            EventKind::Install => &[WorkerState::Uninstalled],
            EventKind::Activate => &[WorkerState::InstalledWaiting],
            EventKind::Fetch
            | EventKind::Push
            | EventKind::NotificationClick
            | EventKind::Sync => &[WorkerState::Active],
        }
    }
}

/// An event the host dispatches to the worker.
#[derive(Debug)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(Request),
    Push(PushMessage),
    NotificationClick(NotificationClick),
    Sync(SyncEvent),
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::Install => EventKind::Install,
            LifecycleEvent::Activate => EventKind::Activate,
            LifecycleEvent::Fetch(_) => EventKind::Fetch,
            LifecycleEvent::Push(_) => EventKind::Push,
            LifecycleEvent::NotificationClick(_) => EventKind::NotificationClick,
            LifecycleEvent::Sync(_) => EventKind::Sync,
        }
    }
}

/// Result of a dispatched event.
#[derive(Debug)]
pub enum EventResponse {
    /// Precache finished with this many entries.
    Installed { entries: usize },
    /// Activation finished after collecting stale caches.
    Activated(GcReport),
    Fetch(FetchHandled),
    Push(NotificationId),
    NotificationClick(ClickOutcome),
    Sync(SyncOutcome),
}

// ==================== Worker ====================

/// Services the host provides to a worker.
#[derive(Clone)]
pub struct WorkerHost {
    pub fetcher: Arc<dyn Fetcher>,
    pub notifier: Arc<dyn Notifier>,
    pub caches: SharedCacheStorage,
    pub clients: SharedClients,
}

/// One worker generation.
pub struct ServiceWorker {
    id: ServiceWorkerId,
    config: Arc<WorkerConfig>,
    version: CacheVersion,
    host: WorkerHost,
    interceptor: FetchInterceptor,
    state: watch::Sender<WorkerState>,
}

impl ServiceWorker {
    /// Create a worker from a validated configuration.
    pub fn new(config: WorkerConfig, host: WorkerHost) -> Result<Self, ServiceWorkerError> {
        let version = config.validate()?;
        let config = Arc::new(config);

        let interceptor = FetchInterceptor::new(
            config.clone(),
            version.cache_name(),
            host.fetcher.clone(),
            host.caches.clone(),
        );
        let (state, _) = watch::channel(WorkerState::Uninstalled);

        Ok(Self {
            id: ServiceWorkerId::new(),
            config,
            version,
            host,
            interceptor,
            state,
        })
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    /// The cache generation this worker owns.
    pub fn version(&self) -> &CacheVersion {
        &self.version
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.state() == WorkerState::Active
    }

    /// Dispatch a lifecycle event.
    ///
    /// Events not accepted in the current state fail with
    /// [`ServiceWorkerError::State`] and leave the worker untouched.
    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<EventResponse, ServiceWorkerError> {
        let kind = event.kind();
        let state = self.state();
        if !kind.accepted_in().contains(&state) {
            return Err(ServiceWorkerError::State(format!(
                "{kind:?} event not accepted while {state}"
            )));
        }

        match event {
            LifecycleEvent::Install => self.install().await,
            LifecycleEvent::Activate => self.activate().await,
            LifecycleEvent::Fetch(request) => {
                self.interceptor.handle(request).await.map(EventResponse::Fetch)
            }
            LifecycleEvent::Push(message) => {
                show_push(&self.config, self.host.notifier.as_ref(), &message)
                    .await
                    .map(EventResponse::Push)
            }
            LifecycleEvent::NotificationClick(click) => handle_click(
                &self.config,
                self.host.notifier.as_ref(),
                &self.host.clients,
                &click,
            )
            .await
            .map(EventResponse::NotificationClick),
            LifecycleEvent::Sync(event) => {
                Ok(EventResponse::Sync(handle_sync(&self.config, &event)))
            }
        }
    }

    /// Go straight to `Active` on top of an existing current store.
    pub(crate) async fn resume(&self) -> Result<(), ServiceWorkerError> {
        let cache_name = self.version.cache_name();
        if !self.host.caches.read().await.has(&cache_name) {
            return Err(ServiceWorkerError::NotFound(format!("cache {cache_name}")));
        }
        self.transition(WorkerState::Uninstalled, WorkerState::Active)?;
        info!(worker = ?self.id, cache = %self.version, "Worker resumed from cache");
        Ok(())
    }

    async fn install(&self) -> Result<EventResponse, ServiceWorkerError> {
        self.transition(WorkerState::Uninstalled, WorkerState::Installing)?;

        match precache(
            &self.config,
            &self.version,
            self.host.fetcher.as_ref(),
            &self.host.caches,
        )
        .await
        {
            Ok(entries) => {
                self.transition(WorkerState::Installing, WorkerState::InstalledWaiting)?;
                info!(worker = ?self.id, cache = %self.version, "Worker installed");
                Ok(EventResponse::Installed { entries })
            }
            Err(e) => {
                self.transition(WorkerState::Installing, WorkerState::Uninstalled)?;
                error!(worker = ?self.id, error = %e, "Worker install failed");
                Err(e)
            }
        }
    }

    async fn activate(&self) -> Result<EventResponse, ServiceWorkerError> {
        let report = collect_stale(&self.host.caches, &self.version).await;
        self.transition(WorkerState::InstalledWaiting, WorkerState::Active)?;
        info!(
            worker = ?self.id,
            cache = %self.version,
            deleted = report.deleted.len(),
            "Worker activated"
        );
        Ok(EventResponse::Activated(report))
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), ServiceWorkerError> {
        let mut moved = false;
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                moved = true;
            }
            moved
        });

        if moved {
            Ok(())
        } else {
            Err(ServiceWorkerError::State(format!(
                "expected {from}, found {}",
                self.state()
            )))
        }
    }
}

impl fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("version", &self.version.to_string())
            .field("state", &self.state())
            .finish()
    }
}
