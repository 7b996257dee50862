//! A registration: the installing, waiting and active worker generations
//! for one scope.
//!
//! A new generation only replaces the active one after it installed and was
//! activated. A failed install is dropped and the active generation keeps
//! serving. A generation whose store survived from an earlier run can be
//! adopted as active without installing.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tradepilot_net::Request;
use url::Url;

use crate::fetch::{FetchDecision, FetchHandled};
use crate::gc::GcReport;
use crate::lifetime::ExtendLifetime;
use crate::notify::{ClickOutcome, NotificationClick, NotificationId, PushMessage};
use crate::sync::{SyncEvent, SyncOutcome};
use crate::worker::{EventResponse, LifecycleEvent, ServiceWorker, ServiceWorkerId, WorkerState};
use crate::ServiceWorkerError;

/// Registration events.
#[derive(Debug, Clone)]
pub enum RegistrationEvent {
    /// A new generation started installing.
    UpdateFound { worker_id: ServiceWorkerId },
    /// A generation changed state.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: WorkerState,
    },
    /// A generation failed to install and was discarded.
    InstallFailed {
        worker_id: ServiceWorkerId,
        error: String,
    },
    /// A generation was replaced and no longer handles events.
    Redundant { worker_id: ServiceWorkerId },
    /// The active generation changed.
    ControllerChange { worker_id: ServiceWorkerId },
}

/// A worker registration.
pub struct ServiceWorkerRegistration {
    /// Scope URL.
    pub scope: Url,

    installing: Option<Arc<ServiceWorker>>,
    waiting: Option<Arc<ServiceWorker>>,
    active: Option<Arc<ServiceWorker>>,

    event_tx: mpsc::UnboundedSender<RegistrationEvent>,
}

impl ServiceWorkerRegistration {
    /// Create a new registration.
    pub fn new(scope: Url) -> (Self, mpsc::UnboundedReceiver<RegistrationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                scope,
                installing: None,
                waiting: None,
                active: None,
                event_tx,
            },
            event_rx,
        )
    }

    pub fn installing(&self) -> Option<&Arc<ServiceWorker>> {
        self.installing.as_ref()
    }

    pub fn waiting(&self) -> Option<&Arc<ServiceWorker>> {
        self.waiting.as_ref()
    }

    /// The generation currently handling events.
    pub fn active(&self) -> Option<&Arc<ServiceWorker>> {
        self.active.as_ref()
    }

    /// Install a new generation.
    ///
    /// On success it becomes the waiting generation (replacing any earlier
    /// waiting one). On failure it is discarded and the error returned; the
    /// active generation is not touched.
    pub async fn update(&mut self, worker: ServiceWorker) -> Result<usize, ServiceWorkerError> {
        let worker = Arc::new(worker);
        let worker_id = worker.id();
        self.installing = Some(worker.clone());
        self.emit(RegistrationEvent::UpdateFound { worker_id });

        let result = worker.dispatch(LifecycleEvent::Install).await;
        self.installing = None;

        match result {
            Ok(EventResponse::Installed { entries }) => {
                if let Some(old) = self.waiting.replace(worker.clone()) {
                    self.emit(RegistrationEvent::Redundant {
                        worker_id: old.id(),
                    });
                }
                self.emit_state(&worker);
                Ok(entries)
            }
            Ok(other) => Err(ServiceWorkerError::State(format!(
                "unexpected install response {other:?}"
            ))),
            Err(e) => {
                if let Some(active) = &self.active {
                    warn!(
                        active = %active.version(),
                        "New worker failed to install, active worker keeps serving"
                    );
                }
                self.emit(RegistrationEvent::InstallFailed {
                    worker_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Activate the waiting generation.
    pub async fn activate(&mut self) -> Result<GcReport, ServiceWorkerError> {
        let worker = self
            .waiting
            .take()
            .ok_or_else(|| ServiceWorkerError::State("no waiting worker".to_string()))?;

        let report = match worker.dispatch(LifecycleEvent::Activate).await {
            Ok(EventResponse::Activated(report)) => report,
            Ok(other) => {
                return Err(ServiceWorkerError::State(format!(
                    "unexpected activate response {other:?}"
                )));
            }
            Err(e) => {
                self.waiting = Some(worker);
                return Err(e);
            }
        };

        if let Some(old) = self.active.replace(worker.clone()) {
            self.emit(RegistrationEvent::Redundant {
                worker_id: old.id(),
            });
        }
        self.emit_state(&worker);
        self.emit(RegistrationEvent::ControllerChange {
            worker_id: worker.id(),
        });
        info!(scope = %self.scope, cache = %worker.version(), "Controller changed");

        Ok(report)
    }

    /// Make a generation active from the store an earlier run left behind.
    ///
    /// Nothing is fetched and no stale store is collected. Fails when the
    /// generation's store is missing.
    pub async fn adopt(&mut self, worker: ServiceWorker) -> Result<(), ServiceWorkerError> {
        worker.resume().await?;
        let worker = Arc::new(worker);

        if let Some(old) = self.active.replace(worker.clone()) {
            self.emit(RegistrationEvent::Redundant {
                worker_id: old.id(),
            });
        }
        self.emit_state(&worker);
        self.emit(RegistrationEvent::ControllerChange {
            worker_id: worker.id(),
        });
        info!(scope = %self.scope, cache = %worker.version(), "Adopted cached worker");
        Ok(())
    }

    /// Activate the waiting generation without waiting for clients to close.
    pub async fn skip_waiting(&mut self) -> Result<GcReport, ServiceWorkerError> {
        self.activate().await
    }

    /// Route a request through the active generation.
    ///
    /// Without an active generation the request passes through.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchHandled, ServiceWorkerError> {
        let Some(active) = &self.active else {
            debug!(url = %request.url, "No active worker, passing through");
            return Ok(FetchHandled {
                decision: FetchDecision::Passthrough,
                lifetime: ExtendLifetime::new(),
            });
        };

        match active.dispatch(LifecycleEvent::Fetch(request)).await? {
            EventResponse::Fetch(handled) => Ok(handled),
            other => Err(unexpected(other)),
        }
    }

    /// Deliver a push message to the active generation.
    pub async fn push(&self, message: PushMessage) -> Result<NotificationId, ServiceWorkerError> {
        match self.require_active()?.dispatch(LifecycleEvent::Push(message)).await? {
            EventResponse::Push(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// Deliver a notification click to the active generation.
    pub async fn notification_click(
        &self,
        click: NotificationClick,
    ) -> Result<ClickOutcome, ServiceWorkerError> {
        match self
            .require_active()?
            .dispatch(LifecycleEvent::NotificationClick(click))
            .await?
        {
            EventResponse::NotificationClick(outcome) => Ok(outcome),
            other => Err(unexpected(other)),
        }
    }

    /// Deliver a sync event to the active generation.
    pub async fn sync(&self, event: SyncEvent) -> Result<SyncOutcome, ServiceWorkerError> {
        match self.require_active()?.dispatch(LifecycleEvent::Sync(event)).await? {
            EventResponse::Sync(outcome) => Ok(outcome),
            other => Err(unexpected(other)),
        }
    }

    /// Drop every generation.
    pub fn unregister(&mut self) {
        for worker in [self.installing.take(), self.waiting.take(), self.active.take()]
            .into_iter()
            .flatten()
        {
            self.emit(RegistrationEvent::Redundant {
                worker_id: worker.id(),
            });
        }
    }

    fn require_active(&self) -> Result<&Arc<ServiceWorker>, ServiceWorkerError> {
        self.active
            .as_ref()
            .ok_or_else(|| ServiceWorkerError::State("no active worker".to_string()))
    }

    fn emit_state(&self, worker: &ServiceWorker) {
        self.emit(RegistrationEvent::StateChange {
            worker_id: worker.id(),
            new_state: worker.state(),
        });
    }

    fn emit(&self, event: RegistrationEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }
}

fn unexpected(response: EventResponse) -> ServiceWorkerError {
    ServiceWorkerError::State(format!("unexpected event response {response:?}"))
}
