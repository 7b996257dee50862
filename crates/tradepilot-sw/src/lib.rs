//! # TradePilot Worker
//!
//! The background worker behind the TradePilot dashboard: offline shell
//! cache, cache-first fetch arbitration, stale cache reclamation and push
//! notifications.
//!
//! ## Features
//!
//! - **Precache**: shell routes stored on install, all-or-nothing
//! - **Fetch interception**: cache-first, network fallback, offline shell
//! - **Cache GC**: only the current `<product>-v<semver>` store survives activation
//! - **Notifications**: push text to system notifications, `explore` clicks to the dashboard
//! - **Lifecycle**: `Uninstalled → Installing → InstalledWaiting → Active`
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerRegistration
//!     ├── installing / waiting / active (ServiceWorker)
//!     │       └── dispatch(LifecycleEvent)
//!     │               ├── Install  → precache
//!     │               ├── Activate → collect_stale
//!     │               ├── Fetch    → FetchInterceptor
//!     │               ├── Push / NotificationClick → notify
//!     │               └── Sync     → handle_sync
//!     └── WorkerHost
//!             ├── Fetcher (network)
//!             ├── Notifier (system notifications)
//!             ├── CacheStorage
//!             └── Clients
//! ```

pub mod cache;
pub mod clients;
pub mod config;
mod error;
pub mod fetch;
pub mod gc;
pub mod install_prompt;
pub mod lifetime;
pub mod notify;
pub mod precache;
pub mod registration;
pub mod sync;
pub mod worker;

pub use cache::{Cache, CacheEntry, CacheStorage, SharedCacheStorage};
pub use clients::{Client, ClientId, ClientType, Clients, SharedClients};
pub use config::{CacheVersion, NotificationDefaults, WorkerConfig, PRECACHE_MANIFEST};
pub use error::ServiceWorkerError;
pub use fetch::{FetchDecision, FetchHandled, FetchInterceptor, FetchResponse, ResponseSource};
pub use gc::GcReport;
pub use install_prompt::{DeferredPrompt, InstallPromptCapture, Platform, UserChoice};
pub use lifetime::ExtendLifetime;
pub use notify::{
    ClickOutcome, NotificationClick, NotificationId, NotificationOptions, Notifier, PushMessage,
};
pub use registration::{RegistrationEvent, ServiceWorkerRegistration};
pub use sync::{SyncEvent, SyncOutcome};
pub use worker::{
    EventKind, EventResponse, LifecycleEvent, ServiceWorker, ServiceWorkerId, WorkerHost,
    WorkerState,
};
