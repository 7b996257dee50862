//! Mock host services shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::StatusCode;
use tradepilot_net::{Fetcher, NetError, Request, Response, ResponseType, Url};
use tradepilot_sw::{
    CacheStorage, Clients, NotificationId, NotificationOptions, Notifier, ServiceWorker,
    ServiceWorkerError, WorkerConfig, WorkerHost,
};

pub const ORIGIN: &str = "https://app.tradepilot.ai";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
enum Route {
    Respond {
        status: StatusCode,
        response_type: ResponseType,
        body: &'static str,
    },
    Fail,
}

/// A network that answers from a route table and counts every call.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Same-origin 200 for each path.
    pub fn with_pages(paths: &[&str]) -> Arc<Self> {
        let fetcher = Self::new();
        for path in paths {
            fetcher.route(url(path).as_str(), StatusCode::OK, ResponseType::Basic, "page");
        }
        fetcher
    }

    pub fn route(&self, url: &str, status: StatusCode, response_type: ResponseType, body: &'static str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route::Respond {
                status,
                response_type,
                body,
            },
        );
    }

    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Fail);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("offline".to_string()));
        }

        let route = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
        match route {
            Some(Route::Respond {
                status,
                response_type,
                body,
            }) => Ok(Response::new(
                request.url.clone(),
                status,
                response_type,
                body.into(),
            )),
            Some(Route::Fail) => Err(NetError::RequestFailed("connection reset".to_string())),
            None => Ok(Response::basic(request.url.clone(), StatusCode::NOT_FOUND, "")),
        }
    }
}

/// A notification host that records what it was asked to do.
#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: Mutex<Vec<(String, NotificationOptions)>>,
    pub closed: Mutex<Vec<NotificationId>>,
    pub fail_display: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn bodies(&self) -> Vec<String> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .map(|(_, o)| o.body.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<NotificationId, ServiceWorkerError> {
        if self.fail_display.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::Notification("permission denied".to_string()));
        }
        self.shown.lock().unwrap().push((title.to_string(), options));
        Ok(NotificationId::new())
    }

    async fn close_notification(&self, id: NotificationId) {
        self.closed.lock().unwrap().push(id);
    }
}

pub struct Harness {
    pub fetcher: Arc<MockFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub host: WorkerHost,
}

impl Harness {
    pub fn new(fetcher: Arc<MockFetcher>) -> Self {
        Self::with_storage(fetcher, CacheStorage::new())
    }

    pub fn with_storage(fetcher: Arc<MockFetcher>, storage: CacheStorage) -> Self {
        init_tracing();
        let notifier = RecordingNotifier::new();
        let host = WorkerHost {
            fetcher: fetcher.clone(),
            notifier: notifier.clone(),
            caches: storage.into_shared(),
            clients: Clients::new().into_shared(),
        };
        Self {
            fetcher,
            notifier,
            host,
        }
    }

    pub fn config(manifest: &[&str]) -> WorkerConfig {
        WorkerConfig::new()
            .with_origin(Url::parse(ORIGIN).unwrap())
            .with_manifest(manifest.iter().copied())
    }

    pub fn worker(&self, config: WorkerConfig) -> ServiceWorker {
        ServiceWorker::new(config, self.host.clone()).unwrap()
    }
}
