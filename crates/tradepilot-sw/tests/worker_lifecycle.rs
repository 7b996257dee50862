//! Install, activate and fetch behaviour of a worker generation.

mod support;

use http::{Method, StatusCode};
use support::{url, Harness, MockFetcher, ORIGIN};
use tradepilot_net::{Request, RequestMode, ResponseType, Url};
use tradepilot_sw::{
    CacheStorage, EventResponse, FetchDecision, LifecycleEvent, RegistrationEvent,
    ResponseSource, ServiceWorker, ServiceWorkerError, ServiceWorkerRegistration, WorkerState,
};

const SHELL: &[&str] = &["/", "/dashboard", "/manifest.json"];

async fn activated(harness: &Harness, manifest: &[&str]) -> ServiceWorker {
    let worker = harness.worker(Harness::config(manifest));
    worker.dispatch(LifecycleEvent::Install).await.unwrap();
    worker.dispatch(LifecycleEvent::Activate).await.unwrap();
    assert_eq!(worker.state(), WorkerState::Active);
    worker
}

async fn fetch(worker: &ServiceWorker, request: Request) -> Result<tradepilot_sw::FetchHandled, ServiceWorkerError> {
    match worker.dispatch(LifecycleEvent::Fetch(request)).await? {
        EventResponse::Fetch(handled) => Ok(handled),
        other => panic!("unexpected response {other:?}"),
    }
}

fn source(decision: &FetchDecision) -> ResponseSource {
    decision.response().expect("worker should respond").source
}

// ==================== Install ====================

#[tokio::test]
async fn install_caches_every_manifest_url() {
    let harness = Harness::new(MockFetcher::with_pages(SHELL));
    let worker = harness.worker(Harness::config(SHELL));

    let response = worker.dispatch(LifecycleEvent::Install).await.unwrap();
    assert!(matches!(response, EventResponse::Installed { entries: 3 }));
    assert_eq!(worker.state(), WorkerState::InstalledWaiting);

    let caches = harness.host.caches.read().await;
    let store = caches.get("tradepilot-ai-v1.0.0").unwrap();
    assert_eq!(store.len(), 3);
    for path in SHELL {
        assert!(
            store.match_request(&Method::GET, url(path).as_str()).is_some(),
            "{path} missing from store"
        );
    }
}

#[tokio::test]
async fn install_failure_stores_nothing() {
    let fetcher = MockFetcher::with_pages(&["/", "/dashboard"]);
    // "/manifest.json" has no route and answers 404.
    let harness = Harness::new(fetcher);
    let worker = harness.worker(Harness::config(SHELL));

    let err = worker.dispatch(LifecycleEvent::Install).await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::Precache(_)));
    assert_eq!(worker.state(), WorkerState::Uninstalled);
    assert!(!harness.host.caches.read().await.has("tradepilot-ai-v1.0.0"));
}

#[tokio::test]
async fn install_network_error_fails_install() {
    let fetcher = MockFetcher::with_pages(SHELL);
    fetcher.fail(url("/dashboard").as_str());
    let harness = Harness::new(fetcher);
    let worker = harness.worker(Harness::config(SHELL));

    assert!(worker.dispatch(LifecycleEvent::Install).await.is_err());
    assert!(harness.host.caches.read().await.keys().is_empty());
}

#[tokio::test]
async fn events_rejected_outside_their_states() {
    let harness = Harness::new(MockFetcher::with_pages(SHELL));
    let worker = harness.worker(Harness::config(SHELL));

    let err = worker.dispatch(LifecycleEvent::Activate).await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::State(_)));

    worker.dispatch(LifecycleEvent::Install).await.unwrap();
    let err = fetch(&worker, Request::get(url("/"))).await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::State(_)));

    let err = worker.dispatch(LifecycleEvent::Install).await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::State(_)));
}

// ==================== Activate ====================

#[tokio::test]
async fn activation_keeps_only_current_store() {
    let mut storage = CacheStorage::new();
    storage.open("tradepilot-ai-v0.9.0");
    storage.open("tradepilot-ai-v1.0.0");
    let harness = Harness::with_storage(MockFetcher::with_pages(SHELL), storage);

    let worker = harness.worker(Harness::config(SHELL));
    worker.dispatch(LifecycleEvent::Install).await.unwrap();
    let response = worker.dispatch(LifecycleEvent::Activate).await.unwrap();

    let EventResponse::Activated(report) = response else {
        panic!("expected activation report");
    };
    assert_eq!(report.deleted, vec!["tradepilot-ai-v0.9.0".to_string()]);
    assert_eq!(
        harness.host.caches.read().await.keys(),
        vec!["tradepilot-ai-v1.0.0"]
    );
}

// ==================== Fetch ====================

#[tokio::test]
async fn cache_hit_makes_no_network_call() {
    let harness = Harness::new(MockFetcher::with_pages(SHELL));
    let worker = activated(&harness, SHELL).await;
    harness.fetcher.reset_calls();

    let handled = fetch(&worker, Request::get(url("/dashboard"))).await.unwrap();

    assert_eq!(source(&handled.decision), ResponseSource::Cache);
    assert_eq!(harness.fetcher.calls(), 0);
}

#[tokio::test]
async fn same_origin_miss_becomes_hit() {
    let fetcher = MockFetcher::with_pages(SHELL);
    fetcher.route(url("/plans").as_str(), StatusCode::OK, ResponseType::Basic, "plans");
    let harness = Harness::new(fetcher);
    let worker = activated(&harness, SHELL).await;
    harness.fetcher.reset_calls();

    let first = fetch(&worker, Request::get(url("/plans"))).await.unwrap();
    assert_eq!(source(&first.decision), ResponseSource::Network);
    assert_eq!(first.lifetime.pending(), 1);
    first.lifetime.settled().await;

    let second = fetch(&worker, Request::get(url("/plans"))).await.unwrap();
    assert_eq!(source(&second.decision), ResponseSource::Cache);
    assert_eq!(harness.fetcher.calls(), 1);

    let caches = harness.host.caches.read().await;
    assert_eq!(caches.get("tradepilot-ai-v1.0.0").unwrap().len(), 4);
}

#[tokio::test]
async fn cross_origin_opaque_response_not_cached() {
    let api = "https://api.exchange.example/v1/ticker";
    let fetcher = MockFetcher::with_pages(SHELL);
    fetcher.route(api, StatusCode::OK, ResponseType::Opaque, "");
    let harness = Harness::new(fetcher);
    let worker = activated(&harness, SHELL).await;

    let request = Request::get(Url::parse(api).unwrap()).mode(RequestMode::NoCors);
    let handled = fetch(&worker, request).await.unwrap();
    let response = handled.decision.response().unwrap();
    assert_eq!(response.source, ResponseSource::Network);
    assert_eq!(response.response.response_type, ResponseType::Opaque);
    assert_eq!(handled.lifetime.pending(), 0);

    let caches = harness.host.caches.read().await;
    assert!(caches.match_request(&Method::GET, api).is_none());
}

#[tokio::test]
async fn error_status_not_cached() {
    let fetcher = MockFetcher::with_pages(SHELL);
    fetcher.route(url("/withdraw").as_str(), StatusCode::INTERNAL_SERVER_ERROR, ResponseType::Basic, "boom");
    let harness = Harness::new(fetcher);
    let worker = activated(&harness, SHELL).await;

    let handled = fetch(&worker, Request::get(url("/withdraw"))).await.unwrap();
    let response = handled.decision.response().unwrap();
    assert_eq!(response.response.status, StatusCode::INTERNAL_SERVER_ERROR);
    handled.lifetime.settled().await;

    let caches = harness.host.caches.read().await;
    assert!(caches.match_request(&Method::GET, url("/withdraw").as_str()).is_none());
}

#[tokio::test]
async fn non_get_and_internal_schemes_pass_through() {
    let harness = Harness::new(MockFetcher::with_pages(SHELL));
    let worker = activated(&harness, SHELL).await;
    harness.fetcher.reset_calls();

    let post = Request::post(url("/api/deposit"), "{\"amount\":100}".into());
    let handled = fetch(&worker, post).await.unwrap();
    assert!(matches!(handled.decision, FetchDecision::Passthrough));

    let extension = Request::get(Url::parse("chrome-extension://abcdef/inject.js").unwrap());
    let handled = fetch(&worker, extension).await.unwrap();
    assert!(matches!(handled.decision, FetchDecision::Passthrough));

    assert_eq!(harness.fetcher.calls(), 0);
}

#[tokio::test]
async fn offline_navigation_gets_shell() {
    let harness = Harness::new(MockFetcher::with_pages(SHELL));
    let worker = activated(&harness, SHELL).await;
    harness.fetcher.set_offline(true);

    let handled = fetch(&worker, Request::navigate(url("/deposit"))).await.unwrap();
    let response = handled.decision.response().unwrap();
    assert_eq!(response.source, ResponseSource::ShellFallback);
    assert_eq!(response.response.url.as_str(), format!("{ORIGIN}/"));
    assert_eq!(response.response.status, StatusCode::OK);
}

#[tokio::test]
async fn offline_subresource_fails() {
    let harness = Harness::new(MockFetcher::with_pages(SHELL));
    let worker = activated(&harness, SHELL).await;
    harness.fetcher.set_offline(true);

    let err = fetch(&worker, Request::get(url("/api/balances"))).await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::Network(_)));
}

#[tokio::test]
async fn offline_navigation_without_shell_fails() {
    let harness = Harness::new(MockFetcher::with_pages(&["/dashboard"]));
    let worker = activated(&harness, &["/dashboard"]).await;
    harness.fetcher.set_offline(true);

    let err = fetch(&worker, Request::navigate(url("/plans"))).await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::Network(_)));
}

#[tokio::test]
async fn concurrent_fetches_all_cache() {
    let fetcher = MockFetcher::with_pages(SHELL);
    let paths = ["/plans", "/deposit", "/withdraw", "/reviews"];
    for path in paths {
        fetcher.route(url(path).as_str(), StatusCode::OK, ResponseType::Basic, "page");
    }
    let harness = Harness::new(fetcher);
    let worker = activated(&harness, SHELL).await;

    let handled = futures::future::join_all(
        paths.iter().map(|p| fetch(&worker, Request::get(url(p)))),
    )
    .await;
    for result in handled {
        result.unwrap().lifetime.settled().await;
    }

    let caches = harness.host.caches.read().await;
    for path in paths {
        assert!(caches.match_request(&Method::GET, url(path).as_str()).is_some());
    }
}

#[tokio::test]
async fn quota_failure_never_reaches_caller() {
    let fetcher = MockFetcher::with_pages(&["/"]);
    fetcher.route(url("/plans").as_str(), StatusCode::OK, ResponseType::Basic, "plans page body");
    let shell_size = url("/").as_str().len() as u64 + "page".len() as u64;
    let storage = CacheStorage::new().with_quota(Some(shell_size));
    let harness = Harness::with_storage(fetcher, storage);

    let worker = harness.worker(Harness::config(&["/"]));
    worker.dispatch(LifecycleEvent::Install).await.unwrap();
    worker.dispatch(LifecycleEvent::Activate).await.unwrap();

    let handled = fetch(&worker, Request::get(url("/plans"))).await.unwrap();
    assert_eq!(source(&handled.decision), ResponseSource::Network);
    handled.lifetime.settled().await;

    let caches = harness.host.caches.read().await;
    assert!(caches.match_request(&Method::GET, url("/plans").as_str()).is_none());
}

// ==================== Registration ====================

#[tokio::test]
async fn failed_update_keeps_active_generation_serving() {
    let harness = Harness::new(MockFetcher::with_pages(SHELL));
    let (mut registration, mut events) = ServiceWorkerRegistration::new(url("/"));

    registration
        .update(harness.worker(Harness::config(SHELL)))
        .await
        .unwrap();
    registration.activate().await.unwrap();
    let v1 = registration.active().unwrap().id();

    harness.fetcher.set_offline(true);
    let next = harness.worker(Harness::config(SHELL).with_version("1.1.0"));
    assert!(registration.update(next).await.is_err());

    assert_eq!(registration.active().unwrap().id(), v1);
    assert!(registration.waiting().is_none());

    let handled = registration
        .handle_fetch(Request::navigate(url("/dashboard")))
        .await
        .unwrap();
    assert_eq!(source(&handled.decision), ResponseSource::Cache);

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RegistrationEvent::InstallFailed { .. }) {
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn version_bump_replaces_previous_generation() {
    let harness = Harness::new(MockFetcher::with_pages(SHELL));
    let (mut registration, _events) = ServiceWorkerRegistration::new(url("/"));

    registration
        .update(harness.worker(Harness::config(SHELL)))
        .await
        .unwrap();
    registration.activate().await.unwrap();

    registration
        .update(harness.worker(Harness::config(SHELL).with_version("1.1.0")))
        .await
        .unwrap();
    let report = registration.skip_waiting().await.unwrap();

    assert_eq!(report.deleted, vec!["tradepilot-ai-v1.0.0".to_string()]);
    assert_eq!(
        registration.active().unwrap().version().cache_name(),
        "tradepilot-ai-v1.1.0"
    );
    assert_eq!(
        harness.host.caches.read().await.keys(),
        vec!["tradepilot-ai-v1.1.0"]
    );
}

#[tokio::test]
async fn no_active_worker_passes_through() {
    let (registration, _events) = ServiceWorkerRegistration::new(url("/"));

    let handled = registration.handle_fetch(Request::get(url("/"))).await.unwrap();
    assert!(matches!(handled.decision, FetchDecision::Passthrough));
}

#[tokio::test]
async fn cached_generation_serves_after_failed_install() {
    let harness = Harness::new(MockFetcher::with_pages(SHELL));
    let (mut earlier, _events) = ServiceWorkerRegistration::new(url("/"));
    earlier
        .update(harness.worker(Harness::config(SHELL)))
        .await
        .unwrap();
    earlier.activate().await.unwrap();
    drop(earlier);

    // A fresh registration over the same storage, with the network gone.
    harness.fetcher.set_offline(true);
    let (mut registration, mut events) = ServiceWorkerRegistration::new(url("/"));
    assert!(registration
        .update(harness.worker(Harness::config(SHELL)))
        .await
        .is_err());
    assert!(harness.host.caches.read().await.has("tradepilot-ai-v1.0.0"));

    registration
        .adopt(harness.worker(Harness::config(SHELL)))
        .await
        .unwrap();
    assert_eq!(registration.active().unwrap().state(), WorkerState::Active);

    let handled = registration
        .handle_fetch(Request::navigate(url("/deposit")))
        .await
        .unwrap();
    assert_eq!(source(&handled.decision), ResponseSource::ShellFallback);

    let mut controller_changed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RegistrationEvent::ControllerChange { .. }) {
            controller_changed = true;
        }
    }
    assert!(controller_changed);
}

#[tokio::test]
async fn adopt_requires_current_store() {
    let mut storage = CacheStorage::new();
    storage.open("tradepilot-ai-v0.9.0");
    let harness = Harness::with_storage(MockFetcher::with_pages(SHELL), storage);
    let (mut registration, _events) = ServiceWorkerRegistration::new(url("/"));

    let err = registration
        .adopt(harness.worker(Harness::config(SHELL)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceWorkerError::NotFound(_)));
    assert!(registration.active().is_none());
}
