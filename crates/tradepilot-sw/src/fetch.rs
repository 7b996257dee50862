//! Per-request arbitration between cache and network.
//!
//! Policy, in order:
//!
//! 1. Non-GET requests and non-http(s) schemes pass through untouched.
//! 2. A hit in any store answers immediately, with no network call.
//! 3. A miss goes to the network; a `200` same-origin response is cloned
//!    into the current store in the background.
//! 4. Cross-origin and non-`200` responses are returned as-is, uncached.
//! 5. If the network fails, navigations get the cached shell document;
//!    everything else fails.

use std::sync::Arc;

use http::{Method, StatusCode};
use tracing::{debug, trace, warn};
use tradepilot_net::{Fetcher, Request, Response};

use crate::cache::{CacheEntry, SharedCacheStorage};
use crate::config::WorkerConfig;
use crate::lifetime::ExtendLifetime;
use crate::ServiceWorkerError;

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// A cache store.
    Cache,
    /// The network.
    Network,
    /// The cached shell document, served to an offline navigation.
    ShellFallback,
}

/// Intercepted response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub response: Response,
    pub source: ResponseSource,
}

/// What the worker decided to do with a request.
#[derive(Debug)]
pub enum FetchDecision {
    /// Not handled; the host performs the request itself.
    Passthrough,
    /// Answered by the worker.
    Respond(FetchResponse),
}

impl FetchDecision {
    /// The response, if the worker answered.
    pub fn response(&self) -> Option<&FetchResponse> {
        match self {
            FetchDecision::Passthrough => None,
            FetchDecision::Respond(r) => Some(r),
        }
    }
}

/// A handled fetch event.
#[derive(Debug)]
pub struct FetchHandled {
    pub decision: FetchDecision,
    /// Background cache writes started by this event.
    pub lifetime: ExtendLifetime,
}

impl FetchHandled {
    fn respond(response: Response, source: ResponseSource, lifetime: ExtendLifetime) -> Self {
        Self {
            decision: FetchDecision::Respond(FetchResponse { response, source }),
            lifetime,
        }
    }
}

/// Whether a request is outside the worker's concern.
pub fn should_bypass(request: &Request) -> bool {
    request.method != Method::GET || !matches!(request.url.scheme(), "http" | "https")
}

/// Whether a network response may be written to the runtime cache.
pub fn is_cacheable(response: &Response) -> bool {
    response.status == StatusCode::OK && response.is_basic()
}

/// Cache-first fetch handler.
pub struct FetchInterceptor {
    config: Arc<WorkerConfig>,
    cache_name: String,
    fetcher: Arc<dyn Fetcher>,
    caches: SharedCacheStorage,
}

impl FetchInterceptor {
    /// Create an interceptor writing into `cache_name`.
    pub fn new(
        config: Arc<WorkerConfig>,
        cache_name: String,
        fetcher: Arc<dyn Fetcher>,
        caches: SharedCacheStorage,
    ) -> Self {
        Self {
            config,
            cache_name,
            fetcher,
            caches,
        }
    }

    /// Handle one intercepted request.
    pub async fn handle(&self, request: Request) -> Result<FetchHandled, ServiceWorkerError> {
        let mut lifetime = ExtendLifetime::new();

        if should_bypass(&request) {
            trace!(url = %request.url, method = %request.method, "Bypassing worker");
            return Ok(FetchHandled {
                decision: FetchDecision::Passthrough,
                lifetime,
            });
        }

        if let Some(cached) = self.lookup(&request).await {
            trace!(url = %request.url, "Cache hit");
            return Ok(FetchHandled::respond(cached, ResponseSource::Cache, lifetime));
        }

        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                if is_cacheable(&response) {
                    self.store_in_background(&request, &response, &mut lifetime);
                } else {
                    debug!(
                        url = %request.url,
                        status = %response.status,
                        response_type = response.response_type.as_str(),
                        "Not caching response"
                    );
                }
                Ok(FetchHandled::respond(response, ResponseSource::Network, lifetime))
            }
            Err(e) if request.is_navigation() => {
                warn!(url = %request.url, error = %e, "Navigation failed, serving shell");
                match self.shell().await {
                    Some(shell) => Ok(FetchHandled::respond(
                        shell,
                        ResponseSource::ShellFallback,
                        lifetime,
                    )),
                    None => Err(e.into()),
                }
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Fetch failed");
                Err(e.into())
            }
        }
    }

    async fn lookup(&self, request: &Request) -> Option<Response> {
        let caches = self.caches.read().await;
        let entry = caches.match_request(&request.method, request.url.as_str())?;
        match entry.to_response() {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    async fn shell(&self) -> Option<Response> {
        let url = self.config.shell_url().ok()?;
        self.lookup(&Request::navigate(url)).await
    }

    /// Snapshot the response now and write it once the caller has it.
    fn store_in_background(
        &self,
        request: &Request,
        response: &Response,
        lifetime: &mut ExtendLifetime,
    ) {
        let entry = CacheEntry::from_response(&request.method, &request.url, response);
        let caches = self.caches.clone();
        let cache_name = self.cache_name.clone();

        lifetime.wait_until(async move {
            let url = entry.url.clone();
            match caches.write().await.put(&cache_name, entry) {
                Ok(()) => debug!(cache = %cache_name, url = %url, "Runtime cached"),
                Err(e) => warn!(cache = %cache_name, url = %url, error = %e, "Runtime cache write failed"),
            }
        });
    }
}
