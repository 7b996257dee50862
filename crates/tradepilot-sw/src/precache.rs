//! Install-time population of the current cache store.

use futures::future::try_join_all;
use http::Method;
use tracing::{debug, error, info};
use tradepilot_net::{Fetcher, Request};

use crate::cache::{CacheEntry, SharedCacheStorage};
use crate::config::{CacheVersion, WorkerConfig};
use crate::ServiceWorkerError;

/// Fetch every manifest URL and store the responses in the current store.
///
/// All-or-nothing: fetches run concurrently and the store is written in a
/// single batch only when every one of them returned a success status.
/// Returns the number of entries written.
pub async fn precache(
    config: &WorkerConfig,
    version: &CacheVersion,
    fetcher: &dyn Fetcher,
    caches: &SharedCacheStorage,
) -> Result<usize, ServiceWorkerError> {
    let cache_name = version.cache_name();
    info!(
        cache = %cache_name,
        urls = config.precache_manifest.len(),
        "Precaching shell resources"
    );

    let fetches = config.precache_manifest.iter().map(|path| async move {
        let url = config.resolve(path)?;
        let response = fetcher
            .fetch(&Request::get(url.clone()))
            .await
            .map_err(|e| ServiceWorkerError::Precache(format!("{url}: {e}")))?;

        if !response.ok() {
            return Err(ServiceWorkerError::Precache(format!(
                "{url}: status {}",
                response.status
            )));
        }

        debug!(url = %url, status = %response.status, "Precached");
        Ok::<_, ServiceWorkerError>(CacheEntry::from_response(&Method::GET, &url, &response))
    });

    let entries = match try_join_all(fetches).await {
        Ok(entries) => entries,
        Err(e) => {
            error!(cache = %cache_name, error = %e, "Precache failed, nothing stored");
            return Err(e);
        }
    };

    let count = entries.len();
    caches
        .write()
        .await
        .put_all(&cache_name, entries)
        .map_err(|e| {
            error!(cache = %cache_name, error = %e, "Precache write failed");
            ServiceWorkerError::Precache(e.to_string())
        })?;

    info!(cache = %cache_name, entries = count, "Precache complete");
    Ok(count)
}
