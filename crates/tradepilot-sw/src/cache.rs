//! Cache storage: named stores of request/response snapshots.
//!
//! ```text
//! CacheStorage (caches)
//!     └── Cache (tradepilot-ai-v1.0.0)
//!             └── GET url → CacheEntry
//! ```

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use tradepilot_net::{Response, ResponseType};
use url::Url;

use crate::ServiceWorkerError;

/// Cache storage shared between concurrently running event handlers.
pub type SharedCacheStorage = Arc<RwLock<CacheStorage>>;

fn cache_key(method: &Method, url: &str) -> String {
    format!("{} {}", method, url)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ==================== Cache Entry ====================

/// A cached request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: Vec<(String, String)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response for the given request method and URL.
    pub fn from_response(method: &Method, url: &Url, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| match value.to_str() {
                Ok(v) => Some((name.as_str().to_string(), v.to_string())),
                Err(_) => {
                    debug!(url = %url, header = %name, "Dropping non-text header from cache entry");
                    None
                }
            })
            .collect();

        Self {
            url: url.to_string(),
            method: method.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body().to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild a response from this snapshot.
    pub fn to_response(&self) -> Result<Response, ServiceWorkerError> {
        let url = Url::parse(&self.url)
            .map_err(|e| ServiceWorkerError::Cache(format!("corrupt entry url: {e}")))?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| ServiceWorkerError::Cache(format!("corrupt entry status: {e}")))?;

        let mut response = Response::new(
            url,
            status,
            ResponseType::Basic,
            Bytes::from(self.body.clone()),
        );
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                response = response.with_header(n, v);
            }
        }
        Ok(response)
    }

    /// Approximate storage footprint.
    pub fn size_bytes(&self) -> u64 {
        let headers: usize = self.headers.iter().map(|(n, v)| n.len() + v.len()).sum();
        (self.url.len() + headers + self.body.len()) as u64
    }

    fn key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

// ==================== Cache ====================

/// A named cache store.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries, keyed by method and URL.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, method: &Method, url: &str) -> Option<&CacheEntry> {
        self.entries.get(&cache_key(method, url))
    }

    /// Add or replace an entry.
    pub fn put(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(entry.key(), entry)
    }

    /// Delete entry.
    pub fn delete(&mut self, method: &Method, url: &str) -> bool {
        self.entries.remove(&cache_key(method, url)).is_some()
    }

    /// Get all cached URLs.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.values().map(|e| e.url.as_str()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Storage used by this cache.
    pub fn size_bytes(&self) -> u64 {
        self.entries.values().map(CacheEntry::size_bytes).sum()
    }
}

// ==================== Cache Storage ====================

/// Cache storage (`caches` global).
///
/// Stores are kept in creation order; cross-store matches search them in
/// that order.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
    order: Vec<String>,
    #[serde(skip)]
    quota_bytes: Option<u64>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total bytes the storage may hold.
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Wrap for sharing between handlers.
    pub fn into_shared(self) -> SharedCacheStorage {
        Arc::new(RwLock::new(self))
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        if !self.caches.contains_key(name) {
            debug!(cache = name, "Creating cache store");
            self.order.push(name.to_string());
        }
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.order.retain(|n| n != name);
        self.caches.remove(name).is_some()
    }

    /// Get all cache names in creation order.
    pub fn keys(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Match across all caches.
    pub fn match_request(&self, method: &Method, url: &str) -> Option<&CacheEntry> {
        self.order
            .iter()
            .filter_map(|name| self.caches.get(name))
            .find_map(|cache| cache.match_request(method, url))
    }

    /// Total bytes stored.
    pub fn usage_bytes(&self) -> u64 {
        self.caches.values().map(Cache::size_bytes).sum()
    }

    /// Store one entry in the named cache, creating the cache if needed.
    pub fn put(&mut self, cache_name: &str, entry: CacheEntry) -> Result<(), ServiceWorkerError> {
        self.put_all(cache_name, vec![entry])
    }

    /// Store a batch of entries in the named cache.
    ///
    /// The batch is checked against the quota as a whole; either every entry
    /// is written or none is.
    pub fn put_all(
        &mut self,
        cache_name: &str,
        entries: Vec<CacheEntry>,
    ) -> Result<(), ServiceWorkerError> {
        if let Some(quota) = self.quota_bytes {
            let existing = self.caches.get(cache_name);
            let replaced: u64 = entries
                .iter()
                .filter_map(|e| existing.and_then(|c| c.entries.get(&e.key())))
                .map(CacheEntry::size_bytes)
                .sum();
            let added: u64 = entries.iter().map(CacheEntry::size_bytes).sum();
            let usage = self.usage_bytes().saturating_sub(replaced);

            if usage + added > quota {
                return Err(ServiceWorkerError::QuotaExceeded {
                    needed: added,
                    available: quota.saturating_sub(usage),
                });
            }
        }

        let cache = self.open(cache_name);
        for entry in entries {
            cache.put(entry);
        }
        Ok(())
    }

    /// Write a JSON snapshot of every store to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ServiceWorkerError> {
        let tmp = path.with_extension("tmp");
        let tmp_err = |e: std::io::Error| ServiceWorkerError::Cache(format!("{}: {e}", tmp.display()));

        let mut writer = BufWriter::new(fs::File::create(&tmp).map_err(tmp_err)?);
        serde_json::to_writer(&mut writer, self)
            .map_err(|e| ServiceWorkerError::Cache(e.to_string()))?;
        // The snapshot must be fully on disk before it replaces the old one.
        writer.flush().map_err(tmp_err)?;
        writer.get_ref().sync_all().map_err(tmp_err)?;
        drop(writer);

        fs::rename(&tmp, path)
            .map_err(|e| ServiceWorkerError::Cache(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), caches = self.order.len(), "Cache storage saved");
        Ok(())
    }

    /// Load a snapshot written by [`CacheStorage::save`].
    ///
    /// A missing file yields empty storage.
    pub fn load(path: &Path, quota_bytes: Option<u64>) -> Result<Self, ServiceWorkerError> {
        let storage = match fs::File::open(path) {
            Ok(file) => serde_json::from_reader::<_, Self>(BufReader::new(file))
                .map_err(|e| ServiceWorkerError::Cache(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::new(),
            Err(e) => {
                return Err(ServiceWorkerError::Cache(format!("{}: {e}", path.display())));
            }
        };

        debug!(path = %path.display(), caches = storage.order.len(), "Cache storage loaded");
        Ok(storage.with_quota(quota_bytes))
    }
}
