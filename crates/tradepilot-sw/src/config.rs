//! Worker configuration and the cache version registry.
//!
//! A [`WorkerConfig`] is built (or deserialized) once, validated when the
//! worker is constructed, and then shared read-only behind an `Arc`. The
//! [`CacheVersion`] derived from it is the single name of the current cache
//! generation; every other store name is stale.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ServiceWorkerError;

/// Shell resources cached at install time.
pub const PRECACHE_MANIFEST: &[&str] = &[
    "/",
    "/dashboard",
    "/plans",
    "/deposit",
    "/withdraw",
    "/logo.png",
    "/manifest.json",
];

/// Body used when a push message carries no readable text.
pub const DEFAULT_PUSH_BODY: &str = "New trading opportunity available!";

/// Tag of the sync registration the worker acknowledges.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

// ==================== Cache Version ====================

/// Name of a cache generation: `<product>-v<semver>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheVersion {
    product: String,
    version: semver::Version,
}

impl CacheVersion {
    /// Build a version from a product slug and a semantic version string.
    ///
    /// A leading `v` on the version is accepted.
    pub fn new(product: &str, version: &str) -> Result<Self, ServiceWorkerError> {
        if product.is_empty() || product.chars().any(char::is_whitespace) {
            return Err(ServiceWorkerError::Config(format!(
                "invalid product slug '{product}'"
            )));
        }

        let raw = version.strip_prefix('v').unwrap_or(version);
        let version = semver::Version::parse(raw).map_err(|e| {
            ServiceWorkerError::Config(format!("invalid cache version '{version}': {e}"))
        })?;

        Ok(Self {
            product: product.to_string(),
            version,
        })
    }

    /// The product slug.
    pub fn product(&self) -> &str {
        &self.product
    }

    /// The semantic version.
    pub fn version(&self) -> &semver::Version {
        &self.version
    }

    /// The cache store name for this generation.
    pub fn cache_name(&self) -> String {
        self.to_string()
    }

    /// Whether `name` is exactly this generation's store name.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.cache_name()
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-v{}", self.product, self.version)
    }
}

// ==================== Notification Defaults ====================

/// Fixed presentation attached to every push notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    /// Notification title.
    pub title: String,
    /// Body used when the push payload has no text.
    pub default_body: String,
    /// Icon asset.
    pub icon: String,
    /// Badge asset.
    pub badge: String,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "TradePilot AI".to_string(),
            default_body: DEFAULT_PUSH_BODY.to_string(),
            icon: "/logo.png".to_string(),
            badge: "/logo.png".to_string(),
            vibrate: vec![100, 50, 100],
        }
    }
}

// ==================== Worker Config ====================

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Product slug used in cache names.
    pub product: String,

    /// Semantic version of the cache generation.
    pub version: String,

    /// Origin the dashboard is served from.
    pub origin: Url,

    /// Shell URLs cached on install. Fixed at build time.
    #[serde(skip, default = "default_manifest")]
    pub precache_manifest: Vec<String>,

    /// Document served to offline navigations.
    pub shell_root: String,

    /// Route opened by the `explore` notification action.
    pub dashboard_route: String,

    /// Notification presentation.
    pub notifications: NotificationDefaults,

    /// Sync tag acknowledged by the sync stub.
    pub sync_tag: String,

    /// Optional byte quota for cache storage.
    pub cache_quota_bytes: Option<u64>,
}

fn default_manifest() -> Vec<String> {
    PRECACHE_MANIFEST.iter().map(|s| s.to_string()).collect()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            product: "tradepilot-ai".to_string(),
            version: "1.0.0".to_string(),
            origin: Url::parse("http://localhost:3000").expect("static origin parses"),
            precache_manifest: default_manifest(),
            shell_root: "/".to_string(),
            dashboard_route: "/dashboard".to_string(),
            notifications: NotificationDefaults::default(),
            sync_tag: BACKGROUND_SYNC_TAG.to_string(),
            cache_quota_bytes: None,
        }
    }
}

impl WorkerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the origin.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = origin;
        self
    }

    /// Replace the precache manifest.
    pub fn with_manifest<I, S>(mut self, manifest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache_manifest = manifest.into_iter().map(Into::into).collect();
        self
    }

    /// Set a cache storage quota.
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.cache_quota_bytes = Some(bytes);
        self
    }

    /// Check the configuration and derive the current cache version.
    pub fn validate(&self) -> Result<CacheVersion, ServiceWorkerError> {
        let version = CacheVersion::new(&self.product, &self.version)?;

        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(ServiceWorkerError::Config(format!(
                "origin must be http(s), got '{}'",
                self.origin
            )));
        }

        for path in self
            .precache_manifest
            .iter()
            .chain([&self.shell_root, &self.dashboard_route])
        {
            self.resolve(path)?;
        }

        Ok(version)
    }

    /// Resolve a path or URL against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, ServiceWorkerError> {
        self.origin
            .join(path)
            .map_err(|e| ServiceWorkerError::Config(format!("cannot resolve '{path}': {e}")))
    }

    /// Absolute URL of the offline shell document.
    pub fn shell_url(&self) -> Result<Url, ServiceWorkerError> {
        self.resolve(&self.shell_root)
    }

    /// Absolute URL of the dashboard route.
    pub fn dashboard_url(&self) -> Result<Url, ServiceWorkerError> {
        self.resolve(&self.dashboard_route)
    }
}
