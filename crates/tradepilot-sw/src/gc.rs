//! Activation-time reclamation of superseded cache generations.

use tracing::{info, warn};

use crate::cache::SharedCacheStorage;
use crate::config::CacheVersion;

/// What a collection pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Stores that were deleted.
    pub deleted: Vec<String>,
    /// Stale stores that could not be deleted.
    pub failed: Vec<String>,
}

/// Delete every store whose name is not the current version.
///
/// Each deletion stands alone: a store that cannot be deleted is logged and
/// the pass moves on. Nothing is retried.
pub async fn collect_stale(caches: &SharedCacheStorage, current: &CacheVersion) -> GcReport {
    let stale: Vec<String> = caches
        .read()
        .await
        .keys()
        .into_iter()
        .filter(|name| !current.is_current(name))
        .map(str::to_string)
        .collect();

    let mut report = GcReport::default();
    for name in stale {
        // One write lock per store; fetch handlers interleave between deletions.
        let deleted = caches.write().await.delete(&name);
        if deleted {
            info!(cache = %name, "Deleted stale cache");
            report.deleted.push(name);
        } else {
            warn!(cache = %name, "Stale cache vanished before deletion");
            report.failed.push(name);
        }
    }

    report
}
