//! TTL-based staleness checks

use crate::error::{CacheError, Result};
use std::path::Path;
use std::time::SystemTime;
use tokio::fs;

/// Whether an entry modified at `modified` is stale at `now`.
///
/// Elapsed time is truncated to whole seconds and compared strictly, so an
/// entry is still fresh at exactly `ttl_secs`. A TTL of `None` or zero never
/// expires. Modification times in the future count as zero elapsed.
pub fn is_stale(modified: SystemTime, now: SystemTime, ttl_secs: Option<u64>) -> bool {
    let ttl = match ttl_secs {
        Some(ttl) if ttl > 0 => ttl,
        _ => return false,
    };

    let elapsed = now
        .duration_since(modified)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    elapsed > ttl
}

/// Check an entry on disk against a TTL.
///
/// Without a TTL this never touches the filesystem.
pub async fn is_expired(path: &Path, ttl_secs: Option<u64>) -> Result<bool> {
    if !matches!(ttl_secs, Some(ttl) if ttl > 0) {
        return Ok(false);
    }

    let meta = fs::metadata(path)
        .await
        .map_err(|e| CacheError::from_io(path, e))?;
    let modified = meta.modified().map_err(|e| CacheError::storage(path, e))?;

    Ok(is_stale(modified, SystemTime::now(), ttl_secs))
}
