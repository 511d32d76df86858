//! Lifecycle hooks: read-through and write-through caching of results and sources

use crate::config::CacheConfig;
use crate::context::{http_date, RequestContext, LAST_MODIFIED};
use crate::error::{CacheError, Result};
use crate::expiration::{is_expired, is_stale};
use crate::hasher::digest;
use crate::paths::PathResolver;
use crate::store::{is_temp_path, AtomicFileStore};
use crate::types::{CacheStats, EntryInfo, EntryKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

/// Extension points fired by the image pipeline, in this order.
///
/// Hooks never fail: anything that goes wrong is logged and the request
/// carries on as if the cache were empty.
#[async_trait]
pub trait CachePlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Request arguments are parsed; a plugin may fill `transformed_image`
    async fn after_parsing_arguments(&self, _ctx: &mut RequestContext) {}

    /// Source is about to be fetched; a plugin may fill `source_image`
    async fn before_loading_source_image(&self, _ctx: &mut RequestContext) {}

    /// Source image was obtained, by fetch or by an earlier hook
    async fn after_loading_source_image(&self, _ctx: &mut RequestContext) {}

    /// Response is complete and `status_code` is set
    async fn after_finish_request(&self, _ctx: &mut RequestContext) {}
}

/// Filesystem-backed result and source cache
pub struct FileStorage {
    config: CacheConfig,
    resolver: PathResolver,
    store: AtomicFileStore,
    result_hits: AtomicU64,
    result_misses: AtomicU64,
    source_hits: AtomicU64,
    source_misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

impl FileStorage {
    pub fn new(config: CacheConfig) -> Self {
        let resolver = PathResolver::new(config.storage_root.clone());
        Self {
            config,
            resolver,
            store: AtomicFileStore::new(),
            result_hits: AtomicU64::new(0),
            result_misses: AtomicU64::new(0),
            source_hits: AtomicU64::new(0),
            source_misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Create the storage root if it is missing
    pub async fn init(&self) -> Result<()> {
        self.store.ensure_dir(self.resolver.root()).await?;
        info!(storage_root = ?self.resolver.root(), "File storage initialized");
        Ok(())
    }

    /// Whether result entries may be used for this request
    pub fn should_store(&self, ctx: &RequestContext) -> bool {
        self.config.stores_unsafe || !ctx.is_unsafe
    }

    /// Resolve a key to its entry path, rejecting paths outside the root
    pub async fn locate(&self, key: &str) -> Result<PathBuf> {
        let path = self.resolver.resolve(key);
        if !self.resolver.is_within_root(&path).await {
            return Err(CacheError::Validation(path));
        }
        Ok(path)
    }

    /// Read a fresh result entry with its modification time
    pub async fn read_result(&self, url: &str) -> Result<(Vec<u8>, SystemTime)> {
        let path = self.locate(url).await?;
        if !self.store.exists(&path).await {
            return Err(CacheError::Miss(path));
        }
        if is_expired(&path, self.config.effective_result_ttl()).await? {
            debug!(path = ?path, "Result entry expired");
            return Err(CacheError::Miss(path));
        }

        let data = self.store.read(&path).await?;
        let modified = self.store.modified(&path).await?;
        Ok((data, modified))
    }

    /// Read a source entry. Sources do not expire.
    pub async fn read_source(&self, image_url: &str) -> Result<Vec<u8>> {
        let path = self.locate(image_url).await?;
        if !self.store.exists(&path).await {
            return Err(CacheError::Miss(path));
        }
        self.store.read(&path).await
    }

    /// Atomically store `data` under `key`
    pub async fn write_entry(&self, key: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.locate(key).await?;
        self.store.write(&path, data).await?;
        Ok(path)
    }

    /// Describe the entry for a key without serving it
    pub async fn inspect(&self, kind: EntryKind, key: &str) -> EntryInfo {
        let path = self.resolver.resolve(key);
        let within_root = self.resolver.is_within_root(&path).await;
        let meta = fs::metadata(&path)
            .await
            .ok()
            .filter(|m| m.is_file() && !is_temp_path(&path));
        let modified = meta.as_ref().and_then(|m| m.modified().ok());

        let ttl = match kind {
            EntryKind::Result => self.config.effective_result_ttl(),
            EntryKind::Source => None,
        };
        let expired = modified
            .map(|m| is_stale(m, SystemTime::now(), ttl))
            .unwrap_or(false);

        EntryInfo {
            key: key.to_string(),
            kind,
            digest: digest(key),
            path,
            within_root,
            exists: meta.is_some(),
            size: meta.as_ref().map(|m| m.len()),
            modified: modified.map(DateTime::<Utc>::from),
            expired,
        }
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            result_hits: self.result_hits.load(Ordering::Relaxed),
            result_misses: self.result_misses.load(Ordering::Relaxed),
            source_hits: self.source_hits.load(Ordering::Relaxed),
            source_misses: self.source_misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    async fn persist(&self, kind: EntryKind, key: &str, data: &[u8]) {
        match self.write_entry(key, data).await {
            Ok(path) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                debug!(%kind, key, path = ?path, size = data.len(), "Stored cache entry");
            }
            Err(e) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                // Continue without the cached copy
                warn!(%kind, key, error = %e, "Failed to store cache entry");
            }
        }
    }
}

fn log_miss(kind: EntryKind, key: &str, err: &CacheError) {
    match err {
        CacheError::Miss(_) => debug!(%kind, key, "Cache miss"),
        CacheError::Validation(path) => {
            warn!(%kind, key, path = ?path, "Cache path outside storage root, treating as miss")
        }
        CacheError::Storage { .. } => {
            warn!(%kind, key, error = %err, "Failed to read cache entry, treating as miss")
        }
    }
}

#[async_trait]
impl CachePlugin for FileStorage {
    fn name(&self) -> &'static str {
        "file-storage"
    }

    async fn after_parsing_arguments(&self, ctx: &mut RequestContext) {
        if !self.should_store(ctx) {
            debug!(url = %ctx.url, "Unsafe request, skipping result cache");
            return;
        }

        match self.read_result(&ctx.url).await {
            Ok((data, modified)) => {
                self.result_hits.fetch_add(1, Ordering::Relaxed);
                debug!(url = %ctx.url, size = data.len(), "Result cache hit");
                ctx.transformed_image = Some(data);
                ctx.result_from_cache = true;
                ctx.headers
                    .insert(LAST_MODIFIED.to_string(), http_date(modified));
            }
            Err(e) => {
                self.result_misses.fetch_add(1, Ordering::Relaxed);
                log_miss(EntryKind::Result, &ctx.url, &e);
            }
        }
    }

    async fn before_loading_source_image(&self, ctx: &mut RequestContext) {
        match self.read_source(&ctx.image_url).await {
            Ok(data) => {
                self.source_hits.fetch_add(1, Ordering::Relaxed);
                debug!(image_url = %ctx.image_url, size = data.len(), "Source cache hit");
                ctx.source_image = Some(data);
            }
            Err(e) => {
                self.source_misses.fetch_add(1, Ordering::Relaxed);
                log_miss(EntryKind::Source, &ctx.image_url, &e);
            }
        }
    }

    async fn after_loading_source_image(&self, ctx: &mut RequestContext) {
        let Some(image) = ctx.source_image.as_deref() else {
            return;
        };
        self.persist(EntryKind::Source, &ctx.image_url, image).await;
    }

    async fn after_finish_request(&self, ctx: &mut RequestContext) {
        if !ctx.succeeded() || ctx.result_from_cache {
            return;
        }
        let Some(image) = ctx.transformed_image.as_deref() else {
            return;
        };
        if !self.should_store(ctx) {
            return;
        }
        self.persist(EntryKind::Result, &ctx.url, image).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::temp_path;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn storage(root: &Path) -> FileStorage {
        FileStorage::new(CacheConfig::new(root).with_result_ttl(60))
    }

    fn backdate(path: &Path, secs: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs))
            .unwrap();
    }

    fn finished(url: &str, image: &[u8]) -> RequestContext {
        let mut ctx = RequestContext::new(url, "https://x/source.png");
        ctx.status_code = Some(200);
        ctx.transformed_image = Some(image.to_vec());
        ctx
    }

    #[tokio::test]
    async fn test_init_creates_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("storage");
        let cache = storage(&root);

        cache.init().await.unwrap();
        cache.init().await.unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_result_miss_leaves_context_untouched() {
        let dir = tempdir().unwrap();
        let cache = storage(dir.path());
        let mut ctx = RequestContext::new("https://x/img.png", "https://x/src.png");

        cache.after_parsing_arguments(&mut ctx).await;

        assert!(ctx.transformed_image.is_none());
        assert!(ctx.headers.is_empty());
        assert_eq!(cache.stats().result_misses, 1);
    }

    #[tokio::test]
    async fn test_result_write_then_hit() {
        let dir = tempdir().unwrap();
        let cache = storage(dir.path());

        cache
            .after_finish_request(&mut finished("https://x/img.png", b"png bytes"))
            .await;

        let mut ctx = RequestContext::new("https://x/img.png", "https://x/src.png");
        cache.after_parsing_arguments(&mut ctx).await;

        assert_eq!(ctx.transformed_image.as_deref(), Some(&b"png bytes"[..]));
        assert!(ctx.result_from_cache);
        let last_modified = ctx.header(LAST_MODIFIED).unwrap();
        assert!(DateTime::parse_from_rfc2822(last_modified).is_ok());

        let stats = cache.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.result_hits, 1);
    }

    #[tokio::test]
    async fn test_result_expired_is_miss() {
        let dir = tempdir().unwrap();
        let cache = storage(dir.path());
        let path = cache
            .write_entry("https://x/img.png", b"old")
            .await
            .unwrap();
        backdate(&path, 61);

        let mut ctx = RequestContext::new("https://x/img.png", "");
        cache.after_parsing_arguments(&mut ctx).await;

        assert!(ctx.transformed_image.is_none());
        assert!(!ctx.result_from_cache);
    }

    #[tokio::test]
    async fn test_result_without_ttl_never_expires() {
        let dir = tempdir().unwrap();
        let cache = FileStorage::new(CacheConfig::new(dir.path()));
        let path = cache
            .write_entry("https://x/img.png", b"old")
            .await
            .unwrap();
        backdate(&path, 365 * 24 * 60 * 60);

        let mut ctx = RequestContext::new("https://x/img.png", "");
        cache.after_parsing_arguments(&mut ctx).await;

        assert_eq!(ctx.transformed_image.as_deref(), Some(&b"old"[..]));
    }

    #[tokio::test]
    async fn test_unsafe_request_gated() {
        let dir = tempdir().unwrap();
        let cache = storage(dir.path());
        cache
            .write_entry("https://x/img.png", b"cached")
            .await
            .unwrap();

        let mut ctx = RequestContext::new("https://x/img.png", "").with_unsafe(true);
        cache.after_parsing_arguments(&mut ctx).await;
        assert!(ctx.transformed_image.is_none());

        let mut done = finished("https://x/other.png", b"fresh").with_unsafe(true);
        cache.after_finish_request(&mut done).await;
        assert!(!cache
            .resolver()
            .resolve("https://x/other.png")
            .exists());
    }

    #[tokio::test]
    async fn test_unsafe_request_allowed_by_config() {
        let dir = tempdir().unwrap();
        let cache = FileStorage::new(CacheConfig::new(dir.path()).with_stores_unsafe(true));

        let mut done = finished("https://x/img.png", b"fresh").with_unsafe(true);
        cache.after_finish_request(&mut done).await;

        let mut ctx = RequestContext::new("https://x/img.png", "").with_unsafe(true);
        cache.after_parsing_arguments(&mut ctx).await;
        assert_eq!(ctx.transformed_image.as_deref(), Some(&b"fresh"[..]));
    }

    #[tokio::test]
    async fn test_result_write_requires_success_and_image() {
        let dir = tempdir().unwrap();
        let cache = storage(dir.path());

        let mut failed = finished("https://x/a.png", b"error page");
        failed.status_code = Some(500);
        cache.after_finish_request(&mut failed).await;

        let mut empty = RequestContext::new("https://x/b.png", "");
        empty.status_code = Some(200);
        cache.after_finish_request(&mut empty).await;

        assert_eq!(cache.stats().writes, 0);
        assert!(!cache.resolver().resolve("https://x/a.png").exists());
        assert!(!cache.resolver().resolve("https://x/b.png").exists());
    }

    #[tokio::test]
    async fn test_result_served_from_cache_not_rewritten() {
        let dir = tempdir().unwrap();
        let cache = storage(dir.path());
        let path = cache
            .write_entry("https://x/img.png", b"cached")
            .await
            .unwrap();
        backdate(&path, 30);
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();

        let mut ctx = RequestContext::new("https://x/img.png", "");
        cache.after_parsing_arguments(&mut ctx).await;
        ctx.status_code = Some(200);
        cache.after_finish_request(&mut ctx).await;

        let after = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(before, after);
        assert_eq!(cache.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_source_write_then_hit_ignores_ttl() {
        let dir = tempdir().unwrap();
        let cache = storage(dir.path());

        let mut ctx = RequestContext::new("", "https://x/source.jpg");
        cache.before_loading_source_image(&mut ctx).await;
        assert!(ctx.source_image.is_none());

        ctx.source_image = Some(b"jpeg bytes".to_vec());
        cache.after_loading_source_image(&mut ctx).await;

        let path = cache.resolver().resolve("https://x/source.jpg");
        backdate(&path, 3600);

        let mut next = RequestContext::new("", "https://x/source.jpg");
        cache.before_loading_source_image(&mut next).await;
        assert_eq!(next.source_image.as_deref(), Some(&b"jpeg bytes"[..]));

        let stats = cache.stats();
        assert_eq!(stats.source_misses, 1);
        assert_eq!(stats.source_hits, 1);
    }

    #[tokio::test]
    async fn test_temp_file_next_to_missing_entry_is_miss() {
        let dir = tempdir().unwrap();
        let cache = storage(dir.path());
        let entry = cache.resolver().resolve("https://x/t");
        let temp = temp_path(&entry);
        std::fs::create_dir_all(entry.parent().unwrap()).unwrap();
        std::fs::write(&temp, b"partial").unwrap();

        let mut ctx = RequestContext::new("https://x/t", "https://x/t");
        cache.after_parsing_arguments(&mut ctx).await;
        cache.before_loading_source_image(&mut ctx).await;

        assert!(ctx.transformed_image.is_none());
        assert!(ctx.source_image.is_none());
        let stats = cache.stats();
        assert_eq!(stats.result_misses, 1);
        assert_eq!(stats.source_misses, 1);
        assert!(!cache.inspect(EntryKind::Result, "https://x/t").await.exists);
    }

    #[tokio::test]
    async fn test_source_write_skipped_without_image() {
        let dir = tempdir().unwrap();
        let cache = storage(dir.path());

        let mut ctx = RequestContext::new("", "https://x/source.jpg");
        cache.after_loading_source_image(&mut ctx).await;

        assert_eq!(cache.stats().writes, 0);
        assert!(!cache.resolver().resolve("https://x/source.jpg").exists());
    }

    #[tokio::test]
    async fn test_write_failure_is_not_fatal() {
        let dir = tempdir().unwrap();
        let cache = storage(dir.path());
        let path = cache.resolver().resolve("https://x/img.png");
        // A file where the shard directory should be
        std::fs::write(path.parent().unwrap(), b"blocker").unwrap();

        cache
            .after_finish_request(&mut finished("https://x/img.png", b"png"))
            .await;

        let stats = cache.stats();
        assert_eq!(stats.writes, 0);
        assert_eq!(stats.write_failures, 1);
    }

    /// Find a key whose digest lands in the given shard
    fn key_in_shard(shard: &str) -> String {
        (0..)
            .map(|i| format!("https://x/probe-{}.png", i))
            .find(|key| digest(key).starts_with(shard))
            .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_escaping_path_treated_as_miss() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("storage");
        let outside = dir.path().join("outside");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("ab")).unwrap();

        let cache = storage(&root);
        let key = key_in_shard("ab");
        let name = cache.resolver().resolve(&key);
        let planted = outside.join(name.file_name().unwrap());
        std::fs::write(&planted, b"planted").unwrap();

        let mut ctx = RequestContext::new(key.clone(), key.clone());
        cache.after_parsing_arguments(&mut ctx).await;
        cache.before_loading_source_image(&mut ctx).await;
        assert!(ctx.transformed_image.is_none());
        assert!(ctx.source_image.is_none());

        let mut done = finished(&key, b"fresh");
        cache.after_finish_request(&mut done).await;
        assert_eq!(std::fs::read(&planted).unwrap(), b"planted");
        assert_eq!(cache.stats().write_failures, 1);

        let err = cache.locate(&key).await.unwrap_err();
        assert!(matches!(err, CacheError::Validation(_)));
    }

    #[tokio::test]
    async fn test_inspect_reports_entry() {
        let dir = tempdir().unwrap();
        let cache = storage(dir.path());

        let info = cache.inspect(EntryKind::Result, "https://x/img.png").await;
        assert!(info.within_root);
        assert!(!info.exists);
        assert!(!info.is_servable());

        let path = cache
            .write_entry("https://x/img.png", b"12345")
            .await
            .unwrap();
        let info = cache.inspect(EntryKind::Result, "https://x/img.png").await;
        assert_eq!(info.path, path);
        assert_eq!(info.size, Some(5));
        assert!(info.modified.is_some());
        assert!(info.is_servable());

        backdate(&path, 120);
        let info = cache.inspect(EntryKind::Result, "https://x/img.png").await;
        assert!(info.expired);
        let info = cache.inspect(EntryKind::Source, "https://x/img.png").await;
        assert!(!info.expired);
    }
}
