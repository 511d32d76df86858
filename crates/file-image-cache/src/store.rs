//! Atomic file storage for cache entries

use crate::error::{CacheError, Result};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Reads and writes entry files. Writes go to a uniquely named sibling temp
/// file which is then renamed over the entry, so readers observe either
/// the old or the new contents in full.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicFileStore;

impl AtomicFileStore {
    pub fn new() -> Self {
        Self
    }

    /// Whether a servable entry exists at `path`. Temp files never count.
    pub async fn exists(&self, path: &Path) -> bool {
        if is_temp_path(path) {
            return false;
        }
        fs::metadata(path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Read an entry. Absent entries yield [`CacheError::Miss`].
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path)
            .await
            .map_err(|e| CacheError::from_io(path, e))
    }

    /// Last-modified time of an entry
    pub async fn modified(&self, path: &Path) -> Result<SystemTime> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| CacheError::from_io(path, e))?;
        meta.modified().map_err(|e| CacheError::storage(path, e))
    }

    /// Create `dir` and its parents. Losing a creation race is not an error.
    pub async fn ensure_dir(&self, dir: &Path) -> Result<()> {
        match fs::create_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && is_dir(dir).await => Ok(()),
            Err(e) => Err(CacheError::storage(dir, e)),
        }
    }

    /// Atomically replace the entry at `path` with `data`
    pub async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            CacheError::storage(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "entry path has no parent"),
            )
        })?;
        self.ensure_dir(parent).await?;

        let temp = temp_path(path);
        if let Err(e) = write_new_file(&temp, data).await {
            discard_temp(&temp).await;
            return Err(CacheError::storage(&temp, e));
        }

        if let Err(e) = fs::rename(&temp, path).await {
            discard_temp(&temp).await;
            return Err(CacheError::storage(path, e));
        }

        debug!(path = ?path, size = data.len(), "Wrote cache entry");
        Ok(())
    }
}

/// Temp file name for an entry: `<entry>.<random token>`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_os_string();
    raw.push(".");
    raw.push(Uuid::new_v4().simple().to_string());
    PathBuf::from(raw)
}

/// Whether a file name carries a temp suffix and so must never be served
pub fn is_temp_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.len() == 32 && ext.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

async fn write_new_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

async fn discard_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = ?path, error = %e, "Failed to remove temp file");
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}
