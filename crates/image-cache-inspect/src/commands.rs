//! Inspector subcommands

use crate::error::Result;
use file_image_cache::{EntryKind, FileStorage};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

pub fn kind_for(source: bool) -> EntryKind {
    if source {
        EntryKind::Source
    } else {
        EntryKind::Result
    }
}

/// Entry path for a URL
pub fn path(storage: &FileStorage, url: &str) -> PathBuf {
    storage.resolver().resolve(url)
}

/// Entry details as pretty JSON
pub async fn stat(storage: &FileStorage, kind: EntryKind, url: &str) -> Result<String> {
    let info = storage.inspect(kind, url).await;
    Ok(serde_json::to_string_pretty(&info)?)
}

/// Copy a servable entry to `out`, returning the number of bytes written
pub async fn get(storage: &FileStorage, kind: EntryKind, url: &str, out: &Path) -> Result<usize> {
    let data = match kind {
        EntryKind::Result => storage.read_result(url).await?.0,
        EntryKind::Source => storage.read_source(url).await?,
    };
    fs::write(out, &data).await?;
    info!(%kind, url, out = ?out, size = data.len(), "Copied cache entry");
    Ok(data.len())
}
