//! Sharded entry paths and storage root containment

use crate::hasher::digest;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Length of the digest prefix used as the shard directory name
pub const SHARD_PREFIX_LEN: usize = 2;

/// Maps cache keys to `<root>/<digest[..2]>/<digest[2..]>`
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entry path for a key. Pure, touches no filesystem state.
    pub fn resolve(&self, key: &str) -> PathBuf {
        let digest = digest(key);
        let (shard, rest) = digest.split_at(SHARD_PREFIX_LEN);
        self.root.join(shard).join(rest)
    }

    /// Check that `path`, once symlinks and `..` are resolved, stays under
    /// the canonical storage root.
    ///
    /// The path does not need to exist: missing trailing components are
    /// resolved lexically on top of the deepest existing ancestor. Any
    /// error while resolving yields `false`.
    pub async fn is_within_root(&self, path: &Path) -> bool {
        let root = match canonicalize_lenient(&self.root).await {
            Ok(root) => root,
            Err(e) => {
                debug!(root = ?self.root, error = %e, "Failed to resolve storage root");
                return false;
            }
        };

        match canonicalize_lenient(path).await {
            Ok(resolved) => resolved.starts_with(&root),
            Err(e) => {
                debug!(path = ?path, error = %e, "Failed to resolve cache path");
                false
            }
        }
    }
}

/// Canonicalize a path that may not exist yet.
async fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut resolved = PathBuf::new();
    // Number of trailing components of `resolved` that do not exist on disk
    let mut missing_depth = 0usize;

    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
                missing_depth = missing_depth.saturating_sub(1);
            }
            Component::Normal(name) => {
                resolved.push(name);
                if missing_depth > 0 {
                    missing_depth += 1;
                    continue;
                }
                match fs::canonicalize(&resolved).await {
                    Ok(canonical) => resolved = canonical,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => missing_depth = 1,
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Ok(resolved)
}
