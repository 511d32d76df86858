//! Error types for the file image cache

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CacheError {
    /// No usable entry at this path (absent or expired)
    Miss(PathBuf),
    /// I/O failure while reading, writing or creating directories
    Storage {
        path: PathBuf,
        source: Box<std::io::Error>,
    },
    /// Resolved path escapes the storage root
    Validation(PathBuf),
}

impl CacheError {
    pub(crate) fn storage(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        CacheError::Storage {
            path: path.into(),
            source: Box::new(err),
        }
    }

    /// Map an I/O error to a miss when the file is simply not there
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            CacheError::Miss(path.into())
        } else {
            Self::storage(path, err)
        }
    }

    /// Whether this error should be handled as an ordinary cache miss.
    ///
    /// Validation failures count as misses: an entry outside the root is
    /// never served.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss(_) | CacheError::Validation(_))
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Miss(path) => write!(f, "Cache miss: {}", path.display()),
            CacheError::Storage { path, source } => {
                write!(f, "Storage error at {}: {}", path.display(), source)
            }
            CacheError::Validation(path) => {
                write!(f, "Path escapes storage root: {}", path.display())
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Storage { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
