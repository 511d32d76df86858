//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The two artifacts kept in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Transformed image, keyed by request URL, subject to TTL
    Result,
    /// Fetched source image, keyed by source URL, never expires
    Source,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Result => write!(f, "result"),
            EntryKind::Source => write!(f, "source"),
        }
    }
}

/// What is on disk for a key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryInfo {
    pub key: String,
    pub kind: EntryKind,
    pub digest: String,
    pub path: PathBuf,
    pub within_root: bool,
    pub exists: bool,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub expired: bool,
}

impl EntryInfo {
    /// Whether a read hook would serve this entry
    pub fn is_servable(&self) -> bool {
        self.within_root && self.exists && !self.expired
    }
}

/// Counters kept by the file storage plugin
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub result_hits: u64,
    pub result_misses: u64,
    pub source_hits: u64,
    pub source_misses: u64,
    pub writes: u64,
    pub write_failures: u64,
}
