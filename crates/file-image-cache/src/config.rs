//! Cache policy configuration

use std::env;
use std::path::PathBuf;
use tracing::warn;

/// Storage root used when nothing else is configured
pub const DEFAULT_STORAGE_ROOT: &str = "/tmp/thumbor/storage";

/// Configuration for the file storage plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding every cache entry
    pub storage_root: PathBuf,
    /// Maximum age of result entries; `None` or `Some(0)` never expires
    pub result_ttl_secs: Option<u64>,
    /// Whether requests flagged unsafe may read and write result entries
    pub stores_unsafe: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            result_ttl_secs: None,
            stores_unsafe: false,
        }
    }
}

impl CacheConfig {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ..Self::default()
        }
    }

    pub fn with_result_ttl(mut self, ttl_secs: u64) -> Self {
        self.result_ttl_secs = Some(ttl_secs);
        self
    }

    pub fn with_stores_unsafe(mut self, stores_unsafe: bool) -> Self {
        self.stores_unsafe = stores_unsafe;
        self
    }

    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let storage_root = lookup("FILE_STORAGE_ROOT_PATH")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_root);

        let result_ttl_secs = lookup("RESULT_STORAGE_EXPIRATION_SECONDS").and_then(|raw| {
            match raw.trim().parse::<u64>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    warn!(value = %raw, "Invalid RESULT_STORAGE_EXPIRATION_SECONDS, entries will not expire");
                    None
                }
            }
        });

        let stores_unsafe = lookup("RESULT_STORAGE_STORES_UNSAFE")
            .and_then(|raw| {
                let parsed = parse_flag(&raw);
                if parsed.is_none() {
                    warn!(value = %raw, "Invalid RESULT_STORAGE_STORES_UNSAFE, using default");
                }
                parsed
            })
            .unwrap_or(defaults.stores_unsafe);

        Self {
            storage_root,
            result_ttl_secs,
            stores_unsafe,
        }
    }

    /// Effective TTL, with zero folded into "never expires"
    pub fn effective_result_ttl(&self) -> Option<u64> {
        self.result_ttl_secs.filter(|&secs| secs > 0)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
