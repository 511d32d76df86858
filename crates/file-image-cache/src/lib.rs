//! Filesystem result and source cache for an image pipeline
//!
//! Entries live at `<root>/<digest[..2]>/<digest[2..]>`, keyed by the
//! SHA-256 of the request or source URL. Writes are atomic (temp file plus
//! rename), result entries expire by modification time, and every failure
//! degrades to a cache miss.

pub mod config;
pub mod context;
pub mod error;
pub mod expiration;
pub mod hasher;
pub mod hooks;
pub mod paths;
pub mod pipeline;
pub mod store;
mod types;

pub use config::CacheConfig;
pub use context::{RequestContext, LAST_MODIFIED};
pub use error::{CacheError, Result};
pub use hooks::{CachePlugin, FileStorage};
pub use paths::PathResolver;
pub use pipeline::{LifecycleEvent, Pipeline};
pub use store::AtomicFileStore;
pub use types::{CacheStats, EntryInfo, EntryKind};
