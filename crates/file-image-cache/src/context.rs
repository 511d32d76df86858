//! Per-request state handed to lifecycle hooks

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::SystemTime;

/// Response header carrying a cached result's modification time
pub const LAST_MODIFIED: &str = "Last-Modified";

/// Mutable view of one image request, owned by the host pipeline
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Request URL; key for result entries
    pub url: String,
    /// Source image URL; key for source entries
    pub image_url: String,
    /// Request was not signed
    pub is_unsafe: bool,
    /// Response status, set by the host before completion
    pub status_code: Option<u16>,
    pub source_image: Option<Vec<u8>>,
    pub transformed_image: Option<Vec<u8>>,
    /// Set when `transformed_image` was served from the result cache
    pub result_from_cache: bool,
    pub headers: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(url: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            image_url: image_url.into(),
            ..Self::default()
        }
    }

    pub fn with_unsafe(mut self, is_unsafe: bool) -> Self {
        self.is_unsafe = is_unsafe;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.status_code == Some(200)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Format a timestamp as an HTTP date, e.g. `Mon, 19 Oct 2026 08:00:00 GMT`
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
