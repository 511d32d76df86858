//! Error types for the cache inspector

use std::fmt;

#[derive(Debug)]
pub enum InspectError {
    Cache(file_image_cache::CacheError),
    Io(Box<std::io::Error>),
    Json(String),
    Config(String),
}

impl fmt::Display for InspectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectError::Cache(err) => write!(f, "Cache error: {}", err),
            InspectError::Io(err) => write!(f, "IO error: {}", err),
            InspectError::Json(msg) => write!(f, "JSON error: {}", msg),
            InspectError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for InspectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InspectError::Cache(err) => Some(err),
            InspectError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<file_image_cache::CacheError> for InspectError {
    fn from(err: file_image_cache::CacheError) -> Self {
        InspectError::Cache(err)
    }
}

impl From<std::io::Error> for InspectError {
    fn from(err: std::io::Error) -> Self {
        InspectError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for InspectError {
    fn from(err: serde_json::Error) -> Self {
        InspectError::Json(err.to_string())
    }
}

impl From<tracing_subscriber::filter::ParseError> for InspectError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        InspectError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InspectError>;
