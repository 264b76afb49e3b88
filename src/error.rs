//! Error types for fetch-kit.

use std::fmt;

/// Result type for fetch-kit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for fetch-kit.
///
/// `Error` is `Clone` because staged loaders keep the last failure of each
/// stage in their run state and hand out snapshots of it.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Serialization failed when converting a value into its cached form.
    ///
    /// Common causes:
    /// - Value contains a map with non-string keys
    /// - A custom `Serialize` implementation returned an error
    SerializationError(String),

    /// Deserialization failed when converting a cached value back into `T`.
    ///
    /// This usually means two callers share a cache key but disagree on
    /// the value type, or a persisted snapshot is from an older layout.
    ///
    /// **Recovery:** Delete the entry and fetch again.
    DeserializationError(String),

    /// Snapshot storage failed (quota, missing directory, I/O error).
    ///
    /// The cache never surfaces this to its callers; it is logged and the
    /// cache keeps working in memory only.
    StorageError(String),

    /// A cache-backed or visibility-aware fetch failed.
    FetchError(String),

    /// A staged loader failed for one stage.
    LoaderError(String),

    /// Invalid configuration (zero capacity, duplicate stage keys, ...).
    ConfigError(String),

    /// Cache miss with `CacheStrategy::Fresh`.
    CacheMiss,

    /// The run or batch this operation belonged to was cancelled.
    Cancelled,

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Error::FetchError(msg) => write!(f, "Fetch error: {}", msg),
            Error::LoaderError(msg) => write!(f, "Loader error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::CacheMiss => write!(f, "Cache miss"),
            Error::Cancelled => write!(f, "Cancelled"),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::StorageError(e.to_string())
        } else if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::StorageError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
