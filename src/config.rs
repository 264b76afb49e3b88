//! Configuration for caches, visibility tracking and fetch wrappers.
//!
//! Every config is a plain struct with a `Default` and chainable `with_*`
//! setters. Durations deserialize from milliseconds so configs can be kept
//! in an application's JSON settings.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Default maximum number of cache entries.
pub const DEFAULT_MAX_SIZE: usize = 100;

/// Default time-to-live for cache entries (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default hidden duration after which a return to foreground refreshes (30 seconds).
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(30);

fn millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn optional_millis<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
}

/// Configuration for [`TtlCache`](crate::cache::TtlCache).
///
/// # Example
///
/// ```
/// use fetch_kit::config::CacheConfig;
/// use std::time::Duration;
///
/// let config = CacheConfig::default()
///     .with_max_size(50)
///     .with_default_ttl(Duration::from_secs(600))
///     .with_persist(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Maximum number of entries held at once.
    pub max_size: usize,

    /// TTL applied when `set` is called without one.
    #[serde(deserialize_with = "millis")]
    pub default_ttl: Duration,

    /// Write a snapshot to the configured store after every mutation.
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_size: DEFAULT_MAX_SIZE,
            default_ttl: DEFAULT_TTL,
            persist: false,
        }
    }
}

impl CacheConfig {
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Reject configurations that would make every insert fail or expire immediately.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::ConfigError("max_size must be at least 1".to_string()));
        }
        if self.default_ttl.is_zero() {
            return Err(Error::ConfigError(
                "default_ttl must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for [`VisibilityCoordinator`](crate::visibility::VisibilityCoordinator).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisibilityConfig {
    /// Hidden duration that must be exceeded before refresh callbacks run.
    #[serde(deserialize_with = "millis")]
    pub refresh_threshold: Duration,

    /// Run registered refresh callbacks on a qualifying return to foreground.
    pub auto_refresh: bool,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        VisibilityConfig {
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            auto_refresh: true,
        }
    }
}

impl VisibilityConfig {
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }
}

/// Per-resource options for [`CachedResource`](crate::resource::CachedResource).
///
/// # Precedence
///
/// - `ttl: Some(d)` overrides the cache's default TTL for this resource only
/// - `ttl: None` falls back to [`CacheConfig::default_ttl`]
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchOptions {
    #[serde(deserialize_with = "optional_millis")]
    pub ttl: Option<Duration>,

    /// When false, the resource neither reads nor writes the cache.
    pub enable_cache: bool,

    /// Number of retry attempts after a failed fetch (0 = no retry).
    ///
    /// Attempts back off exponentially starting at 100ms, capped at 30s.
    pub retry_count: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            ttl: None,
            enable_cache: true,
            retry_count: 0,
        }
    }
}

impl FetchOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }

    pub fn with_retry(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }
}

/// Options for [`VisibilityAwareFetch`](crate::visibility_fetch::VisibilityAwareFetch).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisibilityFetchOptions {
    /// Refetch whenever the application returns to the foreground.
    pub refresh_on_visible: bool,

    /// Skip fetches requested while the application is hidden.
    pub pause_when_hidden: bool,

    #[serde(deserialize_with = "millis")]
    pub refresh_threshold: Duration,
}

impl Default for VisibilityFetchOptions {
    fn default() -> Self {
        VisibilityFetchOptions {
            refresh_on_visible: true,
            pause_when_hidden: true,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
        }
    }
}

impl VisibilityFetchOptions {
    pub fn with_refresh_on_visible(mut self, enabled: bool) -> Self {
        self.refresh_on_visible = enabled;
        self
    }

    pub fn with_pause_when_hidden(mut self, enabled: bool) -> Self {
        self.pause_when_hidden = enabled;
        self
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }
}

/// Options for [`BatchRunner`](crate::batch::BatchRunner).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchOptions {
    /// Maximum number of items in flight at once.
    pub concurrency: usize,

    /// Stop starting new items after the first failure.
    pub stop_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            concurrency: 4,
            stop_on_error: false,
        }
    }
}

impl BatchOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::ConfigError(
                "batch concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
