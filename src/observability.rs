//! Metrics hooks for cache operations.
//!
//! Implement [`CacheMetrics`] to forward cache events to a monitoring
//! system:
//!
//! ```
//! use fetch_kit::observability::CacheMetrics;
//! use fetch_kit::{CacheConfig, TtlCache};
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct HitRate {
//!     hits: AtomicU64,
//!     misses: AtomicU64,
//! }
//!
//! impl CacheMetrics for HitRate {
//!     fn record_hit(&self, _key: &str) {
//!         self.hits.fetch_add(1, Ordering::Relaxed);
//!     }
//!     fn record_miss(&self, _key: &str) {
//!         self.misses.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//!
//! # fn main() -> fetch_kit::Result<()> {
//! let rate = Arc::new(HitRate::default());
//! let cache = TtlCache::new(CacheConfig::default())?.with_metrics(rate.clone());
//! cache.get::<u32>("registrations:w1")?;
//! assert_eq!(rate.misses.load(Ordering::Relaxed), 1);
//! # Ok(())
//! # }
//! ```
//!
//! The default is [`NoOpMetrics`]. [`LogMetrics`] keeps the trait's
//! default bodies, which log every event through the `log` crate.

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a cache hit.
    fn record_hit(&self, key: &str) {
        debug!("Cache HIT: {}", key);
    }

    /// Record a cache miss (absent or expired).
    fn record_miss(&self, key: &str) {
        debug!("Cache MISS: {}", key);
    }

    /// Record a cache set operation.
    fn record_set(&self, key: &str) {
        debug!("Cache SET: {}", key);
    }

    /// Record an explicit delete.
    fn record_delete(&self, key: &str) {
        debug!("Cache DELETE: {}", key);
    }

    /// Record a capacity eviction.
    fn record_eviction(&self, key: &str) {
        debug!("Cache EVICT: {}", key);
    }

    /// Record a swallowed error (persistence, decode).
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str) {}
    fn record_miss(&self, _key: &str) {}
    fn record_set(&self, _key: &str) {}
    fn record_delete(&self, _key: &str) {}
    fn record_eviction(&self, _key: &str) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics implementation that logs every event.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}
