//! Capacity-bounded TTL cache with sliding expiration and LRU eviction.
//!
//! Entries expire `ttl` after their last read or write: a successful
//! [`TtlCache::get`] renews the entry's timestamp. When the cache is full,
//! expired entries are swept first, then the entry with the oldest
//! timestamp is evicted.
//!
//! Values are stored as `serde_json::Value`, so one cache instance can hold
//! workshops, task lists and counts side by side, and the whole map can be
//! persisted through a [`SnapshotStore`].

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::storage::{NoopStore, PersistedEntry, Snapshot, SnapshotStore};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Cache entry with sliding expiration.
struct CacheEntry {
    value: serde_json::Value,
    created_at: Instant,
    ttl: Duration,
    /// Monotonic touch counter; breaks ties between equal timestamps.
    touched: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    touches: AtomicU64,
}

impl Counters {
    fn next_touch(&self) -> u64 {
        self.touches.fetch_add(1, Ordering::Relaxed)
    }
}

/// Thread-safe TTL cache.
///
/// Cloning is cheap and shares the same entries, so one instance can be
/// constructed at startup and handed to every consumer.
///
/// # Example
///
/// ```
/// use fetch_kit::cache::TtlCache;
/// use fetch_kit::config::CacheConfig;
/// use std::time::Duration;
///
/// # fn main() -> fetch_kit::Result<()> {
/// let cache = TtlCache::new(CacheConfig::default().with_max_size(10))?;
///
/// cache.set("workshop:1", &"Intro to Rust", None)?;
/// let title: Option<String> = cache.get("workshop:1")?;
/// assert_eq!(title.as_deref(), Some("Intro to Rust"));
///
/// cache.set("registrations:1", &42u32, Some(Duration::from_secs(30)))?;
/// assert!(cache.has("registrations:1"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TtlCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    write_lock: Arc<Mutex<()>>,
    config: CacheConfig,
    store: Arc<dyn SnapshotStore>,
    metrics: Arc<dyn CacheMetrics>,
    counters: Arc<Counters>,
}

impl TtlCache {
    /// Create a cache that never persists.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if `config` is invalid
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_store(config, NoopStore)
    }

    /// Create a cache backed by `store`.
    ///
    /// When `config.persist` is set, the last snapshot is loaded from the
    /// store. Entries that expired while the process was down are dropped.
    /// An unreadable snapshot is logged and the cache starts empty.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if `config` is invalid
    pub fn with_store<S>(config: CacheConfig, store: S) -> Result<Self>
    where
        S: SnapshotStore + 'static,
    {
        config.validate()?;

        let cache = TtlCache {
            entries: Arc::new(DashMap::new()),
            write_lock: Arc::new(Mutex::new(())),
            config,
            store: Arc::new(store),
            metrics: Arc::new(NoOpMetrics),
            counters: Arc::new(Counters::default()),
        };

        if cache.config.persist {
            cache.hydrate();
        }

        Ok(cache)
    }

    /// Set custom metrics handler.
    ///
    /// Call before cloning; existing clones keep their handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Insert or overwrite `key`.
    ///
    /// Expired entries are swept first. If a new key would exceed
    /// `max_size`, the least recently used entry is evicted. `ttl` defaults
    /// to the configured default TTL.
    ///
    /// # Errors
    /// Returns `Error::SerializationError` if `value` cannot be encoded.
    /// Persistence failures are logged, never returned.
    pub fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let value =
            serde_json::to_value(value).map_err(|e| Error::SerializationError(e.to_string()))?;
        let ttl = ttl.unwrap_or(self.config.default_ttl);

        {
            let _guard = self.lock_writes();
            let now = Instant::now();

            self.sweep(now);
            if !self.entries.contains_key(key) && self.entries.len() >= self.config.max_size {
                self.evict_oldest();
            }

            self.entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    created_at: now,
                    ttl,
                    touched: self.counters.next_touch(),
                },
            );
            self.persist();
        }

        debug!("✓ Cache SET {} (TTL: {:?})", key, ttl);
        self.metrics.record_set(key);
        Ok(())
    }

    /// Read `key`, renewing its timestamp on a hit.
    ///
    /// An expired entry is removed and reported as absent.
    ///
    /// # Errors
    /// Returns `Error::DeserializationError` if the stored value is not a `T`.
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let now = Instant::now();
        let hit = self.entries.get_mut(key).and_then(|mut entry| {
            if entry.is_expired(now) {
                None
            } else {
                entry.created_at = now;
                entry.touched = self.counters.next_touch();
                Some(entry.value.clone())
            }
        });

        match hit {
            Some(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_hit(key);
                serde_json::from_value(value)
                    .map(Some)
                    .map_err(|e| Error::DeserializationError(e.to_string()))
            }
            None => {
                if self.entries.remove_if(key, |_, e| e.is_expired(now)).is_some() {
                    debug!("Cache entry {} expired", key);
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_miss(key);
                Ok(None)
            }
        }
    }

    /// Whether `key` is present and unexpired. Does not renew the entry.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .map(|entry| !entry.is_expired(now));

        match live {
            Some(true) => true,
            Some(false) => {
                self.entries.remove_if(key, |_, e| e.is_expired(now));
                false
            }
            None => false,
        }
    }

    /// Remove `key`. Returns whether an entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let removed = {
            let _guard = self.lock_writes();
            let removed = self.entries.remove(key).is_some();
            if removed {
                self.persist();
            }
            removed
        };

        if removed {
            debug!("✓ Cache DELETE {}", key);
            self.metrics.record_delete(key);
        }
        removed
    }

    /// Remove every entry and the persisted snapshot.
    pub fn clear(&self) {
        let _guard = self.lock_writes();
        self.entries.clear();

        if self.config.persist {
            if let Err(e) = self.store.remove_snapshot() {
                warn!("⚠ Failed to remove cache snapshot: {}", e);
                self.metrics.record_error("<snapshot>", &e.to_string());
            }
        }
        debug!("✓ Cache CLEAR");
    }

    /// Current entry count, including expired entries not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry now. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let _guard = self.lock_writes();
        let removed = self.sweep(Instant::now());
        if removed > 0 {
            self.persist();
        }
        removed
    }

    /// Snapshot of the current keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        CacheStats {
            total_entries: self.entries.len(),
            expired_entries: self.entries.iter().filter(|e| e.is_expired(now)).count(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Print cache statistics to debug log.
    pub fn log_stats(&self) {
        let stats = self.stats();
        debug!(
            "Cache Stats: {} entries ({} expired), {} hits, {} misses, {} evictions",
            stats.total_entries, stats.expired_entries, stats.hits, stats.misses, stats.evictions
        );
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Caller holds the write lock.
    fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Caller holds the write lock.
    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| (e.created_at, e.touched))
            .map(|e| e.key().clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("Cache EVICT {} (capacity {})", key, self.config.max_size);
            self.metrics.record_eviction(&key);
        }
    }

    /// Caller holds the write lock, so snapshots are saved in mutation order.
    fn persist(&self) {
        if !self.config.persist {
            return;
        }

        let now = Instant::now();
        let now_ms = epoch_millis();
        let snapshot: Snapshot = self
            .entries
            .iter()
            .map(|e| {
                let age = millis(now.saturating_duration_since(e.created_at));
                (
                    e.key().clone(),
                    PersistedEntry {
                        data: e.value.clone(),
                        created_at: now_ms.saturating_sub(age),
                        ttl: millis(e.ttl),
                    },
                )
            })
            .collect();

        if let Err(e) = self.store.save_snapshot(&snapshot) {
            warn!("⚠ Failed to persist cache snapshot: {}", e);
            self.metrics.record_error("<snapshot>", &e.to_string());
        }
    }

    fn hydrate(&self) {
        let snapshot = match self.store.load_snapshot() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(e) => {
                warn!("⚠ Ignoring unreadable cache snapshot: {}", e);
                self.metrics.record_error("<snapshot>", &e.to_string());
                return;
            }
        };

        let now = Instant::now();
        let now_ms = epoch_millis();
        let mut live: Vec<(String, PersistedEntry, u64)> = snapshot
            .into_iter()
            .filter_map(|(key, entry)| {
                let age = now_ms.saturating_sub(entry.created_at);
                (age < entry.ttl).then_some((key, entry, age))
            })
            .collect();

        // Keep the most recently touched entries when the snapshot is larger than max_size.
        live.sort_by_key(|(_, _, age)| std::cmp::Reverse(*age));
        let skip = live.len().saturating_sub(self.config.max_size);

        for (key, entry, age) in live.into_iter().skip(skip) {
            let created_at = now
                .checked_sub(Duration::from_millis(age))
                .unwrap_or(now);
            self.entries.insert(
                key,
                CacheEntry {
                    value: entry.data,
                    created_at,
                    ttl: Duration::from_millis(entry.ttl),
                    touched: self.counters.next_touch(),
                },
            );
        }

        info!("✓ Cache restored {} entries from snapshot", self.entries.len());
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(millis)
        .unwrap_or(0)
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}
