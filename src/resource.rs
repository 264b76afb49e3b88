//! Cache-backed resource: one cache key, one data source, observable state.
//!
//! [`CachedResource`] wraps [`TtlCache::get`]/[`TtlCache::set`] around a
//! [`DataSource`] and keeps `{ data, loading, error }` for a view to render.
//!
//! # Example
//!
//! ```
//! use fetch_kit::cache::TtlCache;
//! use fetch_kit::config::{CacheConfig, FetchOptions};
//! use fetch_kit::resource::CachedResource;
//!
//! # async fn demo() -> fetch_kit::Result<()> {
//! let cache = TtlCache::new(CacheConfig::default())?;
//! let tasks = CachedResource::new(
//!     "tasks?workshop=w1",
//!     cache.clone(),
//!     || async { Ok::<_, fetch_kit::Error>(vec!["Write a parser".to_string()]) },
//!     FetchOptions::default(),
//! );
//!
//! let first = tasks.load().await?;      // fetched, stored in cache
//! let again = tasks.refetch(false).await?; // served from cache
//! assert_eq!(first, again);
//!
//! tasks.invalidate();
//! assert!(tasks.data().is_none());
//! # Ok(())
//! # }
//! ```

use crate::cache::TtlCache;
use crate::config::FetchOptions;
use crate::error::{Error, Result};
use crate::source::DataSource;
use crate::strategy::CacheStrategy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Observable state of a resource.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<Error>,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        ResourceState {
            data: None,
            loading: false,
            error: None,
        }
    }
}

/// Cache-backed fetch wrapper.
///
/// A failed fetch is returned to the caller *and* recorded in
/// [`ResourceState::error`]; previously loaded data is kept so the view can
/// show stale content next to a retry action.
pub struct CachedResource<T, S> {
    key: String,
    cache: TtlCache,
    source: S,
    options: FetchOptions,
    state: Mutex<ResourceState<T>>,
    dependencies: Mutex<Option<Vec<String>>>,
    generation: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> CachedResource<T, S>
where
    T: Serialize + DeserializeOwned + Clone + Send,
    S: DataSource<T>,
{
    pub fn new(key: impl Into<String>, cache: TtlCache, source: S, options: FetchOptions) -> Self {
        CachedResource {
            key: key.into(),
            cache,
            source,
            options,
            state: Mutex::new(ResourceState::default()),
            dependencies: Mutex::new(None),
            generation: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Initial load: cache first, source on miss.
    ///
    /// # Errors
    /// Returns the source's error after all retries are exhausted
    pub async fn load(&self) -> Result<T> {
        self.execute(CacheStrategy::Refresh).await
    }

    /// Fetch again. `force = true` skips the cache read but still stores the result.
    ///
    /// # Errors
    /// Returns the source's error after all retries are exhausted
    pub async fn refetch(&self, force: bool) -> Result<T> {
        self.execute(CacheStrategy::from_force(force)).await
    }

    /// Update the dependency list; fetches (cache first) only when it changed.
    ///
    /// Returns `Ok(true)` if a fetch ran.
    ///
    /// # Errors
    /// Returns the source's error if the triggered fetch fails
    pub async fn set_dependencies(&self, dependencies: Vec<String>) -> Result<bool> {
        {
            let mut current = lock(&self.dependencies);
            if current.as_ref() == Some(&dependencies) {
                return Ok(false);
            }
            *current = Some(dependencies);
        }

        self.load().await.map(|_| true)
    }

    /// Delete the cache entry and drop the locally held data.
    pub fn invalidate(&self) {
        self.cache.delete(&self.key);
        lock(&self.state).data = None;
        debug!("Resource {} invalidated", self.key);
    }

    /// Run one fetch with an explicit strategy.
    ///
    /// # Errors
    /// - `Error::CacheMiss` for `CacheStrategy::Fresh` without a cached value
    /// - the source's error after all retries are exhausted
    pub async fn execute(&self, strategy: CacheStrategy) -> Result<T> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = lock(&self.state);
            state.loading = true;
            state.error = None;
        }

        debug!("» Resource {} (strategy: {})", self.key, strategy);

        if let Some(cached) = self.read_cache(strategy) {
            self.apply(generation, Ok(cached.clone()));
            return Ok(cached);
        }

        if strategy == CacheStrategy::Fresh {
            self.apply(generation, Err(Error::CacheMiss));
            return Err(Error::CacheMiss);
        }

        let result = self.fetch_with_retry().await;

        // A newer fetch owns the cache entry; a superseded result must not overwrite it.
        let current = self.generation.load(Ordering::SeqCst) == generation;
        if let Ok(value) = &result {
            if self.options.enable_cache && current {
                if let Err(e) = self.cache.set(&self.key, value, self.options.ttl) {
                    warn!("⚠ Could not cache {}: {}", self.key, e);
                }
            }
        }

        self.apply(generation, result.clone());
        result
    }

    pub fn state(&self) -> ResourceState<T> {
        lock(&self.state).clone()
    }

    pub fn data(&self) -> Option<T> {
        lock(&self.state).data.clone()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).loading
    }

    pub fn error(&self) -> Option<Error> {
        lock(&self.state).error.clone()
    }

    fn read_cache(&self, strategy: CacheStrategy) -> Option<T> {
        if !self.options.enable_cache {
            return None;
        }

        if strategy == CacheStrategy::Invalidate {
            self.cache.delete(&self.key);
            return None;
        }

        if !strategy.reads_cache() {
            return None;
        }

        match self.cache.get::<T>(&self.key) {
            Ok(hit) => hit,
            Err(e) => {
                warn!("⚠ Dropping undecodable cache entry {}: {}", self.key, e);
                self.cache.delete(&self.key);
                None
            }
        }
    }

    async fn fetch_with_retry(&self) -> Result<T> {
        let max_attempts = self.options.retry_count + 1;
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.source.fetch().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempts >= max_attempts {
                        warn!("Fetch for {} failed after {} attempt(s): {}", self.key, attempts, e);
                        return Err(e);
                    }

                    debug!(
                        "Fetch for {} failed (attempt {}/{}), retrying...",
                        self.key, attempts, max_attempts
                    );
                    tokio::time::sleep(backoff_delay(attempts)).await;
                }
            }
        }
    }

    /// Apply a result unless a newer fetch has started since.
    fn apply(&self, generation: u64, result: Result<T>) {
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Resource {} ignoring stale result", self.key);
            return;
        }

        let mut state = lock(&self.state);
        state.loading = false;
        match result {
            Ok(value) => {
                state.data = Some(value);
                state.error = None;
            }
            Err(e) => state.error = Some(e),
        }
    }
}

/// Upper bound for the pause between retries.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Pause after the given failed attempt (1-based): 100ms, 200ms, 400ms, ...
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(100_u64.saturating_mul(factor)).min(MAX_BACKOFF)
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
