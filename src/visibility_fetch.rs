//! Fetching that follows application visibility.
//!
//! [`VisibilityAwareFetch`] skips fetches while the application is hidden
//! (`pause_when_hidden`) and refetches whenever it returns to the foreground
//! (`refresh_on_visible`). The return-to-foreground refetch is not gated by
//! the refresh threshold; the threshold only applies to callbacks registered
//! on the underlying [`VisibilityCoordinator`].

use crate::config::{VisibilityConfig, VisibilityFetchOptions};
use crate::error::Result;
use crate::resource::ResourceState;
use crate::source::DataSource;
use crate::visibility::VisibilityCoordinator;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Visibility-aware fetch wrapper.
///
/// # Example
///
/// ```
/// use fetch_kit::config::VisibilityFetchOptions;
/// use fetch_kit::visibility_fetch::VisibilityAwareFetch;
/// use std::sync::Arc;
///
/// # async fn demo() -> fetch_kit::Result<()> {
/// let submissions = Arc::new(VisibilityAwareFetch::new(
///     true,
///     || async { Ok::<_, fetch_kit::Error>(3u32) },
///     VisibilityFetchOptions::default(),
/// ));
/// let _watcher = submissions.clone().watch();
///
/// assert_eq!(submissions.refetch().await?, Some(3));
/// submissions.coordinator().set_visible(false);
/// assert_eq!(submissions.refetch().await?, None); // paused while hidden
/// # Ok(())
/// # }
/// ```
pub struct VisibilityAwareFetch<T, S> {
    coordinator: Arc<VisibilityCoordinator>,
    source: S,
    options: VisibilityFetchOptions,
    state: Mutex<ResourceState<T>>,
    dependencies: Mutex<Option<Vec<String>>>,
    generation: AtomicU64,
}

impl<T, S> VisibilityAwareFetch<T, S>
where
    T: Clone + Send,
    S: DataSource<T>,
{
    /// Create a fetcher with its own coordinator, configured from `options`.
    pub fn new(initially_visible: bool, source: S, options: VisibilityFetchOptions) -> Self {
        let coordinator = Arc::new(VisibilityCoordinator::new(
            initially_visible,
            VisibilityConfig::default().with_refresh_threshold(options.refresh_threshold),
        ));
        Self::with_coordinator(coordinator, source, options)
    }

    /// Create a fetcher that shares an existing coordinator.
    pub fn with_coordinator(
        coordinator: Arc<VisibilityCoordinator>,
        source: S,
        options: VisibilityFetchOptions,
    ) -> Self {
        VisibilityAwareFetch {
            coordinator,
            source,
            options,
            state: Mutex::new(ResourceState::default()),
            dependencies: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn coordinator(&self) -> &Arc<VisibilityCoordinator> {
        &self.coordinator
    }

    pub fn is_visible(&self) -> bool {
        self.coordinator.is_visible()
    }

    /// Fetch now.
    ///
    /// Returns `Ok(None)` without calling the source when hidden and
    /// `pause_when_hidden` is set.
    ///
    /// # Errors
    /// Returns the source's error, which is also recorded in the state
    pub async fn refetch(&self) -> Result<Option<T>> {
        if self.options.pause_when_hidden && !self.coordinator.is_visible() {
            debug!("Fetch skipped while hidden");
            return Ok(None);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.lock_state();
            state.loading = true;
            state.error = None;
        }

        let result = self.source.fetch().await;

        if self.generation.load(Ordering::SeqCst) == generation {
            let mut state = self.lock_state();
            state.loading = false;
            match &result {
                Ok(value) => {
                    state.data = Some(value.clone());
                    state.error = None;
                }
                Err(e) => state.error = Some(e.clone()),
            }
        }

        result.map(Some)
    }

    /// Update the dependency list; refetches only when it changed.
    ///
    /// The refetch is subject to `pause_when_hidden` like any other.
    ///
    /// # Errors
    /// Returns the source's error if the triggered fetch fails
    pub async fn set_dependencies(&self, dependencies: Vec<String>) -> Result<Option<T>> {
        {
            let mut current = self
                .dependencies
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if current.as_ref() == Some(&dependencies) {
                return Ok(None);
            }
            *current = Some(dependencies);
        }

        self.refetch().await
    }

    /// React to a visibility report already applied to the coordinator.
    ///
    /// # Errors
    /// Returns the source's error if a refetch ran and failed
    pub async fn on_visibility_change(&self, visible: bool) -> Result<Option<T>> {
        if visible && self.options.refresh_on_visible {
            debug!("Visible again, refetching");
            return self.refetch().await;
        }
        Ok(None)
    }

    pub fn state(&self) -> ResourceState<T> {
        self.lock_state().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.lock_state().data.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ResourceState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T, S> VisibilityAwareFetch<T, S>
where
    T: Clone + Send + 'static,
    S: DataSource<T> + 'static,
{
    /// Spawn a task that refetches on every return to the foreground.
    ///
    /// The task keeps `self` alive; abort the handle when the consumer goes away.
    pub fn watch(self: Arc<Self>) -> JoinHandle<()> {
        let mut events = self.coordinator.subscribe();
        tokio::spawn(async move {
            while events.changed().await.is_ok() {
                let visible = *events.borrow_and_update();
                if let Err(e) = self.on_visibility_change(visible).await {
                    warn!("Refetch after visibility change failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::source::ScriptedSource;
    use std::time::Duration;

    fn fetcher(
        visible: bool,
        source: ScriptedSource<u32>,
        options: VisibilityFetchOptions,
    ) -> Arc<VisibilityAwareFetch<u32, ScriptedSource<u32>>> {
        Arc::new(VisibilityAwareFetch::new(visible, source, options))
    }

    #[tokio::test]
    async fn test_fetch_when_visible() {
        let f = fetcher(true, ScriptedSource::always(5), VisibilityFetchOptions::default());
        assert_eq!(f.refetch().await.expect("fetch"), Some(5));
        assert_eq!(f.data(), Some(5));
        assert!(!f.state().loading);
    }

    #[tokio::test]
    async fn test_paused_when_hidden() {
        let f = fetcher(false, ScriptedSource::always(5), VisibilityFetchOptions::default());
        assert_eq!(f.refetch().await.expect("fetch"), None);
        assert_eq!(f.source.calls(), 0);
    }

    #[tokio::test]
    async fn test_not_paused_when_disabled() {
        let f = fetcher(
            false,
            ScriptedSource::always(5),
            VisibilityFetchOptions::default().with_pause_when_hidden(false),
        );
        assert_eq!(f.refetch().await.expect("fetch"), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_refetches_on_return() {
        let f = fetcher(true, ScriptedSource::always(1), VisibilityFetchOptions::default());
        let handle = f.clone().watch();

        f.coordinator().set_visible(false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.source.calls(), 0);

        // Short absence: below threshold, refetch still happens.
        f.coordinator().set_visible(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.source.calls(), 1);
        assert_eq!(f.data(), Some(1));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_respects_refresh_on_visible() {
        let f = fetcher(
            true,
            ScriptedSource::always(1),
            VisibilityFetchOptions::default().with_refresh_on_visible(false),
        );
        let handle = f.clone().watch();

        f.coordinator().set_visible(false);
        tokio::time::sleep(Duration::from_secs(60)).await;
        f.coordinator().set_visible(true);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(f.source.calls(), 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_error_recorded_and_returned() {
        let f = fetcher(
            true,
            ScriptedSource::new(vec![Ok(1), Err(Error::FetchError("offline".to_string()))]),
            VisibilityFetchOptions::default(),
        );
        f.refetch().await.expect("first fetch");
        assert!(f.refetch().await.is_err());

        let state = f.state();
        assert_eq!(state.data, Some(1));
        assert_eq!(state.error, Some(Error::FetchError("offline".to_string())));
    }

    #[tokio::test]
    async fn test_dependencies_change_refetches() {
        let f = fetcher(true, ScriptedSource::always(2), VisibilityFetchOptions::default());

        let deps = vec!["workshop=w1".to_string()];
        assert_eq!(f.set_dependencies(deps.clone()).await.expect("fetch"), Some(2));
        assert_eq!(f.set_dependencies(deps).await.expect("unchanged"), None);
        assert_eq!(f.source.calls(), 1);

        f.set_dependencies(vec!["workshop=w2".to_string()])
            .await
            .expect("fetch");
        assert_eq!(f.source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_configures_coordinator() {
        let f = fetcher(
            true,
            ScriptedSource::always(1),
            VisibilityFetchOptions::default().with_refresh_threshold(Duration::from_secs(5)),
        );
        assert_eq!(
            f.coordinator().config().refresh_threshold,
            Duration::from_secs(5)
        );
    }
}
