//! Foreground/background tracking with threshold-gated refresh.
//!
//! The coordinator is a two-state machine (`Visible`, `Hidden`) fed by
//! [`VisibilityCoordinator::set_visible`] or by a `watch` channel via
//! [`VisibilityCoordinator::listen`]. When the application comes back to
//! the foreground after being hidden for longer than
//! [`VisibilityConfig::refresh_threshold`], every registered refresh
//! callback runs exactly once.
//!
//! ```
//! use fetch_kit::config::VisibilityConfig;
//! use fetch_kit::visibility::VisibilityCoordinator;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let coordinator = Arc::new(VisibilityCoordinator::new(true, VisibilityConfig::default()));
//! let refreshes = Arc::new(AtomicUsize::new(0));
//!
//! let counter = refreshes.clone();
//! let registration = coordinator.register_refresh_callback(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! coordinator.trigger_refresh();
//! assert_eq!(refreshes.load(Ordering::SeqCst), 1);
//!
//! assert!(registration.unregister());
//! coordinator.trigger_refresh();
//! assert_eq!(refreshes.load(Ordering::SeqCst), 1);
//! ```

use crate::config::VisibilityConfig;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type RefreshCallback = Arc<dyn Fn() + Send + Sync>;
type HiddenCallback = Arc<dyn Fn() + Send + Sync>;
type VisibleCallback = Arc<dyn Fn(Duration) + Send + Sync>;

/// Current visibility and when the application was last hidden.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisibilityState {
    pub is_visible: bool,
    /// Set while hidden; cleared on return to foreground.
    pub was_hidden_at: Option<Instant>,
}

/// Tracks visibility transitions and runs refresh callbacks.
pub struct VisibilityCoordinator {
    config: VisibilityConfig,
    state: Mutex<VisibilityState>,
    callbacks: Arc<DashMap<u64, RefreshCallback>>,
    next_id: AtomicU64,
    on_hidden: Option<HiddenCallback>,
    on_visible: Option<VisibleCallback>,
    sender: watch::Sender<bool>,
}

impl VisibilityCoordinator {
    /// Create a coordinator mirroring the current foreground status.
    ///
    /// Starting hidden counts as hidden since construction.
    pub fn new(initially_visible: bool, config: VisibilityConfig) -> Self {
        let (sender, _) = watch::channel(initially_visible);
        VisibilityCoordinator {
            config,
            state: Mutex::new(VisibilityState {
                is_visible: initially_visible,
                was_hidden_at: (!initially_visible).then(Instant::now),
            }),
            callbacks: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            on_hidden: None,
            on_visible: None,
            sender,
        }
    }

    /// Called on every `Visible → Hidden` transition.
    pub fn with_on_hidden<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_hidden = Some(Arc::new(callback));
        self
    }

    /// Called on every `Hidden → Visible` transition with the hidden duration,
    /// whether or not the refresh threshold was exceeded.
    pub fn with_on_visible<F>(mut self, callback: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.on_visible = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }

    pub fn is_visible(&self) -> bool {
        self.lock_state().is_visible
    }

    pub fn state(&self) -> VisibilityState {
        *self.lock_state()
    }

    /// How long the application has been hidden, if it is hidden now.
    pub fn hidden_for(&self) -> Option<Duration> {
        self.lock_state()
            .was_hidden_at
            .map(|at| Instant::now().saturating_duration_since(at))
    }

    /// Report the current foreground status.
    ///
    /// Repeated reports of the same status are ignored.
    pub fn set_visible(&self, visible: bool) {
        let hidden_duration = {
            let mut state = self.lock_state();
            if state.is_visible == visible {
                return;
            }

            let now = Instant::now();
            state.is_visible = visible;
            if visible {
                state
                    .was_hidden_at
                    .take()
                    .map(|at| now.saturating_duration_since(at))
            } else {
                state.was_hidden_at = Some(now);
                None
            }
        };

        self.sender.send_replace(visible);

        if !visible {
            debug!("Visibility: visible → hidden");
            if let Some(on_hidden) = &self.on_hidden {
                on_hidden();
            }
            return;
        }

        let hidden_duration = hidden_duration.unwrap_or_default();
        debug!("Visibility: hidden → visible after {:?}", hidden_duration);

        if let Some(on_visible) = &self.on_visible {
            on_visible(hidden_duration);
        }

        if self.config.auto_refresh && hidden_duration > self.config.refresh_threshold {
            let count = self.trigger_refresh();
            info!(
                "Hidden for {:?} (threshold {:?}), ran {} refresh callback(s)",
                hidden_duration, self.config.refresh_threshold, count
            );
        }
    }

    /// Add a callback run on qualifying returns to the foreground.
    pub fn register_refresh_callback<F>(&self, callback: F) -> RefreshRegistration
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.insert(id, Arc::new(callback));
        RefreshRegistration {
            id,
            callbacks: Arc::downgrade(&self.callbacks),
        }
    }

    /// Run every registered refresh callback now, regardless of visibility.
    ///
    /// Returns the number of callbacks run.
    pub fn trigger_refresh(&self) -> usize {
        // Clone out so callbacks may register or unregister without deadlocking.
        let callbacks: Vec<RefreshCallback> =
            self.callbacks.iter().map(|e| Arc::clone(e.value())).collect();

        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    pub fn registered_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    /// Receiver that observes every reported status change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Drive this coordinator from an external visibility event source.
    ///
    /// The task applies the receiver's current value, then every change,
    /// and ends when the sending side is dropped.
    pub fn listen(self: &Arc<Self>, mut events: watch::Receiver<bool>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let initial = *events.borrow_and_update();
            coordinator.set_visible(initial);

            while events.changed().await.is_ok() {
                let visible = *events.borrow_and_update();
                coordinator.set_visible(visible);
            }
            debug!("Visibility event source closed");
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, VisibilityState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle returned by [`VisibilityCoordinator::register_refresh_callback`].
#[must_use = "dropping the registration keeps the callback registered; call unregister() to remove it"]
pub struct RefreshRegistration {
    id: u64,
    callbacks: Weak<DashMap<u64, RefreshCallback>>,
}

impl RefreshRegistration {
    /// Remove the callback. Returns whether it was still registered.
    pub fn unregister(self) -> bool {
        self.callbacks
            .upgrade()
            .is_some_and(|callbacks| callbacks.remove(&self.id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn coordinator() -> VisibilityCoordinator {
        VisibilityCoordinator::new(
            true,
            VisibilityConfig::default().with_refresh_threshold(Duration::from_millis(30_000)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_absence_does_not_refresh() {
        let coordinator = coordinator();
        let (count, callback) = counter();
        let _registration = coordinator.register_refresh_callback(callback);

        coordinator.set_visible(false);
        tokio::time::advance(Duration::from_millis(20_000)).await;
        coordinator.set_visible(true);

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_absence_refreshes_each_callback_once() {
        let coordinator = coordinator();
        let (first, first_cb) = counter();
        let (second, second_cb) = counter();
        let _a = coordinator.register_refresh_callback(first_cb);
        let _b = coordinator.register_refresh_callback(second_cb);

        coordinator.set_visible(false);
        tokio::time::advance(Duration::from_millis(40_000)).await;
        coordinator.set_visible(true);
        coordinator.set_visible(true);

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_disabled() {
        let coordinator = VisibilityCoordinator::new(
            true,
            VisibilityConfig::default().with_auto_refresh(false),
        );
        let (count, callback) = counter();
        let _registration = coordinator.register_refresh_callback(callback);

        coordinator.set_visible(false);
        tokio::time::advance(Duration::from_secs(120)).await;
        coordinator.set_visible(true);

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_and_visible_hooks() {
        let hidden = Arc::new(AtomicUsize::new(0));
        let shown = Arc::new(Mutex::new(Vec::new()));

        let h = hidden.clone();
        let s = shown.clone();
        let coordinator = coordinator()
            .with_on_hidden(move || {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .with_on_visible(move |d| s.lock().unwrap().push(d));

        coordinator.set_visible(false);
        coordinator.set_visible(false);
        tokio::time::advance(Duration::from_millis(500)).await;
        coordinator.set_visible(true);

        assert_eq!(hidden.load(Ordering::SeqCst), 1);
        assert_eq!(*shown.lock().unwrap(), vec![Duration::from_millis(500)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_tracks_hidden_time() {
        let coordinator = coordinator();
        assert!(coordinator.is_visible());
        assert!(coordinator.hidden_for().is_none());

        coordinator.set_visible(false);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(coordinator.hidden_for(), Some(Duration::from_secs(3)));
        assert!(coordinator.state().was_hidden_at.is_some());

        coordinator.set_visible(true);
        assert!(coordinator.state().was_hidden_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_starting_hidden_counts_from_construction() {
        let coordinator = VisibilityCoordinator::new(false, VisibilityConfig::default());
        let (count, callback) = counter();
        let _registration = coordinator.register_refresh_callback(callback);

        tokio::time::advance(Duration::from_secs(31)).await;
        coordinator.set_visible(true);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister() {
        let coordinator = coordinator();
        let (count, callback) = counter();
        let registration = coordinator.register_refresh_callback(callback);
        assert_eq!(coordinator.registered_callbacks(), 1);

        assert!(registration.unregister());
        assert_eq!(coordinator.registered_callbacks(), 0);
        assert_eq!(coordinator.trigger_refresh(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unregister_after_coordinator_dropped() {
        let coordinator = coordinator();
        let (_count, callback) = counter();
        let registration = coordinator.register_refresh_callback(callback);
        drop(coordinator);
        assert!(!registration.unregister());
    }

    #[test]
    fn test_trigger_refresh_ignores_visibility() {
        let coordinator = VisibilityCoordinator::new(false, VisibilityConfig::default());
        let (count, callback) = counter();
        let _registration = coordinator.register_refresh_callback(callback);

        assert_eq!(coordinator.trigger_refresh(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listen_drives_transitions() {
        let coordinator = Arc::new(coordinator());
        let (count, callback) = counter();
        let _registration = coordinator.register_refresh_callback(callback);

        let (events, rx) = watch::channel(true);
        let handle = coordinator.listen(rx);

        events.send(false).expect("listener alive");
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(!coordinator.is_visible());

        events.send(true).expect("listener alive");
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(coordinator.is_visible());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(events);
        handle.await.expect("listener task");
    }

    #[tokio::test]
    async fn test_subscribe_sees_changes() {
        let coordinator = coordinator();
        let mut rx = coordinator.subscribe();
        assert!(*rx.borrow());

        coordinator.set_visible(false);
        rx.changed().await.expect("sender alive");
        assert!(!*rx.borrow());
    }
}
