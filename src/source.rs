//! Data source trait for abstracting remote fetches.
//!
//! A [`DataSource`] is whatever produces fresh data for a view: a call to
//! the hosted backend, a query over workshops or submissions, a test fake.
//! Any `Fn() -> impl Future<Output = Result<T>>` closure is a data source.
//!
//! ```
//! use fetch_kit::source::DataSource;
//!
//! # async fn demo() -> fetch_kit::Result<()> {
//! let source = || async { Ok::<_, fetch_kit::Error>(vec!["workshop-1".to_string()]) };
//! let workshops = source.fetch().await?;
//! assert_eq!(workshops.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Trait for fetching fresh data.
///
/// The returned future is `Send` so fetches can run on spawned tasks.
pub trait DataSource<T>: Send + Sync {
    /// Fetch the current value from the source of truth.
    ///
    /// # Errors
    /// Returns `Err` if the remote call fails
    fn fetch(&self) -> impl Future<Output = Result<T>> + Send;
}

impl<T, F, Fut> DataSource<T> for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
{
    fn fetch(&self) -> impl Future<Output = Result<T>> + Send {
        self()
    }
}

/// Scripted data source for tests.
///
/// Returns queued results in order, then repeats the last one. Counts calls.
pub struct ScriptedSource<T: Clone> {
    responses: Mutex<Vec<Result<T>>>,
    calls: AtomicUsize,
}

impl<T: Clone + Send> ScriptedSource<T> {
    pub fn new(responses: Vec<Result<T>>) -> Self {
        ScriptedSource {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always return `value`.
    pub fn always(value: T) -> Self {
        Self::new(vec![Ok(value)])
    }

    /// Number of `fetch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Replace the queued responses.
    pub fn set_responses(&self, responses: Vec<Result<T>>) {
        *self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = responses;
    }
}

impl<T: Clone + Send> DataSource<T> for ScriptedSource<T> {
    async fn fetch(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match responses.len() {
            0 => Err(crate::error::Error::FetchError(
                "no scripted response".to_string(),
            )),
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }
}
