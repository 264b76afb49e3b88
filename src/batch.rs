//! Batch administrative operations with progress tracking.
//!
//! Bulk update, cancel/reschedule and import all follow the same shape:
//! apply one async operation to many items, keep going when an item fails,
//! and show progress while it runs. [`BatchRunner`] does that with bounded
//! concurrency and reports which items succeeded, failed or were skipped.
//!
//! ```
//! use fetch_kit::batch::BatchRunner;
//! use fetch_kit::config::BatchOptions;
//!
//! # async fn demo() -> fetch_kit::Result<()> {
//! let runner = BatchRunner::new(BatchOptions::default().with_concurrency(2))?;
//! let report = runner
//!     .run(vec!["w1", "w2", "w3"], |id| async move {
//!         if id == "w2" {
//!             Err(fetch_kit::Error::FetchError("workshop is locked".to_string()))
//!         } else {
//!             Ok(())
//!         }
//!     })
//!     .await;
//!
//! assert_eq!(report.succeeded.len(), 2);
//! assert_eq!(report.failed.len(), 1);
//! assert_eq!(runner.progress().percentage, 100);
//! # Ok(())
//! # }
//! ```

use crate::config::BatchOptions;
use crate::error::{Error, Result};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type ProgressFn = Arc<dyn Fn(BatchProgress) + Send + Sync>;

/// Progress of the current (or last) batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `round(100 * processed / total)`; 0 for an empty batch.
    pub percentage: u32,
}

impl BatchProgress {
    fn start(total: usize) -> Self {
        BatchProgress {
            total,
            ..Default::default()
        }
    }

    fn record(&mut self, ok: bool) {
        self.processed += 1;
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if self.total > 0 {
            self.percentage = (100.0 * self.processed as f64 / self.total as f64).round() as u32;
        }
    }
}

/// Outcome of a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchReport<I> {
    pub succeeded: Vec<I>,
    pub failed: Vec<(I, Error)>,
    /// Items never started because the batch was cancelled.
    pub skipped: Vec<I>,
    pub cancelled: bool,
}

impl<I> BatchReport<I> {
    fn new() -> Self {
        BatchReport {
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            cancelled: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Runs one async operation over a batch of items.
pub struct BatchRunner {
    options: BatchOptions,
    progress: Mutex<BatchProgress>,
    cancelled: AtomicBool,
    on_progress: Option<ProgressFn>,
}

impl BatchRunner {
    /// # Errors
    /// Returns `Error::ConfigError` if `options.concurrency` is zero
    pub fn new(options: BatchOptions) -> Result<Self> {
        options.validate()?;
        Ok(BatchRunner {
            options,
            progress: Mutex::new(BatchProgress::default()),
            cancelled: AtomicBool::new(false),
            on_progress: None,
        })
    }

    /// Called with the updated progress after every finished item.
    pub fn with_on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(BatchProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn progress(&self) -> BatchProgress {
        *self.lock_progress()
    }

    /// Stop starting new items. Items already in flight still finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Apply `operation` to every item, at most `concurrency` at a time.
    ///
    /// A failed item is recorded and the batch continues, unless
    /// `stop_on_error` is set. Finished items are reported in completion
    /// order.
    pub async fn run<I, F, Fut>(&self, items: Vec<I>, operation: F) -> BatchReport<I>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.cancelled.store(false, Ordering::SeqCst);
        *self.lock_progress() = BatchProgress::start(items.len());
        info!(
            "» Batch of {} item(s) (concurrency {})",
            items.len(),
            self.options.concurrency
        );

        let operation = &operation;
        let mut outcomes = stream::iter(items.into_iter().map(|item| async move {
            if self.is_cancelled() {
                return (item, None);
            }
            let result = operation(item.clone()).await;
            (item, Some(result))
        }))
        .buffer_unordered(self.options.concurrency);

        let mut report = BatchReport::new();
        while let Some((item, outcome)) = outcomes.next().await {
            let ok = match outcome {
                None => {
                    report.skipped.push(item);
                    continue;
                }
                Some(Ok(())) => {
                    report.succeeded.push(item);
                    true
                }
                Some(Err(e)) => {
                    warn!("Batch item failed: {}", e);
                    if self.options.stop_on_error {
                        self.cancel();
                    }
                    report.failed.push((item, e));
                    false
                }
            };

            let progress = {
                let mut progress = self.lock_progress();
                progress.record(ok);
                *progress
            };
            if let Some(callback) = &self.on_progress {
                callback(progress);
            }
        }

        report.cancelled = self.is_cancelled();
        info!(
            "✓ Batch finished: {} succeeded, {} failed, {} skipped",
            report.succeeded.len(),
            report.failed.len(),
            report.skipped.len()
        );
        report
    }

    fn lock_progress(&self) -> MutexGuard<'_, BatchProgress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
