//! Staged, priority-ordered loading with per-stage state.
//!
//! A view registers several independent stages (workshop details, task
//! list, submission counts, ...). [`StagedLoader::run`] loads them in
//! priority order, either one at a time with an optional pause between
//! stages or all at once, and records each stage's result separately so a
//! slow or failing stage never blocks the others.
//!
//! # Run lifecycle
//!
//! ```text
//! idle ──► loading ──► loaded
//!              │
//!              └─────► error ──(retry_stage / retry_all)──► loading
//! ```
//!
//! Every run is tied to a [`RunToken`]. Starting a new run or calling
//! [`StagedLoader::cancel`] retires the previous token; results that arrive
//! for a retired token are dropped, so a slow loader from an old run can
//! never overwrite a newer result.
//!
//! # Example
//!
//! ```
//! use fetch_kit::staged::{Stage, StagedLoadOptions, StagedLoader};
//!
//! # async fn demo() -> fetch_kit::Result<()> {
//! let loader = StagedLoader::new(
//!     vec![
//!         Stage::new("tasks", 2, || async { Ok::<_, fetch_kit::Error>(12u32) }),
//!         Stage::new("workshop", 1, || async { Ok::<_, fetch_kit::Error>(1u32) }),
//!     ],
//!     StagedLoadOptions::default(),
//! )?;
//!
//! loader.run().await;
//! assert!(loader.is_complete());
//! assert_eq!(loader.progress().percentage, 100);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type StageFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;
type StageCompleteFn<T> = Arc<dyn Fn(&str, &T) + Send + Sync>;
type AllCompleteFn<T> = Arc<dyn Fn(&HashMap<String, T>) + Send + Sync>;

/// One independently loadable unit of data.
pub struct Stage<T> {
    key: String,
    priority: i32,
    loader: StageFn<T>,
    fallback: Option<T>,
}

impl<T: 'static> Stage<T> {
    /// Lower `priority` loads earlier.
    pub fn new<F, Fut>(key: impl Into<String>, priority: i32, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Stage {
            key: key.into(),
            priority,
            loader: Arc::new(move || loader().boxed()),
            fallback: None,
        }
    }

    /// Data shown before the first successful load.
    pub fn with_fallback(mut self, fallback: T) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Coarse status derived from a [`StageState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageStatus {
    Idle,
    Loading,
    Loaded,
    Failed,
}

/// Result state of one stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StageState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<Error>,
    pub loaded: bool,
    /// Bumped each time the stage starts loading; only the latest attempt may settle.
    attempt: u64,
}

impl<T> StageState<T> {
    fn idle(fallback: Option<T>) -> Self {
        StageState {
            data: fallback,
            loading: false,
            error: None,
            loaded: false,
            attempt: 0,
        }
    }

    pub fn status(&self) -> StageStatus {
        if self.loading {
            StageStatus::Loading
        } else if self.loaded {
            StageStatus::Loaded
        } else if self.error.is_some() {
            StageStatus::Failed
        } else {
            StageStatus::Idle
        }
    }
}

/// Aggregate progress, recomputed from stage states on every call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadProgress {
    pub total: usize,
    pub loaded: usize,
    /// True while any stage is loading.
    pub loading: bool,
    pub errors: usize,
    /// `round(100 * loaded / total)`; 0 when there are no stages.
    pub percentage: u32,
}

impl LoadProgress {
    fn from_states<'a, T: 'a>(states: impl Iterator<Item = &'a StageState<T>>) -> Self {
        let mut progress = LoadProgress {
            total: 0,
            loaded: 0,
            loading: false,
            errors: 0,
            percentage: 0,
        };
        for state in states {
            progress.total += 1;
            progress.loaded += usize::from(state.loaded);
            progress.errors += usize::from(state.error.is_some());
            progress.loading |= state.loading;
        }
        if progress.total > 0 {
            progress.percentage =
                (100.0 * progress.loaded as f64 / progress.total as f64).round() as u32;
        }
        progress
    }
}

/// Identifies one run; inactive once a newer run starts or the run is cancelled.
#[derive(Clone, Debug)]
pub struct RunToken {
    id: u64,
    current: Arc<AtomicU64>,
}

impl RunToken {
    pub fn is_active(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.id
    }
}

/// Options for [`StagedLoader`].
pub struct StagedLoadOptions<T> {
    /// Start all stages at once instead of one at a time.
    pub parallel: bool,

    /// Pause between sequential stages. Ignored in parallel mode.
    pub stagger_delay: Duration,

    on_stage_complete: Option<StageCompleteFn<T>>,
    on_all_complete: Option<AllCompleteFn<T>>,
}

impl<T> Default for StagedLoadOptions<T> {
    fn default() -> Self {
        StagedLoadOptions {
            parallel: false,
            stagger_delay: Duration::ZERO,
            on_stage_complete: None,
            on_all_complete: None,
        }
    }
}

impl<T> StagedLoadOptions<T> {
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_stagger_delay(mut self, delay: Duration) -> Self {
        self.stagger_delay = delay;
        self
    }

    /// Called with the stage key and its data after each successful load.
    pub fn on_stage_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &T) + Send + Sync + 'static,
    {
        self.on_stage_complete = Some(Arc::new(callback));
        self
    }

    /// Called once per run when every stage has loaded.
    pub fn on_all_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&HashMap<String, T>) + Send + Sync + 'static,
    {
        self.on_all_complete = Some(Arc::new(callback));
        self
    }
}

/// Priority-ordered loader for a fixed set of stages.
pub struct StagedLoader<T> {
    stages: Vec<Stage<T>>,
    options: StagedLoadOptions<T>,
    states: Mutex<HashMap<String, StageState<T>>>,
    generation: Arc<AtomicU64>,
    /// Generation whose completion was already reported.
    completed: AtomicU64,
}

impl<T> StagedLoader<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Build a loader. Stages are ordered by ascending priority; equal
    /// priorities keep their input order.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if two stages share a key
    pub fn new(mut stages: Vec<Stage<T>>, options: StagedLoadOptions<T>) -> Result<Self> {
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.key.as_str()) {
                return Err(Error::ConfigError(format!(
                    "duplicate stage key: {}",
                    stage.key
                )));
            }
        }

        stages.sort_by_key(|stage| stage.priority);

        let states = stages
            .iter()
            .map(|stage| (stage.key.clone(), StageState::idle(stage.fallback.clone())))
            .collect();

        Ok(StagedLoader {
            stages,
            options,
            states: Mutex::new(states),
            generation: Arc::new(AtomicU64::new(0)),
            completed: AtomicU64::new(0),
        })
    }

    /// Start a new run of every stage, cancelling any run in flight.
    pub async fn run(&self) {
        let token = self.begin_run();
        self.run_with(&token).await;
    }

    /// Cancel the current run and load every stage again from the start.
    pub async fn retry_all(&self) {
        debug!("Retrying all {} stages", self.stages.len());
        self.run().await;
    }

    /// Load a single stage again, leaving the others untouched.
    ///
    /// The retry belongs to the current run: a later `retry_all` or
    /// `cancel` discards its result. An attempt of the same stage that was
    /// already in flight is superseded and its result dropped.
    ///
    /// # Errors
    /// - `Error::ConfigError` if no stage has this key
    /// - `Error::Cancelled` if the run or this attempt was superseded before
    ///   the stage settled
    pub async fn retry_stage(&self, key: &str) -> Result<()> {
        let stage = self
            .stages
            .iter()
            .find(|stage| stage.key == key)
            .ok_or_else(|| Error::ConfigError(format!("unknown stage: {}", key)))?;

        let token = self.current_token();
        if !self.run_stage(stage, &token).await {
            return Err(Error::Cancelled);
        }
        self.report_completion(&token);
        Ok(())
    }

    /// Retire the current run; in-flight results are ignored from now on.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!("Staged run cancelled");
    }

    pub fn current_token(&self) -> RunToken {
        RunToken {
            id: self.generation.load(Ordering::SeqCst),
            current: Arc::clone(&self.generation),
        }
    }

    pub fn progress(&self) -> LoadProgress {
        LoadProgress::from_states(self.lock_states().values())
    }

    /// True when every stage has loaded.
    pub fn is_complete(&self) -> bool {
        self.lock_states().values().all(|state| state.loaded)
    }

    pub fn has_errors(&self) -> bool {
        self.lock_states().values().any(|state| state.error.is_some())
    }

    pub fn stage(&self, key: &str) -> Option<StageState<T>> {
        self.lock_states().get(key).cloned()
    }

    /// Stage states in load order.
    pub fn stages(&self) -> Vec<(String, StageState<T>)> {
        let states = self.lock_states();
        self.stages
            .iter()
            .filter_map(|stage| {
                states
                    .get(&stage.key)
                    .map(|state| (stage.key.clone(), state.clone()))
            })
            .collect()
    }

    /// Data of every loaded stage.
    pub fn data(&self) -> HashMap<String, T> {
        loaded_data(&self.lock_states())
    }

    fn begin_run(&self) -> RunToken {
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RunToken {
            id,
            current: Arc::clone(&self.generation),
        }
    }

    async fn run_with(&self, token: &RunToken) {
        let mode = if self.options.parallel {
            "parallel"
        } else {
            "sequential"
        };
        debug!("» Staged run {} ({} stages, {})", token.id, self.stages.len(), mode);

        if self.options.parallel {
            join_all(self.stages.iter().map(|stage| self.run_stage(stage, token))).await;
        } else {
            for (index, stage) in self.stages.iter().enumerate() {
                if !token.is_active() {
                    break;
                }

                self.run_stage(stage, token).await;

                let is_last = index + 1 == self.stages.len();
                if !is_last && !self.options.stagger_delay.is_zero() {
                    tokio::time::sleep(self.options.stagger_delay).await;
                }
            }
        }

        if token.is_active() {
            let progress = self.progress();
            info!(
                "✓ Staged run {} finished: {}/{} loaded, {} failed",
                token.id, progress.loaded, progress.total, progress.errors
            );
        }
        self.report_completion(token);
    }

    /// Load one stage. Returns whether its result was applied.
    async fn run_stage(&self, stage: &Stage<T>, token: &RunToken) -> bool {
        if !token.is_active() {
            return false;
        }

        let attempt = {
            let mut states = self.lock_states();
            let Some(state) = states.get_mut(&stage.key) else {
                return false;
            };
            state.attempt += 1;
            state.loading = true;
            state.loaded = false;
            state.error = None;
            state.attempt
        };
        debug!("Stage {} (priority {}) loading", stage.key, stage.priority);

        let result = (stage.loader)().await;

        if !token.is_active() {
            debug!("Stage {} result dropped: run {} was superseded", stage.key, token.id);
            return false;
        }

        let loaded = {
            let mut states = self.lock_states();
            let Some(state) = states.get_mut(&stage.key) else {
                return false;
            };
            if state.attempt != attempt {
                debug!("Stage {} attempt {} dropped: a newer attempt started", stage.key, attempt);
                return false;
            }
            state.loading = false;
            match result {
                Ok(data) => {
                    state.data = Some(data.clone());
                    state.error = None;
                    state.loaded = true;
                    Some(data)
                }
                Err(e) => {
                    warn!("Stage {} failed: {}", stage.key, e);
                    state.error = Some(e);
                    state.loaded = false;
                    None
                }
            }
        };

        if let (Some(data), Some(callback)) = (loaded, &self.options.on_stage_complete) {
            callback(&stage.key, &data);
        }
        true
    }

    /// Fire `on_all_complete` once per run when every stage has loaded.
    fn report_completion(&self, token: &RunToken) {
        if !token.is_active() {
            return;
        }

        let data = {
            let states = self.lock_states();
            if !states.values().all(|state| state.loaded) {
                return;
            }
            loaded_data(&states)
        };

        // Stored as id + 1 so the initial 0 means "nothing reported".
        if self.completed.swap(token.id + 1, Ordering::SeqCst) == token.id + 1 {
            return;
        }

        if let Some(callback) = &self.options.on_all_complete {
            callback(&data);
        }
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<String, StageState<T>>> {
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn loaded_data<T: Clone>(states: &HashMap<String, StageState<T>>) -> HashMap<String, T> {
    states
        .iter()
        .filter(|(_, state)| state.loaded)
        .filter_map(|(key, state)| state.data.clone().map(|data| (key.clone(), data)))
        .collect()
}
