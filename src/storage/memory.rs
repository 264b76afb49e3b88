//! In-memory snapshot store.
//!
//! Holds the serialized snapshot as a JSON string, the same way a browser
//! session store would, so tests exercise the real encode/decode path.
//! Can be switched into a failing mode to simulate quota errors.

use super::{Snapshot, SnapshotStore};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Thread-safe in-memory snapshot store.
///
/// Cloning shares the underlying slot, so a test can keep one handle while
/// the cache owns another.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    slot: Arc<Mutex<Option<String>>>,
    failing: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with raw snapshot text.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        let store = Self::default();
        *store.lock() = Some(raw.into());
        store
    }

    /// Make every subsequent operation fail with `StorageError`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Raw snapshot text, if any.
    pub fn raw(&self) -> Option<String> {
        self.lock().clone()
    }

    /// Number of successful `save_snapshot` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::StorageError("storage quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl SnapshotStore for InMemoryStore {
    fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        self.check()?;
        match self.lock().as_deref() {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.check()?;
        let raw = serde_json::to_string(snapshot)?;
        *self.lock() = Some(raw);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove_snapshot(&self) -> Result<()> {
        self.check()?;
        *self.lock() = None;
        Ok(())
    }
}
