//! Snapshot storage for cache persistence.
//!
//! The cache writes its whole key→entry map through a [`SnapshotStore`]
//! after every mutation and reads it back once at construction. Storage is
//! best-effort: the cache logs failures and keeps working in memory.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "file-store")]
pub mod file;
pub mod memory;

#[cfg(feature = "file-store")]
pub use file::FileStore;
pub use memory::InMemoryStore;

/// Persisted form of a single cache entry.
///
/// Layout: `{ "data": <json>, "createdAt": <ms epoch>, "ttl": <ms> }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry {
    pub data: serde_json::Value,
    pub created_at: u64,
    pub ttl: u64,
}

/// Full persisted cache: key → entry.
pub type Snapshot = HashMap<String, PersistedEntry>;

/// Trait for snapshot storage implementations.
///
/// Implementations: [`NoopStore`] (default), [`InMemoryStore`] (tests),
/// [`FileStore`] (session-scoped JSON file).
///
/// Methods take `&self`; implementations use interior mutability.
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot.
    ///
    /// # Returns
    /// - `Ok(Some(snapshot))` - A snapshot was found and parsed
    /// - `Ok(None)` - Nothing saved yet
    ///
    /// # Errors
    /// Returns `Err` if the storage is unreadable or holds an unparseable snapshot
    fn load_snapshot(&self) -> Result<Option<Snapshot>>;

    /// Replace the saved snapshot.
    ///
    /// # Errors
    /// Returns `Err` on serialization failure, quota or I/O error
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Remove the saved snapshot entirely.
    ///
    /// # Errors
    /// Returns `Err` if the storage is unavailable
    fn remove_snapshot(&self) -> Result<()>;
}

/// Store that persists nothing.
#[derive(Clone, Debug, Default)]
pub struct NoopStore;

impl SnapshotStore for NoopStore {
    fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        Ok(None)
    }

    fn save_snapshot(&self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }

    fn remove_snapshot(&self) -> Result<()> {
        Ok(())
    }
}
