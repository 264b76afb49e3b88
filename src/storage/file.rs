//! JSON file snapshot store.
//!
//! Stands in for browser session storage: one file per session, written
//! atomically through a sibling temp file and a rename.

use super::{Snapshot, SnapshotStore};
use crate::error::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Snapshot store backed by a single JSON file.
///
/// # Example
///
/// ```no_run
/// use fetch_kit::cache::TtlCache;
/// use fetch_kit::config::CacheConfig;
/// use fetch_kit::storage::FileStore;
///
/// let store = FileStore::new(std::env::temp_dir().join("session-cache.json"));
/// let cache = TtlCache::with_store(CacheConfig::default().with_persist(true), store)?;
/// # Ok::<(), fetch_kit::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl SnapshotStore for FileStore {
    fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let raw = serde_json::to_vec(snapshot)?;
        let tmp = self.temp_path();
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        debug!("✓ FileStore SAVE {} entries -> {}", snapshot.len(), self.path.display());
        Ok(())
    }

    fn remove_snapshot(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
