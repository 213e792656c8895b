//! Backup persistence primitives
//!
//! The edit system treats durable storage as an opaque string-keyed blob
//! store plus a process-wide session lock that keeps concurrent sessions
//! from clobbering each other's backups.

pub mod backup;

use std::collections::HashSet;
use std::path::PathBuf;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::core::error::Result;

/// Opaque string-keyed blob storage
pub trait BlobStore: Send + Sync {
    /// Read the value stored under `key`, if any
    fn get_item(&self, key: &str) -> Option<String>;

    /// Write `value` under `key`, replacing any existing value
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Delete the value under `key`, if any
    fn remove_item(&self, key: &str);
}

/// In-memory blob store
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    items: DashMap<String, String>,
}

impl MemoryBlobStore {
    /// An empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).map(|v| v.clone())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        self.items.remove(key);
    }
}

/// Blob store backed by one file per key under a data directory
#[derive(Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // keys are lock/prefix identifiers, never arbitrary paths
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl BlobStore for FileBlobStore {
    fn get_item(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}

static SESSION_LOCKS: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Process-wide named single-writer lock.
///
/// At most one live `SessionMutex` exists per name; backup writes are
/// gated on holding it. The lock releases on drop.
#[derive(Debug)]
pub struct SessionMutex {
    name: String,
}

impl SessionMutex {
    /// Try to take the named lock. `None` if another session holds it.
    pub fn acquire(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let mut locks = SESSION_LOCKS.lock();
        if locks.insert(name.clone()) {
            Some(Self { name })
        } else {
            None
        }
    }

    /// The lock's name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SessionMutex {
    fn drop(&mut self) {
        SESSION_LOCKS.lock().remove(&self.name);
    }
}
