#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use cartograph::actions::EditAction;
use cartograph::core::{EngineConfig, SourceError};
use cartograph::edit::EditSystem;
use cartograph::source::{BoxFuture, EntitySource, RenderControl};
use cartograph::storage::{BlobStore, MemoryBlobStore};
use cartograph::types::{Entity, EntityId};
use cartograph::Result;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A config with a unique origin and lock name, so parallel tests never
/// contend for the same session lock or backup key
pub fn unique_config() -> EngineConfig {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut config = EngineConfig::default();
    config.backup.origin = format!("test{}", n);
    config.backup.lock_name = format!("test_lock_{}", n);
    config
}

/// Box an action for `perform`
pub fn act(action: impl EditAction + 'static) -> Box<dyn EditAction> {
    Box::new(action)
}

/// Entity source backed by an in-memory version table
#[derive(Default)]
pub struct MockSource {
    versions: Mutex<HashMap<EntityId, Vec<Entity>>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one version of an entity; the highest registered
    /// version is what `fetch_entities` hands out
    pub fn put(&self, entity: Entity) {
        let mut versions = self.versions.lock();
        let list = versions.entry(entity.id().clone()).or_default();
        list.push(entity);
        list.sort_by_key(|e| e.version());
    }
}

impl EntitySource for MockSource {
    fn fetch_entities<'a>(&'a self, ids: &'a [EntityId]) -> BoxFuture<'a, Result<Vec<Entity>>> {
        Box::pin(async move {
            let versions = self.versions.lock();
            Ok(ids
                .iter()
                .filter_map(|id| versions.get(id).and_then(|list| list.last()).cloned())
                .collect())
        })
    }

    fn fetch_entity_version<'a>(
        &'a self,
        id: &'a EntityId,
        version: u32,
    ) -> BoxFuture<'a, Result<Entity>> {
        Box::pin(async move {
            let versions = self.versions.lock();
            versions
                .get(id)
                .and_then(|list| list.iter().find(|e| e.version() == version))
                .cloned()
                .ok_or_else(|| SourceError::Fetch(format!("no version {} of {}", version, id)).into())
        })
    }
}

/// Blob store whose writes can be made to fail on demand
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryBlobStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl BlobStore for FlakyStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
        }
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) {
        self.inner.remove_item(key);
    }
}

/// Render control that counts pause/resume calls
#[derive(Default)]
pub struct CountingRender {
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
}

impl RenderControl for CountingRender {
    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A system over a fresh memory store and empty mock source
pub fn system() -> (EditSystem, Arc<MemoryBlobStore>, Arc<MockSource>) {
    let store = Arc::new(MemoryBlobStore::new());
    let source = Arc::new(MockSource::new());
    let system = EditSystem::builder()
        .config(unique_config())
        .blob_store(store.clone())
        .entity_source(source.clone())
        .build()
        .expect("system builds");
    (system, store, source)
}
