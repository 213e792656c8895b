//! Collaborator traits for backup recovery
//!
//! Restoring a backup needs two outside parties: an [`EntitySource`]
//! that can fetch entities the blob references but does not carry, and
//! a [`RenderControl`] that can hold rendering still while the history
//! is rebuilt. Both are object-safe so the edit system can hold them
//! behind `Arc<dyn _>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::core::error::Result;
use crate::types::{Entity, EntityId};

/// Boxed future alias for the object-safe async methods below
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote provider of entity data
pub trait EntitySource: Send + Sync {
    /// Fetch the current version of each requested entity. Unknown ids
    /// may simply be absent from the result.
    fn fetch_entities<'a>(&'a self, ids: &'a [EntityId]) -> BoxFuture<'a, Result<Vec<Entity>>>;

    /// Fetch one specific version of an entity
    fn fetch_entity_version<'a>(
        &'a self,
        id: &'a EntityId,
        version: u32,
    ) -> BoxFuture<'a, Result<Entity>>;
}

/// Rendering pause/resume hooks honored during restore
pub trait RenderControl: Send + Sync {
    /// Stop drawing until [`resume`](Self::resume) is called
    fn pause(&self);
    /// Resume drawing after a pause
    fn resume(&self);
}

/// A render control that does nothing, for headless use
#[derive(Debug, Default)]
pub struct NoopRender;

impl RenderControl for NoopRender {
    fn pause(&self) {}
    fn resume(&self) {}
}

/// Pauses rendering on creation, resumes on drop.
///
/// Resumption happens on every exit path, success or failure.
pub struct RenderPauseGuard {
    render: Arc<dyn RenderControl>,
}

impl RenderPauseGuard {
    /// Pause the given renderer until the guard is dropped
    pub fn new(render: Arc<dyn RenderControl>) -> Self {
        render.pause();
        Self { render }
    }
}

impl Drop for RenderPauseGuard {
    fn drop(&mut self) {
        self.render.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Default)]
    struct CountingRender {
        depth: AtomicI32,
    }

    impl RenderControl for CountingRender {
        fn pause(&self) {
            self.depth.fetch_add(1, Ordering::SeqCst);
        }
        fn resume(&self) {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn guard_resumes_on_drop() {
        let render = Arc::new(CountingRender::default());
        {
            let _guard = RenderPauseGuard::new(render.clone());
            assert_eq!(render.depth.load(Ordering::SeqCst), 1);
        }
        assert_eq!(render.depth.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn guard_resumes_on_unwind() {
        let render = Arc::new(CountingRender::default());
        let cloned = render.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = RenderPauseGuard::new(cloned);
            panic!("restore failed");
        });
        assert!(result.is_err());
        assert_eq!(render.depth.load(Ordering::SeqCst), 0);
    }
}
