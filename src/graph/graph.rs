//! Copy-on-write overlay chain over the shared base layer
//!
//! A `Graph` is a persistent snapshot of all entities: an optional parent
//! graph plus a local overlay mapping entity id to an entity value or a
//! tombstone. Resolution walks the overlay chain from the graph toward
//! the root until a defined entry is found, then falls back to the shared
//! base layer. Overlays are frozen at construction; only the base layer
//! ever mutates (via rebase), and all graphs in a chain observe that
//! growth immediately.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::error::GraphError;
use crate::graph::BaseLayer;
use crate::types::{Entity, EntityId, EntityKind};

/// Overlay entry: `None` is a tombstone ("deleted at this layer")
pub type OverlayEntry = Option<Arc<Entity>>;

/// Result of resolving an id against a graph, for callers that must
/// distinguish a tombstone from an id the graph has never seen
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Entity is live in this graph
    Live(Arc<Entity>),
    /// Entity is tombstoned somewhere in the overlay chain
    Deleted,
    /// No overlay entry and not in the base layer
    Absent,
}

struct GraphCore {
    base: Arc<BaseLayer>,
    parent: Option<Graph>,
    overlay: HashMap<EntityId, OverlayEntry>,
}

/// A persistent snapshot of all entities (cheap to clone)
#[derive(Clone)]
pub struct Graph {
    core: Arc<GraphCore>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("depth", &self.depth())
            .field("overlay_len", &self.core.overlay.len())
            .finish()
    }
}

impl Graph {
    /// Create a root graph over the given base layer
    pub fn new(base: Arc<BaseLayer>) -> Self {
        Self {
            core: Arc::new(GraphCore {
                base,
                parent: None,
                overlay: HashMap::new(),
            }),
        }
    }

    /// The shared base layer
    pub fn base(&self) -> &Arc<BaseLayer> {
        &self.core.base
    }

    /// `true` if this is the root graph (no parent)
    pub fn is_root(&self) -> bool {
        self.core.parent.is_none()
    }

    /// `true` if both handles refer to the same snapshot
    pub fn same_as(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// Number of overlay layers above the root
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = &self.core;
        while let Some(parent) = &cur.parent {
            depth += 1;
            cur = &parent.core;
        }
        depth
    }

    /// First overlay entry for `id` walking the chain toward the root
    fn local_entry(&self, id: &EntityId) -> Option<&OverlayEntry> {
        let mut cur = &self.core;
        loop {
            if let Some(entry) = cur.overlay.get(id) {
                return Some(entry);
            }
            match &cur.parent {
                Some(parent) => cur = &parent.core,
                None => return None,
            }
        }
    }

    /// Resolve `id`, distinguishing live, tombstoned and never-seen
    pub fn resolve(&self, id: &EntityId) -> Resolution {
        match self.local_entry(id) {
            Some(Some(entity)) => Resolution::Live(Arc::clone(entity)),
            Some(None) => Resolution::Deleted,
            None => match self.core.base.get(id) {
                Some(entity) => Resolution::Live(entity),
                None => Resolution::Absent,
            },
        }
    }

    /// Resolve `id` to a live entity; tombstoned or absent yields `None`
    pub fn get(&self, id: &EntityId) -> Option<Arc<Entity>> {
        match self.resolve(id) {
            Resolution::Live(entity) => Some(entity),
            _ => None,
        }
    }

    /// Resolve `id` to a live entity, failing if tombstoned or absent
    pub fn entity(&self, id: &EntityId) -> Result<Arc<Entity>, GraphError> {
        self.get(id)
            .ok_or_else(|| GraphError::EntityNotFound { id: id.clone() })
    }

    // -- derivation (never touches `self`) --------------------------------

    /// A new graph whose parent is `self` and whose overlay is exactly
    /// the given map
    pub fn load(&self, overlay: HashMap<EntityId, OverlayEntry>) -> Graph {
        Graph {
            core: Arc::new(GraphCore {
                base: Arc::clone(&self.core.base),
                parent: Some(self.clone()),
                overlay,
            }),
        }
    }

    /// A new graph with an empty overlay (fresh work-in-progress layer)
    pub fn branch(&self) -> Graph {
        self.load(HashMap::new())
    }

    /// A new graph in which `entity` replaces (or creates) its id
    pub fn replace(&self, entity: Entity) -> Graph {
        self.replace_arc(Arc::new(entity))
    }

    /// `replace` for an already-shared entity
    pub fn replace_arc(&self, entity: Arc<Entity>) -> Graph {
        let mut overlay = HashMap::with_capacity(1);
        overlay.insert(entity.id().clone(), Some(entity));
        self.load(overlay)
    }

    /// A new graph in which `id` is tombstoned; no-op if already gone
    pub fn remove(&self, id: &EntityId) -> Graph {
        if self.get(id).is_none() {
            return self.clone();
        }
        let mut overlay = HashMap::with_capacity(1);
        overlay.insert(id.clone(), None);
        self.load(overlay)
    }

    /// A new graph in which `id` resolves back to its base value
    pub fn revert_entity(&self, id: &EntityId) -> Graph {
        let mut overlay = HashMap::with_capacity(1);
        overlay.insert(id.clone(), self.core.base.get(id));
        self.load(overlay)
    }

    // -- chain inspection --------------------------------------------------

    /// Collect every id with an overlay entry anywhere in the chain
    pub fn collect_touched(&self, out: &mut HashSet<EntityId>) {
        let mut cur = &self.core;
        loop {
            out.extend(cur.overlay.keys().cloned());
            match &cur.parent {
                Some(parent) => cur = &parent.core,
                None => return,
            }
        }
    }

    /// Flatten the overlay chain into one map, nearest layer winning.
    /// The result is this graph's full delta relative to the base layer.
    pub fn flattened_overlay(&self) -> HashMap<EntityId, OverlayEntry> {
        let mut flat: HashMap<EntityId, OverlayEntry> = HashMap::new();
        let mut cur = &self.core;
        loop {
            for (id, entry) in &cur.overlay {
                flat.entry(id.clone()).or_insert_with(|| entry.clone());
            }
            match &cur.parent {
                Some(parent) => cur = &parent.core,
                None => return flat,
            }
        }
    }

    /// Flatten the overlay layers strictly below `ancestor`, nearest
    /// layer winning. When `ancestor` is not in the chain this equals
    /// `flattened_overlay`.
    pub fn overlay_since(&self, ancestor: &Graph) -> HashMap<EntityId, OverlayEntry> {
        let mut flat: HashMap<EntityId, OverlayEntry> = HashMap::new();
        let mut cur = &self.core;
        loop {
            if Arc::ptr_eq(cur, &ancestor.core) {
                return flat;
            }
            for (id, entry) in &cur.overlay {
                flat.entry(id.clone()).or_insert_with(|| entry.clone());
            }
            match &cur.parent {
                Some(parent) => cur = &parent.core,
                None => return flat,
            }
        }
    }

    // -- parent queries ----------------------------------------------------

    /// All live ways whose node list contains `id`, correct against this
    /// graph's resolved entity set
    pub fn parent_paths(&self, id: &EntityId) -> Vec<Arc<Entity>> {
        self.parents_of(id, EntityKind::Way)
    }

    /// All live relations whose member list contains `id`, correct
    /// against this graph's resolved entity set
    pub fn parent_groups(&self, id: &EntityId) -> Vec<Arc<Entity>> {
        self.parents_of(id, EntityKind::Relation)
    }

    /// Candidates come from two places: entities edited anywhere in the
    /// overlay chain (nearest layer wins), and the base back-reference
    /// index for ids with no chain entry. Each candidate is verified
    /// against its resolved value, which handles removals, tombstones
    /// and base growth after a rebase without any descendant patching.
    fn parents_of(&self, child: &EntityId, kind: EntityKind) -> Vec<Arc<Entity>> {
        let mut parents = Vec::new();
        let mut seen: HashSet<&EntityId> = HashSet::new();

        let mut cur = &self.core;
        loop {
            for (id, entry) in &cur.overlay {
                if seen.insert(id) {
                    if let Some(entity) = entry {
                        if entity.kind() == kind && entity.references(child) {
                            parents.push(Arc::clone(entity));
                        }
                    }
                }
            }
            match &cur.parent {
                Some(parent) => cur = &parent.core,
                None => break,
            }
        }

        let base_candidates = match kind {
            EntityKind::Way => self.core.base.parent_path_ids(child),
            EntityKind::Relation => self.core.base.parent_group_ids(child),
            EntityKind::Node => return parents,
        };
        for id in base_candidates {
            if !seen.contains(&id) {
                if let Some(entity) = self.core.base.get(&id) {
                    parents.push(entity);
                }
            }
        }

        parents
    }

    /// Resolved child entities of `entity`, skipping unresolvable refs
    pub fn child_entities(&self, entity: &Entity) -> Vec<Arc<Entity>> {
        entity
            .child_refs()
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect()
    }
}
