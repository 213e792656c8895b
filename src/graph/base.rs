//! Shared base layer of the graph chain
//!
//! The base layer holds the fully-resolved upstream map state. It grows
//! monotonically as data streams in from the remote source; `rebase` is
//! the only writer. Every [`Graph`](crate::graph::Graph) in a chain
//! shares one base layer, so freshly merged data is visible to all
//! snapshots without touching their overlays.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::types::{Entity, EntityId, EntityKind};

/// Shared, monotonically growing root layer
#[derive(Debug, Default)]
pub struct BaseLayer {
    entities: DashMap<EntityId, Arc<Entity>>,
    /// Back-references: child node id -> way ids containing it
    parent_paths: DashMap<EntityId, HashSet<EntityId>>,
    /// Back-references: member id -> relation ids containing it
    parent_groups: DashMap<EntityId, HashSet<EntityId>>,
}

impl BaseLayer {
    /// Create an empty base layer
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a base entity
    pub fn get(&self, id: &EntityId) -> Option<Arc<Entity>> {
        self.entities.get(id).map(|e| Arc::clone(e.value()))
    }

    /// `true` if the base layer has seen this id
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Number of entities in the base layer
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// `true` if no entities have been merged yet
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Way ids whose node list contains `id`, per the base index
    pub fn parent_path_ids(&self, id: &EntityId) -> HashSet<EntityId> {
        self.parent_paths
            .get(id)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Relation ids whose member list contains `id`, per the base index
    pub fn parent_group_ids(&self, id: &EntityId) -> HashSet<EntityId> {
        self.parent_groups
            .get(id)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Merge entities into the base layer.
    ///
    /// Invisible entities are skipped. An id already present is left
    /// alone unless `force` is set (used when restoring a backup, where
    /// the preserved originals must win over whatever was re-fetched).
    /// Descendant overlays are never touched: their local edits keep
    /// shadowing the base, which is what makes this safe to call with
    /// edits in flight.
    pub fn rebase(&self, entities: &[Arc<Entity>], force: bool) {
        for entity in entities {
            if !entity.visible() {
                continue;
            }
            let id = entity.id().clone();
            if !force && self.entities.contains_key(&id) {
                continue;
            }

            if let Some(previous) = self.entities.insert(id, Arc::clone(entity)) {
                self.unindex(&previous);
            }
            self.index(entity);
        }
    }

    fn index(&self, entity: &Arc<Entity>) {
        let index = match entity.kind() {
            EntityKind::Way => &self.parent_paths,
            EntityKind::Relation => &self.parent_groups,
            EntityKind::Node => return,
        };
        for child in entity.child_refs() {
            index
                .entry(child.clone())
                .or_default()
                .insert(entity.id().clone());
        }
    }

    fn unindex(&self, entity: &Arc<Entity>) {
        let index = match entity.kind() {
            EntityKind::Way => &self.parent_paths,
            EntityKind::Relation => &self.parent_groups,
            EntityKind::Node => return,
        };
        for child in entity.child_refs() {
            if let Some(mut parents) = index.get_mut(child) {
                parents.remove(entity.id());
            }
        }
    }
}
