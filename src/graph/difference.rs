//! Difference between two graph snapshots
//!
//! A `Difference` captures the created/modified/deleted sets between any
//! two graphs sharing a base layer, plus a per-id before/after record for
//! observers that need fine-grained diffs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::graph::Graph;
use crate::types::{Entity, EntityId};

/// Before/after record for one touched id
#[derive(Debug, Clone)]
pub struct Change {
    /// Resolved value in the `before` graph (`None` = absent or deleted)
    pub before: Option<Arc<Entity>>,
    /// Resolved value in the `after` graph (`None` = absent or deleted)
    pub after: Option<Arc<Entity>>,
}

/// The computed difference between two graph snapshots
#[derive(Debug, Clone, Default)]
pub struct Difference {
    changes: HashMap<EntityId, Change>,
}

impl Difference {
    /// Compute the difference from `before` to `after`.
    ///
    /// The identity law holds: the same graph handle on both sides yields
    /// an empty difference without walking anything.
    pub fn between(before: &Graph, after: &Graph) -> Self {
        if before.same_as(after) {
            return Self::default();
        }

        let mut touched = HashSet::new();
        before.collect_touched(&mut touched);
        after.collect_touched(&mut touched);

        let mut changes = HashMap::new();
        for id in touched {
            let b = before.get(&id);
            let a = after.get(&id);

            match (&b, &a) {
                (None, None) => continue,
                (Some(x), Some(y)) => {
                    if Arc::ptr_eq(x, y) || x == y {
                        continue;
                    }
                }
                _ => {}
            }

            changes.insert(id, Change { before: b, after: a });
        }

        Self { changes }
    }

    /// Per-id before/after records
    pub fn changes(&self) -> &HashMap<EntityId, Change> {
        &self.changes
    }

    /// `true` if nothing changed
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of touched ids
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Entities present in `after` but not in `before`
    pub fn created(&self) -> Vec<Arc<Entity>> {
        self.changes
            .values()
            .filter(|c| c.before.is_none())
            .filter_map(|c| c.after.clone())
            .collect()
    }

    /// Entities present in both with distinct values
    pub fn modified(&self) -> Vec<Arc<Entity>> {
        self.changes
            .values()
            .filter(|c| c.before.is_some() && c.after.is_some())
            .filter_map(|c| c.after.clone())
            .collect()
    }

    /// Entities present in `before` but gone in `after`
    pub fn deleted(&self) -> Vec<Arc<Entity>> {
        self.changes
            .values()
            .filter(|c| c.after.is_none())
            .filter_map(|c| c.before.clone())
            .collect()
    }

    /// `(created, modified, deleted)` counts
    pub fn summary(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for change in self.changes.values() {
            match (&change.before, &change.after) {
                (None, Some(_)) => counts.0 += 1,
                (Some(_), Some(_)) => counts.1 += 1,
                (Some(_), None) => counts.2 += 1,
                (None, None) => {}
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BaseLayer;
    use crate::types::Shape;

    fn root_with(entities: Vec<Entity>) -> Graph {
        let base = Arc::new(BaseLayer::new());
        let arcs: Vec<Arc<Entity>> = entities.into_iter().map(Arc::new).collect();
        base.rebase(&arcs, false);
        Graph::new(base)
    }

    #[test]
    fn identity_is_empty() {
        let g = root_with(vec![Entity::node("n1", [0.0, 0.0])]);
        let diff = Difference::between(&g, &g);
        assert!(diff.is_empty());
    }

    #[test]
    fn clone_of_same_snapshot_is_empty() {
        let g = root_with(vec![Entity::node("n1", [0.0, 0.0])]);
        let h = g.clone();
        assert!(Difference::between(&g, &h).is_empty());
    }

    #[test]
    fn created_modified_deleted() {
        let root = root_with(vec![
            Entity::node("n1", [0.0, 0.0]),
            Entity::node("n2", [1.0, 1.0]),
        ]);

        let head = root
            .replace(Entity::node("n3", [2.0, 2.0]))
            .replace(root.get(&"n1".into()).unwrap().moved_to([5.0, 5.0]))
            .remove(&"n2".into());

        let diff = Difference::between(&root, &head);
        assert_eq!(diff.len(), 3);
        assert_eq!(diff.created().len(), 1);
        assert_eq!(diff.created()[0].id().as_str(), "n3");
        assert_eq!(diff.modified().len(), 1);
        assert_eq!(
            diff.modified()[0].shape(),
            &Shape::Point([5.0, 5.0])
        );
        assert_eq!(diff.deleted().len(), 1);
        assert_eq!(diff.deleted()[0].id().as_str(), "n2");
    }

    #[test]
    fn touched_but_equal_is_not_a_change() {
        let root = root_with(vec![Entity::node("n1", [0.0, 0.0])]);
        // revert produces an overlay entry with the base value
        let head = root
            .replace(root.get(&"n1".into()).unwrap().moved_to([5.0, 5.0]))
            .revert_entity(&"n1".into());
        let diff = Difference::between(&root, &head);
        assert!(diff.is_empty());
    }

    #[test]
    fn reversed_arguments_swap_created_and_deleted() {
        let root = root_with(vec![]);
        let head = root.replace(Entity::node("n1", [0.0, 0.0]));

        let forward = Difference::between(&root, &head);
        let backward = Difference::between(&head, &root);
        assert_eq!(forward.created().len(), 1);
        assert_eq!(backward.deleted().len(), 1);
    }
}
