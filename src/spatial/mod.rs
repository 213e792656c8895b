//! Uniform-grid spatial index of entity bounding boxes
//!
//! The index tracks the base map's spatial footprint: it is refreshed
//! only when new data is merged into the base layer, not on every edit.
//! Queries resolve hits against a caller-supplied graph, so a feature
//! moved by an uncommitted edit is still found under its last indexed
//! box but comes back with its current value.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::graph::{Graph, Resolution};
use crate::types::{Entity, EntityId, Extent};

/// Grid cell coordinate
type Cell = (i64, i64);

/// Spatial index over entity bounding boxes
#[derive(Debug)]
pub struct SpatialIndex {
    cell_size: f64,
    boxes: HashMap<EntityId, Extent>,
    grid: HashMap<Cell, HashSet<EntityId>>,
}

impl SpatialIndex {
    /// Create an index with the given grid cell size
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            boxes: HashMap::new(),
            grid: HashMap::new(),
        }
    }

    /// Number of indexed entities
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// `true` if nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// `true` if `id` currently has an indexed box
    pub fn contains(&self, id: &EntityId) -> bool {
        self.boxes.contains_key(id)
    }

    /// The indexed box for `id`, if any
    pub fn get_box(&self, id: &EntityId) -> Option<&Extent> {
        self.boxes.get(id)
    }

    fn cell_range(&self, extent: &Extent) -> (Cell, Cell) {
        let lo = (
            (extent.min[0] / self.cell_size).floor() as i64,
            (extent.min[1] / self.cell_size).floor() as i64,
        );
        let hi = (
            (extent.max[0] / self.cell_size).floor() as i64,
            (extent.max[1] / self.cell_size).floor() as i64,
        );
        (lo, hi)
    }

    fn insert(&mut self, id: EntityId, extent: Extent) {
        self.remove(&id);
        let (lo, hi) = self.cell_range(&extent);
        for cx in lo.0..=hi.0 {
            for cy in lo.1..=hi.1 {
                self.grid.entry((cx, cy)).or_default().insert(id.clone());
            }
        }
        self.boxes.insert(id, extent);
    }

    fn remove(&mut self, id: &EntityId) {
        let Some(extent) = self.boxes.remove(id) else {
            return;
        };
        let (lo, hi) = self.cell_range(&extent);
        for cx in lo.0..=hi.0 {
            for cy in lo.1..=hi.1 {
                if let Some(ids) = self.grid.get_mut(&(cx, cy)) {
                    ids.remove(id);
                    if ids.is_empty() {
                        self.grid.remove(&(cx, cy));
                    }
                }
            }
        }
    }

    /// Load newly merged entities into the index.
    ///
    /// Entities already indexed are skipped unless `force` is set.
    /// Entities tombstoned in `graph` stay out of the index. Parents of
    /// an updated entity are re-measured, since their boxes may grow.
    pub fn rebase(&mut self, entities: &[Arc<Entity>], graph: &Graph, force: bool) {
        let mut to_measure: HashMap<EntityId, Arc<Entity>> = HashMap::new();

        for entity in entities {
            if !entity.visible() {
                continue;
            }
            let id = entity.id();
            if matches!(graph.resolve(id), Resolution::Deleted) {
                continue;
            }
            if self.boxes.contains_key(id) && !force {
                continue;
            }
            to_measure.insert(id.clone(), Arc::clone(entity));
            self.include_parents(entity, graph, &mut to_measure, &mut HashSet::new());
        }

        for (id, entity) in to_measure {
            if let Some(extent) = entity.extent(graph) {
                self.insert(id, extent);
            }
        }
    }

    /// Pull already-indexed parents into the measurement set; their
    /// extents may have grown with the new children.
    fn include_parents(
        &self,
        entity: &Arc<Entity>,
        graph: &Graph,
        to_measure: &mut HashMap<EntityId, Arc<Entity>>,
        seen: &mut HashSet<EntityId>,
    ) {
        if !seen.insert(entity.id().clone()) {
            return;
        }

        let mut parents = graph.parent_paths(entity.id());
        parents.extend(graph.parent_groups(entity.id()));
        for parent in parents {
            if self.boxes.contains_key(parent.id()) {
                to_measure.insert(parent.id().clone(), Arc::clone(&parent));
            }
            self.include_parents(&parent, graph, to_measure, seen);
        }
    }

    /// Entities whose indexed box intersects `extent`, resolved to their
    /// current representation in `graph` (tombstoned ids are dropped)
    pub fn intersects(&self, extent: &Extent, graph: &Graph) -> Vec<Arc<Entity>> {
        let (lo, hi) = self.cell_range(extent);
        let mut seen = HashSet::new();
        let mut hits = Vec::new();

        for cx in lo.0..=hi.0 {
            for cy in lo.1..=hi.1 {
                let Some(ids) = self.grid.get(&(cx, cy)) else {
                    continue;
                };
                for id in ids {
                    if !seen.insert(id) {
                        continue;
                    }
                    if self.boxes[id].intersects(extent) {
                        if let Some(entity) = graph.get(id) {
                            hits.push(entity);
                        }
                    }
                }
            }
        }

        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BaseLayer;
    use crate::types::Shape;

    fn setup() -> (Arc<BaseLayer>, Graph, SpatialIndex) {
        let base = Arc::new(BaseLayer::new());
        let graph = Graph::new(Arc::clone(&base));
        (base, graph, SpatialIndex::new(0.05))
    }

    fn merge(base: &BaseLayer, index: &mut SpatialIndex, graph: &Graph, entities: Vec<Entity>) {
        let arcs: Vec<Arc<Entity>> = entities.into_iter().map(Arc::new).collect();
        base.rebase(&arcs, false);
        index.rebase(&arcs, graph, false);
    }

    #[test]
    fn indexes_points_and_ways() {
        let (base, graph, mut index) = setup();
        merge(
            &base,
            &mut index,
            &graph,
            vec![
                Entity::node("n1", [0.0, 0.0]),
                Entity::node("n2", [0.3, 0.3]),
                Entity::way("w1", vec!["n1".into(), "n2".into()]),
            ],
        );

        assert_eq!(index.len(), 3);
        let hits = index.intersects(&Extent::new([-0.1, -0.1], [0.1, 0.1]), &graph);
        let mut ids: Vec<String> = hits.iter().map(|e| e.id().to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["n1", "w1"]); // way box spans both nodes
    }

    #[test]
    fn query_misses_outside_boxes() {
        let (base, graph, mut index) = setup();
        merge(
            &base,
            &mut index,
            &graph,
            vec![Entity::node("n1", [0.0, 0.0])],
        );
        let hits = index.intersects(&Extent::new([10.0, 10.0], [11.0, 11.0]), &graph);
        assert!(hits.is_empty());
    }

    #[test]
    fn rebase_skips_already_seen_without_force() {
        let (base, graph, mut index) = setup();
        merge(
            &base,
            &mut index,
            &graph,
            vec![Entity::node("n1", [0.0, 0.0])],
        );
        let original_box = *index.get_box(&"n1".into()).unwrap();

        // same id at a different location, not forced
        index.rebase(
            &[Arc::new(Entity::node("n1", [5.0, 5.0]))],
            &graph,
            false,
        );
        assert_eq!(index.get_box(&"n1".into()), Some(&original_box));

        index.rebase(&[Arc::new(Entity::node("n1", [5.0, 5.0]))], &graph, true);
        assert_ne!(index.get_box(&"n1".into()), Some(&original_box));
    }

    #[test]
    fn hits_resolve_against_supplied_graph() {
        let (base, graph, mut index) = setup();
        merge(
            &base,
            &mut index,
            &graph,
            vec![Entity::node("n1", [0.0, 0.0])],
        );

        // edit moves the node; the index still holds the old box
        let edited = graph.replace(graph.get(&"n1".into()).unwrap().moved_to([9.0, 9.0]));
        let hits = index.intersects(&Extent::new([-0.1, -0.1], [0.1, 0.1]), &edited);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].shape(), &Shape::Point([9.0, 9.0]));

        // tombstoned entities drop out of results
        let removed = graph.remove(&"n1".into());
        let hits = index.intersects(&Extent::new([-0.1, -0.1], [0.1, 0.1]), &removed);
        assert!(hits.is_empty());
    }

    #[test]
    fn parent_way_box_grows_with_new_children() {
        let (base, graph, mut index) = setup();
        merge(
            &base,
            &mut index,
            &graph,
            vec![
                Entity::node("n1", [0.0, 0.0]),
                Entity::way("w1", vec!["n1".into(), "n2".into()]),
            ],
        );
        // n2 streams in later; w1's box must be re-measured
        merge(
            &base,
            &mut index,
            &graph,
            vec![Entity::node("n2", [1.0, 1.0])],
        );

        let hits = index.intersects(&Extent::new([0.9, 0.9], [1.1, 1.1]), &graph);
        let mut ids: Vec<String> = hits.iter().map(|e| e.id().to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["n2", "w1"]);
    }
}
