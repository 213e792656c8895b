//! Graph actions
//!
//! An action is a pure transformation from one graph to the next. The
//! edit system applies them during `perform`, and transitionable actions
//! additionally render intermediate graphs while an animation eases in.

use std::sync::Arc;

use crate::graph::Graph;
use crate::types::{Entity, EntityId};

/// A pure graph transformation
pub trait EditAction: Send + Sync {
    /// Produce the next graph from `graph`
    fn apply(&self, graph: &Graph) -> Graph;

    /// Whether intermediate states can be rendered while easing in
    fn transitionable(&self) -> bool {
        false
    }

    /// Apply partially, `t` in `[0, 1]`. At `t = 1` the result must
    /// equal `apply`. The default ignores `t`.
    fn apply_eased(&self, graph: &Graph, _t: f64) -> Graph {
        self.apply(graph)
    }
}

impl<F> EditAction for F
where
    F: Fn(&Graph) -> Graph + Send + Sync,
{
    fn apply(&self, graph: &Graph) -> Graph {
        self(graph)
    }
}

/// Insert or overwrite an entity
pub struct AddEntity {
    entity: Arc<Entity>,
}

impl AddEntity {
    /// Action that inserts `entity` under its own id
    pub fn new(entity: Entity) -> Self {
        Self {
            entity: Arc::new(entity),
        }
    }
}

impl EditAction for AddEntity {
    fn apply(&self, graph: &Graph) -> Graph {
        graph.replace_arc(Arc::clone(&self.entity))
    }
}

/// Tombstone an entity
pub struct DeleteEntity {
    id: EntityId,
}

impl DeleteEntity {
    /// Action that tombstones `id`
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self { id: id.into() }
    }
}

impl EditAction for DeleteEntity {
    fn apply(&self, graph: &Graph) -> Graph {
        graph.remove(&self.id)
    }
}

/// Replace an entity's tag set
pub struct UpdateTags {
    id: EntityId,
    tags: std::collections::BTreeMap<String, String>,
}

impl UpdateTags {
    /// Action that replaces the tag set of `id`
    pub fn new(
        id: impl Into<EntityId>,
        tags: std::collections::BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: id.into(),
            tags,
        }
    }
}

impl EditAction for UpdateTags {
    fn apply(&self, graph: &Graph) -> Graph {
        match graph.get(&self.id) {
            Some(entity) => graph.replace(entity.with_tags(self.tags.clone())),
            None => graph.branch(),
        }
    }
}

/// Move a point entity to a new location, with eased interpolation
pub struct MoveNode {
    id: EntityId,
    to: [f64; 2],
}

impl MoveNode {
    /// Action that moves the point `id` to `to`
    pub fn new(id: impl Into<EntityId>, to: [f64; 2]) -> Self {
        Self { id: id.into(), to }
    }
}

impl EditAction for MoveNode {
    fn apply(&self, graph: &Graph) -> Graph {
        match graph.get(&self.id) {
            Some(entity) => graph.replace(entity.moved_to(self.to)),
            None => graph.branch(),
        }
    }

    fn transitionable(&self) -> bool {
        true
    }

    fn apply_eased(&self, graph: &Graph, t: f64) -> Graph {
        let Some(entity) = graph.get(&self.id) else {
            return graph.branch();
        };
        let crate::types::Shape::Point(from) = entity.shape() else {
            return graph.branch();
        };
        let t = t.clamp(0.0, 1.0);
        let loc = [
            from[0] + (self.to[0] - from[0]) * t,
            from[1] + (self.to[1] - from[1]) * t,
        ];
        graph.replace(entity.moved_to(loc))
    }
}
