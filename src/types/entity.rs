//! The map feature value type
//!
//! Entities are treated as immutable values: "editing" an entity means
//! producing a new value with a bumped revision, never mutating a shared
//! one in place. The single sanctioned exception is [`Entity::touch`],
//! used when a merge makes a group member newly resolvable and observers
//! need to see the parent as changed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::graph::Graph;
use crate::types::{EntityId, Extent};

/// The kind of a map feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A single located point
    Node,
    /// An ordered sequence of node references
    Way,
    /// An ordered group of member references with roles
    Relation,
}

/// A relation member: a referenced entity plus its role within the group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Referenced entity id
    pub id: EntityId,
    /// Role of the member within the group (may be empty)
    #[serde(default)]
    pub role: String,
}

/// Geometry payload of an entity, determining its kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// A point location `[lon, lat]`
    Point([f64; 2]),
    /// Ordered child node references
    Path(Vec<EntityId>),
    /// Ordered members with roles
    Group(Vec<Member>),
}

/// An immutable map feature
#[derive(Debug, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    shape: Shape,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    /// Upstream version number assigned by the remote source
    #[serde(default)]
    version: u32,
    /// `false` means the upstream source has deleted this entity
    #[serde(default = "default_visible")]
    visible: bool,
    /// Internal revision counter, bumped on every derived copy
    #[serde(default)]
    revision: AtomicU32,
}

fn default_visible() -> bool {
    true
}

impl Clone for Entity {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            shape: self.shape.clone(),
            tags: self.tags.clone(),
            version: self.version,
            visible: self.visible,
            revision: AtomicU32::new(self.revision.load(Ordering::Relaxed)),
        }
    }
}

// Revision is deliberately excluded: two values that differ only in
// revision render and serialize upstream identically.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.shape == other.shape
            && self.tags == other.tags
            && self.version == other.version
            && self.visible == other.visible
    }
}

impl Entity {
    /// Create a node at the given location
    pub fn node(id: impl Into<EntityId>, loc: [f64; 2]) -> Self {
        Self::with_shape(id, Shape::Point(loc))
    }

    /// Create a way over the given child nodes
    pub fn way(id: impl Into<EntityId>, nodes: Vec<EntityId>) -> Self {
        Self::with_shape(id, Shape::Path(nodes))
    }

    /// Create a relation over the given members
    pub fn relation(id: impl Into<EntityId>, members: Vec<Member>) -> Self {
        Self::with_shape(id, Shape::Group(members))
    }

    fn with_shape(id: impl Into<EntityId>, shape: Shape) -> Self {
        Self {
            id: id.into(),
            shape,
            tags: BTreeMap::new(),
            version: 0,
            visible: true,
            revision: AtomicU32::new(0),
        }
    }

    /// Entity id
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Geometry payload
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Key/value tags
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Upstream version number
    pub fn version(&self) -> u32 {
        self.version
    }

    /// `false` if deleted upstream
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Current internal revision
    pub fn revision(&self) -> u32 {
        self.revision.load(Ordering::Relaxed)
    }

    /// The kind implied by the shape
    pub fn kind(&self) -> EntityKind {
        match self.shape {
            Shape::Point(_) => EntityKind::Node,
            Shape::Path(_) => EntityKind::Way,
            Shape::Group(_) => EntityKind::Relation,
        }
    }

    /// Composite id + revision key, used to index distinct revisions of
    /// the same entity within a serialized backup
    pub fn key(&self) -> String {
        format!("{}v{}", self.id, self.revision())
    }

    /// Bump the internal revision in place.
    ///
    /// This is the single sanctioned mutation of a shared entity value.
    /// It is only called from merge, when a group gains a newly
    /// resolvable member and observers must see the parent as changed.
    pub fn touch(&self) {
        self.revision.fetch_add(1, Ordering::Relaxed);
    }

    /// Ordered child references (`Path` nodes or `Group` members)
    pub fn child_refs(&self) -> Vec<&EntityId> {
        match &self.shape {
            Shape::Point(_) => Vec::new(),
            Shape::Path(nodes) => nodes.iter().collect(),
            Shape::Group(members) => members.iter().map(|m| &m.id).collect(),
        }
    }

    /// `true` if this entity's child list references `id`
    pub fn references(&self, id: &EntityId) -> bool {
        match &self.shape {
            Shape::Point(_) => false,
            Shape::Path(nodes) => nodes.contains(id),
            Shape::Group(members) => members.iter().any(|m| &m.id == id),
        }
    }

    // -- derived copies (each bumps the revision) --------------------------

    fn derived(&self) -> Self {
        let copy = self.clone();
        copy.revision
            .store(self.revision().wrapping_add(1), Ordering::Relaxed);
        copy
    }

    /// A copy with replacement tags
    pub fn with_tags(&self, tags: BTreeMap<String, String>) -> Self {
        let mut copy = self.derived();
        copy.tags = tags;
        copy
    }

    /// A copy with one tag set
    pub fn with_tag(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut copy = self.derived();
        copy.tags.insert(key.into(), value.into());
        copy
    }

    /// A copy of a node moved to a new location
    pub fn moved_to(&self, loc: [f64; 2]) -> Self {
        let mut copy = self.derived();
        if matches!(copy.shape, Shape::Point(_)) {
            copy.shape = Shape::Point(loc);
        }
        copy
    }

    /// A copy with a replacement shape
    pub fn reshaped(&self, shape: Shape) -> Self {
        let mut copy = self.derived();
        copy.shape = shape;
        copy
    }

    /// A copy carrying a new upstream version and visibility
    pub fn new_version(&self, version: u32, visible: bool) -> Self {
        let mut copy = self.derived();
        copy.version = version;
        copy.visible = visible;
        copy
    }

    // -- geometry ----------------------------------------------------------

    /// Bounding box of this entity, resolving child references against
    /// `graph`. Unresolvable children are skipped; `None` means no point
    /// of this entity could be located.
    pub fn extent(&self, graph: &Graph) -> Option<Extent> {
        let mut seen = HashSet::new();
        self.extent_guarded(graph, &mut seen)
    }

    fn extent_guarded(&self, graph: &Graph, seen: &mut HashSet<EntityId>) -> Option<Extent> {
        if !seen.insert(self.id.clone()) {
            return None; // member cycle
        }

        match &self.shape {
            Shape::Point(loc) => Some(Extent::point(*loc)),
            Shape::Path(nodes) => {
                let mut acc: Option<Extent> = None;
                for node_id in nodes {
                    let Some(node) = graph.get(node_id) else {
                        continue;
                    };
                    if let Shape::Point(loc) = node.shape() {
                        let point = Extent::point(*loc);
                        match acc.as_mut() {
                            Some(extent) => extent.extend(&point),
                            None => acc = Some(point),
                        }
                    }
                }
                acc
            }
            Shape::Group(members) => {
                let mut acc: Option<Extent> = None;
                for member in members {
                    let Some(child) = graph.get(&member.id) else {
                        continue;
                    };
                    if let Some(child_extent) = child.extent_guarded(graph, seen) {
                        match acc.as_mut() {
                            Some(extent) => extent.extend(&child_extent),
                            None => acc = Some(child_extent),
                        }
                    }
                }
                acc
            }
        }
    }
}
