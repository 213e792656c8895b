//! Type definitions for map feature data

mod entity;
mod extent;

pub use entity::{Entity, EntityKind, Member, Shape};
pub use extent::Extent;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed entity identifier.
///
/// The first byte encodes the kind (`n` node, `w` way, `r` relation);
/// a negative numeric suffix (e.g. `n-3`) marks a locally created entity
/// that has never been uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an id from a raw string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The kind encoded in the id prefix, if recognizable
    pub fn kind(&self) -> Option<EntityKind> {
        match self.0.as_bytes().first() {
            Some(b'n') => Some(EntityKind::Node),
            Some(b'w') => Some(EntityKind::Way),
            Some(b'r') => Some(EntityKind::Relation),
            _ => None,
        }
    }

    /// `true` for locally created entities that have never been uploaded
    pub fn is_local(&self) -> bool {
        self.0.len() > 1 && self.0.as_bytes()[1] == b'-'
    }

    /// The raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Allocator for locally created entity ids.
///
/// Counters round-trip through the backup blob so a restored session
/// keeps allocating past the ids already in use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGenerator {
    /// Next node counter
    pub node: u64,
    /// Next way counter
    pub way: u64,
    /// Next relation counter
    pub relation: u64,
}

impl IdGenerator {
    /// Create a generator with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh local id of the given kind
    pub fn next(&mut self, kind: EntityKind) -> EntityId {
        let (prefix, counter) = match kind {
            EntityKind::Node => ('n', &mut self.node),
            EntityKind::Way => ('w', &mut self.way),
            EntityKind::Relation => ('r', &mut self.relation),
        };
        *counter += 1;
        EntityId::new(format!("{}-{}", prefix, counter))
    }
}

/// Map view transform recorded with each edit (pan offset and zoom factor)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    /// Horizontal pan offset
    pub x: f64,
    /// Vertical pan offset
    pub y: f64,
    /// Zoom factor
    pub k: f64,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            k: 1.0,
        }
    }
}
