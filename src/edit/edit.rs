//! A single history entry

use std::collections::BTreeSet;

use crate::graph::Graph;
use crate::types::{EntityId, ViewTransform};

/// One snapshot in the edit history: a graph plus the metadata stamped
/// on it at commit time. Entries are replaced wholesale rather than
/// field-mutated; the one exception is the staging entry's graph,
/// which the system reassigns as actions apply.
#[derive(Debug, Clone)]
pub struct Edit {
    /// The graph snapshot
    pub graph: Graph,

    /// Human-readable description ("Moved a point"), `None` on the base
    /// entry and on staging
    pub annotation: Option<String>,

    /// Ids selected when this entry was committed
    pub selected_ids: BTreeSet<EntityId>,

    /// Attribution sources active when this entry was committed
    pub sources: BTreeSet<String>,

    /// Map view when this entry was committed
    pub transform: ViewTransform,
}

impl Edit {
    /// The base entry: bare graph, no metadata
    pub fn base(graph: Graph) -> Self {
        Self {
            graph,
            annotation: None,
            selected_ids: BTreeSet::new(),
            sources: BTreeSet::new(),
            transform: ViewTransform::default(),
        }
    }
}

/// Metadata stamped onto staging when it is committed into history
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Description of the edit being committed
    pub annotation: Option<String>,
    /// Ids currently selected
    pub selected_ids: BTreeSet<EntityId>,
    /// Attribution sources for the edit
    pub sources: BTreeSet<String>,
    /// Current map view
    pub transform: ViewTransform,
}

impl CommitOptions {
    /// Options carrying just an annotation
    pub fn annotated(annotation: impl Into<String>) -> Self {
        Self {
            annotation: Some(annotation.into()),
            ..Default::default()
        }
    }
}
