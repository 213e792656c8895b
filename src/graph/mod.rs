//! Versioned graph: shared base layer, overlay-chain snapshots, diffs

mod base;
mod difference;
#[allow(clippy::module_inception)]
mod graph;

pub use base::BaseLayer;
pub use difference::{Change, Difference};
pub use graph::{Graph, OverlayEntry, Resolution};
