//! Cartograph - A Versioned-Graph Edit Engine for Map Data
//!
//! Cartograph is an in-memory, undo/redo-capable, spatially-indexed
//! store of map features. Remote data merges into a shared base layer
//! without disturbing in-progress edits, and the whole session
//! serializes to a blob for crash recovery.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;

// Main functional modules
pub mod actions;
pub mod edit;
pub mod graph;
pub mod source;
pub mod spatial;
pub mod storage;
pub mod types;

// Re-export commonly used items for convenience
pub use crate::core::{EngineConfig, Error, Result};
pub use crate::edit::{CommitOptions, EditEvent, EditSystem};
pub use crate::graph::{Difference, Graph};
pub use crate::types::{Entity, EntityId, Extent};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize the engine with tracing wired to the environment filter
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Initializing {} v{}", NAME, VERSION);

    Ok(())
}
