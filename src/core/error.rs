//! Error types and handling for the cartograph edit engine
//!
//! This module defines all error types used throughout the crate,
//! organized as a top-level `Error` with per-subsystem sub-enums.

use thiserror::Error;

use crate::types::EntityId;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the cartograph edit engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Graph resolution errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Edit history / state machine errors
    #[error("Edit error: {0}")]
    Edit(#[from] EditError),

    /// Backup serialization errors
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    /// Entity source (remote fetch) errors
    #[error("Entity source error: {0}")]
    Source(#[from] SourceError),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Graph resolution errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// Entity absent (or tombstoned) after a full chain walk
    #[error("Entity not found: {id}")]
    EntityNotFound {
        /// ID of the missing entity
        id: EntityId,
    },
}

/// Edit history / state machine errors
#[derive(Error, Debug)]
pub enum EditError {
    /// Operation not valid in the current history state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A declared collaborator was not supplied at initialization
    #[error("Missing dependency: {0}")]
    MissingDependency(&'static str),
}

/// Backup serialization errors
#[derive(Error, Debug)]
pub enum BackupError {
    /// Version tag does not match the current backup format
    #[error("Backup version {found} not supported")]
    UnsupportedVersion {
        /// Version tag found in the blob
        found: u64,
    },

    /// Blob is not valid JSON or does not match the schema
    #[error("Malformed backup: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A history frame references an entity key the blob does not carry
    #[error("Backup references unknown entity: {key}")]
    MissingEntity {
        /// Unresolvable `id + revision` key
        key: String,
    },
}

/// Entity source (remote fetch) errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// The fetch itself failed (network, parse, etc.)
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The source never produced the requested entities
    #[error("Entities could not be resolved: {0:?}")]
    Unresolved(Vec<EntityId>),

    /// Walked version numbers down to zero without finding a live version
    #[error("No live version found for entity: {id}")]
    ExhaustedVersions {
        /// ID of the entity whose versions were exhausted
        id: EntityId,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::Edit(EditError::InvalidOperation(msg.into()))
    }

    /// Check if this error indicates an unusable backup blob
    pub fn is_unsupported_backup(&self) -> bool {
        matches!(self, Error::Backup(BackupError::UnsupportedVersion { .. }))
    }
}
