//! Core plumbing: configuration and error handling

pub mod config;
pub mod error;

pub use config::EngineConfig;
pub use error::{BackupError, EditError, Error, GraphError, Result, SourceError};
