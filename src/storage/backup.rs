//! Serialized backup format, version 3
//!
//! A backup captures everything needed to rebuild the edit history over
//! a freshly loaded base: the modified entity values (keyed by their
//! id + revision composite), the original base values of every touched
//! entity and its neighborhood, one frame per history entry listing the
//! keys it modified or deleted, the local id counters, and the stable
//! index. Only the current version tag is accepted on load.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::error::{BackupError, Result};
use crate::types::{Entity, EntityId, IdGenerator, ViewTransform};

/// Current backup format version
pub const BACKUP_VERSION: u64 = 3;

/// One serialized history entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupFrame {
    /// `id + revision` keys of entities this entry modified or created
    #[serde(default)]
    pub modified: Vec<String>,

    /// Ids this entry tombstoned
    #[serde(default)]
    pub deleted: Vec<EntityId>,

    /// Human-readable description stamped at commit
    #[serde(default)]
    pub annotation: Option<String>,

    /// Selection recorded at commit
    #[serde(default)]
    pub selected_ids: BTreeSet<EntityId>,

    /// Attribution sources recorded at commit
    #[serde(default)]
    pub sources: BTreeSet<String>,

    /// Map view recorded at commit
    #[serde(default)]
    pub transform: Option<ViewTransform>,
}

/// The complete serialized session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupV3 {
    /// Format version tag, always [`BACKUP_VERSION`]
    pub version: u64,

    /// Modified entity values; distinct revisions of one id may coexist
    pub entities: Vec<Entity>,

    /// Original base values of every touched entity plus its children
    /// and parents, so the history resolves without refetching
    pub base_entities: Vec<Entity>,

    /// One frame per history entry; frame 0 is the empty base entry
    pub stack: Vec<BackupFrame>,

    /// Local id counters at capture time
    pub next_ids: IdGenerator,

    /// Stable index at capture time
    pub index: usize,

    /// Capture time, milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp_ms: u64,
}

/// Serialize a backup to its JSON blob
pub fn to_json(backup: &BackupV3) -> Result<String> {
    Ok(serde_json::to_string(backup).map_err(BackupError::Malformed)?)
}

/// Parse a backup blob, rejecting any version tag other than the
/// current one before deserializing the rest
pub fn from_json(blob: &str) -> Result<BackupV3> {
    let value: serde_json::Value = serde_json::from_str(blob).map_err(BackupError::Malformed)?;
    let found = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0);
    if found != BACKUP_VERSION {
        return Err(BackupError::UnsupportedVersion { found }.into());
    }
    Ok(serde_json::from_value(value).map_err(BackupError::Malformed)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;

    fn minimal() -> BackupV3 {
        BackupV3 {
            version: BACKUP_VERSION,
            entities: vec![Entity::node("n-1", [1.0, 2.0])],
            base_entities: vec![],
            stack: vec![
                BackupFrame::default(),
                BackupFrame {
                    modified: vec!["n-1v0".to_string()],
                    annotation: Some("added a point".to_string()),
                    ..Default::default()
                },
            ],
            next_ids: IdGenerator { node: 1, way: 0, relation: 0 },
            index: 1,
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn round_trips() {
        let blob = to_json(&minimal()).unwrap();
        let back = from_json(&blob).unwrap();
        assert_eq!(back.stack.len(), 2);
        assert_eq!(back.index, 1);
        assert_eq!(back.entities[0].key(), "n-1v0");
        assert_eq!(back.next_ids.node, 1);
    }

    #[test]
    fn rejects_other_versions() {
        let err = from_json(r#"{"version": 2, "stack": []}"#).unwrap_err();
        assert!(matches!(
            err,
            Error::Backup(BackupError::UnsupportedVersion { found: 2 })
        ));

        let err = from_json(r#"{"stack": []}"#).unwrap_err();
        assert!(err.is_unsupported_backup());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            from_json("not json").unwrap_err(),
            Error::Backup(BackupError::Malformed(_))
        ));
    }
}
