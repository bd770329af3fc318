//! Shared wire types for workspace change notifications.

use serde::{Deserialize, Serialize};

/// Kind of a workspace filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// A single workspace mutation, as delivered to clients in `fs-event`
/// batches. The path is always workspace-relative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsChange {
    pub kind: ChangeKind,
    pub path: String,
}

impl FsChange {
    pub fn new(kind: ChangeKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}
