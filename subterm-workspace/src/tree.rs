//! Deterministic workspace tree listings.
//!
//! One snapshot walk feeds both wire shapes the client has consumed across
//! its revisions: the nested `{name: children-or-null}` mapping and the flat
//! node array used by tree-widget renderers. Both render the same
//! `BTreeMap`-backed snapshot, so they cannot disagree, and the byte-order
//! key sorting makes repeated fetches without intervening mutation
//! byte-identical.

use crate::store::TMP_PREFIX;
use ignore::WalkBuilder;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use subterm_core::Result;
use tracing::debug;

/// One node of the flat tree shape: `id` is the workspace-relative path.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub children: Option<Vec<TreeNode>>,
}

/// A point-in-time listing of the workspace.
#[derive(Debug, Default)]
pub struct TreeSnapshot {
    root: DirMap,
}

/// `None` marks a file, `Some` a directory.
#[derive(Debug, Default)]
struct DirMap(BTreeMap<String, Option<DirMap>>);

impl TreeSnapshot {
    /// Walk the workspace and capture its current shape. `.git` directories
    /// and in-flight staging files are excluded; ignore files are NOT
    /// honored — the editor shows everything else.
    pub fn capture(root: &Path) -> Result<Self> {
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                name != ".git" && !name.starts_with(TMP_PREFIX)
            })
            .build();

        let mut snapshot = Self::default();
        let mut entries = 0usize;
        for entry in walker.filter_map(|e| e.ok()) {
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let segments: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            if segments.is_empty() {
                continue; // the root itself
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            snapshot.root.insert(&segments, is_dir);
            entries += 1;
        }

        debug!(entries, "captured workspace tree snapshot");
        Ok(snapshot)
    }

    /// Nested mapping shape, served as `{"tree": ...}` on `/files`.
    pub fn to_nested(&self) -> Value {
        self.root.to_nested()
    }

    /// Flat node-array shape served on `/api/get-tree`.
    pub fn to_flat(&self) -> Vec<TreeNode> {
        self.root.to_flat("")
    }

    /// True when a workspace-relative path is present in the snapshot.
    pub fn contains(&self, path: &str) -> bool {
        let mut current = &self.root;
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        while let Some(segment) = segments.next() {
            match current.0.get(segment) {
                Some(Some(child)) => current = child,
                Some(None) => return segments.peek().is_none(),
                None => return false,
            }
        }
        true
    }
}

impl DirMap {
    fn insert(&mut self, segments: &[String], is_dir: bool) {
        let (first, rest) = match segments.split_first() {
            Some(split) => split,
            None => return,
        };
        if rest.is_empty() {
            let entry = self.0.entry(first.clone());
            if is_dir {
                // A directory may have been implicitly created by a deeper
                // entry walked earlier; keep its children either way.
                entry.or_insert_with(|| Some(DirMap::default()));
            } else {
                entry.or_insert(None);
            }
            return;
        }
        let child = self
            .0
            .entry(first.clone())
            .or_insert_with(|| Some(DirMap::default()));
        if let Some(child) = child {
            child.insert(rest, is_dir);
        }
    }

    fn to_nested(&self) -> Value {
        let mut map = Map::new();
        for (name, child) in &self.0 {
            let value = match child {
                Some(dir) => dir.to_nested(),
                None => Value::Null,
            };
            map.insert(name.clone(), value);
        }
        Value::Object(map)
    }

    fn to_flat(&self, prefix: &str) -> Vec<TreeNode> {
        self.0
            .iter()
            .map(|(name, child)| {
                let id = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                TreeNode {
                    name: name.clone(),
                    children: child.as_ref().map(|dir| dir.to_flat(&id)),
                    id,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(dir: &tempfile::TempDir) {
        std::fs::create_dir_all(dir.path().join("src/util")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        std::fs::write(dir.path().join("README.md"), "# readme").unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("src/util/mod.rs"), "").unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: x").unwrap();
    }

    #[test]
    fn test_nested_shape() {
        let dir = tempfile::tempdir().unwrap();
        seed(&dir);

        let snapshot = TreeSnapshot::capture(dir.path()).unwrap();
        let nested = snapshot.to_nested();

        assert_eq!(nested["README.md"], Value::Null);
        assert_eq!(nested["src"]["main.rs"], Value::Null);
        assert_eq!(nested["src"]["util"]["mod.rs"], Value::Null);
        assert!(nested.get(".git").is_none());
    }

    #[test]
    fn test_flat_shape_ids_and_order() {
        let dir = tempfile::tempdir().unwrap();
        seed(&dir);

        let snapshot = TreeSnapshot::capture(dir.path()).unwrap();
        let flat = snapshot.to_flat();

        // BTreeMap keys: "README.md" < "src" in byte order.
        assert_eq!(flat[0].name, "README.md");
        assert!(flat[0].children.is_none());
        let src = &flat[1];
        assert_eq!(src.id, "src");
        let children = src.children.as_ref().unwrap();
        assert_eq!(children[0].id, "src/main.rs");
        assert_eq!(children[1].id, "src/util");
    }

    #[test]
    fn test_repeated_capture_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        seed(&dir);

        let one = serde_json::to_string(&TreeSnapshot::capture(dir.path()).unwrap().to_nested()).unwrap();
        let two = serde_json::to_string(&TreeSnapshot::capture(dir.path()).unwrap().to_nested()).unwrap();
        assert_eq!(one, two);

        let flat_one =
            serde_json::to_string(&TreeSnapshot::capture(dir.path()).unwrap().to_flat()).unwrap();
        let flat_two =
            serde_json::to_string(&TreeSnapshot::capture(dir.path()).unwrap().to_flat()).unwrap();
        assert_eq!(flat_one, flat_two);
    }

    #[test]
    fn test_contains() {
        let dir = tempfile::tempdir().unwrap();
        seed(&dir);

        let snapshot = TreeSnapshot::capture(dir.path()).unwrap();
        assert!(snapshot.contains("src/main.rs"));
        assert!(snapshot.contains("src"));
        assert!(!snapshot.contains("src/missing.rs"));
        assert!(!snapshot.contains(".git/HEAD"));
    }

    #[test]
    fn test_empty_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = TreeSnapshot::capture(dir.path()).unwrap();
        assert_eq!(snapshot.to_nested(), Value::Object(Map::new()));
        assert!(snapshot.to_flat().is_empty());
    }
}
