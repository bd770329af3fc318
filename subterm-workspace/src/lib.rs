//! Workspace storage layer for the SubTerm backend.
//!
//! This crate owns everything that touches the workspace directory:
//! - `ScopedPath`: sandboxed workspace-relative paths
//! - `FileStore`: read/write operations with atomic writes and per-path
//!   serialization
//! - `TreeSnapshot`: deterministic tree listings in both wire shapes
//! - `WorkspaceWatcher`: debounced, coalesced change notification batches
//! - `import`: clone-a-repository-into-the-workspace service

pub mod import;
pub mod path;
pub mod store;
pub mod tree;
pub mod watcher;

pub use import::{ImportRequest, Importer};
pub use path::ScopedPath;
pub use store::FileStore;
pub use tree::{TreeNode, TreeSnapshot};
pub use watcher::WorkspaceWatcher;
