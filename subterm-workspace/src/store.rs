//! Workspace file store: sandboxed read/write over the workspace root.

use crate::path::ScopedPath;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use subterm_core::{Error, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix for in-flight write staging files. The watcher and tree indexer
/// both skip entries with this prefix so half-written files never surface.
pub(crate) const TMP_PREFIX: &str = ".subterm-tmp-";

/// File store rooted at the workspace directory.
///
/// Writes are atomic (staged next to the target, then renamed) and writes to
/// the same path serialize through a per-path async lock. Reads and writes to
/// distinct paths proceed independently.
pub struct FileStore {
    root: PathBuf,
    max_file_size: u64,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            root: root.into(),
            max_file_size,
            write_locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a file as UTF-8 text.
    pub async fn read_file(&self, path: &ScopedPath) -> Result<String> {
        let physical = path.to_physical(&self.root);

        let metadata = tokio::fs::metadata(&physical)
            .await
            .map_err(|_| Error::not_found(format!("no such file: {}", path)))?;
        if metadata.is_dir() {
            return Err(Error::invalid_input(format!("{} is a directory", path)));
        }

        let bytes = tokio::fs::read(&physical).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::not_found(format!("no such file: {}", path)),
            _ => Error::Io(e),
        })?;

        String::from_utf8(bytes)
            .map_err(|_| Error::invalid_input(format!("{} is not valid UTF-8 text", path)))
    }

    /// Create or overwrite a file, creating missing parent directories.
    ///
    /// Empty content is valid; the client uses it for new files and for
    /// `.keep` folder placeholders.
    pub async fn write_file(&self, path: &ScopedPath, content: &str) -> Result<()> {
        if content.len() as u64 > self.max_file_size {
            return Err(Error::invalid_input(format!(
                "{} exceeds the maximum file size of {} bytes",
                path, self.max_file_size
            )));
        }

        let lock = self
            .write_locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let physical = path.to_physical(&self.root);
        if let Ok(metadata) = tokio::fs::metadata(&physical).await {
            if metadata.is_dir() {
                return Err(Error::invalid_input(format!("{} is a directory", path)));
            }
        }

        let parent = physical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&parent).await.map_err(|_| {
            Error::invalid_input(format!("cannot create parent directories for {}", path))
        })?;

        // Stage in the same directory so the final rename is atomic.
        let staging = parent.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&staging, content).await {
            let _ = tokio::fs::remove_file(&staging).await;
            warn!(path = %path, error = %e, "staging write failed");
            return Err(Error::Io(e));
        }
        if let Err(e) = tokio::fs::rename(&staging, &physical).await {
            let _ = tokio::fs::remove_file(&staging).await;
            warn!(path = %path, error = %e, "commit rename failed");
            return Err(Error::Io(e));
        }

        debug!(path = %path, bytes = content.len(), "wrote file");
        Ok(())
    }
}
