//! End-to-end flow across the workspace layer: writes surface in tree
//! snapshots and produce watcher notifications.

use std::time::Duration;
use subterm_core::config::WatcherSettings;
use subterm_workspace::{FileStore, ScopedPath, TreeSnapshot, WorkspaceWatcher};

fn fast_settings() -> WatcherSettings {
    WatcherSettings {
        debounce_ms: 20,
        batch_interval_ms: 40,
        max_batch: 64,
    }
}

#[tokio::test]
async fn test_write_surfaces_in_tree_and_watcher() {
    let dir = tempfile::tempdir().unwrap();
    let mut watcher = WorkspaceWatcher::new(dir.path(), &fast_settings()).unwrap();
    let store = FileStore::new(dir.path(), 1024 * 1024);

    let path = ScopedPath::parse("src/app.rs").unwrap();
    store.write_file(&path, "fn run() {}").await.unwrap();

    let snapshot = TreeSnapshot::capture(dir.path()).unwrap();
    assert!(snapshot.contains("src/app.rs"));
    assert!(snapshot.contains("src"));

    let batch = tokio::time::timeout(Duration::from_secs(5), watcher.recv())
        .await
        .expect("no fs-event batch within 5s")
        .expect("watcher closed");
    assert!(
        batch.iter().any(|change| change.path.starts_with("src")),
        "batch did not mention the write: {:?}",
        batch
    );
}

#[tokio::test]
async fn test_deletion_surfaces_in_watcher() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path(), 1024 * 1024);
    let path = ScopedPath::parse("doomed.txt").unwrap();
    store.write_file(&path, "soon gone").await.unwrap();

    let mut watcher = WorkspaceWatcher::new(dir.path(), &fast_settings()).unwrap();
    std::fs::remove_file(dir.path().join("doomed.txt")).unwrap();

    let batch = tokio::time::timeout(Duration::from_secs(5), watcher.recv())
        .await
        .expect("no fs-event batch within 5s")
        .expect("watcher closed");
    assert!(batch.iter().any(|change| change.path == "doomed.txt"));

    let snapshot = TreeSnapshot::capture(dir.path()).unwrap();
    assert!(!snapshot.contains("doomed.txt"));
}
