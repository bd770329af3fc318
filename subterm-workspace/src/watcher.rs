//! Workspace change watcher with debouncing and change coalescing.
//!
//! Raw notify events are rebased to workspace-relative paths, filtered
//! (`.git` internals and staging files never surface), coalesced per path
//! and emitted as batches. The delivery contract is deliberately weak:
//! at least one non-empty batch eventually follows any logical change.
//! Clients re-fetch the tree on receipt rather than applying diffs.

use crate::store::TMP_PREFIX;
use dashmap::DashMap;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subterm_core::config::WatcherSettings;
use subterm_core::{ChangeKind, Error, FsChange, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

/// Pending change for a path, waiting out its debounce window.
#[derive(Debug, Clone)]
struct PendingChange {
    change: FsChange,
    last_updated: Instant,
}

/// Recursive watcher over the workspace root.
///
/// Must be created from within a tokio runtime; the coalescer and batch
/// timer run as background tasks that stop when the watcher is dropped.
pub struct WorkspaceWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<Vec<FsChange>>,
    _coalescer: JoinHandle<()>,
}

impl WorkspaceWatcher {
    pub fn new(root: &Path, settings: &WatcherSettings) -> Result<Self> {
        // notify reports resolved paths, so rebasing needs the resolved root.
        let root = root
            .canonicalize()
            .map_err(|e| Error::watcher(format!("cannot resolve workspace root: {}", e)))?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();

        let convert_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if let Some(change) = convert_event(&event, &convert_root) {
                    let _ = raw_tx.send(change);
                }
            }
        })
        .map_err(|e| Error::watcher(format!("failed to create watcher: {}", e)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::watcher(format!("failed to watch workspace: {}", e)))?;

        debug!(root = %root.display(), "workspace watcher started");

        let coalescer = tokio::spawn(coalesce_changes(raw_rx, batch_tx, settings.clone()));

        Ok(Self {
            _watcher: watcher,
            receiver: batch_rx,
            _coalescer: coalescer,
        })
    }

    /// Receive the next batch of changes. Batches are never empty.
    pub async fn recv(&mut self) -> Option<Vec<FsChange>> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Vec<FsChange>> {
        self.receiver.try_recv().ok()
    }
}

/// Debounce and coalesce raw changes into batches.
async fn coalesce_changes(
    mut raw_rx: mpsc::UnboundedReceiver<FsChange>,
    batch_tx: mpsc::UnboundedSender<Vec<FsChange>>,
    settings: WatcherSettings,
) {
    let debounce = Duration::from_millis(settings.debounce_ms);
    let pending: Arc<DashMap<String, PendingChange>> = Arc::new(DashMap::new());

    // Batch emission timer.
    let timer_pending = Arc::clone(&pending);
    let timer_tx = batch_tx.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(settings.batch_interval_ms.max(1)));
        loop {
            ticker.tick().await;

            let now = Instant::now();
            let mut ready = Vec::new();
            timer_pending.retain(|_, entry| {
                if now.duration_since(entry.last_updated) >= debounce {
                    ready.push(entry.change.clone());
                    false
                } else {
                    true
                }
            });

            if timer_pending.len() >= settings.max_batch {
                warn!(pending = timer_pending.len(), "max batch size reached, flushing early");
                timer_pending.retain(|_, entry| {
                    ready.push(entry.change.clone());
                    false
                });
            }

            if !ready.is_empty() {
                ready.sort_by(|a, b| a.path.cmp(&b.path));
                if timer_tx.send(ready).is_err() {
                    // Receiver dropped, stop the timer.
                    break;
                }
            }
        }
    });

    while let Some(change) = raw_rx.recv().await {
        match pending.get_mut(&change.path) {
            Some(mut entry) => {
                entry.change.kind = merge_kinds(entry.change.kind, change.kind);
                entry.last_updated = Instant::now();
            }
            None => {
                pending.insert(
                    change.path.clone(),
                    PendingChange {
                        change,
                        last_updated: Instant::now(),
                    },
                );
            }
        }
    }
}

/// Collapse two changes to the same path into the one the client should see.
fn merge_kinds(old: ChangeKind, new: ChangeKind) -> ChangeKind {
    use ChangeKind::*;
    match (old, new) {
        // Created then touched again is still a creation.
        (Created, Modified) => Created,
        // Short-lived files end as a deletion either way.
        (Created, Deleted) | (Modified, Deleted) => Deleted,
        // Replaced in place.
        (Deleted, Created) => Modified,
        _ => new,
    }
}

/// Map a notify event to a workspace-relative change, or drop it.
fn convert_event(event: &Event, root: &Path) -> Option<FsChange> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(_)) if event.paths.len() >= 2 => ChangeKind::Renamed,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Any if event.paths.len() >= 2 => ChangeKind::Renamed,
        _ => return None,
    };

    let path = if kind == ChangeKind::Renamed {
        event.paths.last()?
    } else {
        event.paths.first()?
    };

    rebase(path, root).map(|relative| FsChange::new(kind, relative))
}

/// Rebase an absolute path to workspace-relative form, dropping anything
/// outside the root, under `.git`, or named like a staging file.
fn rebase(path: &Path, root: &Path) -> Option<String> {
    let relative: &Path = path.strip_prefix(root).ok()?;

    let mut segments = Vec::new();
    for component in relative.components() {
        let name = component.as_os_str().to_string_lossy();
        if name == ".git" || name.starts_with(TMP_PREFIX) {
            return None;
        }
        segments.push(name.into_owned());
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}
