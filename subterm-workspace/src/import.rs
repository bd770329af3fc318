//! Repository import: clone a remote git repository into the workspace.
//!
//! The clone happens in a private staging directory and only lands in the
//! workspace through a final rename, so a failed or timed-out import never
//! leaves a partial tree behind.

use crate::store::TMP_PREFIX;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use subterm_core::config::ImportConfig;
use subterm_core::{Error, Result};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

static REPO_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,99}$").expect("valid regex"));
static BRANCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]{0,200}$").expect("valid regex"));

/// Parameters of one import, matching the client's request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub repo_url: String,
    pub branch: String,
    pub repo_name: String,
}

/// Clones repositories into the workspace root.
pub struct Importer {
    root: PathBuf,
    config: ImportConfig,
}

impl Importer {
    pub fn new(root: impl Into<PathBuf>, config: ImportConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Clone `repo_url` at `branch` into `<root>/<repo_name>`.
    ///
    /// Runs as long as the clone does (bounded by the configured timeout);
    /// callers that must not block should spawn it.
    pub async fn import(&self, request: &ImportRequest) -> Result<()> {
        validate(request)?;

        let destination = self.root.join(&request.repo_name);
        if tokio::fs::metadata(&destination).await.is_ok() {
            return Err(Error::already_exists(format!(
                "{} already exists in the workspace",
                request.repo_name
            )));
        }

        info!(
            repo = %request.repo_name,
            branch = %request.branch,
            "importing repository"
        );

        // Stage outside the workspace so the watcher never sees the clone.
        let staging = tempfile::tempdir()
            .map_err(|e| Error::import(format!("failed to create staging directory: {}", e)))?;
        let checkout = staging.path().join("checkout");

        self.clone_repository(request, &checkout).await?;

        // The checkout is plain files from here on.
        let git_dir = checkout.join(".git");
        if git_dir.exists() {
            tokio::fs::remove_dir_all(&git_dir)
                .await
                .map_err(|e| Error::import(format!("failed to strip git metadata: {}", e)))?;
        }

        // Re-check: a concurrent import may have taken the name meanwhile.
        if tokio::fs::metadata(&destination).await.is_ok() {
            return Err(Error::already_exists(format!(
                "{} already exists in the workspace",
                request.repo_name
            )));
        }

        self.move_into_workspace(&checkout, &destination).await?;

        info!(repo = %request.repo_name, "repository imported");
        Ok(())
    }

    async fn clone_repository(&self, request: &ImportRequest, checkout: &Path) -> Result<()> {
        let clone = Command::new("git")
            .arg("clone")
            .arg("--depth")
            .arg(self.config.depth.to_string())
            .arg("--branch")
            .arg(&request.branch)
            .arg("--single-branch")
            .arg("--")
            .arg(&request.repo_url)
            .arg(checkout)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let duration = Duration::from_secs(self.config.timeout_secs);
        let output = match timeout(duration, clone).await {
            // Dropping the future kills the child (kill_on_drop).
            Err(_) => {
                warn!(repo = %request.repo_name, timeout_secs = self.config.timeout_secs, "clone timed out");
                return Err(Error::import("clone timed out"));
            }
            Ok(Err(e)) => {
                return Err(Error::import(format!("failed to run git: {}", e)));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("unknown git error")
                .chars()
                .take(200)
                .collect::<String>()
                // git sometimes echoes the checkout location; never expose it.
                .replace(&checkout.display().to_string(), "<staging>");
            debug!(repo = %request.repo_name, status = ?output.status.code(), %reason, "clone failed");
            return Err(Error::import(format!("git clone failed: {}", reason)));
        }

        Ok(())
    }

    /// Move the finished checkout into the workspace. Prefers a rename; on
    /// cross-device failure, copies into a hidden sibling first so the
    /// destination still appears in a single rename.
    async fn move_into_workspace(&self, checkout: &Path, destination: &Path) -> Result<()> {
        if tokio::fs::rename(checkout, destination).await.is_ok() {
            return Ok(());
        }

        let shadow = self
            .root
            .join(format!("{}{}", TMP_PREFIX, Uuid::new_v4().simple()));
        let copy_src = checkout.to_path_buf();
        let copy_dst = shadow.clone();
        let copied = tokio::task::spawn_blocking(move || copy_dir_all(&copy_src, &copy_dst))
            .await
            .map_err(|e| Error::internal(format!("copy task failed: {}", e)))?;

        if let Err(e) = copied {
            let _ = tokio::fs::remove_dir_all(&shadow).await;
            return Err(Error::import(format!("failed to copy repository: {}", e)));
        }

        if let Err(e) = tokio::fs::rename(&shadow, destination).await {
            let _ = tokio::fs::remove_dir_all(&shadow).await;
            return Err(Error::import(format!("failed to place repository: {}", e)));
        }

        Ok(())
    }
}

fn validate(request: &ImportRequest) -> Result<()> {
    if !REPO_NAME_RE.is_match(&request.repo_name) {
        return Err(Error::invalid_input(
            "repoName must be a plain directory name (letters, digits, dots, dashes)",
        ));
    }
    if !BRANCH_RE.is_match(&request.branch) {
        return Err(Error::invalid_input("branch name is not valid"));
    }

    let url = request.repo_url.trim();
    if url.len() > 2048 || url.chars().any(char::is_whitespace) {
        return Err(Error::invalid_input("repoUrl is not a valid repository URL"));
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(Error::invalid_input(
            "repoUrl must be an http(s) repository URL",
        ));
    }
    Ok(())
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
        // Symlinks are dropped: the workspace only holds regular files.
    }
    Ok(())
}
