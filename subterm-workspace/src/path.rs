//! Workspace-relative path handling.
//!
//! Every path the client sends is parsed into a `ScopedPath` before any
//! filesystem access. A `ScopedPath` is a list of plain name segments; it can
//! only ever resolve to a location under the workspace root. Traversal
//! attempts are rejected at parse time, never silently clamped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use subterm_core::{Error, Result};

/// Maximum number of segments in a workspace path.
const MAX_DEPTH: usize = 64;
/// Maximum byte length of a single segment.
const MAX_SEGMENT_LEN: usize = 255;

/// A validated path relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopedPath {
    segments: Vec<String>,
}

impl ScopedPath {
    /// Parse a client-supplied path.
    ///
    /// Leading slashes are tolerated (the client is inconsistent about
    /// them); empty and `.` segments are dropped. Anything that could step
    /// outside the workspace root — `..` segments, backslashes, NUL bytes —
    /// is an error, as is an empty result.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_path("path is empty"));
        }
        if trimmed.contains('\0') {
            return Err(Error::invalid_path("path contains a NUL byte"));
        }
        if trimmed.contains('\\') {
            return Err(Error::invalid_path("path contains a backslash"));
        }

        let mut segments = Vec::new();
        for segment in trimmed.trim_start_matches('/').split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            if segment == ".." {
                return Err(Error::invalid_path(format!(
                    "path escapes the workspace root: {}",
                    raw.trim()
                )));
            }
            if segment.len() > MAX_SEGMENT_LEN {
                return Err(Error::invalid_path("path segment is too long"));
            }
            segments.push(segment.to_string());
        }

        if segments.is_empty() {
            return Err(Error::invalid_path("path is empty"));
        }
        if segments.len() > MAX_DEPTH {
            return Err(Error::invalid_path("path is nested too deeply"));
        }

        Ok(Self { segments })
    }

    /// Build a scoped path from a physical path known to live under `base`.
    pub fn from_physical(physical: &Path, base: &Path) -> Result<Self> {
        let relative = physical.strip_prefix(base).map_err(|_| {
            Error::invalid_path("path is outside the workspace root")
        })?;
        let raw = relative
            .to_str()
            .ok_or_else(|| Error::invalid_path("path is not valid UTF-8"))?;
        Self::parse(raw)
    }

    /// Append one validated segment.
    pub fn join(&self, segment: &str) -> Result<Self> {
        let mut joined = self.to_string();
        joined.push('/');
        joined.push_str(segment);
        Self::parse(&joined)
    }

    /// Parent path, or `None` for a single-segment path.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Final segment.
    pub fn file_name(&self) -> &str {
        // segments is non-empty by construction
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolve against a physical base directory.
    pub fn to_physical(&self, base: &Path) -> PathBuf {
        let mut physical = base.to_path_buf();
        for segment in &self.segments {
            physical.push(segment);
        }
        physical
    }
}

impl fmt::Display for ScopedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}
