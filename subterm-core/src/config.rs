//! Configuration system for the SubTerm backend.
//!
//! Configuration lives in a single TOML file, by default at
//! `~/.subterm/config.toml`. Precedence, lowest to highest: built-in
//! defaults, config file, `SUBTERM_*` environment variables, CLI flags
//! (applied by the binary).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the config file location.
pub const ENV_CONFIG_PATH: &str = "SUBTERM_CONFIG_PATH";
/// Environment variable overriding the bind host.
pub const ENV_HOST: &str = "SUBTERM_HOST";
/// Environment variable overriding the bind port.
pub const ENV_PORT: &str = "SUBTERM_PORT";
/// Environment variable overriding the workspace root directory.
pub const ENV_WORKSPACE_ROOT: &str = "SUBTERM_WORKSPACE_ROOT";
/// Environment variable overriding the terminal shell.
pub const ENV_SHELL: &str = "SUBTERM_SHELL";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
    pub terminal: TerminalConfig,
    pub import: ImportConfig,
    pub watcher: WatcherSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3334,
        }
    }
}

/// Workspace storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root directory all file operations are scoped to.
    pub root: PathBuf,
    /// Upper bound for a single file write, in bytes.
    pub max_file_size_bytes: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: subterm_home().join("workspace"),
            max_file_size_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Terminal session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell binary spawned per session.
    pub shell: String,
    /// Value of `TERM` inside the session.
    pub term: String,
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
        }
    }
}

/// Repository import settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Wall-clock limit for a single clone.
    pub timeout_secs: u64,
    /// History depth passed to `git clone --depth`.
    pub depth: u32,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            depth: 1,
        }
    }
}

/// Filesystem watcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    /// Quiet period per path before an event is considered settled.
    pub debounce_ms: u64,
    /// Interval at which settled events are flushed as one batch.
    pub batch_interval_ms: u64,
    /// Pending-event count that forces an early flush.
    pub max_batch: usize,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            batch_interval_ms: 250,
            max_batch: 256,
        }
    }
}

impl Config {
    /// Load configuration from the given path, or from the default location
    /// when `path` is `None`. A missing file yields the defaults. Environment
    /// overrides are applied in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path(),
        };

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&raw)
                .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))?;
            debug!(path = %path.display(), "loaded configuration file");
            config
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Default config file location: `~/.subterm/config.toml`, overridable
    /// with `SUBTERM_CONFIG_PATH`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }
        subterm_home().join("config.toml")
    }

    /// Write this configuration to `path` as TOML, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("failed to serialize configuration: {}", e)))?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Render as TOML (used by `subterm config show`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("failed to serialize configuration: {}", e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var(ENV_HOST) {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var(ENV_PORT) {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %port, "ignoring invalid {}", ENV_PORT),
            }
        }
        if let Ok(root) = std::env::var(ENV_WORKSPACE_ROOT) {
            self.workspace.root = PathBuf::from(root);
        }
        if let Ok(shell) = std::env::var(ENV_SHELL) {
            self.terminal.shell = shell;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(Error::config("server.host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(Error::config("server.port cannot be 0"));
        }
        if self.terminal.shell.is_empty() {
            return Err(Error::config("terminal.shell cannot be empty"));
        }
        if self.workspace.max_file_size_bytes == 0 {
            return Err(Error::config("workspace.max_file_size_bytes cannot be 0"));
        }
        if self.import.timeout_secs == 0 {
            return Err(Error::config("import.timeout_secs cannot be 0"));
        }
        Ok(())
    }
}

/// Base directory for SubTerm state (`~/.subterm`), falling back to the
/// current directory when no home directory can be resolved.
pub fn subterm_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".subterm"))
        .unwrap_or_else(|| PathBuf::from(".subterm"))
}

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3334);
        assert_eq!(config.import.depth, 1);
        assert!(config.workspace.max_file_size_bytes > 0);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let raw = "[server]\nport = 4000\n";
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.watcher.debounce_ms, 100);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.server.port = 9999;
        config.terminal.shell = "/bin/zsh".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.server.port, 9999);
        assert_eq!(loaded.terminal.shell, "/bin/zsh");
    }

    #[test]
    fn test_env_override_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nhost = \"10.0.0.1\"\n").unwrap();

        std::env::set_var(ENV_HOST, "192.168.1.5");
        let loaded = Config::load(Some(&path)).unwrap();
        std::env::remove_var(ENV_HOST);

        assert_eq!(loaded.server.host, "192.168.1.5");
    }

    #[test]
    fn test_invalid_port_rejected() {
        let raw = "[server]\nport = 0\n";
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.validate().is_err());
    }
}
