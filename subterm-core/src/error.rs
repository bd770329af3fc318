//! Error types for the SubTerm backend.

/// Result type alias for SubTerm operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the SubTerm backend.
///
/// Error messages are surfaced verbatim to the browser client, so they must
/// only ever reference workspace-relative paths, never server-side locations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path rejected by workspace sandboxing
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Missing file or directory
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or out-of-range request data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Destination already taken
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem watcher errors
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Terminal session errors
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// Repository import errors
    #[error("Import error: {0}")]
    Import(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new invalid path error
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new already exists error
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new watcher error
    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }

    /// Create a new terminal error
    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    /// Create a new import error
    pub fn import(msg: impl Into<String>) -> Self {
        Self::Import(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error is the client's fault (bad path or input)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath(_) | Self::InvalidInput(_) | Self::NotFound(_) | Self::AlreadyExists(_)
        )
    }
}
