//! Error types for proptree.

/// Result type alias for proptree operations.
pub type Result<T> = std::result::Result<T, ProptreeError>;

/// Main error type for proptree.
#[derive(Debug, thiserror::Error)]
pub enum ProptreeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Coordination store errors surfaced to a fallible caller
    #[error("Coordination error: {0}")]
    Coordination(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Watch registration errors
    #[error("Watch error: {0}")]
    Watch(String),

    /// Import/export archive errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProptreeError {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new coordination error
    pub fn coordination(msg: impl Into<String>) -> Self {
        Self::Coordination(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new watch error
    pub fn watch(msg: impl Into<String>) -> Self {
        Self::Watch(msg.into())
    }

    /// Create a new archive error
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Check if this is an invalid input error
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}
