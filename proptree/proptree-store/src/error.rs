//! Typed failures of coordination store calls.
//!
//! These never cross the public boundary of [`crate::CoordinationClient`] or
//! [`crate::PropertyTreeStore`]; they are logged there and degraded to
//! false/empty/none.

use proptree_core::ProptreeError;

pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinationError {
    /// The addressed node does not exist
    #[error("No node: {0}")]
    NoNode(String),

    /// Create-if-absent found an existing node
    #[error("Node exists: {0}")]
    NodeExists(String),

    /// The path is not an absolute, well-formed node path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No session has been established
    #[error("Not connected to coordination store")]
    NotConnected,

    /// The session was closed
    #[error("Coordination session closed")]
    Closed,

    /// Connection attempts exhausted
    #[error("Failed to connect to {address} after {attempts} attempts: {reason}")]
    ConnectFailed {
        address: String,
        attempts: u32,
        reason: String,
    },

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl CoordinationError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn no_node(path: impl Into<String>) -> Self {
        Self::NoNode(path.into())
    }

    pub fn node_exists(path: impl Into<String>) -> Self {
        Self::NodeExists(path.into())
    }

    pub fn is_no_node(&self) -> bool {
        matches!(self, Self::NoNode(_))
    }

    pub fn is_node_exists(&self) -> bool {
        matches!(self, Self::NodeExists(_))
    }

    /// Logical outcomes that callers treat as normal rather than failures.
    pub fn is_expected(&self) -> bool {
        self.is_no_node() || self.is_node_exists()
    }
}

impl From<CoordinationError> for ProptreeError {
    fn from(err: CoordinationError) -> Self {
        ProptreeError::coordination(err.to_string())
    }
}
