//! Capability contract of the coordination store.

use crate::error::{CoordinationError, CoordinationResult};
use async_trait::async_trait;
use proptree_core::path;
use proptree_core::WatchKey;

/// A hierarchical path namespace with atomic per-path operations.
///
/// The root `/` always exists and cannot be deleted. All paths must satisfy
/// [`path::is_valid_path`].
#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn exists(&self, path: &str) -> CoordinationResult<bool>;

    /// Data stored at `path`; `NoNode` if absent.
    async fn get_data(&self, path: &str) -> CoordinationResult<Vec<u8>>;

    /// Names of the direct children of `path`; `NoNode` if absent.
    async fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>>;

    /// Atomically create `path` and any missing ancestors.
    ///
    /// Exactly one of several concurrent creators succeeds; the others get
    /// `NodeExists`. Returns the path actually stored.
    async fn create(&self, path: &str, data: &[u8]) -> CoordinationResult<String>;

    /// Replace the data of an existing node; `NoNode` if absent.
    async fn set_data(&self, path: &str, data: &[u8]) -> CoordinationResult<()>;

    /// Delete `path` and all descendants; `NoNode` if absent.
    async fn delete_recursive(&self, path: &str) -> CoordinationResult<()>;

    /// Register interest in changes below `path`; `NoNode` if absent.
    ///
    /// The key delivers one batch at a time and must be reset after each.
    async fn watch(&self, path: &str) -> CoordinationResult<WatchKey>;

    /// Release the session. Further calls fail with `Closed`.
    async fn close(&self) -> CoordinationResult<()>;
}

/// Reject malformed paths before they reach a backend.
pub fn check_path(path: &str) -> CoordinationResult<()> {
    if path::is_valid_path(path) {
        Ok(())
    } else {
        Err(CoordinationError::InvalidPath(path.to_string()))
    }
}
