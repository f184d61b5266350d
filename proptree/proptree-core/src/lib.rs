//! Core types and abstractions for the proptree configuration store.
//!
//! This crate provides the path helpers, property types, watch primitive,
//! configuration and error handling shared by the store, the watch loop and
//! the command-line console.

pub mod config;
pub mod error;
pub mod path;
pub mod types;
pub mod watch;

pub use config::{ProptreeConfig, RetryConfig};
pub use error::{ProptreeError, Result};
pub use types::{DisplayItem, PropertyItem};
pub use watch::{watch_key, WatchEvent, WatchEventKind, WatchKey, WatchSignal};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CoordinationConfig, ProptreeConfig, RetryConfig};
    pub use crate::error::{ProptreeError, Result};
    pub use crate::path::{make_path, make_paths, COMMENT_SUFFIX};
    pub use crate::types::{DisplayItem, PropertyItem};
    pub use crate::watch::{watch_key, WatchEvent, WatchEventKind, WatchKey, WatchSignal};
}
