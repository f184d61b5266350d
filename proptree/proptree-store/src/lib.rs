//! Coordination store access for proptree.
//!
//! Provides the backend contract with in-memory and SurrealDB implementations,
//! the session-owning [`CoordinationClient`], and the [`PropertyTreeStore`]
//! that implements version/group/key CRUD on top of it.

pub mod backend;
pub mod client;
pub mod error;
pub mod memory;
pub mod surreal;
pub mod tree;

pub use backend::CoordinationBackend;
pub use client::CoordinationClient;
pub use error::{CoordinationError, CoordinationResult};
pub use memory::MemoryBackend;
pub use surreal::SurrealBackend;
pub use tree::PropertyTreeStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::backend::CoordinationBackend;
    pub use crate::client::CoordinationClient;
    pub use crate::error::{CoordinationError, CoordinationResult};
    pub use crate::memory::MemoryBackend;
    pub use crate::tree::PropertyTreeStore;
}
