//! Change detection for proptree.
//!
//! A [`ChangeWatchLoop`] observes one target, either a local configuration file
//! or a node in the coordination store, and calls a reload operation whenever
//! that target's content is modified.

pub mod file_source;
pub mod watch_loop;

pub use file_source::{watch_file, FileWatch};
pub use watch_loop::{ChangeWatchLoop, LoopState, ReloadFn, WatchExit, WatchReport};
