//! Filesystem change source for a single configuration file.
//!
//! The parent directory is watched non-recursively; every event is reported
//! with the affected entry's file name as its context, so the watch loop can
//! pick out the one file it cares about.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use proptree_core::error::{ProptreeError, Result};
use proptree_core::{watch_key, WatchEvent, WatchEventKind, WatchKey, WatchSignal};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A watch on the directory containing a file.
#[derive(Debug)]
pub struct FileWatch {
    pub key: WatchKey,
    /// File name to match events against.
    pub target: String,
    pub directory: PathBuf,
}

/// Split a file path into its watched directory and file name.
pub fn split_file_path(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            ProptreeError::invalid_input(format!("Not a file path: {}", path.display()))
        })?
        .to_string();

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok((directory, name))
}

/// Start watching the directory that contains `path`.
///
/// The returned key owns the underlying watcher; dropping the key stops it.
pub fn watch_file(path: &Path) -> Result<FileWatch> {
    let (directory, target) = split_file_path(path)?;

    let (key, signal) = watch_key(directory.display().to_string());
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => forward_event(&signal, event),
        Err(e) => warn!("File watcher error: {}", e),
    })
    .map_err(|e| ProptreeError::watch(format!("Failed to create watcher: {}", e)))?;

    watcher
        .watch(&directory, RecursiveMode::NonRecursive)
        .map_err(|e| {
            ProptreeError::watch(format!(
                "Failed to watch directory {}: {}",
                directory.display(),
                e
            ))
        })?;

    debug!("Watching {} for changes to {}", directory.display(), target);

    Ok(FileWatch {
        key: key.with_guard(watcher),
        target,
        directory,
    })
}

fn forward_event(signal: &WatchSignal, event: Event) {
    for (kind, path) in convert_event(&event) {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        signal.signal(WatchEvent::new(kind, name));
    }
}

/// Map a notify event onto watch event kinds, one per affected path.
fn convert_event(event: &Event) -> Vec<(WatchEventKind, &Path)> {
    let paths = event.paths.iter().map(PathBuf::as_path);

    match event.kind {
        EventKind::Create(_) => paths.map(|p| (WatchEventKind::Created, p)).collect(),
        EventKind::Remove(_) => paths.map(|p| (WatchEventKind::Deleted, p)).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.map(|p| (WatchEventKind::Deleted, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.map(|p| (WatchEventKind::Created, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => vec![
            (WatchEventKind::Deleted, event.paths[0].as_path()),
            (WatchEventKind::Created, event.paths[1].as_path()),
        ],
        EventKind::Modify(_) => paths.map(|p| (WatchEventKind::Modified, p)).collect(),
        _ => Vec::new(),
    }
}
