//! In-process coordination tree.
//!
//! Serves `memory://` addresses and the test-suite. Every mutation runs under
//! a single write lock, which gives create-if-absent the same atomicity a
//! remote store provides. Watch notifications are collected under the lock
//! and dispatched after it is released.

use crate::backend::{check_path, CoordinationBackend};
use crate::error::{CoordinationError, CoordinationResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use proptree_core::path::{self, ROOT};
use proptree_core::{watch_key, WatchEvent, WatchKey, WatchSignal};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

#[derive(Debug, Default)]
struct Node {
    data: Vec<u8>,
    children: BTreeSet<String>,
}

struct Registration {
    path: String,
    signal: WatchSignal,
}

/// Pending notifications produced by one mutation.
#[derive(Default)]
struct Changes {
    events: Vec<(String, ChangeKind)>,
}

#[derive(Debug, Clone, Copy)]
enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl Changes {
    fn push(&mut self, path: impl Into<String>, kind: ChangeKind) {
        self.events.push((path.into(), kind));
    }
}

/// Coordination backend holding the whole tree in memory.
pub struct MemoryBackend {
    nodes: RwLock<HashMap<String, Node>>,
    watchers: Mutex<Vec<Registration>>,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT.to_string(), Node::default());
        Self {
            nodes: RwLock::new(nodes),
            watchers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> CoordinationResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(CoordinationError::Closed)
        } else {
            Ok(())
        }
    }

    fn insert_node(
        nodes: &mut HashMap<String, Node>,
        node_path: &str,
        data: Vec<u8>,
        changes: &mut Changes,
    ) {
        if let Some(parent) = path::parent_path(node_path) {
            if let Some(parent_node) = nodes.get_mut(parent) {
                parent_node.children.insert(path::node_name(node_path).to_string());
            }
        }
        nodes.insert(
            node_path.to_string(),
            Node {
                data,
                children: BTreeSet::new(),
            },
        );
        changes.push(node_path, ChangeKind::Created);
    }

    fn dispatch(&self, changes: Changes) {
        if changes.events.is_empty() {
            return;
        }

        let mut watchers = self.watchers.lock();
        for registration in watchers.iter() {
            for (changed, kind) in &changes.events {
                if let Some(context) = path::relative_to(changed, &registration.path) {
                    let event = match kind {
                        ChangeKind::Created => WatchEvent::created(context),
                        ChangeKind::Modified => WatchEvent::modified(context),
                        ChangeKind::Deleted => WatchEvent::deleted(context),
                    };
                    registration.signal.signal(event);
                } else if matches!(kind, ChangeKind::Deleted)
                    && path::is_same_or_descendant(&registration.path, changed)
                {
                    debug!("Watched node {} deleted, invalidating watch", registration.path);
                    registration.signal.invalidate();
                }
            }
        }
        watchers.retain(|registration| !registration.signal.is_closed());
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, path: &str) -> CoordinationResult<bool> {
        self.ensure_open()?;
        check_path(path)?;
        Ok(self.nodes.read().contains_key(path))
    }

    async fn get_data(&self, path: &str) -> CoordinationResult<Vec<u8>> {
        self.ensure_open()?;
        check_path(path)?;
        self.nodes
            .read()
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| CoordinationError::no_node(path))
    }

    async fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        self.ensure_open()?;
        check_path(path)?;
        self.nodes
            .read()
            .get(path)
            .map(|node| node.children.iter().cloned().collect())
            .ok_or_else(|| CoordinationError::no_node(path))
    }

    async fn create(&self, path: &str, data: &[u8]) -> CoordinationResult<String> {
        self.ensure_open()?;
        check_path(path)?;

        let mut changes = Changes::default();
        {
            let mut nodes = self.nodes.write();
            if nodes.contains_key(path) {
                return Err(CoordinationError::node_exists(path));
            }
            for ancestor in path::ancestors(path) {
                if !nodes.contains_key(&ancestor) {
                    Self::insert_node(&mut nodes, &ancestor, Vec::new(), &mut changes);
                }
            }
            Self::insert_node(&mut nodes, path, data.to_vec(), &mut changes);
        }

        self.dispatch(changes);
        Ok(path.to_string())
    }

    async fn set_data(&self, path: &str, data: &[u8]) -> CoordinationResult<()> {
        self.ensure_open()?;
        check_path(path)?;

        let mut changes = Changes::default();
        {
            let mut nodes = self.nodes.write();
            let node = nodes
                .get_mut(path)
                .ok_or_else(|| CoordinationError::no_node(path))?;
            node.data = data.to_vec();
            changes.push(path, ChangeKind::Modified);
        }

        self.dispatch(changes);
        Ok(())
    }

    async fn delete_recursive(&self, path: &str) -> CoordinationResult<()> {
        self.ensure_open()?;
        check_path(path)?;
        if path == ROOT {
            return Err(CoordinationError::InvalidPath(
                "the root node cannot be deleted".to_string(),
            ));
        }

        let mut changes = Changes::default();
        {
            let mut nodes = self.nodes.write();
            if !nodes.contains_key(path) {
                return Err(CoordinationError::no_node(path));
            }

            let mut doomed: Vec<String> = nodes
                .keys()
                .filter(|candidate| path::is_same_or_descendant(candidate, path))
                .cloned()
                .collect();
            // Deepest first, like a bottom-up recursive delete.
            doomed.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

            for doomed_path in doomed {
                nodes.remove(&doomed_path);
                changes.push(doomed_path, ChangeKind::Deleted);
            }

            if let Some(parent) = path::parent_path(path) {
                if let Some(parent_node) = nodes.get_mut(parent) {
                    parent_node.children.remove(path::node_name(path));
                }
            }
        }

        self.dispatch(changes);
        Ok(())
    }

    async fn watch(&self, path: &str) -> CoordinationResult<WatchKey> {
        self.ensure_open()?;
        check_path(path)?;

        // Registration happens under the read lock so no mutation slips between
        // the existence check and the moment the watch becomes visible.
        let nodes = self.nodes.read();
        if !nodes.contains_key(path) {
            return Err(CoordinationError::no_node(path));
        }
        let (key, signal) = watch_key(path);
        self.watchers.lock().push(Registration {
            path: path.to_string(),
            signal,
        });
        drop(nodes);

        debug!("Registered watch on {}", path);
        Ok(key)
    }

    async fn close(&self) -> CoordinationResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        for registration in self.watchers.lock().drain(..) {
            registration.signal.invalidate();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptree_core::WatchEventKind;

    #[tokio::test]
    async fn test_create_with_parents() {
        let backend = MemoryBackend::new();
        let created = backend.create("/u1/v1/g1/k1", b"10").await.unwrap();
        assert_eq!(created, "/u1/v1/g1/k1");

        assert!(backend.exists("/u1").await.unwrap());
        assert!(backend.exists("/u1/v1/g1").await.unwrap());
        assert_eq!(backend.get_data("/u1/v1").await.unwrap(), Vec::<u8>::new());
        assert_eq!(backend.get_data("/u1/v1/g1/k1").await.unwrap(), b"10".to_vec());
        assert_eq!(backend.get_children("/").await.unwrap(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let backend = MemoryBackend::new();
        backend.create("/u1", b"a").await.unwrap();
        let err = backend.create("/u1", b"b").await.unwrap_err();
        assert!(err.is_node_exists());
        assert_eq!(backend.get_data("/u1").await.unwrap(), b"a".to_vec());
    }

    #[tokio::test]
    async fn test_children_distinguish_absent_from_empty() {
        let backend = MemoryBackend::new();
        backend.create("/u1", b"").await.unwrap();
        assert!(backend.get_children("/u1").await.unwrap().is_empty());
        assert!(backend.get_children("/u2").await.unwrap_err().is_no_node());
    }

    #[tokio::test]
    async fn test_delete_recursive() {
        let backend = MemoryBackend::new();
        backend.create("/u1/v1/g1/k1", b"1").await.unwrap();
        backend.create("/u1/v1/g1/k2", b"2").await.unwrap();
        backend.create("/u1/v10/g1/k1", b"3").await.unwrap();

        backend.delete_recursive("/u1/v1").await.unwrap();

        assert!(!backend.exists("/u1/v1/g1/k1").await.unwrap());
        assert!(!backend.exists("/u1/v1").await.unwrap());
        assert!(backend.exists("/u1/v10/g1/k1").await.unwrap());
        assert_eq!(backend.get_children("/u1").await.unwrap(), vec!["v10".to_string()]);
        assert!(backend.delete_recursive("/u1/v1").await.unwrap_err().is_no_node());
    }

    #[tokio::test]
    async fn test_invalid_paths_rejected() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.create("u1", b"").await,
            Err(CoordinationError::InvalidPath(_))
        ));
        assert!(matches!(
            backend.delete_recursive("/").await,
            Err(CoordinationError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_reports_descendant_changes() {
        let backend = MemoryBackend::new();
        backend.create("/u1/v1/g1/k1", b"1").await.unwrap();
        let mut key = backend.watch("/u1/v1").await.unwrap();

        backend.set_data("/u1/v1/g1/k1", b"2").await.unwrap();
        backend.set_data("/u1/v1", b"self").await.unwrap();

        let batch = key.take().await.unwrap();
        assert_eq!(batch, vec![WatchEvent::modified("g1/k1")]);
        assert!(key.reset());

        backend.create("/u1/v1/g2/k1", b"x").await.unwrap();
        let batch = key.take().await.unwrap();
        assert!(batch.iter().all(|e| e.kind == WatchEventKind::Created));
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_deleting_watched_node_invalidates_key() {
        let backend = MemoryBackend::new();
        backend.create("/u1/v1/g1", b"").await.unwrap();
        let mut key = backend.watch("/u1/v1/g1").await.unwrap();

        backend.delete_recursive("/u1/v1").await.unwrap();

        assert!(!key.is_valid());
        assert!(!key.reset());
    }

    #[tokio::test]
    async fn test_watch_requires_existing_node() {
        let backend = MemoryBackend::new();
        assert!(backend.watch("/missing").await.unwrap_err().is_no_node());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let backend = MemoryBackend::new();
        backend.close().await.unwrap();
        backend.close().await.unwrap();
        assert_eq!(backend.exists("/").await, Err(CoordinationError::Closed));
    }
}
