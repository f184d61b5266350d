//! SurrealDB-backed coordination store.
//!
//! Every node is a record in the `znode` table keyed by its full path, holding
//! its parent path, its own name and its data. Watches are live queries on
//! that table, filtered to the watched subtree.

use crate::backend::{check_path, CoordinationBackend};
use crate::error::{CoordinationError, CoordinationResult};
use async_trait::async_trait;
use futures::StreamExt;
use proptree_core::config::CoordinationConfig;
use proptree_core::path::{self, ROOT};
use proptree_core::{watch_key, WatchEvent, WatchEventKind, WatchKey, WatchSignal};
use serde::{Deserialize, Serialize};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use surrealdb::engine::any::{self, Any};
use surrealdb::method::Stream;
use surrealdb::{Action, Notification, Surreal};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

const TABLE: &str = "znode";

/// Stored form of a node. Data is kept as UTF-8 text.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRecord {
    path: String,
    parent: String,
    name: String,
    data: String,
}

impl NodeRecord {
    fn new(node_path: &str, data: &[u8]) -> Self {
        Self {
            path: node_path.to_string(),
            parent: path::parent_path(node_path).unwrap_or(ROOT).to_string(),
            name: path::node_name(node_path).to_string(),
            data: String::from_utf8_lossy(data).into_owned(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NameRow {
    name: String,
}

/// Aborts the live-query forwarding task when the owning key is dropped.
struct LiveQueryTask(JoinHandle<()>);

impl Drop for LiveQueryTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A live watch owned by the session, torn down on close.
struct LiveWatch {
    signal: WatchSignal,
    task: AbortHandle,
}

/// Coordination backend using a SurrealDB connection.
pub struct SurrealBackend {
    db: Surreal<Any>,
    address: String,
    watches: Mutex<Vec<LiveWatch>>,
    closed: AtomicBool,
}

impl SurrealBackend {
    /// Open a connection and select the configured namespace and database.
    pub async fn connect(config: &CoordinationConfig) -> CoordinationResult<Self> {
        debug!("Creating new SurrealDB connection: {}", config.address);

        let db = any::connect(config.address.clone())
            .await
            .map_err(|e| CoordinationError::backend(format!("Failed to connect: {}", e)))?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                CoordinationError::backend(format!("Failed to use namespace/database: {}", e))
            })?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            db.signin(surrealdb::opt::auth::Root { username, password })
                .await
                .map_err(|e| CoordinationError::backend(format!("Authentication failed: {}", e)))?;
        }

        info!("SurrealDB coordination session open at {}", config.address);

        Ok(Self {
            db,
            address: config.address.clone(),
            watches: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn ensure_open(&self) -> CoordinationResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(CoordinationError::Closed)
        } else {
            Ok(())
        }
    }

    async fn fetch(&self, node_path: &str) -> CoordinationResult<Option<NodeRecord>> {
        let record: Option<NodeRecord> = self
            .db
            .select((TABLE, node_path.to_string()))
            .await
            .map_err(|e| CoordinationError::backend(format!("Failed to read {}: {}", node_path, e)))?;
        Ok(record)
    }

    async fn node_exists(&self, node_path: &str) -> CoordinationResult<bool> {
        if node_path == ROOT {
            return Ok(true);
        }
        Ok(self.fetch(node_path).await?.is_some())
    }

    async fn insert(&self, node_path: &str, data: &[u8]) -> CoordinationResult<String> {
        let created: std::result::Result<Option<NodeRecord>, surrealdb::Error> = self
            .db
            .create((TABLE, node_path.to_string()))
            .content(NodeRecord::new(node_path, data))
            .await;

        match created {
            Ok(Some(record)) => Ok(record.path),
            Ok(None) => Err(CoordinationError::backend(format!(
                "Create of {} returned no record",
                node_path
            ))),
            // The record id is unique, so a failed create on a now-present
            // node means another writer won the race.
            Err(e) => {
                if self.fetch(node_path).await?.is_some() {
                    Err(CoordinationError::node_exists(node_path))
                } else {
                    Err(CoordinationError::backend(format!(
                        "Failed to create {}: {}",
                        node_path, e
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl CoordinationBackend for SurrealBackend {
    fn name(&self) -> &'static str {
        "surrealdb"
    }

    async fn exists(&self, path: &str) -> CoordinationResult<bool> {
        self.ensure_open()?;
        check_path(path)?;
        self.node_exists(path).await
    }

    async fn get_data(&self, path: &str) -> CoordinationResult<Vec<u8>> {
        self.ensure_open()?;
        check_path(path)?;
        if path == ROOT {
            return Ok(Vec::new());
        }
        self.fetch(path)
            .await?
            .map(|record| record.data.into_bytes())
            .ok_or_else(|| CoordinationError::no_node(path))
    }

    async fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        self.ensure_open()?;
        check_path(path)?;
        if !self.node_exists(path).await? {
            return Err(CoordinationError::no_node(path));
        }

        let mut response = self
            .db
            .query("SELECT name FROM znode WHERE parent = $parent ORDER BY name")
            .bind(("parent", path.to_string()))
            .await
            .map_err(|e| CoordinationError::backend(format!("Failed to list {}: {}", path, e)))?;

        let rows: Vec<NameRow> = response
            .take(0)
            .map_err(|e| CoordinationError::backend(format!("Failed to parse children: {}", e)))?;

        Ok(rows.into_iter().map(|row| row.name).collect())
    }

    async fn create(&self, path: &str, data: &[u8]) -> CoordinationResult<String> {
        self.ensure_open()?;
        check_path(path)?;
        if self.node_exists(path).await? {
            return Err(CoordinationError::node_exists(path));
        }

        for ancestor in path::ancestors(path) {
            if self.fetch(&ancestor).await?.is_some() {
                continue;
            }
            match self.insert(&ancestor, &[]).await {
                Ok(_) => {}
                Err(e) if e.is_node_exists() => {}
                Err(e) => return Err(e),
            }
        }

        self.insert(path, data).await
    }

    async fn set_data(&self, path: &str, data: &[u8]) -> CoordinationResult<()> {
        self.ensure_open()?;
        check_path(path)?;
        if path == ROOT {
            return Err(CoordinationError::InvalidPath(
                "the root node holds no data".to_string(),
            ));
        }
        if self.fetch(path).await?.is_none() {
            return Err(CoordinationError::no_node(path));
        }

        let _: Option<NodeRecord> = self
            .db
            .upsert((TABLE, path.to_string()))
            .content(NodeRecord::new(path, data))
            .await
            .map_err(|e| CoordinationError::backend(format!("Failed to update {}: {}", path, e)))?;

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
        if self.fetch(path).await?.is_none() {
            return Err(CoordinationError::no_node(path));
        }

        let mut response = self
            .db
            .query("DELETE znode WHERE path = $path OR string::starts_with(path, $prefix) RETURN BEFORE")
            .bind(("path", path.to_string()))
            .bind(("prefix", format!("{}/", path)))
            .await
            .map_err(|e| CoordinationError::backend(format!("Failed to delete {}: {}", path, e)))?;

        let removed: Vec<NodeRecord> = response
            .take(0)
            .map_err(|e| CoordinationError::backend(format!("Failed to delete {}: {}", path, e)))?;

        debug!("Deleted {} nodes under {}", removed.len(), path);
        Ok(())
    }

    async fn watch(&self, path: &str) -> CoordinationResult<WatchKey> {
        self.ensure_open()?;
        check_path(path)?;
        if !self.node_exists(path).await? {
            return Err(CoordinationError::no_node(path));
        }

        let stream: Stream<Vec<NodeRecord>> = self
            .db
            .select(TABLE)
            .live()
            .await
            .map_err(|e| CoordinationError::backend(format!("Failed to watch {}: {}", path, e)))?;

        let (key, signal) = watch_key(path);
        let task = tokio::spawn(forward_notifications(
            stream,
            path.to_string(),
            signal.clone(),
        ));

        {
            let mut watches = self.watches.lock();
            watches.retain(|watch| !watch.signal.is_closed());
            watches.push(LiveWatch {
                signal,
                task: task.abort_handle(),
            });
        }

        debug!("Registered live query watch on {}", path);
        Ok(key.with_guard(LiveQueryTask(task)))
    }

    async fn close(&self) -> CoordinationResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Closing SurrealDB coordination session at {}", self.address);

        for watch in self.watches.lock().drain(..) {
            watch.task.abort();
            watch.signal.invalidate();
        }
        Ok(())
    }
}

/// Translate live-query notifications for the watched subtree into key signals.
async fn forward_notifications(
    mut stream: Stream<Vec<NodeRecord>>,
    watched: String,
    signal: WatchSignal,
) {
    while let Some(item) = stream.next().await {
        let notification: Notification<NodeRecord> = match item {
            Ok(notification) => notification,
            Err(e) => {
                warn!("Live query notification error on {}: {}", watched, e);
                continue;
            }
        };

        let kind = match notification.action {
            Action::Create => WatchEventKind::Created,
            Action::Update => WatchEventKind::Modified,
            Action::Delete => WatchEventKind::Deleted,
            _ => continue,
        };
        let record = notification.data;

        if let Some(context) = path::relative_to(&record.path, &watched) {
            if !signal.signal(WatchEvent::new(kind, context)) {
                break;
            }
        } else if kind == WatchEventKind::Deleted
            && path::is_same_or_descendant(&watched, &record.path)
        {
            debug!("Watched node {} deleted, invalidating watch", watched);
            break;
        }
    }

    signal.invalidate();
}
