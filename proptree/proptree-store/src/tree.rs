//! Hierarchical property CRUD over the coordination client.
//!
//! Paths follow `/<root>/<version>/<group>/<key>`. Values are UTF-8 text. No
//! operation here spans more than one remote path atomically.

use crate::client::CoordinationClient;
use proptree_core::path::make_path;
use proptree_core::PropertyItem;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Version/group/key property tree with create-if-absent and upsert semantics.
#[derive(Debug, Clone)]
pub struct PropertyTreeStore {
    client: Arc<CoordinationClient>,
}

impl PropertyTreeStore {
    pub fn new(client: Arc<CoordinationClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<CoordinationClient> {
        &self.client
    }

    /// Child names of `node`, or `None` if `node` does not exist.
    pub async fn list_children(&self, node: &str) -> Option<Vec<String>> {
        debug!("Find children of node: [{}]", node);
        self.client.children(node).await
    }

    /// Properties directly under a group node. Empty if the group is absent.
    pub async fn find_properties(&self, node: &str) -> Vec<PropertyItem> {
        debug!("Find properties in node: [{}]", node);

        let children = match self.client.try_children(node).await {
            Ok(children) => children,
            Err(e) if e.is_no_node() => return Vec::new(),
            Err(e) => {
                error!("Failed to list properties of {}: {}", node, e);
                return Vec::new();
            }
        };

        let mut properties = Vec::with_capacity(children.len());
        for child in children {
            let prop_path = make_path(node, &child);
            match self.client.try_read(&prop_path).await {
                Ok(data) => {
                    let value = String::from_utf8_lossy(&data).into_owned();
                    properties.push(PropertyItem::new(child, value));
                }
                // Removed by another writer after the listing.
                Err(e) if e.is_no_node() => continue,
                Err(e) => {
                    error!("Failed to read property {}: {}", prop_path, e);
                    break;
                }
            }
        }
        properties
    }

    /// Create `node` (with parents) only if it does not exist yet.
    ///
    /// Returns `false` without touching the store when the node is present.
    pub async fn create_property(&self, node: &str, value: Option<&str>) -> bool {
        debug!("Create property : [{}] = [{:?}]", node, value);

        match self.client.try_exists(node).await {
            Ok(true) => return false,
            Ok(false) => {}
            Err(e) => {
                error!("Failed to check {}: {}", node, e);
                return false;
            }
        }

        let data = value.unwrap_or_default().as_bytes();
        match self.client.try_create(node, data).await {
            Ok(stored) => stored == node,
            Err(e) if e.is_node_exists() => {
                debug!("Lost create race for {}", node);
                false
            }
            Err(e) => {
                error!("Failed to create {}: {}", node, e);
                false
            }
        }
    }

    /// Create or overwrite `node` with `value`.
    pub async fn update_property(&self, node: &str, value: &str) -> bool {
        debug!("Update property: [{}] = [{}]", node, value);
        self.client.write(node, value.as_bytes()).await
    }

    /// Recursively delete `node`; nothing happens if it is absent.
    pub async fn delete_property(&self, node: &str) {
        debug!("Delete property: [{}]", node);
        self.client.delete(node).await;
    }

    /// Value stored at `node`, if it exists.
    pub async fn get_value(&self, node: &str) -> Option<String> {
        match self.client.try_read(node).await {
            Ok(data) => Some(String::from_utf8_lossy(&data).into_owned()),
            Err(e) if e.is_no_node() => None,
            Err(e) => {
                warn!("Failed to read value of {}: {}", node, e);
                None
            }
        }
    }
}
