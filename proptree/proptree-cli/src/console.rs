//! Version, group and item management for one namespace root.
//!
//! Every value lives at `/<root>/<version>/<group>/<key>` and its comment at
//! the mirrored path under the shadow version `<version>$`. The two writes are
//! independent; [`PairedWrite`] reports which halves went through.

use crate::archive::{self, ArchiveEntry};
use crate::properties::{self, PROPERTIES_EXTENSION, ZIP_EXTENSION};
use proptree_core::error::{ProptreeError, Result};
use proptree_core::path::{self, make_paths, shadow_version};
use proptree_core::DisplayItem;
use proptree_store::PropertyTreeStore;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of a value write paired with its comment write.
///
/// `comment` is also `true` when no comment write was needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PairedWrite {
    pub value: bool,
    pub comment: bool,
}

impl PairedWrite {
    pub fn is_complete(&self) -> bool {
        self.value && self.comment
    }

    /// One half was written and the other was not.
    pub fn is_partial(&self) -> bool {
        self.value != self.comment
    }
}

/// Result of importing a `.properties` file or a zip of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub groups: Vec<String>,
    /// Properties newly created.
    pub created: usize,
    /// Properties left untouched because they already existed.
    pub skipped: usize,
}

/// Composite configuration operations scoped to a namespace root.
#[derive(Debug, Clone)]
pub struct ConfigConsole {
    store: PropertyTreeStore,
    root: String,
}

impl ConfigConsole {
    pub fn new(store: PropertyTreeStore, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into().trim_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn store(&self) -> &PropertyTreeStore {
        &self.store
    }

    fn version_path(&self, version: &str) -> String {
        make_paths(&self.root, &[version])
    }

    fn group_path(&self, version: &str, group: &str) -> String {
        make_paths(&self.root, &[version, group])
    }

    fn item_path(&self, version: &str, group: &str, key: &str) -> String {
        make_paths(&self.root, &[version, group, key])
    }

    /// Data versions under the root, newest-looking name first.
    pub async fn versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self
            .store
            .list_children(&make_paths(&self.root, &[]))
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|name| !path::is_shadow_version(name))
            .collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions
    }

    /// Groups of a version in ascending order; empty if the version is absent.
    pub async fn groups(&self, version: &str) -> Vec<String> {
        let mut groups = self
            .store
            .list_children(&self.version_path(version))
            .await
            .unwrap_or_default();
        groups.sort();
        groups
    }

    /// Items of a group joined with their comments, sorted by name.
    pub async fn display_items(&self, version: &str, group: &str) -> Vec<DisplayItem> {
        let props = self
            .store
            .find_properties(&self.group_path(version, group))
            .await;
        let comments = self
            .store
            .find_properties(&self.group_path(&shadow_version(version), group))
            .await;
        DisplayItem::join(props, comments)
    }

    /// Create a version and its shadow, optionally cloning both trees from `from`.
    ///
    /// Returns `false` if the name is invalid or the version already exists.
    pub async fn create_version(&self, version: &str, from: Option<&str>) -> bool {
        let version = version.trim();
        let from = from.map(str::trim).filter(|f| !f.is_empty());
        debug!("Create version {} from {:?}", version, from);

        if !is_node_name(version) || path::is_shadow_version(version) {
            warn!("Rejected version name [{}]", version);
            return false;
        }

        if !self.store.create_property(&self.version_path(version), None).await {
            return false;
        }

        let shadow = shadow_version(version);
        self.store
            .create_property(&self.version_path(&shadow), None)
            .await;

        if let Some(from) = from {
            self.clone_version(from, version).await;
            self.clone_version(&shadow_version(from), &shadow).await;
        }

        info!("Created version {}/{}", self.root, version);
        true
    }

    /// Copy every group and key of `source` into `destination` without overwriting.
    pub async fn clone_version(&self, source: &str, destination: &str) {
        let source_path = self.version_path(source);
        let destination_path = self.version_path(destination);

        let Some(groups) = self.store.list_children(&source_path).await else {
            return;
        };

        for group in groups {
            let source_group = make_paths(&source_path, &[&group]);
            let destination_group = make_paths(&destination_path, &[&group]);

            self.store.create_property(&destination_group, None).await;
            for prop in self.store.find_properties(&source_group).await {
                self.store
                    .create_property(
                        &make_paths(&destination_group, &[&prop.name]),
                        Some(&prop.value),
                    )
                    .await;
            }
        }
    }

    /// Delete a version together with its shadow.
    pub async fn delete_version(&self, version: &str) {
        debug!("Delete version: {}", version);
        self.store.delete_property(&self.version_path(version)).await;
        self.store
            .delete_property(&self.version_path(&shadow_version(version)))
            .await;
    }

    pub async fn create_group(&self, version: &str, group: &str) -> bool {
        let group = group.trim();
        if !is_node_name(group) {
            return false;
        }
        self.store
            .create_property(&self.group_path(version.trim(), group), None)
            .await
    }

    /// Delete a group from the data tree. Its comments are kept.
    pub async fn delete_group(&self, version: &str, group: &str) {
        debug!("Delete group version: {}, group: {}", version, group);
        self.store
            .delete_property(&self.group_path(version, group))
            .await;
    }

    /// Create an item; the comment is written only if the value was created.
    pub async fn create_item(
        &self,
        version: &str,
        group: &str,
        key: &str,
        value: &str,
        comment: Option<&str>,
    ) -> PairedWrite {
        let (version, group, key, value) = (version.trim(), group.trim(), key.trim(), value.trim());
        let comment = comment.map(str::trim).unwrap_or_default();
        debug!(
            "Create property version: {}, group: {}, key: {}, value: {}, comment: {}",
            version, group, key, value, comment
        );
        if !is_item_address(group, key) {
            warn!("Rejected item name [{}/{}]", group, key);
            return PairedWrite {
                value: false,
                comment: false,
            };
        }

        let value_written = self
            .store
            .create_property(&self.item_path(version, group, key), Some(value))
            .await;
        if !value_written {
            return PairedWrite {
                value: false,
                comment: false,
            };
        }

        let comment_written = comment.is_empty()
            || self
                .store
                .create_property(
                    &self.item_path(&shadow_version(version), group, key),
                    Some(comment),
                )
                .await;

        PairedWrite {
            value: true,
            comment: comment_written,
        }
    }

    /// Upsert an item value and its comment as two independent writes.
    pub async fn update_item(
        &self,
        version: &str,
        group: &str,
        key: &str,
        value: &str,
        comment: Option<&str>,
    ) -> PairedWrite {
        let (version, group, key, value) = (version.trim(), group.trim(), key.trim(), value.trim());
        let comment = comment.map(str::trim).unwrap_or_default();
        debug!(
            "Update property version: {}, group: {}, key: {}, value: {}, comment: {}",
            version, group, key, value, comment
        );
        if !is_item_address(group, key) {
            warn!("Rejected item name [{}/{}]", group, key);
            return PairedWrite {
                value: false,
                comment: false,
            };
        }

        let value_written = self
            .store
            .update_property(&self.item_path(version, group, key), value)
            .await;
        let comment_written = self
            .store
            .update_property(
                &self.item_path(&shadow_version(version), group, key),
                comment,
            )
            .await;

        let outcome = PairedWrite {
            value: value_written,
            comment: comment_written,
        };
        if outcome.is_partial() {
            warn!(
                "Partial update of {}/{}/{}: value={}, comment={}",
                version, group, key, outcome.value, outcome.comment
            );
        }
        outcome
    }

    /// Delete an item and its comment.
    pub async fn delete_item(&self, version: &str, group: &str, key: &str) {
        debug!("Delete property version: {}, group: {}, key: {}", version, group, key);
        self.store
            .delete_property(&self.item_path(version, group, key))
            .await;
        self.store
            .delete_property(&self.item_path(&shadow_version(version), group, key))
            .await;
    }

    pub async fn get_item(&self, version: &str, group: &str, key: &str) -> Option<DisplayItem> {
        let value = self
            .store
            .get_value(&self.item_path(version, group, key))
            .await?;
        let comment = self
            .store
            .get_value(&self.item_path(&shadow_version(version), group, key))
            .await
            .unwrap_or_default();
        Some(DisplayItem::new(key, value).with_comment(comment))
    }

    /// Render one group as `.properties` text.
    pub async fn export_group(&self, version: &str, group: &str) -> String {
        let items = self.display_items(version, group).await;
        properties::render(&self.root, version, group, &items)
    }

    /// Zip every non-empty group of a version as `<group>.properties`.
    ///
    /// Returns `None` if the version has no groups.
    pub async fn export_version(&self, version: &str) -> Result<Option<Vec<u8>>> {
        let groups = self.groups(version).await;
        if groups.is_empty() {
            return Ok(None);
        }

        let mut entries = Vec::with_capacity(groups.len());
        for group in &groups {
            let items = self.display_items(version, group).await;
            if items.is_empty() {
                continue;
            }
            entries.push(ArchiveEntry::new(
                format!("{}.{}", group, PROPERTIES_EXTENSION),
                properties::render(&self.root, version, group, &items),
            ));
        }

        info!(
            "Exported {} groups of {}/{}",
            entries.len(),
            self.root,
            version
        );
        archive::write_zip(&entries).map(Some)
    }

    /// File name for a whole-version export of this root.
    pub fn export_file_name(&self) -> String {
        format!("{}.{}", self.root.replace('/', "-"), ZIP_EXTENSION)
    }

    /// Import a `.properties` file (one group named after the file stem) or a
    /// zip of them (one group per entry). Existing properties are kept.
    pub async fn import(&self, version: &str, file_name: &str, bytes: &[u8]) -> Result<ImportSummary> {
        info!("Upload file : {}", file_name);

        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        let mut summary = ImportSummary::default();
        match extension {
            PROPERTIES_EXTENSION => {
                let text = String::from_utf8_lossy(bytes);
                self.save_group(version, file_name, &text, &mut summary).await;
            }
            ZIP_EXTENSION => {
                for entry in archive::read_zip(bytes)? {
                    self.save_group(version, &entry.name, &entry.content, &mut summary)
                        .await;
                }
            }
            _ => {
                return Err(ProptreeError::invalid_input(format!(
                    "Unsupported import file {}, expected .{} or .{}",
                    file_name, PROPERTIES_EXTENSION, ZIP_EXTENSION
                )));
            }
        }

        Ok(summary)
    }

    async fn save_group(&self, version: &str, file_name: &str, text: &str, summary: &mut ImportSummary) {
        let items = properties::parse(text);
        if items.is_empty() {
            return;
        }

        let Some(group) = Path::new(file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
        else {
            warn!("Skipping import entry without a group name: {}", file_name);
            return;
        };

        let data_path = self.group_path(version, group);
        let comment_path = self.group_path(&shadow_version(version), group);

        for item in &items {
            if !is_node_name(&item.name) {
                warn!("Skipping imported key [{}] in group {}", item.name, group);
                summary.skipped += 1;
                continue;
            }
            let created = self
                .store
                .create_property(&make_paths(&data_path, &[&item.name]), Some(&item.value))
                .await;
            self.store
                .create_property(
                    &make_paths(&comment_path, &[&item.name]),
                    item.comment.as_deref(),
                )
                .await;

            if created {
                summary.created += 1;
            } else {
                summary.skipped += 1;
            }
        }

        debug!("Imported group {} with {} items", group, items.len());
        summary.groups.push(group.to_string());
    }
}

/// A single path segment: non-empty and free of separators.
fn is_node_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}

fn is_item_address(group: &str, key: &str) -> bool {
    is_node_name(group) && is_node_name(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptree_store::CoordinationClient;
    use std::sync::Arc;

    async fn console() -> ConfigConsole {
        let client = CoordinationClient::connect_to("memory://").await.unwrap();
        ConfigConsole::new(PropertyTreeStore::new(Arc::new(client)), "u1")
    }

    #[test]
    fn test_paired_write_flags() {
        let partial = PairedWrite {
            value: true,
            comment: false,
        };
        assert!(partial.is_partial());
        assert!(!partial.is_complete());
        assert!(PairedWrite { value: true, comment: true }.is_complete());
        assert!(!PairedWrite { value: false, comment: false }.is_partial());
    }

    #[tokio::test]
    async fn test_versions_hide_shadows_and_sort_descending() {
        let console = console().await;
        assert!(console.create_version("1.0.0", None).await);
        assert!(console.create_version("2.0.0", None).await);
        assert!(!console.create_version("2.0.0", None).await);

        assert_eq!(console.versions().await, vec!["2.0.0", "1.0.0"]);
        assert!(console.store().get_value("/u1/2.0.0$").await.is_some());
    }

    #[tokio::test]
    async fn test_create_version_rejects_bad_names() {
        let console = console().await;
        assert!(!console.create_version("", None).await);
        assert!(!console.create_version("  ", None).await);
        assert!(!console.create_version("v1$", None).await);
        assert!(console.versions().await.is_empty());
    }

    #[tokio::test]
    async fn test_item_keys_must_be_single_segments() {
        let console = console().await;
        assert!(console.create_version("v1", None).await);

        let rejected = PairedWrite {
            value: false,
            comment: false,
        };
        assert_eq!(
            console.create_item("v1", "db", "pool/max", "8", Some("cap")).await,
            rejected
        );
        assert_eq!(console.update_item("v1", "db", "a/b", "1", None).await, rejected);
        assert_eq!(console.create_item("v1", "db/x", "pool", "8", None).await, rejected);
        assert_eq!(console.update_item("v1", "db", "", "1", None).await, rejected);

        assert!(console.display_items("v1", "db").await.is_empty());
        assert!(!console.store().client().exists("/u1/v1/db/pool").await);
        assert!(!console.store().client().exists("/u1/v1$/db/pool").await);
    }

    #[tokio::test]
    async fn test_import_skips_nested_keys() {
        let console = console().await;
        let summary = console
            .import("v1", "db.properties", b"pool/max=8\nurl=x\n")
            .await
            .unwrap();

        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(
            console.display_items("v1", "db").await,
            vec![DisplayItem::new("url", "x")]
        );
    }

    #[tokio::test]
    async fn test_create_item_writes_comment_only_with_value() {
        let console = console().await;
        console.create_version("v1", None).await;

        let first = console.create_item("v1", "g1", "k1", "10", Some("ten")).await;
        assert!(first.is_complete());

        let second = console.create_item("v1", "g1", "k1", "11", Some("eleven")).await;
        assert_eq!(second, PairedWrite { value: false, comment: false });

        let item = console.get_item("v1", "g1", "k1").await.unwrap();
        assert_eq!(item, DisplayItem::new("k1", "10").with_comment("ten"));

        let no_comment = console.create_item("v1", "g1", "k2", "x", None).await;
        assert!(no_comment.is_complete());
        assert_eq!(console.store().get_value("/u1/v1$/g1/k2").await, None);
    }

    #[tokio::test]
    async fn test_update_item_upserts_both_trees() {
        let console = console().await;
        let outcome = console.update_item("v1", "g1", "k1", " 20 ", Some("note")).await;
        assert!(outcome.is_complete());

        let items = console.display_items("v1", "g1").await;
        assert_eq!(items, vec![DisplayItem::new("k1", "20").with_comment("note")]);
    }

    #[tokio::test]
    async fn test_clone_copies_values_and_comments() {
        let console = console().await;
        console.create_version("v1", None).await;
        console.create_item("v1", "db", "url", "x", Some("the url")).await;
        console.create_item("v1", "cache", "ttl", "60", None).await;

        assert!(console.create_version("v2", Some("v1")).await);

        assert_eq!(console.groups("v2").await, vec!["cache", "db"]);
        assert_eq!(
            console.display_items("v2", "db").await,
            console.display_items("v1", "db").await
        );
        assert_eq!(
            console.get_item("v2", "cache", "ttl").await,
            Some(DisplayItem::new("ttl", "60"))
        );
    }

    #[tokio::test]
    async fn test_delete_group_keeps_comments_delete_item_removes_both() {
        let console = console().await;
        console.create_item("v1", "g1", "k1", "1", Some("c1")).await;
        console.create_item("v1", "g2", "k2", "2", Some("c2")).await;

        console.delete_group("v1", "g1").await;
        assert!(console.display_items("v1", "g1").await.is_empty());
        assert!(console.store().get_value("/u1/v1$/g1/k1").await.is_some());

        console.delete_item("v1", "g2", "k2").await;
        assert_eq!(console.get_item("v1", "g2", "k2").await, None);
        assert_eq!(console.store().get_value("/u1/v1$/g2/k2").await, None);
    }

    #[tokio::test]
    async fn test_delete_version_removes_shadow() {
        let console = console().await;
        console.create_version("v1", None).await;
        console.create_item("v1", "g1", "k1", "1", Some("c")).await;

        console.delete_version("v1").await;

        assert!(console.versions().await.is_empty());
        assert_eq!(console.store().list_children("/u1").await, Some(vec![]));
    }

    #[tokio::test]
    async fn test_import_rejects_unknown_extension() {
        let console = console().await;
        let err = console.import("v1", "data.txt", b"a=1").await.unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[tokio::test]
    async fn test_export_group_then_import_elsewhere() {
        let console = console().await;
        console.create_item("v1", "db", "url", "x=y", Some("the url")).await;
        console.create_item("v1", "db", "pool", "8", None).await;

        let text = console.export_group("v1", "db").await;
        assert!(text.starts_with("# Export from zookeeper configuration group: [u1] - [v1] - [db]."));

        let summary = console.import("v2", "db.properties", text.as_bytes()).await.unwrap();
        assert_eq!(summary.groups, vec!["db"]);
        assert_eq!(summary.created, 2);
        assert_eq!(
            console.display_items("v2", "db").await,
            console.display_items("v1", "db").await
        );
    }
}
