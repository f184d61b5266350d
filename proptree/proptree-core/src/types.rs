//! Property types exchanged between the store and its callers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A (name, value) pair stored under a group node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyItem {
    pub name: String,
    pub value: String,
}

impl PropertyItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A property joined with its comment from the shadow tree.
///
/// Display items order by name only, which is the presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayItem {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl DisplayItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            comment: None,
        }
    }

    /// Attach a comment; empty comments are treated as absent.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        self.comment = if comment.is_empty() { None } else { Some(comment) };
        self
    }

    /// Join data properties with shadow-tree comments by name, sorted by name.
    ///
    /// Comments without a matching property are dropped.
    pub fn join(properties: Vec<PropertyItem>, comments: Vec<PropertyItem>) -> Vec<DisplayItem> {
        let mut comments: HashMap<String, String> = comments
            .into_iter()
            .map(|item| (item.name, item.value))
            .collect();

        let mut items: Vec<DisplayItem> = properties
            .into_iter()
            .map(|prop| {
                let comment = comments.remove(&prop.name).unwrap_or_default();
                DisplayItem::new(prop.name, prop.value).with_comment(comment)
            })
            .collect();

        items.sort();
        items
    }
}

impl PartialOrd for DisplayItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DisplayItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}
