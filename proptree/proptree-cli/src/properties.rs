//! `.properties` interchange format.
//!
//! An exported group looks like:
//!
//! ```text
//! # Export from zookeeper configuration group: [u1] - [v1] - [db].
//!
//! # connection url
//! url=jdbc:mysql://localhost
//! pool=8
//! ```
//!
//! A `#` line directly above a property is that property's comment.

use proptree_core::DisplayItem;

/// Prefix of the first line written on export and skipped on import.
pub const EXPORT_MARKER: &str = "# Export from zookeeper";

pub const LINE_SEPARATOR: &str = "\r\n";

pub const PROPERTIES_EXTENSION: &str = "properties";

pub const ZIP_EXTENSION: &str = "zip";

/// Parse property lines, attaching each directly preceding `#` line as a comment.
///
/// Lines without `=` are ignored; key and value are trimmed and split on the
/// first `=` only.
pub fn parse(text: &str) -> Vec<DisplayItem> {
    let mut items = Vec::new();
    let mut previous: Option<&str> = None;

    for (index, line) in text.lines().enumerate() {
        if index == 0 && line.starts_with(EXPORT_MARKER) {
            continue;
        }

        if !line.starts_with('#') {
            if let Some((name, value)) = line.split_once('=') {
                let mut item = DisplayItem::new(name.trim(), value.trim());
                if let Some(comment) = previous.filter(|prev| prev.starts_with('#')) {
                    item = item.with_comment(comment.trim_start_matches('#').trim());
                }
                items.push(item);
            }
        }

        previous = Some(line);
    }

    items
}

/// Header line identifying the exported group.
pub fn export_header(root: &str, version: &str, group: &str) -> String {
    format!(
        "{} configuration group: [{}] - [{}] - [{}].",
        EXPORT_MARKER, root, version, group
    )
}

/// Render a group as `.properties` text.
pub fn render(root: &str, version: &str, group: &str, items: &[DisplayItem]) -> String {
    let mut lines = Vec::with_capacity(items.len() * 2 + 2);
    lines.push(export_header(root, version, group));
    lines.push(String::new());

    for item in items {
        if let Some(comment) = item.comment.as_deref().filter(|c| !c.is_empty()) {
            lines.push(format!("# {}", comment));
        }
        lines.push(format!("{}={}", item.name, item.value));
    }

    lines.join(LINE_SEPARATOR)
}
