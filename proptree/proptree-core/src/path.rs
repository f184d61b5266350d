//! Node path helpers for the coordination namespace.
//!
//! Paths are absolute, `/`-separated strings. The namespace is laid out as
//! `/<root>/<version>/<group>/<key>`, and every data version `v` has a
//! comment-shadow twin `v$` holding the per-key comments at mirrored paths.

/// Path separator used by the coordination namespace.
pub const SEPARATOR: char = '/';

/// Root of the coordination namespace.
pub const ROOT: &str = "/";

/// Marker appended to a version name to address its comment-shadow version.
pub const COMMENT_SUFFIX: &str = "$";

/// Join a parent path and a child node name.
///
/// Leading and trailing separators on either part are normalised, so
/// `make_path("/u1/", "/v1")` and `make_path("u1", "v1")` both yield `/u1/v1`.
/// An empty child returns the normalised parent.
pub fn make_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_matches(SEPARATOR);
    let child = child.trim_matches(SEPARATOR);

    let mut path = String::with_capacity(parent.len() + child.len() + 2);
    path.push(SEPARATOR);
    path.push_str(parent);
    if !child.is_empty() {
        if !parent.is_empty() {
            path.push(SEPARATOR);
        }
        path.push_str(child);
    }
    path
}

/// Join a root with any number of child segments.
pub fn make_paths(root: &str, segments: &[&str]) -> String {
    segments
        .iter()
        .fold(make_path(root, ""), |path, segment| make_path(&path, segment))
}

/// Last segment of a path (`"/u1/v1" -> "v1"`); empty for the root.
pub fn node_name(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or_default()
}

/// Parent of a path; `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == ROOT || path.is_empty() {
        return None;
    }
    match path.rfind(SEPARATOR) {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Proper ancestors of a path from the top down, excluding the root.
///
/// `ancestors("/a/b/c") == ["/a", "/a/b"]`.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = parent_path(path);
    while let Some(p) = current {
        if p == ROOT {
            break;
        }
        result.push(p.to_string());
        current = parent_path(p);
    }
    result.reverse();
    result
}

/// Path of `path` relative to `base`, if `path` is a strict descendant.
pub fn relative_to<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if base == ROOT {
        return path.strip_prefix(SEPARATOR).filter(|rest| !rest.is_empty());
    }
    path.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .filter(|rest| !rest.is_empty())
}

/// Whether `path` is `base` itself or lies beneath it.
pub fn is_same_or_descendant(path: &str, base: &str) -> bool {
    path == base || relative_to(path, base).is_some()
}

/// Check that a path is absolute, has no empty segments and no trailing separator.
pub fn is_valid_path(path: &str) -> bool {
    if path == ROOT {
        return true;
    }
    path.starts_with(SEPARATOR)
        && !path.ends_with(SEPARATOR)
        && path[1..].split(SEPARATOR).all(|segment| !segment.is_empty())
}

/// Name of the comment-shadow twin of a version.
pub fn shadow_version(version: &str) -> String {
    format!("{}{}", version, COMMENT_SUFFIX)
}

/// Whether a version name addresses a comment-shadow version.
pub fn is_shadow_version(version: &str) -> bool {
    version.ends_with(COMMENT_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_path() {
        assert_eq!(make_path("/u1", "v1"), "/u1/v1");
        assert_eq!(make_path("u1", "v1"), "/u1/v1");
        assert_eq!(make_path("/u1/", "/v1/"), "/u1/v1");
        assert_eq!(make_path("/", "u1"), "/u1");
        assert_eq!(make_path("", "u1"), "/u1");
        assert_eq!(make_path("/u1", ""), "/u1");
        assert_eq!(make_path("/", ""), "/");
    }

    #[test]
    fn test_make_paths() {
        assert_eq!(make_paths("u1", &["v1", "g1", "k1"]), "/u1/v1/g1/k1");
        assert_eq!(make_paths("/u1", &[]), "/u1");
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(node_name("/u1/v1"), "v1");
        assert_eq!(node_name("/"), "");
        assert_eq!(parent_path("/u1/v1"), Some("/u1"));
        assert_eq!(parent_path("/u1"), Some("/"));
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("/a/b/c"), vec!["/a".to_string(), "/a/b".to_string()]);
        assert!(ancestors("/a").is_empty());
        assert!(ancestors("/").is_empty());
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(relative_to("/u1/v1/g1/k1", "/u1/v1"), Some("g1/k1"));
        assert_eq!(relative_to("/u1/v1", "/u1/v1"), None);
        assert_eq!(relative_to("/u1/v10", "/u1/v1"), None);
        assert_eq!(relative_to("/u1", "/"), Some("u1"));
        assert!(is_same_or_descendant("/u1/v1", "/u1/v1"));
        assert!(is_same_or_descendant("/u1/v1/g1", "/u1"));
        assert!(!is_same_or_descendant("/u10", "/u1"));
    }

    #[test]
    fn test_path_validation() {
        assert!(is_valid_path("/"));
        assert!(is_valid_path("/u1/v1$/g1"));
        assert!(!is_valid_path("u1"));
        assert!(!is_valid_path("/u1/"));
        assert!(!is_valid_path("/u1//v1"));
        assert!(!is_valid_path(""));
    }

    #[test]
    fn test_shadow_versions() {
        assert_eq!(shadow_version("v1"), "v1$");
        assert!(is_shadow_version("v1$"));
        assert!(!is_shadow_version("v1"));
    }
}
