//! Materialized ancestry path
//!
//! A path is the dot-delimited chain of ancestor identifiers ending in the
//! department's own identifier ("root.dev.grp"). Subtree selection and cycle
//! detection are prefix operations on this value, never graph traversal.

use std::fmt;

/// Segment separator within a path.
pub const SEPARATOR: char = '.';

/// Reserved marker prefixed to the own segment of a soft-deleted department.
/// Identifiers are lowercase-latin only, so the underscore guarantees a
/// marked path can never collide with an active one.
pub const DELETED_MARKER: &str = "deleted_";

/// Immutable dot-delimited ancestry path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreePath(String);

impl TreePath {
    /// Path for an active department: `parent.path + "." + identifier`,
    /// or just `identifier` for a root.
    pub fn new(identifier: &str, parent: Option<&TreePath>) -> Self {
        match parent {
            Some(parent) => Self(format!("{}{}{}", parent.0, SEPARATOR, identifier)),
            None => Self(identifier.to_string()),
        }
    }

    /// Same as [`TreePath::new`] but the own segment carries the delete
    /// marker, so the whole subtree drops out of active-tree prefix queries.
    pub fn new_deleted(identifier: &str, parent: Option<&TreePath>) -> Self {
        let leaf = format!("{DELETED_MARKER}{identifier}");
        match parent {
            Some(parent) => Self(format!("{}{}{}", parent.0, SEPARATOR, leaf)),
            None => Self(leaf),
        }
    }

    /// Wrap a raw path column value.
    pub fn from_storage(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of path segments minus one.
    pub fn depth(&self) -> i32 {
        self.0.matches(SEPARATOR).count() as i32
    }

    pub fn segments(&self) -> std::str::Split<'_, char> {
        self.0.split(SEPARATOR)
    }

    /// The department's own segment.
    pub fn leaf(&self) -> &str {
        match self.0.rfind(SEPARATOR) {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Path of the parent, if any.
    pub fn parent(&self) -> Option<TreePath> {
        self.0.rfind(SEPARATOR).map(|idx| Self(self.0[..idx].to_string()))
    }

    /// True iff `other` lies strictly below `self` (prefix followed by the
    /// separator; a path is not its own ancestor).
    pub fn is_ancestor_of(&self, other: &TreePath) -> bool {
        other.0.len() > self.0.len()
            && other.0.as_bytes()[self.0.len()] == SEPARATOR as u8
            && other.0.starts_with(&self.0)
    }

    /// True if any segment carries the delete marker, i.e. the department is
    /// soft-deleted or lives inside a soft-deleted subtree.
    pub fn has_deleted_marker(&self) -> bool {
        self.segments().any(|segment| segment.starts_with(DELETED_MARKER))
    }

    /// Replace the `old_prefix` of this path with `new_prefix`. This is the
    /// in-memory form of the set-based rewrite the store issues for a whole
    /// subtree; `old_prefix` must be this path or one of its ancestors.
    pub fn splice(&self, old_prefix: &TreePath, new_prefix: &TreePath) -> TreePath {
        debug_assert!(self == old_prefix || old_prefix.is_ancestor_of(self));
        TreePath(format!("{}{}", new_prefix.0, &self.0[old_prefix.0.len()..]))
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TreePath> for String {
    fn from(path: TreePath) -> Self {
        path.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path() {
        let root = TreePath::new("root", None);
        assert_eq!(root.as_str(), "root");
        assert_eq!(root.depth(), 0);
        assert_eq!(root.leaf(), "root");
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_child_path() {
        let root = TreePath::new("root", None);
        let child = TreePath::new("dev", Some(&root));
        assert_eq!(child.as_str(), "root.dev");
        assert_eq!(child.depth(), 1);
        assert_eq!(child.leaf(), "dev");
        assert_eq!(child.parent(), Some(root));
    }

    #[test]
    fn test_is_ancestor_of_is_strict() {
        let root = TreePath::new("root", None);
        let child = TreePath::new("dev", Some(&root));
        let grandchild = TreePath::new("grp", Some(&child));

        assert!(root.is_ancestor_of(&child));
        assert!(root.is_ancestor_of(&grandchild));
        assert!(child.is_ancestor_of(&grandchild));
        assert!(!child.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));
    }

    #[test]
    fn test_is_ancestor_of_rejects_segment_prefix() {
        // "root" is a string prefix of "rootling" but not a path ancestor
        let a = TreePath::from_storage("root");
        let b = TreePath::from_storage("rootling.dev");
        assert!(!a.is_ancestor_of(&b));
    }

    #[test]
    fn test_deleted_path() {
        let root = TreePath::new("root", None);
        let deleted = TreePath::new_deleted("root", None);
        assert_eq!(deleted.as_str(), "deleted_root");
        assert_eq!(deleted.depth(), root.depth());
        assert!(deleted.has_deleted_marker());
        assert!(!root.has_deleted_marker());

        let child = TreePath::new("dev", Some(&deleted));
        assert!(child.has_deleted_marker());
    }

    #[test]
    fn test_splice_for_move() {
        // moving "root.dev" (with child "root.dev.grp") to become a new root
        let old = TreePath::from_storage("root.dev");
        let new = TreePath::from_storage("dev");
        let descendant = TreePath::from_storage("root.dev.grp");

        let spliced = descendant.splice(&old, &new);
        assert_eq!(spliced.as_str(), "dev.grp");
        assert_eq!(spliced.depth(), 1);
    }

    #[test]
    fn test_splice_for_soft_delete() {
        let old = TreePath::from_storage("root");
        let new = TreePath::new_deleted("root", None);
        let descendant = TreePath::from_storage("root.dev");

        let spliced = descendant.splice(&old, &new);
        assert_eq!(spliced.as_str(), "deleted_root.dev");
        assert_eq!(spliced.depth(), descendant.depth());
    }

    #[test]
    fn test_segments() {
        let path = TreePath::from_storage("root.dev.grp");
        let segments: Vec<&str> = path.segments().collect();
        assert_eq!(segments, vec!["root", "dev", "grp"]);
        assert_eq!(path.depth() as usize, segments.len() - 1);
    }
}
