//! Path parsing and formatting.
//!
//! Every formula-bearing entity is addressed by a dotted path:
//! `function`, `function.component` or `function.component.column`.
//! Two segments address a scalar field (or a whole table), three segments
//! address a table column.
//!
//! # Examples
//!
//! ```ignore
//! let path = Path::build("F", Some("T"), Some("a"));
//! assert_eq!(path.as_str(), "F.T.a");
//! assert_eq!(path.column_id(), Some("a"));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of segments a path may carry.
pub const MAX_SEGMENTS: usize = 3;

/// A dotted `function[.component[.column]]` address.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(String);

impl Path {
    /// Build a path by joining the present segments with `.`.
    pub fn build(function_id: &str, component_id: Option<&str>, column_id: Option<&str>) -> Path {
        let mut out = function_id.to_string();
        if let Some(component_id) = component_id {
            out.push('.');
            out.push_str(component_id);
            if let Some(column_id) = column_id {
                out.push('.');
                out.push_str(column_id);
            }
        }
        Path(out)
    }

    pub fn function(function_id: &str) -> Path {
        Path::build(function_id, None, None)
    }

    pub fn component(function_id: &str, component_id: &str) -> Path {
        Path::build(function_id, Some(component_id), None)
    }

    pub fn column(function_id: &str, component_id: &str, column_id: &str) -> Path {
        Path::build(function_id, Some(component_id), Some(column_id))
    }

    /// Parse a dotted path. Returns None for empty segments or more than
    /// three segments.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Option<Path> {
        let segments = split_path(text);
        if segments.is_empty()
            || segments.len() > MAX_SEGMENTS
            || segments.iter().any(|s| s.trim().is_empty())
        {
            return None;
        }
        Some(Path(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> Vec<&str> {
        split_path(&self.0)
    }

    /// Number of segments (1..=3).
    pub fn depth(&self) -> usize {
        self.0.split('.').count()
    }

    pub fn function_id(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    pub fn component_id(&self) -> Option<&str> {
        self.0.split('.').nth(1)
    }

    pub fn column_id(&self) -> Option<&str> {
        self.0.split('.').nth(2)
    }

    /// True for `function.component.column` paths.
    pub fn is_row_scoped(&self) -> bool {
        self.depth() == 3
    }

    /// Drop the last segment. A function path has no parent.
    pub fn parent(&self) -> Option<Path> {
        self.0.rsplit_once('.').map(|(head, _)| Path(head.to_string()))
    }

    /// Replace the column segment of a three-segment path.
    pub fn with_column(&self, column_id: &str) -> Option<Path> {
        let component_id = self.component_id()?;
        self.column_id()?;
        Some(Path::column(self.function_id(), component_id, column_id))
    }
}

/// Split a path into its segments. Never validates segment existence.
pub fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        return Vec::new();
    }
    path.split('.').collect()
}

impl std::str::FromStr for Path {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::from_str(s).ok_or_else(|| format!("Invalid path: {}", s))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_joins_present_segments() {
        assert_eq!(Path::build("F", None, None).as_str(), "F");
        assert_eq!(Path::build("F", Some("C"), None).as_str(), "F.C");
        assert_eq!(Path::build("F", Some("T"), Some("a")).as_str(), "F.T.a");
        // A column without a component is ignored.
        assert_eq!(Path::build("F", None, Some("a")).as_str(), "F");
    }

    #[test]
    fn test_accessors() {
        let path = Path::column("F", "T", "a");
        assert_eq!(path.function_id(), "F");
        assert_eq!(path.component_id(), Some("T"));
        assert_eq!(path.column_id(), Some("a"));
        assert_eq!(path.depth(), 3);
        assert!(path.is_row_scoped());
        assert_eq!(path.parent(), Some(Path::component("F", "T")));
        assert_eq!(path.with_column("b"), Some(Path::column("F", "T", "b")));
        assert_eq!(Path::component("F", "C").with_column("b"), None);
    }

    #[test]
    fn test_from_str_rejects_bad_shapes() {
        assert!(Path::from_str("").is_none());
        assert!(Path::from_str("F..a").is_none());
        assert!(Path::from_str("a.b.c.d").is_none());
        assert!(Path::from_str("F.C").is_some());
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("F.T.a"), vec!["F", "T", "a"]);
        assert_eq!(split_path("F"), vec!["F"]);
        assert!(split_path("").is_empty());
    }
}
