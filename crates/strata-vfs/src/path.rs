//! Logical paths.
//!
//! Every path that crosses the VFS boundary is a [`LogicalPath`]: a list of
//! clean segments plus an absolute flag. Construction goes through
//! [`normalize`], so a `LogicalPath` never contains `.`, `..` or empty
//! segments and can be joined onto any store root without escaping it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};

/// Logical directory separator, independent of the host platform.
pub const SEPARATOR: char = '/';

/// A normalized path in the virtual namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalPath {
    absolute: bool,
    segments: Vec<String>,
}

/// Canonicalize a raw path string.
///
/// `\` is accepted as an alias of `/`. Empty and `.` segments are dropped,
/// `..` pops the previous segment. A `..` with nothing left to pop fails
/// with [`VfsError::InvalidPath`] rather than clamping to the root.
pub fn normalize(raw: &str) -> VfsResult<LogicalPath> {
    if raw.contains('\0') {
        return Err(VfsError::invalid_path(format!("{raw:?}: contains NUL")));
    }

    let unified = raw.replace('\\', "/");
    let absolute = unified.starts_with(SEPARATOR);

    let mut segments: Vec<String> = Vec::new();
    for part in unified.split(SEPARATOR) {
        match part {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(VfsError::invalid_path(format!("{raw}: escapes above root")));
                }
            }
            name => segments.push(name.to_string()),
        }
    }

    Ok(LogicalPath { absolute, segments })
}

impl LogicalPath {
    /// The absolute root, `/`.
    pub fn root() -> Self {
        Self {
            absolute: true,
            segments: Vec::new(),
        }
    }

    /// The empty relative path, naming a store's own root.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// True for `/` and for the empty relative path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent path, or `None` at the root.
    pub fn parent(&self) -> Option<LogicalPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            absolute: self.absolute,
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append a single segment.
    ///
    /// `name` must be one plain segment: no separators, not `.` or `..`.
    pub fn child(&self, name: &str) -> VfsResult<LogicalPath> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0'])
        {
            return Err(VfsError::invalid_path(format!("{name:?}: not a single path segment")));
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self {
            absolute: self.absolute,
            segments,
        })
    }

    /// Append every segment of `other`, which is treated as relative.
    pub fn join(&self, other: &LogicalPath) -> LogicalPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self {
            absolute: self.absolute,
            segments,
        }
    }

    /// Segment-wise prefix test. The absolute flag is ignored.
    pub fn starts_with(&self, prefix: &LogicalPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Path of `self` relative to `prefix`, or `None` if it is not under it.
    pub fn strip_prefix(&self, prefix: &LogicalPath) -> Option<LogicalPath> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Self {
            absolute: false,
            segments: self.segments[prefix.segments.len()..].to_vec(),
        })
    }

    pub fn to_absolute(&self) -> LogicalPath {
        Self {
            absolute: true,
            segments: self.segments.clone(),
        }
    }

    pub fn to_relative(&self) -> LogicalPath {
        Self {
            absolute: false,
            segments: self.segments.clone(),
        }
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "{SEPARATOR}")?;
        }
        write!(f, "{}", self.segments.join("/"))
    }
}

impl FromStr for LogicalPath {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn norm(s: &str) -> String {
        normalize(s).unwrap().to_string()
    }

    #[test]
    fn test_basic_normalization() {
        assert_eq!(norm("/a/b/c"), "/a/b/c");
        assert_eq!(norm("a//b/./c/"), "a/b/c");
        assert_eq!(norm("/a/b/../c"), "/a/c");
        assert_eq!(norm("\\data\\System.def"), "/data/System.def");
        assert_eq!(norm("/"), "/");
        assert_eq!(norm(""), "");
        assert_eq!(norm("./"), "");
    }

    #[test]
    fn test_escape_above_root_fails() {
        assert!(matches!(normalize("/.."), Err(VfsError::InvalidPath(_))));
        assert!(matches!(normalize("../etc"), Err(VfsError::InvalidPath(_))));
        assert!(matches!(normalize("a/../../b"), Err(VfsError::InvalidPath(_))));
        // Climbing back to the root is fine, only going past it fails.
        assert_eq!(norm("a/b/../.."), "");
    }

    #[test]
    fn test_nul_rejected() {
        assert!(matches!(normalize("a\0b"), Err(VfsError::InvalidPath(_))));
    }

    #[test]
    fn test_child_and_parent() {
        let p = normalize("/data").unwrap();
        let c = p.child("System.def").unwrap();
        assert_eq!(c.to_string(), "/data/System.def");
        assert_eq!(c.file_name(), Some("System.def"));
        assert_eq!(c.parent().unwrap(), p);
        assert!(LogicalPath::root().parent().is_none());

        assert!(p.child("..").is_err());
        assert!(p.child("a/b").is_err());
        assert!(p.child("").is_err());
    }

    #[test]
    fn test_strip_prefix() {
        let mount = normalize("/mods").unwrap();
        let path = normalize("/mods/chars/kfm.def").unwrap();
        let rel = path.strip_prefix(&mount).unwrap();
        assert!(!rel.is_absolute());
        assert_eq!(rel.to_string(), "chars/kfm.def");

        assert!(normalize("/modsx/a").unwrap().strip_prefix(&mount).is_none());
        assert_eq!(
            path.strip_prefix(&LogicalPath::root()).unwrap().to_string(),
            "mods/chars/kfm.def"
        );
    }

    #[test]
    fn test_from_str() {
        let p: LogicalPath = "/x/./y".parse().unwrap();
        assert_eq!(p.segments(), ["x", "y"]);
        assert!("/../y".parse::<LogicalPath>().is_err());
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in "[a-zA-Z./\\\\]{0,24}") {
            if let Ok(once) = normalize(&raw) {
                let twice = normalize(&once.to_string()).unwrap();
                prop_assert_eq!(once, twice);
            }
        }
    }
}
