//! Core VFS types.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Anything else a store reports (devices, sockets, ...).
    Other,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// File attributes, as returned by `stat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttr {
    /// File type.
    pub kind: FileType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, if the store knows it.
    pub modified: Option<SystemTime>,
    /// Whether the owning store refuses writes.
    pub read_only: bool,
}

impl FileAttr {
    /// Attributes for a file.
    pub fn file(size: u64) -> Self {
        Self {
            kind: FileType::File,
            size,
            modified: None,
            read_only: false,
        }
    }

    /// Attributes for a directory.
    pub fn directory() -> Self {
        Self {
            kind: FileType::Directory,
            size: 0,
            modified: None,
            read_only: false,
        }
    }

    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry.
///
/// Produced transiently by store listings; never cached by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path), in the store's own casing.
    pub name: String,
    /// Entry type.
    pub kind: FileType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, if available.
    pub modified: Option<SystemTime>,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
            modified: None,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, FileType::File, size)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory, 0)
    }

    /// Build an entry from a name and the attributes a store reported.
    pub fn from_attr(name: impl Into<String>, attr: &FileAttr) -> Self {
        Self {
            name: name.into(),
            kind: attr.kind,
            size: attr.size,
            modified: attr.modified,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// How a file handle was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    /// Read from the start of an existing file.
    Read,
    /// Create or truncate, then write.
    Write,
    /// Create if missing; every write lands at the end.
    Append,
}

impl OpenMode {
    pub fn is_readable(&self) -> bool {
        matches!(self, OpenMode::Read)
    }

    pub fn is_writable(&self) -> bool {
        !self.is_readable()
    }
}

/// Reference point for [`FileHandle::seek`](crate::FileHandle::seek).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

/// Numeric whence values `0`, `1`, `2`, as used by `lseek` and friends.
impl TryFrom<i32> for SeekOrigin {
    type Error = VfsError;

    fn try_from(whence: i32) -> VfsResult<Self> {
        match whence {
            0 => Ok(SeekOrigin::Start),
            1 => Ok(SeekOrigin::Current),
            2 => Ok(SeekOrigin::End),
            other => Err(VfsError::invalid_argument(format!("unknown seek origin {other}"))),
        }
    }
}
