//! In-memory backing store.
//!
//! Used for tests and as a stand-in for a mounted archive: seed it with
//! [`MemoryStore::insert_file`], optionally mark it read-only, mount it.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};
use crate::path::{LogicalPath, normalize};
use crate::store::{BackingStore, StoreFile};
use crate::types::{DirEntry, FileAttr};

/// Node in the memory tree.
#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, modified: SystemTime },
    Directory { modified: SystemTime },
}

impl Node {
    fn empty_file() -> Self {
        Node::File {
            data: Vec::new(),
            modified: SystemTime::now(),
        }
    }

    fn directory() -> Self {
        Node::Directory {
            modified: SystemTime::now(),
        }
    }

    fn attr(&self) -> FileAttr {
        match self {
            Node::File { data, modified } => {
                FileAttr::file(data.len() as u64).with_modified(Some(*modified))
            }
            Node::Directory { modified } => FileAttr::directory().with_modified(Some(*modified)),
        }
    }
}

type Tree = Arc<RwLock<IndexMap<LogicalPath, Node>>>;

/// In-memory backing store.
///
/// Listings come back in insertion order. Thread-safe via an internal lock;
/// all data is lost when the last reference is dropped.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    read_only: bool,
    nodes: Tree,
}

impl MemoryStore {
    /// Create an empty, writable store.
    pub fn new(name: impl Into<String>) -> Self {
        let mut nodes = IndexMap::new();
        // Root directory always exists
        nodes.insert(LogicalPath::empty(), Node::directory());
        Self {
            name: name.into(),
            read_only: false,
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    /// Refuse writes through the [`BackingStore`] interface from now on.
    ///
    /// Seeding with [`insert_file`](Self::insert_file) keeps working.
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Add or replace a file, creating parent directories.
    pub fn insert_file(&self, path: &str, data: impl Into<Vec<u8>>) -> VfsResult<()> {
        let key = normalize(path)?.to_relative();
        let mut nodes = self.nodes.write();
        Self::ensure_parents(&mut nodes, &key)?;
        if let Some(Node::Directory { .. }) = nodes.get(&key) {
            return Err(VfsError::is_a_directory(key.to_string()));
        }
        nodes.insert(
            key,
            Node::File {
                data: data.into(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    /// Add a directory (and its parents). Existing directories are kept.
    pub fn insert_dir(&self, path: &str) -> VfsResult<()> {
        let key = normalize(path)?.to_relative();
        let mut nodes = self.nodes.write();
        Self::ensure_parents(&mut nodes, &key)?;
        match nodes.get(&key) {
            Some(Node::Directory { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(VfsError::already_exists(key.to_string())),
            None => {
                nodes.insert(key, Node::directory());
                Ok(())
            }
        }
    }

    /// Ensure all parent directories exist.
    fn ensure_parents(nodes: &mut IndexMap<LogicalPath, Node>, path: &LogicalPath) -> VfsResult<()> {
        let mut current = LogicalPath::empty();
        let parents = path.depth().saturating_sub(1);
        for segment in &path.segments()[..parents] {
            current = current.child(segment)?;
            match nodes.get(&current) {
                Some(Node::Directory { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(VfsError::not_a_directory(current.to_string()));
                }
                None => {
                    nodes.insert(current.clone(), Node::directory());
                }
            }
        }
        Ok(())
    }

    /// Check if write operations are allowed.
    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::permission_denied(format!("{} is read-only", self.name)))
        } else {
            Ok(())
        }
    }

    /// Shared body of `open_write` / `open_append`.
    fn open_for_writing(&self, path: &LogicalPath, truncate: bool) -> VfsResult<Box<dyn StoreFile>> {
        self.check_writable()?;
        let key = path.to_relative();
        if key.is_root() {
            return Err(VfsError::is_a_directory("/"));
        }

        let mut nodes = self.nodes.write();
        Self::ensure_parents(&mut nodes, &key)?;
        match nodes.get_mut(&key) {
            Some(Node::Directory { .. }) => {
                return Err(VfsError::is_a_directory(key.to_string()));
            }
            Some(Node::File { data, modified }) => {
                if truncate {
                    data.clear();
                    *modified = SystemTime::now();
                }
            }
            None => {
                nodes.insert(key.clone(), Node::empty_file());
            }
        }

        Ok(Box::new(MemoryFile {
            nodes: Arc::clone(&self.nodes),
            path: key,
        }))
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    async fn stat(&self, path: &LogicalPath) -> VfsResult<FileAttr> {
        let key = path.to_relative();
        let nodes = self.nodes.read();
        nodes
            .get(&key)
            .map(|node| node.attr().with_read_only(self.read_only))
            .ok_or_else(|| VfsError::not_found(key.to_string()))
    }

    async fn list(&self, path: &LogicalPath) -> VfsResult<Vec<DirEntry>> {
        let key = path.to_relative();
        let nodes = self.nodes.read();

        // Verify the path is a directory
        match nodes.get(&key) {
            Some(Node::Directory { .. }) => {}
            Some(Node::File { .. }) => return Err(VfsError::not_a_directory(key.to_string())),
            None => return Err(VfsError::not_found(key.to_string())),
        }

        let entries = nodes
            .iter()
            .filter(|(child, _)| child.parent().as_ref() == Some(&key))
            .filter_map(|(child, node)| {
                child
                    .file_name()
                    .map(|name| DirEntry::from_attr(name, &node.attr()))
            })
            .collect();
        Ok(entries)
    }

    async fn open_read(&self, path: &LogicalPath) -> VfsResult<Box<dyn StoreFile>> {
        let key = path.to_relative();
        {
            let nodes = self.nodes.read();
            match nodes.get(&key) {
                Some(Node::File { .. }) => {}
                Some(Node::Directory { .. }) => {
                    return Err(VfsError::is_a_directory(key.to_string()));
                }
                None => return Err(VfsError::not_found(key.to_string())),
            }
        }
        Ok(Box::new(MemoryFile {
            nodes: Arc::clone(&self.nodes),
            path: key,
        }))
    }

    async fn open_write(&self, path: &LogicalPath) -> VfsResult<Box<dyn StoreFile>> {
        self.open_for_writing(path, true)
    }

    async fn open_append(&self, path: &LogicalPath) -> VfsResult<Box<dyn StoreFile>> {
        self.open_for_writing(path, false)
    }
}

/// Open file in a [`MemoryStore`]. Writes land in the shared tree directly.
struct MemoryFile {
    nodes: Tree,
    path: LogicalPath,
}

#[async_trait]
impl StoreFile for MemoryFile {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let nodes = self.nodes.read();
        match nodes.get(&self.path) {
            Some(Node::File { data, .. }) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
                let end = start.saturating_add(buf.len()).min(data.len());
                let n = end - start;
                buf[..n].copy_from_slice(&data[start..end]);
                Ok(n)
            }
            Some(Node::Directory { .. }) => Err(VfsError::is_a_directory(self.path.to_string())),
            None => Err(VfsError::not_found(self.path.to_string())),
        }
    }

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> VfsResult<usize> {
        let offset = usize::try_from(offset)
            .map_err(|_| VfsError::OutOfRange(i128::from(offset)))?;
        let end = offset
            .checked_add(data.len())
            .ok_or(VfsError::OutOfRange(offset as i128))?;

        let mut nodes = self.nodes.write();
        match nodes.get_mut(&self.path) {
            Some(Node::File {
                data: contents,
                modified,
            }) => {
                // Extend if necessary, failing instead of aborting on huge gaps
                if end > contents.len() {
                    contents
                        .try_reserve(end - contents.len())
                        .map_err(|_| VfsError::OutOfRange(offset as i128))?;
                    contents.resize(end, 0);
                }
                contents[offset..end].copy_from_slice(data);
                *modified = SystemTime::now();
                Ok(data.len())
            }
            Some(Node::Directory { .. }) => Err(VfsError::is_a_directory(self.path.to_string())),
            None => Err(VfsError::not_found(self.path.to_string())),
        }
    }

    async fn size(&mut self) -> VfsResult<u64> {
        let nodes = self.nodes.read();
        match nodes.get(&self.path) {
            Some(Node::File { data, .. }) => Ok(data.len() as u64),
            Some(Node::Directory { .. }) => Err(VfsError::is_a_directory(self.path.to_string())),
            None => Err(VfsError::not_found(self.path.to_string())),
        }
    }

    async fn close(&mut self) -> VfsResult<()> {
        Ok(())
    }
}
