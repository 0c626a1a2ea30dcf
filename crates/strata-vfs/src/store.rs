//! Backing store traits.
//!
//! A backing store is one mounted source: a real directory, an archive, an
//! in-memory tree. The core never looks inside a store; it only calls the
//! narrow interface below.

use async_trait::async_trait;

use crate::error::VfsResult;
use crate::path::LogicalPath;
use crate::types::{DirEntry, FileAttr};

/// One mounted source.
///
/// All paths are relative to the store's own root and already normalized,
/// so a store never has to deal with `.`, `..` or mixed separators. The
/// [`MountStack`](crate::MountStack) handles routing and path translation.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Human-readable name, reported in the search path and used by
    /// [`MountStack::unmount_by_name`](crate::MountStack::unmount_by_name).
    fn name(&self) -> &str;

    /// Returns true if this store refuses writes.
    fn read_only(&self) -> bool;

    /// Get attributes for a file or directory.
    ///
    /// Fails with `NotFound` when the entry does not exist.
    async fn stat(&self, path: &LogicalPath) -> VfsResult<FileAttr>;

    /// List the children of a directory, in an order the store chooses.
    ///
    /// The order must be stable within one call; callers treat it as
    /// otherwise arbitrary.
    async fn list(&self, path: &LogicalPath) -> VfsResult<Vec<DirEntry>>;

    /// Open an existing file for reading.
    async fn open_read(&self, path: &LogicalPath) -> VfsResult<Box<dyn StoreFile>>;

    /// Create or truncate a file for writing, creating parent directories.
    async fn open_write(&self, path: &LogicalPath) -> VfsResult<Box<dyn StoreFile>>;

    /// Open a file for appending, creating it (and its parents) if missing.
    async fn open_append(&self, path: &LogicalPath) -> VfsResult<Box<dyn StoreFile>>;

    /// Check if a path exists.
    async fn exists(&self, path: &LogicalPath) -> bool {
        self.stat(path).await.is_ok()
    }
}

/// An open file inside a store.
///
/// Reads and writes take an explicit offset; the cursor lives in
/// [`FileHandle`](crate::FileHandle), not here.
#[async_trait]
pub trait StoreFile: Send + Sync {
    /// Read up to `buf.len()` bytes at `offset`.
    ///
    /// Returns 0 at or past the end of the file.
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> VfsResult<usize>;

    /// Write `data` at `offset`, zero-filling any gap past the current end.
    ///
    /// Returns the number of bytes actually written.
    async fn write_at(&mut self, offset: u64, data: &[u8]) -> VfsResult<usize>;

    /// Current length in bytes.
    async fn size(&mut self) -> VfsResult<u64>;

    /// Flush and release the underlying resource.
    async fn close(&mut self) -> VfsResult<()>;
}
