//! Host directory backing store.
//!
//! Provides access to a real directory tree, with path security to
//! prevent escaping the root directory through symlinks.

use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{VfsError, VfsResult};
use crate::path::LogicalPath;
use crate::store::{BackingStore, StoreFile};
use crate::types::{DirEntry, FileAttr, FileType};

/// Host directory backing store.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/home/amy/game`, then the logical path `data/system.def` maps to
/// `/home/amy/game/data/system.def`.
///
/// `..` never reaches a store (logical paths are normalized), but a
/// symlink inside the tree could still point outside it; those are
/// rejected with `PermissionDenied`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    name: String,
    root: PathBuf,
    read_only: bool,
}

impl DirectoryStore {
    /// Create a writable store rooted at the given directory.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self {
            name: root.display().to_string(),
            root,
            read_only: false,
        }
    }

    /// Create a read-only store.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(root);
        store.read_only = true;
        store
    }

    /// Set whether this store is read-only.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a logical path to a host path within the root.
    ///
    /// Returns an error if a symlink along the way escapes the root.
    fn resolve(&self, path: &LogicalPath) -> VfsResult<PathBuf> {
        let full = path
            .segments()
            .iter()
            .fold(self.root.clone(), |acc, segment| acc.join(segment));

        // For new files, canonicalize the deepest existing ancestor
        let mut existing = full.as_path();
        while !existing.exists() {
            if existing == self.root {
                return Ok(full);
            }
            match existing.parent() {
                Some(parent) => existing = parent,
                None => return Ok(full),
            }
        }

        let canonical = dunce::canonicalize(existing)
            .map_err(|e| VfsError::from_io(e, path.to_string()))?;
        if !canonical.starts_with(&self.root) {
            return Err(VfsError::permission_denied(format!(
                "{} escapes {}",
                path,
                self.root.display()
            )));
        }

        Ok(full)
    }

    /// Check if write operations are allowed.
    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::permission_denied(format!("{} is read-only", self.name)))
        } else {
            Ok(())
        }
    }

    /// Convert std::fs::Metadata to FileAttr.
    fn metadata_to_attr(&self, meta: &std::fs::Metadata) -> FileAttr {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else if meta.is_file() {
            FileType::File
        } else {
            FileType::Other
        };

        FileAttr {
            kind,
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok(),
            read_only: self.read_only || meta.permissions().readonly(),
        }
    }

    async fn open_with(
        &self,
        path: &LogicalPath,
        options: &mut fs::OpenOptions,
    ) -> VfsResult<Box<dyn StoreFile>> {
        self.check_writable()?;
        if path.is_root() {
            return Err(VfsError::is_a_directory(path.to_string()));
        }
        let full_path = self.resolve(path)?;

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VfsError::from_io(e, path.to_string()))?;
        }

        let file = options
            .open(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path.to_string()))?;
        Ok(Box::new(LocalFile {
            file,
            path: path.to_string(),
        }))
    }
}

#[async_trait]
impl BackingStore for DirectoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    async fn stat(&self, path: &LogicalPath) -> VfsResult<FileAttr> {
        let full_path = self.resolve(path)?;
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path.to_string()))?;
        Ok(self.metadata_to_attr(&meta))
    }

    async fn list(&self, path: &LogicalPath) -> VfsResult<Vec<DirEntry>> {
        let full_path = self.resolve(path)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path.to_string()))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| VfsError::from_io(e, path.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Follows symlinks; dangling links are skipped
            let Ok(meta) = fs::metadata(entry.path()).await else {
                tracing::debug!(store = %self.name, %name, "skipping unreadable entry");
                continue;
            };
            entries.push(DirEntry::from_attr(name, &self.metadata_to_attr(&meta)));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open_read(&self, path: &LogicalPath) -> VfsResult<Box<dyn StoreFile>> {
        let full_path = self.resolve(path)?;
        if full_path.is_dir() {
            return Err(VfsError::is_a_directory(path.to_string()));
        }
        let file = fs::File::open(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, path.to_string()))?;
        Ok(Box::new(LocalFile {
            file,
            path: path.to_string(),
        }))
    }

    async fn open_write(&self, path: &LogicalPath) -> VfsResult<Box<dyn StoreFile>> {
        self.open_with(
            path,
            fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true),
        )
        .await
    }

    async fn open_append(&self, path: &LogicalPath) -> VfsResult<Box<dyn StoreFile>> {
        self.open_with(
            path,
            fs::OpenOptions::new().read(true).write(true).create(true),
        )
        .await
    }
}

/// Open host file. Every access seeks explicitly, so the OS cursor is
/// never relied on between calls.
struct LocalFile {
    file: fs::File,
    path: String,
}

impl LocalFile {
    fn io_err(&self, e: std::io::Error) -> VfsError {
        VfsError::from_io(e, self.path.clone())
    }
}

#[async_trait]
impl StoreFile for LocalFile {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        self.file
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| self.io_err(e))?;

        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .file
                .read(&mut buf[filled..])
                .await
                .map_err(|e| self.io_err(e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> VfsResult<usize> {
        self.file
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| self.io_err(e))?;
        let n = self.file.write(data).await.map_err(|e| self.io_err(e))?;
        Ok(n)
    }

    async fn size(&mut self) -> VfsResult<u64> {
        let meta = self.file.metadata().await.map_err(|e| self.io_err(e))?;
        Ok(meta.len())
    }

    async fn close(&mut self) -> VfsResult<()> {
        self.file.flush().await.map_err(|e| self.io_err(e))?;
        self.file.sync_all().await.map_err(|e| self.io_err(e))
    }
}
