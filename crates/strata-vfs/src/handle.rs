//! Cursor-tracking file handles.

use std::fmt;
use std::sync::Arc;

use crate::error::{VfsError, VfsResult};
use crate::path::LogicalPath;
use crate::store::{BackingStore, StoreFile};
use crate::types::{OpenMode, SeekOrigin};

const READ_CHUNK: usize = 8192;

/// An open file in one store, with its own cursor.
///
/// Single owner: every operation takes `&mut self`. Call [`close`] when
/// done; after that every operation fails with [`VfsError::Closed`].
///
/// [`close`]: FileHandle::close
pub struct FileHandle {
    store: Arc<dyn BackingStore>,
    path: LogicalPath,
    mode: OpenMode,
    inner: Option<Box<dyn StoreFile>>,
    cursor: u64,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("store", &self.store.name())
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("cursor", &self.cursor)
            .field("closed", &self.inner.is_none())
            .finish()
    }
}

impl FileHandle {
    /// Open `path` (store-relative) in `store`.
    pub async fn open(
        store: Arc<dyn BackingStore>,
        path: &LogicalPath,
        mode: OpenMode,
    ) -> VfsResult<Self> {
        let path = path.to_relative();
        let inner = match mode {
            OpenMode::Read => store.open_read(&path).await?,
            OpenMode::Write => store.open_write(&path).await?,
            OpenMode::Append => store.open_append(&path).await?,
        };
        tracing::debug!(store = store.name(), %path, ?mode, "opened");
        Ok(Self {
            store,
            path,
            mode,
            inner: Some(inner),
            cursor: 0,
        })
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Store-relative path of the open file.
    pub fn path(&self) -> &LogicalPath {
        &self.path
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn file(&mut self) -> VfsResult<&mut Box<dyn StoreFile>> {
        self.inner.as_mut().ok_or(VfsError::Closed)
    }

    /// Current cursor position.
    pub fn tell(&self) -> VfsResult<u64> {
        if self.inner.is_none() {
            return Err(VfsError::Closed);
        }
        Ok(self.cursor)
    }

    /// Current length of the file in bytes.
    pub async fn length(&mut self) -> VfsResult<u64> {
        self.file()?.size().await
    }

    /// True when the cursor is at or past the end.
    pub async fn eof(&mut self) -> VfsResult<bool> {
        let cursor = self.cursor;
        Ok(cursor >= self.length().await?)
    }

    /// Read into `buf` at the cursor and advance it.
    ///
    /// Never returns `Ok(0)`: when no bytes can be produced (cursor at or
    /// past the end, or an empty `buf`) the result is
    /// [`VfsError::EndOfStream`].
    pub async fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let n = self.read_from(self.cursor, buf).await?;
        self.cursor += n as u64;
        Ok(n)
    }

    /// Read into `buf` at `offset` without moving the cursor.
    ///
    /// Same rules as [`read`](Self::read); an offset beyond `i64::MAX`
    /// fails with [`VfsError::OutOfRange`].
    pub async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        self.file()?;
        check_offset(offset)?;
        self.read_from(offset, buf).await
    }

    async fn read_from(&mut self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let readable = self.mode.is_readable();
        let path = self.path.to_string();
        let file = self.file()?;
        if !readable {
            return Err(VfsError::permission_denied(format!(
                "{path} is not open for reading"
            )));
        }
        if buf.is_empty() {
            return Err(VfsError::EndOfStream);
        }

        let n = file.read_at(offset, buf).await?;
        if n == 0 {
            return Err(VfsError::EndOfStream);
        }
        Ok(n)
    }

    /// Read from the cursor to the end of the file.
    pub async fn read_to_end(&mut self) -> VfsResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match self.read(&mut chunk).await {
                Ok(n) => out.extend_from_slice(&chunk[..n]),
                Err(VfsError::EndOfStream) => return Ok(out),
                Err(e) => return Err(e),
            }
        }
    }

    /// Write `data` at the cursor, or at the end in append mode.
    ///
    /// Returns the number of bytes the store accepted, which may be less
    /// than `data.len()`; short writes are not retried.
    pub async fn write(&mut self, data: &[u8]) -> VfsResult<usize> {
        let (end, n) = self.write_to(self.cursor, data).await?;
        self.cursor = end;
        Ok(n)
    }

    /// Write `data` at `offset` without moving the cursor.
    ///
    /// Append handles ignore `offset` and write at the end, like
    /// [`write`](Self::write). An offset beyond `i64::MAX` fails with
    /// [`VfsError::OutOfRange`].
    pub async fn write_at(&mut self, offset: u64, data: &[u8]) -> VfsResult<usize> {
        self.file()?;
        check_offset(offset)?;
        let (_, n) = self.write_to(offset, data).await?;
        Ok(n)
    }

    /// Returns the position after the written bytes and their count.
    async fn write_to(&mut self, offset: u64, data: &[u8]) -> VfsResult<(u64, usize)> {
        let mode = self.mode;
        let path = self.path.to_string();
        let file = self.file()?;
        if !mode.is_writable() {
            return Err(VfsError::permission_denied(format!(
                "{path} is not open for writing"
            )));
        }
        if data.is_empty() {
            return Ok((offset, 0));
        }

        let offset = if mode == OpenMode::Append {
            file.size().await?
        } else {
            offset
        };
        let n = file.write_at(offset, data).await?;
        if n < data.len() {
            tracing::debug!(%path, requested = data.len(), written = n, "short write");
        }
        Ok((offset + n as u64, n))
    }

    /// Step the cursor back over bytes read ahead by a stream adapter.
    pub(crate) fn unread(&mut self, n: u64) {
        self.cursor = self.cursor.saturating_sub(n);
    }

    /// Move the cursor and return its new position.
    ///
    /// Targets past the end are allowed. A negative target, or one beyond
    /// `i64::MAX`, fails with [`VfsError::OutOfRange`] and leaves the
    /// cursor where it was.
    pub async fn seek(&mut self, offset: i64, origin: SeekOrigin) -> VfsResult<u64> {
        let base = match origin {
            SeekOrigin::Start => {
                self.file()?;
                0
            }
            SeekOrigin::Current => {
                self.file()?;
                self.cursor
            }
            SeekOrigin::End => self.file()?.size().await?,
        };

        let target = i128::from(base) + i128::from(offset);
        if target < 0 || target > i128::from(i64::MAX) {
            return Err(VfsError::OutOfRange(target));
        }
        self.cursor = target as u64;
        Ok(self.cursor)
    }

    /// Flush and release the store handle.
    ///
    /// A second call fails with [`VfsError::Closed`].
    pub async fn close(&mut self) -> VfsResult<()> {
        let mut file = self.inner.take().ok_or(VfsError::Closed)?;
        tracing::debug!(store = self.store.name(), path = %self.path, "closed");
        file.close().await
    }
}

fn check_offset(offset: u64) -> VfsResult<()> {
    if offset > i64::MAX as u64 {
        return Err(VfsError::OutOfRange(i128::from(offset)));
    }
    Ok(())
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.inner.is_some() {
            tracing::debug!(store = self.store.name(), path = %self.path, "handle dropped without close");
        }
    }
}
