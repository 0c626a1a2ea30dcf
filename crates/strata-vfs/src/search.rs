//! Path-string conveniences on top of [`MountStack`].
//!
//! These take raw strings, normalize them, and report the store's actual
//! casing back to the caller, which is what asset loaders usually want.

use crate::error::{VfsError, VfsResult};
use crate::mount::MountStack;
use crate::path::{LogicalPath, normalize};
use crate::pattern::GlobPattern;

impl MountStack {
    fn parse(&self, raw: &str) -> VfsResult<LogicalPath> {
        normalize(raw).map(|p| p.to_absolute()).inspect_err(|e| self.record(e))
    }

    /// True if `path` names a file or directory.
    pub async fn exists(&self, path: &str) -> bool {
        match self.parse(path) {
            Ok(path) => self.stat(&path).await.is_ok(),
            Err(_) => false,
        }
    }

    /// True if `path` names a regular file.
    pub async fn is_file(&self, path: &str) -> bool {
        match self.parse(path) {
            Ok(path) => self.stat(&path).await.is_ok_and(|a| a.is_file()),
            Err(_) => false,
        }
    }

    /// True if `path` names a directory, including virtual ones.
    pub async fn is_dir(&self, path: &str) -> bool {
        match self.parse(path) {
            Ok(path) => self.stat(&path).await.is_ok_and(|a| a.is_dir()),
            Err(_) => false,
        }
    }

    /// Confirm that `path` is a file and return it with the store's casing.
    pub async fn check_file(&self, path: &str) -> VfsResult<LogicalPath> {
        let path = self.parse(path)?;
        let resolved = self.resolve(&path).await?;
        if !resolved.attr.is_file() {
            let err = VfsError::is_a_directory(path.to_string());
            self.record(&err);
            return Err(err);
        }
        Ok(resolved.logical_path())
    }

    /// Look for the file `name` inside `dir`.
    pub async fn find_file(&self, dir: &str, name: &str) -> VfsResult<LogicalPath> {
        let dir = self.parse(dir)?;
        let candidate = dir.join(&self.parse(name)?.to_relative());
        self.check_file(&candidate.to_string()).await
    }

    /// Look for `name` in each of `dirs`, returning the first hit.
    pub async fn find_file_in_dirs<S: AsRef<str>>(
        &self,
        dirs: &[S],
        name: &str,
    ) -> VfsResult<LogicalPath> {
        for dir in dirs {
            match self.find_file(dir.as_ref(), name).await {
                Ok(found) => return Ok(found),
                Err(e) if e.is_miss() || matches!(e, VfsError::IsADirectory(_)) => {}
                Err(e) => return Err(e),
            }
        }
        let err = VfsError::not_found(name);
        self.record(&err);
        Err(err)
    }

    /// Entries of `dir` whose names match a glob, as logical paths in
    /// merged listing order.
    pub async fn find_matching(&self, dir: &str, pattern: &str) -> VfsResult<Vec<LogicalPath>> {
        let pattern = GlobPattern::new(pattern).inspect_err(|e| self.record(e))?;
        let requested = self.parse(dir)?;

        // List under the directory's actual casing
        let dir = match self.resolve(&requested).await {
            Ok(resolved) => resolved.logical_path(),
            Err(_) => requested,
        };

        let mut found = Vec::new();
        for entry in self.list(&dir).await? {
            if pattern.matches(&entry.name) {
                if let Ok(path) = dir.child(&entry.name) {
                    found.push(path);
                }
            }
        }
        Ok(found)
    }

    /// Read a whole file.
    pub async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let mut handle = self.open_read(path).await?;
        let data = handle.read_to_end().await;
        let closed = handle.close().await;
        let data = data?;
        closed?;
        Ok(data)
    }

    /// Create or replace a file in the write directory.
    ///
    /// Returns the number of bytes the store accepted.
    pub async fn write_file(&self, path: &str, data: &[u8]) -> VfsResult<usize> {
        let mut handle = self.open_write(path).await?;
        let written = handle.write(data).await;
        let closed = handle.close().await;
        let written = written?;
        closed?;
        Ok(written)
    }

    /// Append to a file in the write directory, creating it if needed.
    pub async fn append_file(&self, path: &str, data: &[u8]) -> VfsResult<usize> {
        let mut handle = self.open_append(path).await?;
        let written = handle.write(data).await;
        let closed = handle.close().await;
        let written = written?;
        closed?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use crate::store::BackingStore;
    use std::sync::Arc;

    async fn stack() -> MountStack {
        let store = MemoryStore::new("game");
        store.insert_file("data/System.def", "[Info]").unwrap();
        store.insert_file("data/select.def", "sel").unwrap();
        store.insert_file("data/fight.sff", "spr").unwrap();
        store.insert_file("font/f-4x6.def", "font").unwrap();

        let stack = MountStack::new();
        stack.mount(Arc::new(store), "/", false).await.unwrap();
        stack
    }

    #[tokio::test]
    async fn test_exists_family() {
        let stack = stack().await;
        assert!(stack.exists("data/system.def").await);
        assert!(stack.is_file("DATA/System.def").await);
        assert!(stack.is_dir("data").await);
        assert!(!stack.is_file("data").await);
        assert!(!stack.exists("../escape").await);
        assert!(!stack.exists("nope").await);
    }

    #[tokio::test]
    async fn test_check_file() {
        let stack = stack().await;
        let found = stack.check_file("data/system.def").await.unwrap();
        assert_eq!(found.to_string(), "/data/System.def");

        assert!(matches!(
            stack.check_file("data").await,
            Err(VfsError::IsADirectory(_))
        ));
        assert!(matches!(
            stack.check_file("data/missing.def").await,
            Err(VfsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_find_file_in_dirs() {
        let stack = stack().await;
        let found = stack
            .find_file_in_dirs(&["chars", "font", "data"], "F-4X6.DEF")
            .await
            .unwrap();
        assert_eq!(found.to_string(), "/font/f-4x6.def");

        let err = stack
            .find_file_in_dirs(&["data"], "f-4x6.def")
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
        assert!(stack.last_error().is_some());
    }

    #[tokio::test]
    async fn test_find_matching() {
        let stack = stack().await;
        let found: Vec<_> = stack
            .find_matching("Data", "*.def")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(found, ["/data/System.def", "/data/select.def"]);

        assert!(matches!(
            stack.find_matching("data", "[a-").await,
            Err(VfsError::InvalidPattern(_))
        ));
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let stack = stack().await;
        let saves: Arc<dyn BackingStore> = Arc::new(MemoryStore::new("saves"));
        stack.mount(Arc::clone(&saves), "/", true).await.unwrap();
        stack.set_write_dir(Some(saves)).await.unwrap();

        assert_eq!(stack.write_file("save/log.txt", b"one").await.unwrap(), 3);
        stack.append_file("save/log.txt", b" two").await.unwrap();
        assert_eq!(stack.read_file("save/log.txt").await.unwrap(), b"one two");
        assert_eq!(stack.read_file("data/system.def").await.unwrap(), b"[Info]");
    }
}
