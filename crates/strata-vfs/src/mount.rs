//! The mount stack: ordered stores, first match wins.
//!
//! Unlike a longest-prefix mount table, every mounted store whose mount
//! point covers a path is a candidate, tried in stack order. Resolution
//! runs in two passes:
//!
//! 1. exact-case `stat` in every candidate store, in priority order;
//! 2. only if that found nothing, a case-insensitive walk
//!    ([`crate::resolver`]) in every candidate store, in priority order.
//!
//! So an exact match anywhere shadows an approximate match everywhere.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{VfsError, VfsResult};
use crate::handle::FileHandle;
use crate::path::{LogicalPath, normalize};
use crate::resolver;
use crate::store::BackingStore;
use crate::types::{DirEntry, FileAttr, OpenMode};

/// One entry of the search path, as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct MountInfo {
    /// The store's name (e.g. the host directory it serves).
    pub name: String,
    /// Where the store's root appears in the logical namespace.
    pub mount_point: LogicalPath,
    /// Whether the store refuses writes.
    pub read_only: bool,
    /// Whether the store was mounted ahead of existing entries.
    pub prepended: bool,
}

struct MountEntry {
    store: Arc<dyn BackingStore>,
    mount_point: LogicalPath,
    prepended: bool,
}

impl MountEntry {
    fn resolved(&self, relative: LogicalPath, attr: FileAttr, exact: bool) -> Resolved {
        Resolved {
            store: Arc::clone(&self.store),
            mount_point: self.mount_point.clone(),
            relative,
            attr,
            exact,
        }
    }
}

/// Result of [`MountStack::resolve`].
#[derive(Clone)]
pub struct Resolved {
    /// The store that owns the entry.
    pub store: Arc<dyn BackingStore>,
    /// Mount point of that store.
    pub mount_point: LogicalPath,
    /// Store-relative path, in the store's own casing.
    pub relative: LogicalPath,
    /// Attributes reported by the store.
    pub attr: FileAttr,
    /// False when the case-insensitive fallback was needed.
    pub exact: bool,
}

impl Resolved {
    /// The logical path with the store's actual casing.
    pub fn logical_path(&self) -> LogicalPath {
        self.mount_point.join(&self.relative)
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("store", &self.store.name())
            .field("mount_point", &self.mount_point)
            .field("relative", &self.relative)
            .field("attr", &self.attr)
            .field("exact", &self.exact)
            .finish()
    }
}

/// Ordered stack of mounted stores.
///
/// Mount, unmount and write-directory changes take the table's write lock.
/// Each resolution or listing holds the read lock for its whole duration,
/// so the stack never changes under an in-flight lookup.
pub struct MountStack {
    mounts: RwLock<Vec<MountEntry>>,
    write_dir: RwLock<Option<Arc<dyn BackingStore>>>,
    last_error: parking_lot::Mutex<Option<String>>,
}

impl fmt::Debug for MountStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountStack")
            .field("mounts", &"<locked>")
            .finish()
    }
}

impl Default for MountStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MountStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(Vec::new()),
            write_dir: RwLock::new(None),
            last_error: parking_lot::Mutex::new(None),
        }
    }

    /// Mount a store at `mount_point`.
    ///
    /// With `prepend` the store is searched before everything already
    /// mounted; otherwise after. Fails with `AlreadyMounted` if this same
    /// store instance is already on the stack. Mounting a different store
    /// at an occupied mount point is fine and shadows by order.
    pub async fn mount(
        &self,
        store: Arc<dyn BackingStore>,
        mount_point: &str,
        prepend: bool,
    ) -> VfsResult<()> {
        let mount_point = normalize(mount_point)
            .inspect_err(|e| self.record(e))?
            .to_absolute();

        let mut mounts = self.mounts.write().await;
        if mounts.iter().any(|m| Arc::ptr_eq(&m.store, &store)) {
            let err = VfsError::AlreadyMounted(store.name().to_string());
            self.record(&err);
            return Err(err);
        }

        tracing::info!(store = store.name(), %mount_point, prepend, "mounted");
        let entry = MountEntry {
            store,
            mount_point,
            prepended: prepend,
        };
        if prepend {
            mounts.insert(0, entry);
        } else {
            mounts.push(entry);
        }
        Ok(())
    }

    /// Mount an owned store, returning the shared handle needed to
    /// unmount it later.
    pub async fn mount_owned(
        &self,
        store: impl BackingStore + 'static,
        mount_point: &str,
        prepend: bool,
    ) -> VfsResult<Arc<dyn BackingStore>> {
        let store: Arc<dyn BackingStore> = Arc::new(store);
        self.mount(Arc::clone(&store), mount_point, prepend).await?;
        Ok(store)
    }

    /// Remove the first entry holding this store instance.
    pub async fn unmount(&self, store: &Arc<dyn BackingStore>) -> VfsResult<()> {
        let mut mounts = self.mounts.write().await;
        match mounts.iter().position(|m| Arc::ptr_eq(&m.store, store)) {
            Some(index) => {
                let entry = mounts.remove(index);
                tracing::info!(store = entry.store.name(), mount_point = %entry.mount_point, "unmounted");
                Ok(())
            }
            None => {
                let err = VfsError::NotMounted(store.name().to_string());
                self.record(&err);
                Err(err)
            }
        }
    }

    /// Remove the first entry whose store has this name.
    ///
    /// Returns the store so the caller can release it.
    pub async fn unmount_by_name(&self, name: &str) -> VfsResult<Arc<dyn BackingStore>> {
        let mut mounts = self.mounts.write().await;
        match mounts.iter().position(|m| m.store.name() == name) {
            Some(index) => {
                let entry = mounts.remove(index);
                tracing::info!(store = name, mount_point = %entry.mount_point, "unmounted");
                Ok(entry.store)
            }
            None => {
                let err = VfsError::NotMounted(name.to_string());
                self.record(&err);
                Err(err)
            }
        }
    }

    /// Mounted stores in resolution order.
    pub async fn search_path(&self) -> Vec<MountInfo> {
        let mounts = self.mounts.read().await;
        mounts
            .iter()
            .map(|m| MountInfo {
                name: m.store.name().to_string(),
                mount_point: m.mount_point.clone(),
                read_only: m.store.read_only(),
                prepended: m.prepended,
            })
            .collect()
    }

    /// Choose the store that receives writes and appends.
    ///
    /// The write store does not need to be on the search path. Passing
    /// `None` disables writing.
    pub async fn set_write_dir(&self, store: Option<Arc<dyn BackingStore>>) -> VfsResult<()> {
        if let Some(store) = &store {
            if store.read_only() {
                let err = VfsError::permission_denied(format!(
                    "{} is read-only and cannot be the write directory",
                    store.name()
                ));
                self.record(&err);
                return Err(err);
            }
            tracing::info!(store = store.name(), "write directory set");
        }
        *self.write_dir.write().await = store;
        Ok(())
    }

    /// The current write store, if any.
    pub async fn write_dir(&self) -> Option<Arc<dyn BackingStore>> {
        self.write_dir.read().await.clone()
    }

    /// Most recent failure seen by this stack, as a readable message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub(crate) fn record(&self, err: &VfsError) {
        *self.last_error.lock() = Some(err.to_string());
    }

    /// Resolve a logical path to the store that holds it.
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path))]
    pub async fn resolve(&self, path: &LogicalPath) -> VfsResult<Resolved> {
        let result = self.resolve_inner(path).await;
        if let Err(e) = &result {
            self.record(e);
        }
        result
    }

    async fn resolve_inner(&self, path: &LogicalPath) -> VfsResult<Resolved> {
        let path = path.to_absolute();
        let mounts = self.mounts.read().await;

        for entry in mounts.iter() {
            let Some(relative) = path.strip_prefix(&entry.mount_point) else {
                continue;
            };
            match entry.store.stat(&relative).await {
                Ok(attr) => return Ok(entry.resolved(relative, attr, true)),
                Err(e) if e.is_miss() => {}
                Err(e) => self.store_failure(entry, &e),
            }
        }

        for entry in mounts.iter() {
            let Some(relative) = path.strip_prefix(&entry.mount_point) else {
                continue;
            };
            let actual = match resolver::resolve_path(entry.store.as_ref(), &relative).await {
                Ok(Some(actual)) => actual,
                Ok(None) => continue,
                Err(e) => {
                    self.store_failure(entry, &e);
                    continue;
                }
            };
            match entry.store.stat(&actual).await {
                Ok(attr) => {
                    tracing::debug!(store = entry.store.name(), %actual, "case-insensitive match");
                    return Ok(entry.resolved(actual, attr, false));
                }
                Err(e) if e.is_miss() => {}
                Err(e) => self.store_failure(entry, &e),
            }
        }

        Err(VfsError::not_found(path.to_string()))
    }

    fn store_failure(&self, entry: &MountEntry, err: &VfsError) {
        tracing::warn!(store = entry.store.name(), error = %err, "store lookup failed");
        self.record(err);
    }

    /// True for the root and for every mount point and its ancestors.
    async fn is_virtual_dir(&self, path: &LogicalPath) -> bool {
        if path.is_root() {
            return true;
        }
        let mounts = self.mounts.read().await;
        mounts.iter().any(|m| m.mount_point.starts_with(path))
    }

    /// Attributes of a logical path.
    ///
    /// Mount points and their ancestors always exist as directories.
    pub async fn stat(&self, path: &LogicalPath) -> VfsResult<FileAttr> {
        if self.is_virtual_dir(path).await {
            return Ok(FileAttr::directory().with_read_only(true));
        }
        self.resolve(path).await.map(|r| r.attr)
    }

    /// Merged listing of a logical directory.
    ///
    /// Every store where `dir` is a directory contributes, highest priority
    /// first; a name already seen is skipped, so higher stores shadow
    /// lower ones. Mount points nested below `dir` appear as directories.
    pub async fn list(&self, dir: &LogicalPath) -> VfsResult<Vec<DirEntry>> {
        let dir = dir.to_absolute();
        let mounts = self.mounts.read().await;

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        let mut found = dir.is_root();
        let mut not_a_dir = false;

        for entry in mounts.iter() {
            if let Some(relative) = dir.strip_prefix(&entry.mount_point) {
                match Self::list_in_store(entry.store.as_ref(), &relative).await {
                    Ok(Some(entries)) => {
                        found = true;
                        for e in entries {
                            if seen.insert(e.name.clone()) {
                                merged.push(e);
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(VfsError::NotADirectory(_)) => not_a_dir = true,
                    Err(e) => self.store_failure(entry, &e),
                }
            } else if let Some(below) = entry.mount_point.strip_prefix(&dir) {
                if let Some(first) = below.segments().first() {
                    found = true;
                    if seen.insert(first.clone()) {
                        merged.push(DirEntry::directory(first.clone()));
                    }
                }
            }
        }

        if found {
            Ok(merged)
        } else {
            let err = if not_a_dir {
                VfsError::not_a_directory(dir.to_string())
            } else {
                VfsError::not_found(dir.to_string())
            };
            self.record(&err);
            Err(err)
        }
    }

    /// List `relative` in one store, falling back to its case-insensitive
    /// spelling. `Ok(None)` means the store has no such directory.
    async fn list_in_store(
        store: &dyn BackingStore,
        relative: &LogicalPath,
    ) -> VfsResult<Option<Vec<DirEntry>>> {
        match store.list(relative).await {
            Ok(entries) => return Ok(Some(entries)),
            Err(VfsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let Some(actual) = resolver::resolve_path(store, relative).await? else {
            return Ok(None);
        };
        match store.list(&actual).await {
            Ok(entries) => Ok(Some(entries)),
            Err(e) if e.is_miss() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Open a file for reading through the stack.
    pub async fn open_read(&self, path: &str) -> VfsResult<FileHandle> {
        let path = normalize(path).inspect_err(|e| self.record(e))?;
        let resolved = self.resolve(&path).await?;
        FileHandle::open(resolved.store, &resolved.relative, OpenMode::Read)
            .await
            .inspect_err(|e| self.record(e))
    }

    /// Create or truncate a file in the write directory.
    pub async fn open_write(&self, path: &str) -> VfsResult<FileHandle> {
        self.open_in_write_dir(path, OpenMode::Write).await
    }

    /// Open a file in the write directory for appending.
    pub async fn open_append(&self, path: &str) -> VfsResult<FileHandle> {
        self.open_in_write_dir(path, OpenMode::Append).await
    }

    async fn open_in_write_dir(&self, path: &str, mode: OpenMode) -> VfsResult<FileHandle> {
        let path = normalize(path).inspect_err(|e| self.record(e))?;
        let Some(store) = self.write_dir().await else {
            self.record(&VfsError::NoWriteDir);
            return Err(VfsError::NoWriteDir);
        };
        FileHandle::open(store, &path.to_relative(), mode)
            .await
            .inspect_err(|e| self.record(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;

    fn p(s: &str) -> LogicalPath {
        normalize(s).unwrap()
    }

    fn store_with(name: &str, files: &[(&str, &str)]) -> Arc<dyn BackingStore> {
        let store = MemoryStore::new(name);
        for (path, data) in files {
            store.insert_file(path, *data).unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_append_order_first_wins() {
        let stack = MountStack::new();
        let a = store_with("a", &[("shared.txt", "from a")]);
        let b = store_with("b", &[("shared.txt", "from b")]);
        stack.mount(Arc::clone(&a), "/", false).await.unwrap();
        stack.mount(Arc::clone(&b), "/", false).await.unwrap();

        let resolved = stack.resolve(&p("/shared.txt")).await.unwrap();
        assert_eq!(resolved.store.name(), "a");
        assert!(resolved.exact);
    }

    #[tokio::test]
    async fn test_prepend_shadows() {
        let stack = MountStack::new();
        let a = store_with("a", &[("shared.txt", "from a")]);
        let b = store_with("b", &[("shared.txt", "from b")]);
        stack.mount(a, "/", false).await.unwrap();
        stack.mount(b, "/", true).await.unwrap();

        let resolved = stack.resolve(&p("/shared.txt")).await.unwrap();
        assert_eq!(resolved.store.name(), "b");

        let order: Vec<_> = stack.search_path().await.into_iter().map(|m| m.name).collect();
        assert_eq!(order, ["b", "a"]);
    }

    #[tokio::test]
    async fn test_already_mounted() {
        let stack = MountStack::new();
        let a = store_with("a", &[]);
        stack.mount(Arc::clone(&a), "/", false).await.unwrap();
        let err = stack.mount(Arc::clone(&a), "/other", true).await.unwrap_err();
        assert!(matches!(err, VfsError::AlreadyMounted(_)));
        assert_eq!(stack.search_path().await.len(), 1);
        assert!(stack.last_error().unwrap().contains("already mounted"));
    }

    #[tokio::test]
    async fn test_unmount() {
        let stack = MountStack::new();
        let a = store_with("a", &[("x.txt", "x")]);
        stack.mount(Arc::clone(&a), "/", false).await.unwrap();
        assert!(stack.resolve(&p("x.txt")).await.is_ok());

        stack.unmount(&a).await.unwrap();
        assert!(matches!(
            stack.resolve(&p("x.txt")).await,
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(stack.unmount(&a).await, Err(VfsError::NotMounted(_))));
    }

    #[tokio::test]
    async fn test_unmount_by_name() {
        let stack = MountStack::new();
        stack.mount(store_with("game.zip", &[]), "/", false).await.unwrap();
        let store = stack.unmount_by_name("game.zip").await.unwrap();
        assert_eq!(store.name(), "game.zip");
        assert!(matches!(
            stack.unmount_by_name("game.zip").await,
            Err(VfsError::NotMounted(_))
        ));
    }

    #[tokio::test]
    async fn test_mount_point_routing() {
        let stack = MountStack::new();
        stack
            .mount(store_with("mods", &[("kfm/kfm.def", "k")]), "/chars", false)
            .await
            .unwrap();

        let resolved = stack.resolve(&p("/chars/kfm/kfm.def")).await.unwrap();
        assert_eq!(resolved.relative.to_string(), "kfm/kfm.def");
        assert_eq!(resolved.logical_path().to_string(), "/chars/kfm/kfm.def");

        // Not under the mount point
        assert!(stack.resolve(&p("/kfm/kfm.def")).await.is_err());
    }

    #[tokio::test]
    async fn test_case_insensitive_fallback() {
        let stack = MountStack::new();
        stack
            .mount(store_with("a", &[("data/System.def", "sys")]), "/", false)
            .await
            .unwrap();

        let resolved = stack.resolve(&p("Data/system.DEF")).await.unwrap();
        assert!(!resolved.exact);
        assert_eq!(resolved.relative.to_string(), "data/System.def");
        assert_eq!(resolved.logical_path().to_string(), "/data/System.def");
    }

    #[tokio::test]
    async fn test_exact_anywhere_beats_approximate() {
        let stack = MountStack::new();
        // Higher priority store only has a differently-cased variant
        stack
            .mount(store_with("high", &[("README.TXT", "high")]), "/", false)
            .await
            .unwrap();
        stack
            .mount(store_with("low", &[("readme.txt", "low")]), "/", false)
            .await
            .unwrap();

        let resolved = stack.resolve(&p("readme.txt")).await.unwrap();
        assert_eq!(resolved.store.name(), "low");
        assert!(resolved.exact);
    }

    #[tokio::test]
    async fn test_stat_virtual_dirs() {
        let stack = MountStack::new();
        stack.mount(store_with("m", &[]), "/mnt/game", false).await.unwrap();

        assert!(stack.stat(&p("/")).await.unwrap().is_dir());
        assert!(stack.stat(&p("/mnt")).await.unwrap().is_dir());
        assert!(stack.stat(&p("/mnt/game")).await.unwrap().is_dir());
        assert!(stack.stat(&p("/other")).await.is_err());
    }

    #[tokio::test]
    async fn test_merged_listing() {
        let stack = MountStack::new();
        stack
            .mount(
                store_with("a", &[("data/one.def", "a1"), ("data/shared.def", "a")]),
                "/",
                false,
            )
            .await
            .unwrap();
        stack
            .mount(
                store_with("b", &[("data/shared.def", "bb"), ("data/two.def", "b2")]),
                "/",
                false,
            )
            .await
            .unwrap();
        stack.mount(store_with("c", &[]), "/data/plugins", false).await.unwrap();

        let entries = stack.list(&p("/data")).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["one.def", "shared.def", "two.def", "plugins"]);
        // Shadowed entry comes from the higher store
        assert_eq!(entries[1].size, 1);
        assert!(entries[3].is_dir());
    }

    #[tokio::test]
    async fn test_list_missing_and_file() {
        let stack = MountStack::new();
        stack
            .mount(store_with("a", &[("file.txt", "x")]), "/", false)
            .await
            .unwrap();

        assert!(matches!(
            stack.list(&p("/nope")).await,
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(
            stack.list(&p("/file.txt")).await,
            Err(VfsError::NotADirectory(_))
        ));
        // Empty stack still has a root
        assert!(MountStack::new().list(&p("/")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_dir() {
        let stack = MountStack::new();
        assert!(matches!(
            stack.open_write("save.dat").await,
            Err(VfsError::NoWriteDir)
        ));

        let archive: Arc<dyn BackingStore> = Arc::new(MemoryStore::new("ro").into_read_only());
        assert!(matches!(
            stack.set_write_dir(Some(archive)).await,
            Err(VfsError::PermissionDenied(_))
        ));

        let saves: Arc<dyn BackingStore> = Arc::new(MemoryStore::new("saves"));
        stack.set_write_dir(Some(Arc::clone(&saves))).await.unwrap();
        let mut handle = stack.open_write("/slots/1.dat").await.unwrap();
        handle.write(b"progress").await.unwrap();
        handle.close().await.unwrap();

        assert!(saves.stat(&p("slots/1.dat")).await.unwrap().is_file());
    }
}
