//! Depth-first traversal of the logical namespace.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{VfsError, VfsResult};
use crate::mount::MountStack;
use crate::path::LogicalPath;
use crate::types::DirEntry;

/// One visited entry.
#[derive(Debug, Clone, Serialize)]
pub struct WalkEntry {
    /// Absolute logical path.
    pub path: LogicalPath,
    /// Path relative to the walk root.
    pub relative: LogicalPath,
    /// 1 for children of the root.
    pub depth: usize,
    pub entry: DirEntry,
}

impl WalkEntry {
    pub fn is_dir(&self) -> bool {
        self.entry.is_dir()
    }
}

/// What the visitor wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    Stop,
}

/// How a walk ended when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Every reachable entry was visited.
    Completed,
    /// The visitor returned [`WalkControl::Stop`].
    Stopped,
}

/// Pre-order, depth-first walker over merged listings.
///
/// Each entry is visited before anything below it, and a directory's
/// subtree is finished before its next sibling. Siblings come in merged
/// listing order. Traversal keeps an explicit stack of pending listings.
#[derive(Debug)]
pub struct DirectoryWalker<'a> {
    stack: &'a MountStack,
    root: LogicalPath,
    max_depth: Option<usize>,
    cancel: Option<CancellationToken>,
}

impl<'a> DirectoryWalker<'a> {
    pub fn new(stack: &'a MountStack, root: LogicalPath) -> Self {
        Self {
            stack,
            root: root.to_absolute(),
            max_depth: None,
            cancel: None,
        }
    }

    /// Do not descend below `depth` (1 visits only the root's children).
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Abort with [`VfsError::Cancelled`] once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Walk, calling `visit` for every entry.
    ///
    /// An `Err` from `visit` ends the walk and is returned unchanged.
    /// Listing failures are converted into `E`.
    pub async fn walk<E, F>(&self, mut visit: F) -> Result<WalkOutcome, E>
    where
        E: From<VfsError>,
        F: FnMut(&WalkEntry) -> Result<WalkControl, E>,
    {
        let attr = self.stack.stat(&self.root).await?;
        if !attr.is_dir() {
            return Err(VfsError::not_a_directory(self.root.to_string()).into());
        }

        let mut frames = vec![self.children(&self.root, 1).await?.into_iter()];
        while let Some(frame) = frames.last_mut() {
            let Some(entry) = frame.next() else {
                frames.pop();
                continue;
            };

            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                tracing::debug!(root = %self.root, "walk cancelled");
                return Err(VfsError::Cancelled.into());
            }

            if visit(&entry)? == WalkControl::Stop {
                tracing::debug!(root = %self.root, at = %entry.path, "walk stopped by visitor");
                return Ok(WalkOutcome::Stopped);
            }

            let descend = self.max_depth.is_none_or(|max| entry.depth < max);
            if entry.is_dir() && descend {
                frames.push(self.children(&entry.path, entry.depth + 1).await?.into_iter());
            }
        }

        Ok(WalkOutcome::Completed)
    }

    /// Visit everything and return the entries in walk order.
    pub async fn collect(&self) -> VfsResult<Vec<WalkEntry>> {
        let mut out = Vec::new();
        self.walk(|entry| {
            out.push(entry.clone());
            Ok::<_, VfsError>(WalkControl::Continue)
        })
        .await?;
        Ok(out)
    }

    async fn children(&self, dir: &LogicalPath, depth: usize) -> VfsResult<Vec<WalkEntry>> {
        let listing = self.stack.list(dir).await?;
        let mut entries = Vec::with_capacity(listing.len());
        for entry in listing {
            // Host names containing `\` cannot be addressed logically
            let Ok(path) = dir.child(&entry.name) else {
                tracing::debug!(%dir, name = %entry.name, "skipping unaddressable entry");
                continue;
            };
            let relative = path.strip_prefix(&self.root).unwrap_or_else(|| path.to_relative());
            entries.push(WalkEntry {
                path,
                relative,
                depth,
                entry,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use crate::path::normalize;
    use std::sync::Arc;

    async fn stack() -> MountStack {
        let store = MemoryStore::new("game");
        store.insert_file("data/system.def", "s").unwrap();
        store.insert_file("data/fight/fight.def", "f").unwrap();
        store.insert_file("data/select.def", "sel").unwrap();
        store.insert_file("readme.txt", "r").unwrap();

        let stack = MountStack::new();
        stack.mount(Arc::new(store), "/", false).await.unwrap();
        stack
    }

    fn paths(entries: &[WalkEntry]) -> Vec<String> {
        entries.iter().map(|e| e.path.to_string()).collect()
    }

    #[tokio::test]
    async fn test_preorder() {
        let stack = stack().await;
        let entries = DirectoryWalker::new(&stack, LogicalPath::root())
            .collect()
            .await
            .unwrap();
        assert_eq!(
            paths(&entries),
            [
                "/data",
                "/data/system.def",
                "/data/fight",
                "/data/fight/fight.def",
                "/data/select.def",
                "/readme.txt",
            ]
        );
        assert_eq!(entries[3].depth, 3);
        assert_eq!(entries[3].relative.to_string(), "data/fight/fight.def");
    }

    #[tokio::test]
    async fn test_subtree_relative_paths() {
        let stack = stack().await;
        let entries = DirectoryWalker::new(&stack, normalize("/data").unwrap())
            .collect()
            .await
            .unwrap();
        assert_eq!(entries[0].relative.to_string(), "system.def");
        assert_eq!(entries.len(), 4);
    }

    #[tokio::test]
    async fn test_stop_is_immediate() {
        let stack = stack().await;
        let mut seen = Vec::new();
        let outcome = DirectoryWalker::new(&stack, LogicalPath::root())
            .walk(|entry| {
                seen.push(entry.path.to_string());
                Ok::<_, VfsError>(if entry.entry.name == "fight" {
                    WalkControl::Stop
                } else {
                    WalkControl::Continue
                })
            })
            .await
            .unwrap();
        assert_eq!(outcome, WalkOutcome::Stopped);
        assert_eq!(seen, ["/data", "/data/system.def", "/data/fight"]);
    }

    #[tokio::test]
    async fn test_visitor_error_surfaces() {
        #[derive(Debug)]
        #[allow(dead_code)]
        enum VisitError {
            Found(String),
            Vfs(VfsError),
        }
        impl From<VfsError> for VisitError {
            fn from(e: VfsError) -> Self {
                VisitError::Vfs(e)
            }
        }

        let stack = stack().await;
        let mut visits = 0;
        let err = DirectoryWalker::new(&stack, LogicalPath::root())
            .walk(|entry| {
                visits += 1;
                if entry.entry.name.ends_with(".def") {
                    Err(VisitError::Found(entry.path.to_string()))
                } else {
                    Ok(WalkControl::Continue)
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VisitError::Found(ref p) if p == "/data/system.def"));
        assert_eq!(visits, 2);
    }

    #[tokio::test]
    async fn test_max_depth() {
        let stack = stack().await;
        let entries = DirectoryWalker::new(&stack, LogicalPath::root())
            .with_max_depth(1)
            .collect()
            .await
            .unwrap();
        assert_eq!(paths(&entries), ["/data", "/readme.txt"]);
    }

    #[tokio::test]
    async fn test_cancellation() {
        let stack = stack().await;
        let token = CancellationToken::new();
        let walker = DirectoryWalker::new(&stack, LogicalPath::root())
            .with_cancellation(token.clone());

        let result = walker
            .walk(|_| {
                token.cancel();
                Ok::<_, VfsError>(WalkControl::Continue)
            })
            .await;
        assert!(matches!(result, Err(VfsError::Cancelled)));
    }

    #[tokio::test]
    async fn test_walk_into_mount_points() {
        let stack = MountStack::new();
        let mods = MemoryStore::new("mods");
        mods.insert_file("kfm/kfm.def", "k").unwrap();
        stack.mount(Arc::new(mods), "/chars", false).await.unwrap();

        let entries = DirectoryWalker::new(&stack, LogicalPath::root())
            .collect()
            .await
            .unwrap();
        assert_eq!(paths(&entries), ["/chars", "/chars/kfm", "/chars/kfm/kfm.def"]);
    }

    #[tokio::test]
    async fn test_walk_file_root() {
        let stack = stack().await;
        let result = DirectoryWalker::new(&stack, normalize("/readme.txt").unwrap())
            .collect()
            .await;
        assert!(matches!(result, Err(VfsError::NotADirectory(_))));
    }
}
