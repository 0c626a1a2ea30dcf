//! # strata-vfs
//!
//! Layered virtual filesystem.
//!
//! An ordered stack of mounted sources (host directories, in-memory trees,
//! anything implementing [`BackingStore`]) is presented as one logical
//! namespace. Key components:
//!
//! - [`normalize`] / [`LogicalPath`] - canonical `/`-separated paths that
//!   can never climb above the root
//! - [`MountStack`] - ordered mounts; the first store holding a path wins
//! - [`resolver`] - case-insensitive fallback lookup
//! - [`GlobPattern`] - shell-style name matching
//! - [`FileHandle`] - cursor-tracking byte streams, with [`FileStream`]
//!   adapting them to tokio's `AsyncRead`/`AsyncWrite`/`AsyncSeek`
//! - [`DirectoryWalker`] - depth-first enumeration with early stop
//!
//! ## Resolution
//!
//! A lookup first tries the exact spelling in every store, in stack order.
//! Only when that fails everywhere does it retry each store
//! case-insensitively, one path segment at a time. Results carry the
//! store's actual casing.
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_vfs::{DirectoryStore, MountStack};
//!
//! # async fn demo() -> strata_vfs::VfsResult<()> {
//! let stack = MountStack::new();
//! stack.mount(Arc::new(DirectoryStore::read_only("/opt/game")), "/", false).await?;
//! stack.mount(Arc::new(DirectoryStore::read_only("/home/amy/mods")), "/", true).await?;
//!
//! let system = stack.read_file("data/SYSTEM.DEF").await?;
//! # let _ = system;
//! # Ok(())
//! # }
//! ```

pub mod backends;
mod error;
mod handle;
pub mod host;
mod mount;
mod path;
pub mod pattern;
pub mod resolver;
mod search;
mod store;
mod stream;
mod types;
mod walker;

pub use backends::{DirectoryStore, MemoryStore};
pub use error::{VfsError, VfsResult};
pub use handle::FileHandle;
pub use mount::{MountInfo, MountStack, Resolved};
pub use path::{LogicalPath, SEPARATOR, normalize};
pub use pattern::GlobPattern;
pub use store::{BackingStore, StoreFile};
pub use stream::FileStream;
pub use types::{DirEntry, FileAttr, FileType, OpenMode, SeekOrigin};
pub use walker::{DirectoryWalker, WalkControl, WalkEntry, WalkOutcome};
