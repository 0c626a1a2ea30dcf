//! Backing stores.
//!
//! Stores implement [`BackingStore`](crate::BackingStore) for different
//! kinds of mounted source.

mod local;
mod memory;

pub use local::DirectoryStore;
pub use memory::MemoryStore;
