//! Host environment queries.

use std::path::PathBuf;

use crate::error::{VfsError, VfsResult};
use crate::path::SEPARATOR;

/// Directory containing the running executable.
///
/// Games conventionally mount this first so assets next to the binary
/// are found.
pub fn base_dir() -> VfsResult<PathBuf> {
    let exe = std::env::current_exe()?;
    let exe = dunce::canonicalize(&exe).unwrap_or(exe);
    exe.parent()
        .map(PathBuf::from)
        .ok_or_else(|| VfsError::other(format!("{} has no parent directory", exe.display())))
}

/// Separator used in logical paths, independent of the host platform.
pub fn dir_separator() -> char {
    SEPARATOR
}
