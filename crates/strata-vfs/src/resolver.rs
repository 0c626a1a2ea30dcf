//! Case-insensitive lookup inside a single store.
//!
//! Used by the mount stack only after an exact-case lookup has failed in
//! every store. Matching walks the path one segment at a time, so a case
//! mismatch in an intermediate directory (`Data/` vs `data/`) is tolerated
//! as well as one in the final name.

use crate::error::VfsResult;
use crate::path::LogicalPath;
use crate::store::BackingStore;

/// Compare two names ignoring case (Unicode lowercase folding).
pub fn names_match(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Find the store's own spelling of `name` inside `parent`.
///
/// Lists `parent` once. When several entries fold to `name`, the entry
/// spelled exactly like `name` is returned even if a folded match comes
/// earlier in the listing. Without an exact entry the first folded match
/// in listing order is returned. A parent that does not exist (or is not
/// a directory) yields `Ok(None)`.
pub async fn resolve_segment(
    store: &dyn BackingStore,
    parent: &LogicalPath,
    name: &str,
) -> VfsResult<Option<String>> {
    let entries = match store.list(parent).await {
        Ok(entries) => entries,
        Err(e) if e.is_miss() => return Ok(None),
        Err(e) => return Err(e),
    };

    if entries.iter().any(|e| e.name == name) {
        return Ok(Some(name.to_string()));
    }

    Ok(entries
        .into_iter()
        .find(|e| names_match(&e.name, name))
        .map(|e| e.name))
}

/// Resolve every segment of `path` case-insensitively, left to right.
///
/// Returns the store-relative path with the store's actual casing, or
/// `None` as soon as one segment has no match.
pub async fn resolve_path(
    store: &dyn BackingStore,
    path: &LogicalPath,
) -> VfsResult<Option<LogicalPath>> {
    let mut current = LogicalPath::empty();
    for segment in path.segments() {
        match resolve_segment(store, &current, segment).await? {
            Some(actual) => {
                if actual != *segment {
                    tracing::trace!(store = store.name(), %segment, %actual, "case-folded segment");
                }
                current = current.child(&actual)?;
            }
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}
