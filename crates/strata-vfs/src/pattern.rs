//! Shell-style glob matching of single names.
//!
//! Supported syntax:
//!
//! - `*` matches any run of characters, including none
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` character classes; `[!a-z]` or `[^a-z]` negate
//! - `{a,b}` matches either alternative
//! - `\x` matches `x` literally
//!
//! Matching is case-sensitive: names are compared as the store spells
//! them. Patterns are compiled once into a [`GlobMatcher`].

use globset::{GlobBuilder, GlobMatcher};

use crate::error::{VfsError, VfsResult};
use crate::path::LogicalPath;
use crate::store::BackingStore;

/// A compiled glob pattern. Stateless and cheap to clone.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    matcher: GlobMatcher,
}

impl GlobPattern {
    /// Compile a pattern.
    ///
    /// Fails with [`VfsError::InvalidPattern`] for an unterminated class,
    /// a reversed range such as `[z-a]`, or a dangling `\`.
    pub fn new(pattern: &str) -> VfsResult<Self> {
        let glob = GlobBuilder::new(pattern)
            .backslash_escape(true)
            .build()
            .map_err(|e| VfsError::invalid_pattern(format!("{pattern}: {}", e.kind())))?;
        Ok(Self {
            source: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the pattern has no wildcards, classes or alternations.
    pub fn is_literal(&self) -> bool {
        !self.source.contains(['*', '?', '[', '{', '\\'])
    }

    pub fn matches(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }
}

/// One-shot match of `name` against `pattern`.
pub fn matches(pattern: &str, name: &str) -> VfsResult<bool> {
    Ok(GlobPattern::new(pattern)?.matches(name))
}

/// List `dir` in `store` once and keep the names matching `pattern`,
/// in listing order.
pub async fn find_in_directory(
    store: &dyn BackingStore,
    dir: &LogicalPath,
    pattern: &GlobPattern,
) -> VfsResult<Vec<String>> {
    let entries = store.list(dir).await?;
    Ok(entries
        .into_iter()
        .filter(|e| pattern.matches(&e.name))
        .map(|e| e.name)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use crate::path::normalize;

    fn m(pattern: &str, name: &str) -> bool {
        matches(pattern, name).unwrap()
    }

    #[test]
    fn test_star_and_question() {
        assert!(m("*.def", "system.def"));
        assert!(!m("*.def", "system.DEF"));
        assert!(m("a?c", "abc"));
        assert!(!m("a?c", "ac"));
        assert!(m("*", ""));
        assert!(!m("*.def", "system.def.bak"));
    }

    #[test]
    fn test_metachars_are_literal() {
        assert!(m("a+b(1).txt", "a+b(1).txt"));
        assert!(!m("a.b", "axb"));
        assert!(m("$x^", "$x^"));
    }

    #[test]
    fn test_classes() {
        assert!(m("stage[0-9].def", "stage3.def"));
        assert!(!m("stage[0-9].def", "stageX.def"));
        assert!(m("[!a]*", "bcd"));
        assert!(!m("[^a]*", "abc"));
        assert!(m("[]]", "]"));
        assert!(m("[a-]", "-"));
    }

    #[test]
    fn test_alternation() {
        assert!(m("*.{def,cns}", "kfm.cns"));
        assert!(m("*.{def,cns}", "kfm.def"));
        assert!(!m("*.{def,cns}", "kfm.sff"));
    }

    #[test]
    fn test_escape() {
        assert!(m("\\*", "*"));
        assert!(!m("\\*", "a"));
        assert!(m("\\{x\\}", "{x}"));
        assert!(matches!(
            GlobPattern::new("end\\"),
            Err(VfsError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_malformed_classes() {
        assert!(matches!(
            GlobPattern::new("[abc"),
            Err(VfsError::InvalidPattern(_))
        ));
        assert!(matches!(
            GlobPattern::new("[z-a]"),
            Err(VfsError::InvalidPattern(_))
        ));
        assert!(matches!(GlobPattern::new("["), Err(VfsError::InvalidPattern(_))));
    }

    #[test]
    fn test_is_literal() {
        assert!(GlobPattern::new("system.def").unwrap().is_literal());
        assert!(!GlobPattern::new("*.def").unwrap().is_literal());
        assert!(!GlobPattern::new("{a,b}").unwrap().is_literal());
    }

    #[tokio::test]
    async fn test_find_in_directory_keeps_listing_order() {
        let store = MemoryStore::new("mem");
        store.insert_file("data/zz.def", "").unwrap();
        store.insert_file("data/readme.txt", "").unwrap();
        store.insert_file("data/aa.def", "").unwrap();
        store.insert_file("data/UPPER.DEF", "").unwrap();

        let pattern = GlobPattern::new("*.def").unwrap();
        let found = find_in_directory(&store, &normalize("data").unwrap(), &pattern)
            .await
            .unwrap();
        assert_eq!(found, ["zz.def", "aa.def"]);
    }
}
