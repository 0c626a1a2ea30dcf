//! TOML configuration for the `strata` binary.
//!
//! ```toml
//! write_dir = "~/.local/share/mygame"
//!
//! [[mount]]
//! source = "/opt/mygame"
//!
//! [[mount]]
//! source = "~/mygame-mods"
//! mount_point = "/"
//! prepend = true
//! ```
//!
//! Relative sources are taken relative to the config file's directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One `[[mount]]` table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MountConfig {
    pub source: PathBuf,
    #[serde(default = "default_mount_point")]
    pub mount_point: String,
    #[serde(default)]
    pub prepend: bool,
    #[serde(default = "default_read_only")]
    pub read_only: bool,
}

fn default_mount_point() -> String {
    "/".to_string()
}

fn default_read_only() -> bool {
    true
}

impl MountConfig {
    /// A read-only mount at `/`, as produced by `--mount`.
    pub fn at_root(source: PathBuf, prepend: bool) -> Self {
        Self {
            source,
            mount_point: default_mount_point(),
            prepend,
            read_only: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub write_dir: Option<PathBuf>,
    #[serde(default, rename = "mount")]
    pub mounts: Vec<MountConfig>,
}

impl Config {
    /// `<config dir>/strata/strata.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("strata").join("strata.toml"))
    }

    /// Parse a config file and resolve its paths.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config.rebase_paths(path.parent().unwrap_or_else(|| Path::new(".")));
        Ok(config)
    }

    /// Load `explicit` if given (it must exist), else the default file if
    /// present, else an empty config.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(&expand(path));
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading default config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    fn rebase_paths(&mut self, base: &Path) {
        if let Some(dir) = &mut self.write_dir {
            *dir = join_base(base, &expand(dir));
        }
        for mount in &mut self.mounts {
            mount.source = join_base(base, &expand(&mount.source));
        }
    }
}

/// Expand a leading `~`.
pub fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}

fn join_base(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[mount]]
            source = "/opt/game"

            [[mount]]
            source = "/opt/mods"
            mount_point = "/mods"
            prepend = true
            read_only = false
            "#,
        )
        .unwrap();

        assert_eq!(config.write_dir, None);
        assert_eq!(config.mounts.len(), 2);
        assert_eq!(config.mounts[0], MountConfig::at_root("/opt/game".into(), false));
        assert_eq!(config.mounts[1].mount_point, "/mods");
        assert!(config.mounts[1].prepend);
        assert!(!config.mounts[1].read_only);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<Config>("wrtie_dir = \"/tmp\"").is_err());
    }

    #[test]
    fn test_load_rebases_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.toml");
        std::fs::write(
            &path,
            "write_dir = \"saves\"\n[[mount]]\nsource = \"data\"\n[[mount]]\nsource = \"/abs\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.write_dir, Some(dir.path().join("saves")));
        assert_eq!(config.mounts[0].source, dir.path().join("data"));
        assert_eq!(config.mounts[1].source, PathBuf::from("/abs"));
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load_or_default(Some(&missing)).is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand(Path::new("~/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("x"));
        }
        assert_eq!(expand(Path::new("/plain")), PathBuf::from("/plain"));
    }
}
