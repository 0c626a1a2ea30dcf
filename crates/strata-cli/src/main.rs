//! strata binary
//!
//! Mounts host directories into one layered namespace and runs a single
//! query or write against it.
//!
//! ## Usage
//!
//! ```bash
//! # Game data first, mods shadowing it
//! strata --mount /opt/game --prepend ~/mods ls /data
//!
//! # Case-insensitive lookups report the real spelling
//! strata --mount /opt/game check DATA/SYSTEM.DEF
//!
//! # Glob search and walks
//! strata --mount /opt/game match /data '*.def'
//! strata --mount /opt/game walk / --max-depth 2
//!
//! # Writes go to the write directory
//! strata --write-dir ~/.local/share/game write saves/slot1.sav "round 1"
//! ```
//!
//! Mounts can also come from `~/.config/strata/strata.toml`; see
//! [`config`] for the format.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use strata_vfs::{BackingStore, DirectoryStore, MountStack};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, MountConfig, expand};

/// Layered virtual filesystem explorer.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Query a layered virtual filesystem built from host directories")]
struct Args {
    /// Config file (default: <config dir>/strata/strata.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory to mount at `/`, searched after existing mounts
    #[arg(long = "mount", value_name = "DIR", global = true)]
    mounts: Vec<PathBuf>,

    /// Directory to mount at `/`, searched before existing mounts
    #[arg(long = "prepend", value_name = "DIR", global = true)]
    prepends: Vec<PathBuf>,

    /// Directory receiving writes and appends
    #[arg(long, value_name = "DIR", global = true)]
    write_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the search path in resolution order
    Mounts,
    /// List a directory (merged across mounts)
    Ls {
        #[arg(default_value = "/")]
        path: String,
        #[arg(long)]
        json: bool,
    },
    /// Show attributes and the owning mount
    Stat {
        path: String,
        #[arg(long)]
        json: bool,
    },
    /// Print a file to stdout
    Cat { path: String },
    /// Look for a file inside a directory
    Find { dir: String, name: String },
    /// Confirm a file exists and print its real spelling
    Check { path: String },
    /// Look for a file in several directories, first hit wins
    FindIn {
        name: String,
        #[arg(required = true)]
        dirs: Vec<String>,
    },
    /// List entries of a directory matching a glob
    Match { dir: String, pattern: String },
    /// Walk a directory tree depth-first
    Walk {
        #[arg(default_value = "/")]
        root: String,
        #[arg(long)]
        max_depth: Option<usize>,
        /// Stop at the first entry whose name matches this glob
        #[arg(long)]
        until: Option<String>,
    },
    /// Create or replace a file in the write directory
    Write {
        path: String,
        /// Contents; read from stdin when omitted
        data: Option<String>,
    },
    /// Append to a file in the write directory
    Append {
        path: String,
        /// Contents; read from stdin when omitted
        data: Option<String>,
    },
    /// Unmount a store by name, then show what remains
    Unmount { name: String },
    /// Print the directory containing this executable
    BaseDir,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;
    let stack = build_stack(&config, &args).await?;

    commands::run(&stack, args.command).await
}

/// Mount config entries, then `--mount`, then `--prepend`.
async fn build_stack(config: &Config, args: &Args) -> Result<MountStack> {
    let stack = MountStack::new();

    let flags = args
        .mounts
        .iter()
        .map(|dir| MountConfig::at_root(expand(dir), false))
        .chain(
            args.prepends
                .iter()
                .map(|dir| MountConfig::at_root(expand(dir), true)),
        );

    for mount in config.mounts.iter().cloned().chain(flags) {
        if !mount.source.is_dir() {
            bail!(
                "{} is not a directory (only host directories can be mounted)",
                mount.source.display()
            );
        }
        let mut store = DirectoryStore::new(&mount.source);
        store.set_read_only(mount.read_only);
        stack
            .mount(Arc::new(store), &mount.mount_point, mount.prepend)
            .await
            .with_context(|| format!("mounting {}", mount.source.display()))?;
    }

    let write_dir = args
        .write_dir
        .as_deref()
        .map(expand)
        .or_else(|| config.write_dir.clone());
    if let Some(dir) = write_dir {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating write directory {}", dir.display()))?;
        let store: Arc<dyn BackingStore> = Arc::new(DirectoryStore::new(&dir));
        stack.set_write_dir(Some(store)).await?;
    }

    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_flags_layer_over_config() {
        let game = TempDir::new().unwrap();
        let mods = TempDir::new().unwrap();
        let saves = TempDir::new().unwrap();

        let config = Config {
            write_dir: None,
            mounts: vec![MountConfig::at_root(game.path().to_path_buf(), false)],
        };
        let args = Args::parse_from([
            "strata".into(),
            "--prepend".into(),
            mods.path().as_os_str().to_owned(),
            "--write-dir".into(),
            saves.path().join("w").into_os_string(),
            "mounts".into(),
        ]);

        let stack = build_stack(&config, &args).await.unwrap();
        let order = stack.search_path().await;
        assert_eq!(order.len(), 2);
        assert!(order[0].prepended);
        assert!(order[1].read_only);
        assert!(stack.write_dir().await.is_some());
        assert!(saves.path().join("w").is_dir());
    }

    #[tokio::test]
    async fn test_non_directory_mount_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("game.zip");
        std::fs::write(&archive, "PK").unwrap();

        let config = Config {
            write_dir: None,
            mounts: vec![MountConfig::at_root(archive, false)],
        };
        let args = Args::parse_from(["strata", "mounts"]);
        assert!(build_stack(&config, &args).await.is_err());
    }
}
