//! Subcommand implementations.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use strata_vfs::{
    DirectoryWalker, FileAttr, GlobPattern, MountStack, VfsError, WalkControl, WalkOutcome,
    host, normalize,
};

use crate::Command;

#[derive(Serialize)]
struct StatReport<'a> {
    path: String,
    store: Option<&'a str>,
    #[serde(flatten)]
    attr: &'a FileAttr,
}

pub async fn run(stack: &MountStack, command: Command) -> Result<()> {
    match command {
        Command::Mounts => mounts(stack).await,
        Command::Ls { path, json } => ls(stack, &path, json).await,
        Command::Stat { path, json } => stat(stack, &path, json).await,
        Command::Cat { path } => {
            let data = stack
                .read_file(&path)
                .await
                .with_context(|| format!("reading {path}"))?;
            std::io::stdout().write_all(&data)?;
            Ok(())
        }
        Command::Find { dir, name } => {
            let found = stack
                .find_file(&dir, &name)
                .await
                .with_context(|| format!("cannot find {name} in {dir}"))?;
            println!("{found}");
            Ok(())
        }
        Command::Check { path } => {
            let found = stack.check_file(&path).await.with_context(|| format!("checking {path}"))?;
            println!("{found}");
            Ok(())
        }
        Command::FindIn { name, dirs } => {
            let found = stack
                .find_file_in_dirs(&dirs, &name)
                .await
                .with_context(|| format!("cannot find {name} in {}", dirs.join(", ")))?;
            println!("{found}");
            Ok(())
        }
        Command::Match { dir, pattern } => {
            for path in stack.find_matching(&dir, &pattern).await? {
                println!("{path}");
            }
            Ok(())
        }
        Command::Walk {
            root,
            max_depth,
            until,
        } => walk(stack, &root, max_depth, until.as_deref()).await,
        Command::Write { path, data } => {
            let data = data_or_stdin(data)?;
            let written = stack.write_file(&path, &data).await?;
            report_written(&path, written, data.len());
            Ok(())
        }
        Command::Append { path, data } => {
            let data = data_or_stdin(data)?;
            let written = stack.append_file(&path, &data).await?;
            report_written(&path, written, data.len());
            Ok(())
        }
        Command::Unmount { name } => {
            stack
                .unmount_by_name(&name)
                .await
                .with_context(|| format!("unmounting {name}"))?;
            println!("Unmounted {name}");
            mounts(stack).await
        }
        Command::BaseDir => {
            println!("{}", host::base_dir()?.display());
            Ok(())
        }
    }
}

async fn mounts(stack: &MountStack) -> Result<()> {
    for (i, info) in stack.search_path().await.iter().enumerate() {
        let mode = if info.read_only { "ro" } else { "rw" };
        println!("{i}: {} -> {} [{mode}]", info.mount_point, info.name);
    }
    if let Some(store) = stack.write_dir().await {
        println!("write: {}", store.name());
    }
    Ok(())
}

async fn ls(stack: &MountStack, path: &str, json: bool) -> Result<()> {
    let dir = normalize(path)?;
    let entries = stack.list(&dir).await.with_context(|| format!("listing {path}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in entries {
        let suffix = if entry.is_dir() { "/" } else { "" };
        println!("{:>10}  {}{suffix}", entry.size, entry.name);
    }
    Ok(())
}

async fn stat(stack: &MountStack, path: &str, json: bool) -> Result<()> {
    let logical = normalize(path)?;
    let attr = stack.stat(&logical).await.with_context(|| format!("stat {path}"))?;

    // Virtual directories have no owning store
    let resolved = stack.resolve(&logical).await.ok();
    let report = StatReport {
        path: resolved
            .as_ref()
            .map(|r| r.logical_path().to_string())
            .unwrap_or_else(|| logical.to_absolute().to_string()),
        store: resolved.as_ref().map(|r| r.store.name()),
        attr: &attr,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("path:      {}", report.path);
        println!("store:     {}", report.store.unwrap_or("(virtual)"));
        println!("kind:      {:?}", attr.kind);
        println!("size:      {}", attr.size);
        println!("read-only: {}", attr.read_only);
    }
    Ok(())
}

async fn walk(
    stack: &MountStack,
    root: &str,
    max_depth: Option<usize>,
    until: Option<&str>,
) -> Result<()> {
    let until = until.map(GlobPattern::new).transpose()?;
    let mut walker = DirectoryWalker::new(stack, normalize(root)?);
    if let Some(depth) = max_depth {
        walker = walker.with_max_depth(depth);
    }

    let outcome = walker
        .walk(|entry| {
            let suffix = if entry.is_dir() { "/" } else { "" };
            println!("{}{}{suffix}", "  ".repeat(entry.depth - 1), entry.entry.name);
            let stop = until.as_ref().is_some_and(|p| p.matches(&entry.entry.name));
            Ok::<_, VfsError>(if stop {
                WalkControl::Stop
            } else {
                WalkControl::Continue
            })
        })
        .await?;

    if outcome == WalkOutcome::Stopped {
        tracing::info!(root, "walk stopped at first match");
    }
    Ok(())
}

fn data_or_stdin(data: Option<String>) -> Result<Vec<u8>> {
    match data {
        Some(text) => Ok(text.into_bytes()),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}

fn report_written(path: &str, written: usize, requested: usize) {
    if written < requested {
        eprintln!("short write to {path}: {written} of {requested} bytes");
    } else {
        println!("{written} bytes -> {path}");
    }
}
