//! Directory tree helpers: walking, copying, pruning and atomic writes.
//!
//! All relative paths handed to the rest of the engine are `/`-separated
//! strings (see [`rel_to_slash`]) so that patch targets and exclusion entries
//! compare the same way on every platform.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{ForkError, Result, io_at};
use crate::model::exclude::ExclusionSet;

/// Convert a relative path to its `/`-separated form.
#[must_use]
pub fn rel_to_slash(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Recursively list regular files under `root`, as sorted relative paths.
///
/// Symlinks are followed. A missing `root` yields an empty list.
///
/// # Errors
/// Returns [`ForkError::Io`] if a directory cannot be read.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if root.is_dir() {
        collect_files(root, root, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(io_at(dir))? {
        let entry = entry.map_err(io_at(dir))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
        } else if path.is_file()
            && let Ok(rel) = path.strip_prefix(root)
        {
            files.push(rel.to_path_buf());
        }
    }
    Ok(())
}

/// List files under `root` as `/`-separated paths, minus excluded ones.
///
/// # Errors
/// Returns [`ForkError::Io`] if a directory cannot be read.
pub fn list_included(root: &Path, excludes: &ExclusionSet) -> Result<BTreeSet<String>> {
    Ok(list_files(root)?
        .iter()
        .map(|rel| rel_to_slash(rel))
        .filter(|rel| !excludes.is_excluded(rel))
        .collect())
}

/// Copy every non-excluded file under `src` into `dst`, creating directories
/// as needed. Returns the number of files copied.
///
/// # Errors
/// Returns [`ForkError::Io`] on read, create or copy failures.
pub fn copy_tree(src: &Path, dst: &Path, excludes: &ExclusionSet) -> Result<usize> {
    let files = list_included(src, excludes)?;
    for rel in &files {
        copy_file(&src.join(rel), &dst.join(rel))?;
    }
    Ok(files.len())
}

/// Copy one file, creating the destination's parent directories.
///
/// # Errors
/// Returns [`ForkError::Io`] on failure.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(io_at(parent))?;
    }
    fs::copy(src, dst).map_err(io_at(src))?;
    Ok(())
}

/// Write `bytes` to `path` through a temporary file in the same directory,
/// then rename it into place.
///
/// # Errors
/// Returns [`ForkError::Io`] on any step.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| ForkError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent directory"),
    })?;
    fs::create_dir_all(dir).map_err(io_at(dir))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_at(dir))?;
    tmp.write_all(bytes).map_err(io_at(tmp.path()))?;
    tmp.as_file().sync_all().map_err(io_at(path))?;
    tmp.persist(path).map_err(|e| ForkError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Write `bytes` to `path`, creating parent directories.
///
/// # Errors
/// Returns [`ForkError::Io`] on failure.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_at(parent))?;
    }
    fs::write(path, bytes).map_err(io_at(path))
}

/// Remove a file, then any parent directories it leaves empty, stopping at
/// `root`.
///
/// # Errors
/// Returns [`ForkError::Io`] if the file cannot be removed.
pub fn remove_file_and_empty_parents(root: &Path, path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(io_at(path))?;
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == root || !d.starts_with(root) {
            break;
        }
        // Stops at the first non-empty directory.
        if fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
    Ok(())
}

/// Remove a directory tree if it exists.
///
/// # Errors
/// Returns [`ForkError::Io`] on failure.
pub fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ForkError::Io {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}

/// Remove empty directories below `root` (never `root` itself).
///
/// # Errors
/// Returns [`ForkError::Io`] if a directory cannot be read.
pub fn prune_empty_dirs(root: &Path) -> Result<()> {
    prune_inner(root)?;
    Ok(())
}

/// Returns `true` if `dir` ended up empty.
fn prune_inner(dir: &Path) -> Result<bool> {
    let mut empty = true;
    for entry in fs::read_dir(dir).map_err(io_at(dir))? {
        let path = entry.map_err(io_at(dir))?.path();
        if path.is_dir() && !path.is_symlink() {
            if prune_inner(&path)? {
                fs::remove_dir(&path).map_err(io_at(&path))?;
            } else {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    Ok(empty)
}
