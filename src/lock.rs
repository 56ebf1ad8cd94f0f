//! Per-fork exclusive locks.
//!
//! Apply and rediff of the same fork are serialized with an advisory lock on
//! `<state_dir>/locks/<fork>.lock`. The lock is released when the guard is
//! dropped (the file is closed).

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use crate::error::{Result, io_at};
use crate::model::types::ForkName;

/// Held while a fork's output directory is being written.
#[derive(Debug)]
pub struct NodeLock {
    _file: File,
    path: PathBuf,
}

impl NodeLock {
    /// Block until the lock for `fork` is held.
    ///
    /// # Errors
    /// Returns [`crate::ForkError::Io`] if the lock file cannot be created or
    /// locked.
    pub fn acquire(state_dir: &Path, fork: &ForkName) -> Result<Self> {
        let dir = state_dir.join("locks");
        fs::create_dir_all(&dir).map_err(io_at(&dir))?;
        let path = dir.join(format!("{fork}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_at(&path))?;
        FileExt::lock_exclusive(&file).map_err(io_at(&path))?;
        tracing::debug!(fork = %fork, lock = %path.display(), "acquired fork lock");
        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
