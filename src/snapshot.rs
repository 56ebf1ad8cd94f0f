//! Upstream snapshot provider.
//!
//! The engine never clones or checks out repositories itself. A
//! [`SnapshotProvider`] turns an [`UpstreamRef`] into a read-only directory
//! holding that revision's tree; the bundled [`DirectorySnapshots`] expects
//! the checkout to already exist on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ForkError, Result};
use crate::model::types::{UpstreamName, UpstreamRef};

/// Supplies upstream source trees.
pub trait SnapshotProvider: Send + Sync {
    /// Return the directory holding `upstream` at its configured revision.
    ///
    /// The engine only reads from the returned directory.
    ///
    /// # Errors
    /// Returns [`ForkError::Snapshot`] if the revision is not available.
    fn checkout(&self, upstream: &UpstreamRef) -> Result<PathBuf>;
}

/// Snapshots laid out as `<root>/<upstream>/<revision>/`, with optional
/// per-upstream overrides.
#[derive(Clone, Debug)]
pub struct DirectorySnapshots {
    root: PathBuf,
    overrides: BTreeMap<UpstreamName, PathBuf>,
}

impl DirectorySnapshots {
    /// Create a provider rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overrides: BTreeMap::new(),
        }
    }

    /// Serve `upstream` from `path` instead of the revision directory.
    #[must_use]
    pub fn with_override(mut self, upstream: UpstreamName, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(upstream, path.into());
        self
    }

    /// Where `upstream` is expected on disk.
    #[must_use]
    pub fn location(&self, upstream: &UpstreamRef) -> PathBuf {
        self.overrides.get(&upstream.name).cloned().unwrap_or_else(|| {
            self.root
                .join(upstream.name.as_str())
                .join(sanitize_revision(&upstream.revision))
        })
    }

    /// The snapshot root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SnapshotProvider for DirectorySnapshots {
    fn checkout(&self, upstream: &UpstreamRef) -> Result<PathBuf> {
        let dir = self.location(upstream);
        if dir.is_dir() {
            tracing::debug!(upstream = %upstream.name, dir = %dir.display(), "using upstream snapshot");
            Ok(dir)
        } else {
            Err(ForkError::Snapshot {
                upstream: upstream.name.clone(),
                detail: format!(
                    "{} at revision '{}' expected in {}",
                    upstream.repo,
                    upstream.revision,
                    dir.display()
                ),
            })
        }
    }
}

/// Branch names may contain `/`; keep each revision a single directory.
fn sanitize_revision(revision: &str) -> String {
    revision.replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn upstream(rev: &str) -> UpstreamRef {
        UpstreamRef::new(
            UpstreamName::new("paper").unwrap(),
            "PaperMC/Paper".to_owned(),
            rev.to_owned(),
        )
    }

    #[test]
    fn checkout_finds_revision_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("paper/abc")).unwrap();
        let snaps = DirectorySnapshots::new(tmp.path());
        assert_eq!(snaps.checkout(&upstream("abc")).unwrap(), tmp.path().join("paper/abc"));
    }

    #[test]
    fn missing_revision_is_snapshot_error() {
        let tmp = TempDir::new().unwrap();
        let err = DirectorySnapshots::new(tmp.path())
            .checkout(&upstream("nope"))
            .unwrap_err();
        assert_eq!(err.kind(), "snapshot");
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn override_wins() {
        let tmp = TempDir::new().unwrap();
        let snaps = DirectorySnapshots::new("/unused")
            .with_override(UpstreamName::new("paper").unwrap(), tmp.path());
        assert_eq!(snaps.checkout(&upstream("abc")).unwrap(), tmp.path());
    }

    #[test]
    fn branch_revisions_stay_one_directory() {
        let snaps = DirectorySnapshots::new("/snap");
        assert_eq!(
            snaps.location(&upstream("ver/1.21.8")),
            PathBuf::from("/snap/paper/ver_1.21.8")
        );
    }
}
