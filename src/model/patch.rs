//! Patch model: fragments, units and sets.
//!
//! A fork never stores modified copies of upstream files. Instead each file it
//! changes carries a [`PatchUnit`]: an ordered list of [`PatchFragment`]s, each
//! one unified diff plus authorship metadata. Fragment order is significant:
//! fragment *n* was written against the file as fragments *0..n* left it.
//!
//! Key types:
//! - [`FragmentMeta`]: authorship of a fragment
//! - [`PatchUnit`]: one target file and its fragments
//! - [`PatchSetSpec`]: where a set reads from, writes to, and stores patches
//! - [`PatchSet`]: a spec plus its units, ordered by path

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use super::exclude::ExclusionSet;
use super::types::SetLabel;
use crate::diff::FileDiff;

/// Author name used for fragments created by rediff without caller metadata.
pub const PLACEHOLDER_AUTHOR: &str = "Unknown Author";
/// Author email used for fragments created by rediff without caller metadata.
pub const PLACEHOLDER_EMAIL: &str = "unknown@localhost";
/// Title prefix used for fragments created by rediff without caller metadata.
pub const PLACEHOLDER_TITLE_PREFIX: &str = "Unnamed change to ";

// ---------------------------------------------------------------------------
// FragmentMeta
// ---------------------------------------------------------------------------

/// Commit-like metadata attached to one fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentMeta {
    /// One-line summary.
    pub title: String,
    /// Author display name.
    pub author_name: String,
    /// Author email address.
    pub author_email: String,
    /// When the fragment was authored.
    pub timestamp: DateTime<FixedOffset>,
    /// Optional longer description (may span lines).
    pub body: Option<String>,
}

impl FragmentMeta {
    /// Create metadata with no body.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            title: title.into(),
            author_name: author_name.into(),
            author_email: author_email.into(),
            timestamp,
            body: None,
        }
    }

    /// Metadata for a fragment nobody has described yet.
    ///
    /// Recognizable via [`FragmentMeta::is_placeholder`] so that reviews can
    /// find units that still need a human-written title.
    #[must_use]
    pub fn placeholder(path: &str) -> Self {
        Self::new(
            format!("{PLACEHOLDER_TITLE_PREFIX}{path}"),
            PLACEHOLDER_AUTHOR,
            PLACEHOLDER_EMAIL,
            Utc::now().fixed_offset(),
        )
    }

    /// Returns `true` if this metadata was generated by [`FragmentMeta::placeholder`].
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.author_email == PLACEHOLDER_EMAIL && self.title.starts_with(PLACEHOLDER_TITLE_PREFIX)
    }
}

// ---------------------------------------------------------------------------
// PatchFragment / PatchUnit
// ---------------------------------------------------------------------------

/// One unified-diff change block against a single file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchFragment {
    /// Authorship metadata.
    pub meta: FragmentMeta,
    /// The change itself. `diff.path` is the fragment's target.
    pub diff: FileDiff,
}

impl PatchFragment {
    /// The target path, relative to the patch set root.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.diff.path
    }
}

/// One target file and its ordered fragments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchUnit {
    /// Target path, `/`-separated, relative to the patch set root.
    pub path: String,
    /// Fragments in application order. Never empty for a stored unit.
    pub fragments: Vec<PatchFragment>,
}

impl PatchUnit {
    /// Create a unit with a single fragment.
    #[must_use]
    pub fn single(fragment: PatchFragment) -> Self {
        Self {
            path: fragment.target().to_owned(),
            fragments: vec![fragment],
        }
    }

    /// The last fragment (the one rediff rewrites).
    #[must_use]
    pub fn last_fragment(&self) -> Option<&PatchFragment> {
        self.fragments.last()
    }
}

// ---------------------------------------------------------------------------
// PatchSetSpec / PatchSet
// ---------------------------------------------------------------------------

/// Whether a set covers a directory tree or a single file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchSetKind {
    /// Many files under a directory, one `.patch` file per unit.
    #[default]
    Dir,
    /// Exactly one file, with its unit stored at a single patch file path.
    File,
}

/// Where a patch set reads, writes, and stores its patches.
#[derive(Clone, Debug)]
pub struct PatchSetSpec {
    /// Source-root label (e.g. `paperServer`).
    pub label: SetLabel,
    /// Directory or single file.
    pub kind: PatchSetKind,
    /// Path within the node's input tree.
    pub upstream_path: PathBuf,
    /// Path within the node's output directory.
    pub output_path: PathBuf,
    /// Absolute patch storage location: a directory for [`PatchSetKind::Dir`],
    /// a file for [`PatchSetKind::File`].
    pub patches: PathBuf,
    /// Paths never copied, patched or regenerated. Always empty for file sets.
    pub excludes: ExclusionSet,
}

impl PatchSetSpec {
    /// The unit path used by a [`PatchSetKind::File`] set: the file name of
    /// its upstream path.
    #[must_use]
    pub fn file_unit_path(&self) -> String {
        self.upstream_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A patch set spec together with its loaded units.
///
/// Invariant: `units` is sorted by path and holds at most one unit per path.
#[derive(Clone, Debug)]
pub struct PatchSet {
    /// Configuration of this set.
    pub spec: PatchSetSpec,
    /// Units, sorted by path.
    pub units: Vec<PatchUnit>,
}

impl PatchSet {
    /// Create a set, sorting units by path.
    #[must_use]
    pub fn new(spec: PatchSetSpec, mut units: Vec<PatchUnit>) -> Self {
        units.sort_by(|a, b| a.path.cmp(&b.path));
        Self { spec, units }
    }

    /// Look up the unit for a path.
    #[must_use]
    pub fn unit(&self, path: &str) -> Option<&PatchUnit> {
        self.units
            .binary_search_by(|u| u.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.units[i])
    }

    /// Insert or replace the unit for `unit.path`, keeping path order.
    pub fn upsert(&mut self, unit: PatchUnit) {
        match self
            .units
            .binary_search_by(|u| u.path.as_str().cmp(&unit.path))
        {
            Ok(i) => self.units[i] = unit,
            Err(i) => self.units.insert(i, unit),
        }
    }

    /// Remove and return the unit for `path`.
    pub fn remove(&mut self, path: &str) -> Option<PatchUnit> {
        self.units
            .binary_search_by(|u| u.path.as_str().cmp(path))
            .ok()
            .map(|i| self.units.remove(i))
    }

    /// Total number of fragments across all units.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.units.iter().map(|u| u.fragments.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
