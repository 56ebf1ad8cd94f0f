//! Error types for forkstack.
//!
//! Defines [`ForkError`], the unified error type for chain resolution, apply,
//! rediff and drift detection. Every variant carries enough locator
//! information (fork, patch set, path, fragment index) to point a developer at
//! the failing patch text, and its message ends with a short "To fix" hint.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::diff::ApplyError;
use crate::model::types::{ForkName, ParentRef, SetLabel, UpstreamName};

/// Convenience alias used throughout the crate.
pub type Result<T, E = ForkError> = std::result::Result<T, E>;

/// Unified error type for forkstack operations.
#[derive(Debug, Error)]
pub enum ForkError {
    /// A fork is its own transitive ancestor.
    #[error(
        "fork chain contains a cycle: {}\n  To fix: change one `forks = ...` entry so the chain ends at an upstream.",
        join_names(.cycle)
    )]
    CycleDetected {
        /// The cycle, starting and ending at the same fork.
        cycle: Vec<ForkName>,
    },

    /// A fork refers to a parent that is not configured.
    #[error("fork '{fork}' refers to {parent}, which is not configured\n  To fix: define it in forkstack.toml or correct the reference.")]
    UnresolvedParent {
        /// The fork holding the dangling reference.
        fork: ForkName,
        /// The missing parent.
        parent: ParentRef,
    },

    /// The requested fork does not exist.
    #[error("fork '{name}' not found\n  To fix: check the [forks] tables in forkstack.toml.")]
    UnknownFork {
        /// The name that was asked for.
        name: String,
    },

    /// A fragment failed to apply.
    #[error(
        "fork '{fork}', patch set '{patch_set}': fragment #{fragment_index} of '{unit_path}' failed to apply: {reason}\n  patch file: {}\n  To fix: rebase the fragment against the parent tree, or rediff after fixing the output by hand.",
        .patch_file.display()
    )]
    PatchApplyFailure {
        /// Fork being materialized.
        fork: ForkName,
        /// Patch set label.
        patch_set: SetLabel,
        /// Target path of the unit.
        unit_path: String,
        /// 0-based index of the fragment within the unit.
        fragment_index: usize,
        /// The patch file holding the fragment.
        patch_file: PathBuf,
        /// What went wrong.
        reason: ApplyError,
    },

    /// A materialized tree no longer reflects its inputs.
    #[error(
        "fork '{fork}' is stale ({detail}); upstream '{upstream}' is configured at '{configured}'{}\n  To fix: re-run `forkstack apply`.",
        .recorded.as_ref().map(|r| format!(", tree was built from '{r}'")).unwrap_or_default()
    )]
    StaleTree {
        /// The stale fork.
        fork: ForkName,
        /// Root upstream of the fork's chain.
        upstream: UpstreamName,
        /// Revision recorded when the tree was built, if any.
        recorded: Option<String>,
        /// Revision currently configured.
        configured: String,
        /// Why the tree is stale.
        detail: String,
    },

    /// Rediff found files nobody tracks.
    #[error(
        "fork '{fork}', patch set '{patch_set}': {} untracked addition(s): {}\n  To fix: rerun rediff with --track-additions, or delete the files.",
        .paths.len(),
        .paths.join(", ")
    )]
    UntrackedAddition {
        /// Fork being rediffed.
        fork: ForkName,
        /// Patch set label.
        patch_set: SetLabel,
        /// The added paths.
        paths: Vec<String>,
    },

    /// Two patch sets or forks claim overlapping output paths.
    #[error(
        "output path conflict: {first} and {second} both write under {}\n  To fix: give each patch set and fork a distinct output path.",
        .path.display()
    )]
    OutputPathConflict {
        /// First claimant (`fork/set` or `fork`).
        first: String,
        /// Second claimant.
        second: String,
        /// The overlapping path.
        path: PathBuf,
    },

    /// A fork's input tree has not been materialized.
    #[error("fork '{fork}' has not been materialized\n  To fix: run `forkstack apply` first.")]
    NotMaterialized {
        /// The fork whose tree is missing.
        fork: ForkName,
    },

    /// The caller cancelled the operation.
    #[error("cancelled before fork '{fork}', patch set '{patch_set}'")]
    Cancelled {
        /// Fork in progress.
        fork: ForkName,
        /// Patch set that was about to start.
        patch_set: SetLabel,
    },

    /// The configuration file is missing or invalid.
    #[error("invalid configuration in {}: {detail}", .path.display())]
    Config {
        /// Path of the configuration file.
        path: PathBuf,
        /// What is wrong.
        detail: String,
    },

    /// A patch file could not be parsed.
    #[error("malformed patch file {}:{line}: {detail}", .file.display())]
    PatchParse {
        /// The patch file.
        file: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What is wrong.
        detail: String,
    },

    /// A file to diff is not UTF-8 text.
    #[error("fork '{fork}', patch set '{patch_set}': '{path}' is not UTF-8 text and cannot be diffed\n  To fix: exclude it from the patch set.")]
    BinaryFile {
        /// Fork being processed.
        fork: ForkName,
        /// Patch set label.
        patch_set: SetLabel,
        /// Offending path.
        path: String,
    },

    /// The upstream snapshot is unavailable.
    #[error("upstream '{upstream}' snapshot unavailable: {detail}\n  To fix: check out the configured revision into the snapshot root.")]
    Snapshot {
        /// Upstream name.
        upstream: UpstreamName,
        /// What is wrong.
        detail: String,
    },

    /// An I/O error, with the path involved.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
}

impl ForkError {
    /// A stable machine-readable name for the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CycleDetected { .. } => "cycle_detected",
            Self::UnresolvedParent { .. } => "unresolved_parent",
            Self::UnknownFork { .. } => "unknown_fork",
            Self::PatchApplyFailure { .. } => "patch_apply_failure",
            Self::StaleTree { .. } => "stale_tree",
            Self::UntrackedAddition { .. } => "untracked_addition",
            Self::OutputPathConflict { .. } => "output_path_conflict",
            Self::NotMaterialized { .. } => "not_materialized",
            Self::Cancelled { .. } => "cancelled",
            Self::Config { .. } => "config",
            Self::PatchParse { .. } => "patch_parse",
            Self::BinaryFile { .. } => "binary_file",
            Self::Snapshot { .. } => "snapshot",
            Self::Io { .. } => "io",
        }
    }
}

/// Build a `map_err` adapter that attaches `path` to an I/O error.
pub fn io_at(path: &Path) -> impl FnOnce(io::Error) -> ForkError + '_ {
    move |source| ForkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn join_names(names: &[ForkName]) -> String {
    names
        .iter()
        .map(ForkName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
