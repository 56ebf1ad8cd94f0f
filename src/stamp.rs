//! Build stamps: what each materialized tree was built from.
//!
//! Every apply writes `<state_dir>/stamps/<fork>.json` twice: once as
//! `in_progress` before the output directory is touched, and once with the
//! final status. Drift detection compares these records against the current
//! configuration and patch files.
//!
//! Fingerprints are lowercase SHA-256 hex digests. A node's patches
//! fingerprint covers its patch set configuration and the raw bytes of every
//! patch file; its chain fingerprint folds in the parent's chain fingerprint
//! (or the upstream revision for a root node), so a change anywhere up the
//! chain changes every descendant's chain fingerprint.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ForkError, Result, io_at};
use crate::model::fork::ForkNode;
use crate::model::patch::PatchSetKind;
use crate::model::types::{ForkName, UpstreamName, UpstreamRef};
use crate::patchfile::PATCH_EXTENSION;
use crate::tree;

/// Outcome of the last apply of a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StampStatus {
    /// Apply started and has not finished (or the process died).
    InProgress,
    /// The tree is complete.
    Complete,
    /// A fragment failed to apply.
    Failed {
        /// The error message, including its locator.
        locator: String,
    },
    /// The apply was cancelled before finishing.
    Cancelled,
}

impl StampStatus {
    /// Short name used in reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Persistent record of one node's last apply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    /// The fork.
    pub fork: ForkName,
    /// Root upstream of the chain it was built in.
    pub upstream: UpstreamName,
    /// Upstream revision at build time.
    pub revision: String,
    /// Fingerprint of the node's own patch sets.
    pub patches_fingerprint: String,
    /// Fingerprint of everything the tree depends on.
    pub chain_fingerprint: String,
    /// Chain fingerprint of the parent tree it was built on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_fingerprint: Option<String>,
    /// Result of the apply.
    pub status: StampStatus,
    /// When the stamp was written.
    pub timestamp: DateTime<Utc>,
}

/// Expected fingerprints of a node, computed from current inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeFingerprint {
    /// See [`Stamp::patches_fingerprint`].
    pub patches: String,
    /// See [`Stamp::chain_fingerprint`].
    pub chain: String,
    /// The parent's chain fingerprint, for non-root nodes.
    pub parent: Option<String>,
}

impl NodeFingerprint {
    /// Build a stamp for `node` with the given status.
    #[must_use]
    pub fn stamp(&self, node: &ForkNode, upstream: &UpstreamRef, status: StampStatus) -> Stamp {
        Stamp {
            fork: node.name.clone(),
            upstream: upstream.name.clone(),
            revision: upstream.revision.clone(),
            patches_fingerprint: self.patches.clone(),
            chain_fingerprint: self.chain.clone(),
            parent_fingerprint: self.parent.clone(),
            status,
            timestamp: Utc::now(),
        }
    }
}

/// Path of the stamp for `fork`.
#[must_use]
pub fn stamp_path(state_dir: &Path, fork: &ForkName) -> PathBuf {
    state_dir.join("stamps").join(format!("{fork}.json"))
}

/// Read the stamp for `fork`, if one was ever written.
///
/// # Errors
/// Returns [`ForkError::Io`] on read failures and [`ForkError::Config`] if the
/// stamp is not valid JSON.
pub fn read_stamp(state_dir: &Path, fork: &ForkName) -> Result<Option<Stamp>> {
    let path = stamp_path(state_dir, fork);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_at(&path)(e)),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| ForkError::Config {
            path,
            detail: format!("corrupt stamp ({e}); delete it and re-run `forkstack apply`"),
        })
}

/// Write the stamp atomically.
///
/// # Errors
/// Returns [`ForkError::Io`] on failure.
pub fn write_stamp(state_dir: &Path, stamp: &Stamp) -> Result<()> {
    let path = stamp_path(state_dir, &stamp.fork);
    let mut json = serde_json::to_string_pretty(stamp).map_err(|e| ForkError::Io {
        path: path.clone(),
        source: std::io::Error::other(e),
    })?;
    json.push('\n');
    tree::write_atomic(&path, json.as_bytes())
}

/// Fingerprint a node's patch sets from disk.
///
/// # Errors
/// Returns [`ForkError::Io`] if a patch file cannot be read.
pub fn patches_fingerprint(node: &ForkNode) -> Result<String> {
    let mut hasher = Sha256::new();
    for set in &node.patch_sets {
        hasher.update(b"set\n");
        hasher.update(set.label.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(if set.kind == PatchSetKind::File { b"file\n" as &[u8] } else { b"dir\n" });
        hasher.update(tree::rel_to_slash(&set.upstream_path).as_bytes());
        hasher.update(b"\n");
        hasher.update(tree::rel_to_slash(&set.output_path).as_bytes());
        hasher.update(b"\n");
        for exclude in set.excludes.entries() {
            hasher.update(b"exclude:");
            hasher.update(exclude.as_bytes());
            hasher.update(b"\n");
        }
        match set.kind {
            PatchSetKind::File => {
                if set.patches.is_file() {
                    hasher.update(fs::read(&set.patches).map_err(io_at(&set.patches))?);
                }
            }
            PatchSetKind::Dir => {
                // Hash exactly the files load_patch_set reads.
                for rel in tree::list_files(&set.patches)? {
                    if !rel.extension().is_some_and(|e| e == PATCH_EXTENSION) {
                        continue;
                    }
                    let file = set.patches.join(&rel);
                    hasher.update(tree::rel_to_slash(&rel).as_bytes());
                    hasher.update(b"\0");
                    hasher.update(fs::read(&file).map_err(io_at(&file))?);
                    hasher.update(b"\0");
                }
            }
        }
    }
    Ok(to_hex(&hasher.finalize()))
}

/// Fold a node's patches fingerprint onto its base: the parent's chain
/// fingerprint, or the upstream identity for a root node.
#[must_use]
pub fn chain_fingerprint(base: &str, patches: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    hasher.update(b"\n");
    hasher.update(patches.as_bytes());
    hasher.update(b"\n");
    to_hex(&hasher.finalize())
}

/// The chain base of a root node.
#[must_use]
pub fn upstream_base(upstream: &UpstreamRef) -> String {
    format!("{}@{}:{}", upstream.repo, upstream.name, upstream.revision)
}

/// Compute the expected fingerprints of every node in a chain, root first.
///
/// # Errors
/// Returns [`ForkError::Io`] if a patch file cannot be read.
pub fn chain_fingerprints(upstream: &UpstreamRef, nodes: &[ForkNode]) -> Result<Vec<NodeFingerprint>> {
    let mut out: Vec<NodeFingerprint> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let patches = patches_fingerprint(node)?;
        let parent = out.last().map(|p| p.chain.clone());
        let base = parent.clone().unwrap_or_else(|| upstream_base(upstream));
        out.push(NodeFingerprint {
            chain: chain_fingerprint(&base, &patches),
            patches,
            parent,
        });
    }
    Ok(out)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(hex, "{b:02x}");
    }
    hex
}
