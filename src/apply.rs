//! Apply engine: materialize fork trees from patches.
//!
//! For each node of a [`ResolvedChain`], root first, the engine wipes the
//! node's output directory, copies each patch set's subtree out of the input
//! tree (the upstream snapshot for the root node, the previous node's output
//! otherwise) minus excluded paths, and applies every unit's fragments in
//! order. The first fragment that does not apply aborts the chain; nodes that
//! already completed keep their trees.
//!
//! Patch sets of one node write disjoint outputs, so they run in parallel on
//! the rayon pool when [`ApplyOptions::parallel`] is set. Fragments of one
//! unit are always applied sequentially.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::instrument;

use crate::chain::ResolvedChain;
use crate::diff::apply_file_diff;
use crate::error::{ForkError, Result, io_at};
use crate::lock::NodeLock;
use crate::model::exclude::ExclusionSet;
use crate::model::fork::ForkNode;
use crate::model::patch::{PatchSet, PatchSetKind, PatchSetSpec, PatchUnit};
use crate::model::types::{ForkName, SetLabel, UpstreamName};
use crate::patchfile;
use crate::snapshot::SnapshotProvider;
use crate::stamp::{self, NodeFingerprint, StampStatus};
use crate::tree;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag, checked before each patch set starts.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Work already in a patch set finishes that set.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`CancelToken::cancel`] was called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs for [`apply_chain`].
#[derive(Clone, Debug)]
pub struct ApplyOptions {
    /// Apply the patch sets of a node in parallel.
    pub parallel: bool,
    /// Cancellation flag.
    pub cancel: CancelToken,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            cancel: CancelToken::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What [`apply_chain`] did.
#[derive(Clone, Debug, Serialize)]
pub struct ApplyReport {
    /// Root upstream.
    pub upstream: UpstreamName,
    /// Upstream revision the chain was built on.
    pub revision: String,
    /// One entry per node, in chain order.
    pub nodes: Vec<NodeReport>,
}

impl ApplyReport {
    /// Total fragments applied across the chain.
    #[must_use]
    pub fn fragments_applied(&self) -> usize {
        self.nodes
            .iter()
            .flat_map(|n| &n.patch_sets)
            .map(|s| s.fragments_applied)
            .sum()
    }
}

/// One materialized node.
#[derive(Clone, Debug, Serialize)]
pub struct NodeReport {
    /// The fork.
    pub fork: ForkName,
    /// Where its tree now lives.
    pub output_dir: PathBuf,
    /// Per patch set counts, in configured order.
    pub patch_sets: Vec<SetReport>,
}

/// One applied patch set.
#[derive(Clone, Debug, Serialize)]
pub struct SetReport {
    /// Patch set label.
    pub label: SetLabel,
    /// Files copied from the input tree.
    pub files_copied: usize,
    /// Units applied.
    pub units: usize,
    /// Fragments applied.
    pub fragments_applied: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Materialize every node of `chain`, root first.
///
/// # Errors
/// - [`ForkError::Snapshot`] if the upstream tree is unavailable.
/// - [`ForkError::PatchParse`] for malformed patch files.
/// - [`ForkError::PatchApplyFailure`] for the first fragment that does not apply.
/// - [`ForkError::Cancelled`] if `options.cancel` fires.
/// - [`ForkError::Io`] on filesystem failures.
#[instrument(skip_all, fields(leaf = %chain.leaf().name, upstream = %chain.upstream.name))]
pub fn apply_chain(
    chain: &ResolvedChain,
    snapshots: &dyn SnapshotProvider,
    state_dir: &Path,
    options: &ApplyOptions,
) -> Result<ApplyReport> {
    let upstream_dir = snapshots.checkout(&chain.upstream)?;
    let fingerprints = stamp::chain_fingerprints(&chain.upstream, &chain.nodes)?;

    tracing::info!(
        nodes = chain.nodes.len(),
        revision = %chain.upstream.revision,
        "applying fork chain"
    );

    let mut reports = Vec::with_capacity(chain.nodes.len());
    let mut input = upstream_dir;
    for (node, fingerprint) in chain.nodes.iter().zip(&fingerprints) {
        let report = apply_node(chain, node, fingerprint, &input, state_dir, options)?;
        input.clone_from(&node.output_dir);
        reports.push(report);
    }

    Ok(ApplyReport {
        upstream: chain.upstream.name.clone(),
        revision: chain.upstream.revision.clone(),
        nodes: reports,
    })
}

#[instrument(skip_all, fields(fork = %node.name))]
fn apply_node(
    chain: &ResolvedChain,
    node: &ForkNode,
    fingerprint: &NodeFingerprint,
    input: &Path,
    state_dir: &Path,
    options: &ApplyOptions,
) -> Result<NodeReport> {
    let _lock = NodeLock::acquire(state_dir, &node.name)?;
    stamp::write_stamp(
        state_dir,
        &fingerprint.stamp(node, &chain.upstream, StampStatus::InProgress),
    )?;

    let result = materialize(node, input, options);

    let status = match &result {
        Ok(_) => StampStatus::Complete,
        Err(ForkError::Cancelled { .. }) => StampStatus::Cancelled,
        Err(e) => StampStatus::Failed {
            locator: e.to_string(),
        },
    };
    stamp::write_stamp(state_dir, &fingerprint.stamp(node, &chain.upstream, status))?;

    match &result {
        Ok(sets) => tracing::info!(
            fragments = sets.iter().map(|s| s.fragments_applied).sum::<usize>(),
            output = %node.output_dir.display(),
            "fork materialized"
        ),
        Err(e) => tracing::warn!(error = %e, "fork apply failed; partial output left for inspection"),
    }

    Ok(NodeReport {
        fork: node.name.clone(),
        output_dir: node.output_dir.clone(),
        patch_sets: result?,
    })
}

fn materialize(node: &ForkNode, input: &Path, options: &ApplyOptions) -> Result<Vec<SetReport>> {
    tree::remove_dir_if_exists(&node.output_dir)?;
    fs::create_dir_all(&node.output_dir).map_err(io_at(&node.output_dir))?;

    // A fork without patch sets passes its input through unchanged.
    if node.patch_sets.is_empty() {
        let files = tree::copy_tree(input, &node.output_dir, &ExclusionSet::empty())?;
        tracing::debug!(fork = %node.name, files, "no patch sets, copied input tree");
        return Ok(Vec::new());
    }

    let run = |spec: &PatchSetSpec| {
        if options.cancel.is_cancelled() {
            return Err(ForkError::Cancelled {
                fork: node.name.clone(),
                patch_set: spec.label.clone(),
            });
        }
        apply_set(node, spec, input)
    };

    if options.parallel && node.patch_sets.len() > 1 {
        // Collect every result, then report the first failure in set order.
        let results: Vec<Result<SetReport>> = node.patch_sets.par_iter().map(run).collect();
        results.into_iter().collect()
    } else {
        node.patch_sets.iter().map(run).collect()
    }
}

fn apply_set(node: &ForkNode, spec: &PatchSetSpec, input: &Path) -> Result<SetReport> {
    let set = patchfile::load_patch_set(spec)?;
    let src = input.join(&spec.upstream_path);
    let dst = node.output_dir.join(&spec.output_path);

    let files_copied = match spec.kind {
        PatchSetKind::Dir => {
            if !src.is_dir() {
                tracing::warn!(set = %spec.label, path = %src.display(), "patch set source missing in input tree");
            }
            tree::copy_tree(&src, &dst, &spec.excludes)?
        }
        PatchSetKind::File => {
            if src.is_file() {
                tree::copy_file(&src, &dst)?;
                1
            } else {
                0
            }
        }
    };

    let mut fragments_applied = 0;
    for unit in &set.units {
        if spec.kind == PatchSetKind::Dir && spec.excludes.is_excluded(&unit.path) {
            tracing::warn!(set = %spec.label, unit = %unit.path, "skipping patch for excluded path");
            continue;
        }
        fragments_applied += apply_unit(node, &set, unit, &dst)?;
    }

    tracing::debug!(
        set = %spec.label,
        files_copied,
        units = set.units.len(),
        fragments_applied,
        "patch set applied"
    );

    Ok(SetReport {
        label: spec.label.clone(),
        files_copied,
        units: set.units.len(),
        fragments_applied,
    })
}

/// Apply one unit's fragments to its target under `root`.
fn apply_unit(node: &ForkNode, set: &PatchSet, unit: &PatchUnit, root: &Path) -> Result<usize> {
    let spec = &set.spec;
    let target = unit_target(spec, root, &unit.path);
    let mut current = read_text(&target).map_err(|e| match e {
        TextError::Binary => ForkError::BinaryFile {
            fork: node.name.clone(),
            patch_set: spec.label.clone(),
            path: unit.path.clone(),
        },
        TextError::Io(source) => ForkError::Io {
            path: target.clone(),
            source,
        },
    })?;

    for (index, fragment) in unit.fragments.iter().enumerate() {
        current = apply_file_diff(current.as_deref(), &fragment.diff).map_err(|reason| {
            ForkError::PatchApplyFailure {
                fork: node.name.clone(),
                patch_set: spec.label.clone(),
                unit_path: unit.path.clone(),
                fragment_index: index,
                patch_file: patchfile::unit_file(spec, &unit.path),
                reason,
            }
        })?;
    }

    match current {
        Some(text) => tree::write_file(&target, text.as_bytes())?,
        None if target.exists() => tree::remove_file_and_empty_parents(root, &target)?,
        None => {}
    }
    Ok(unit.fragments.len())
}

/// On-disk location of a unit's target file under a set's root.
pub(crate) fn unit_target(spec: &PatchSetSpec, root: &Path, unit_path: &str) -> PathBuf {
    match spec.kind {
        PatchSetKind::Dir => root.join(unit_path),
        PatchSetKind::File => root.to_path_buf(),
    }
}

pub(crate) enum TextError {
    Binary,
    Io(std::io::Error),
}

/// Read a file as UTF-8 text; a missing file is `None`.
pub(crate) fn read_text(path: &Path) -> std::result::Result<Option<String>, TextError> {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| TextError::Binary),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TextError::Io(e)),
    }
}
