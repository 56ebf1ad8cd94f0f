//! Rediff engine: regenerate a fork's patches from its edited output tree.
//!
//! The diff base of a node is always its immediate input tree (the upstream
//! snapshot or the parent fork's output), so rediffing one node never touches
//! another node's patches. For each patch set, every file that is in the
//! input or output subtree, or already has a unit, is classified:
//!
//! | state                                        | result                    |
//! |----------------------------------------------|---------------------------|
//! | unit exists, output differs from input       | last fragment rewritten   |
//! | unit exists, output equals input             | unit removed              |
//! | no unit, output differs from existing input  | new unit                  |
//! | no unit, file only in output                 | untracked addition        |
//!
//! A unit's earlier fragments are replayed onto the input first; only the last
//! fragment is rewritten, as the diff from that replayed text to the output.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::instrument;

use crate::apply::{TextError, read_text, unit_target};
use crate::chain::ResolvedChain;
use crate::diff::{DEFAULT_CONTEXT, apply_file_diff, diff_texts};
use crate::error::{ForkError, Result, io_at};
use crate::lock::NodeLock;
use crate::model::fork::ForkNode;
use crate::model::patch::{FragmentMeta, PatchFragment, PatchSet, PatchSetKind, PatchSetSpec, PatchUnit};
use crate::model::types::{ForkName, SetLabel};
use crate::patchfile;
use crate::snapshot::SnapshotProvider;
use crate::stamp::{self, StampStatus};
use crate::tree;

/// Knobs for [`rediff_node`].
#[derive(Clone, Debug)]
pub struct RediffOptions {
    /// Turn untracked additions into new units instead of reporting them.
    pub track_additions: bool,
    /// Compute the report without writing patch files.
    pub dry_run: bool,
    /// Metadata for rewritten and new fragments. Existing fragments keep
    /// their metadata when `None`; new ones get placeholder metadata.
    pub metadata: Option<FragmentMeta>,
    /// Context lines around each hunk.
    pub context_lines: usize,
}

impl Default for RediffOptions {
    fn default() -> Self {
        Self {
            track_additions: false,
            dry_run: false,
            metadata: None,
            context_lines: DEFAULT_CONTEXT,
        }
    }
}

/// What happened to one file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RediffOutcome {
    /// The unit's last fragment was rewritten, or dropped because the earlier
    /// fragments already produce the output.
    Updated {
        /// `true` if the last fragment was removed rather than rewritten.
        fragment_dropped: bool,
    },
    /// A new unit was created.
    Added {
        /// `true` if the fragment carries placeholder metadata.
        needs_metadata: bool,
    },
    /// The output equals the input again; the unit was deleted.
    Removed,
    /// A file exists only in the output and nobody tracks it.
    UntrackedAddition,
}

/// One reported file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RediffEntry {
    /// Unit path, relative to the patch set root.
    pub path: String,
    /// What happened.
    #[serde(flatten)]
    pub outcome: RediffOutcome,
}

/// Results for one patch set.
#[derive(Clone, Debug, Serialize)]
pub struct SetRediff {
    /// Patch set label.
    pub label: SetLabel,
    /// Changed, added, removed and untracked files, by path.
    pub entries: Vec<RediffEntry>,
    /// Units whose patch text did not change.
    pub unchanged: usize,
}

/// What [`rediff_node`] found (and, unless dry-run, wrote).
#[derive(Clone, Debug, Serialize)]
pub struct RediffReport {
    /// The rediffed fork.
    pub fork: ForkName,
    /// Whether patch files were left untouched.
    pub dry_run: bool,
    /// Per patch set results, in configured order.
    pub patch_sets: Vec<SetRediff>,
}

impl RediffReport {
    /// All entries with their set label.
    pub fn entries(&self) -> impl Iterator<Item = (&SetLabel, &RediffEntry)> {
        self.patch_sets
            .iter()
            .flat_map(|s| s.entries.iter().map(move |e| (&s.label, e)))
    }

    /// Returns `true` if any patch file changed (or would change).
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.entries()
            .any(|(_, e)| e.outcome != RediffOutcome::UntrackedAddition)
    }

    /// Paths reported as untracked additions, per set.
    #[must_use]
    pub fn untracked(&self) -> Vec<(&SetLabel, Vec<String>)> {
        self.patch_sets
            .iter()
            .map(|s| {
                let paths = s
                    .entries
                    .iter()
                    .filter(|e| e.outcome == RediffOutcome::UntrackedAddition)
                    .map(|e| e.path.clone())
                    .collect::<Vec<_>>();
                (&s.label, paths)
            })
            .filter(|(_, paths)| !paths.is_empty())
            .collect()
    }

    /// Turn untracked additions into an error.
    ///
    /// # Errors
    /// Returns [`ForkError::UntrackedAddition`] for the first set with any.
    pub fn ensure_no_untracked(&self) -> Result<()> {
        match self.untracked().into_iter().next() {
            Some((label, paths)) => Err(ForkError::UntrackedAddition {
                fork: self.fork.clone(),
                patch_set: label.clone(),
                paths,
            }),
            None => Ok(()),
        }
    }
}

/// Rediff `fork`, which must be part of `chain`.
///
/// # Errors
/// - [`ForkError::UnknownFork`] if `fork` is not in `chain`.
/// - [`ForkError::NotMaterialized`] if the fork's output or its input tree
///   is missing.
/// - [`ForkError::PatchApplyFailure`] if a unit's earlier fragments no longer
///   apply to the input.
/// - [`ForkError::BinaryFile`] for changed files that are not UTF-8.
/// - [`ForkError::Io`] and [`ForkError::PatchParse`] as usual.
#[instrument(skip_all, fields(fork = %fork, dry_run = options.dry_run))]
pub fn rediff_node(
    chain: &ResolvedChain,
    fork: &ForkName,
    snapshots: &dyn SnapshotProvider,
    state_dir: &Path,
    options: &RediffOptions,
) -> Result<RediffReport> {
    let position = chain.position(fork).ok_or_else(|| ForkError::UnknownFork {
        name: fork.to_string(),
    })?;
    let node = &chain.nodes[position];
    let input = match position.checked_sub(1) {
        None => snapshots.checkout(&chain.upstream)?,
        Some(parent) => {
            let parent = &chain.nodes[parent];
            if !parent.output_dir.is_dir() {
                return Err(ForkError::NotMaterialized {
                    fork: parent.name.clone(),
                });
            }
            parent.output_dir.clone()
        }
    };
    if !node.output_dir.is_dir() {
        return Err(ForkError::NotMaterialized {
            fork: node.name.clone(),
        });
    }

    let _lock = NodeLock::acquire(state_dir, &node.name)?;

    let mut patch_sets = Vec::with_capacity(node.patch_sets.len());
    for spec in &node.patch_sets {
        let mut set = patchfile::load_patch_set(spec)?;
        let summary = rediff_set(node, &mut set, &input, options)?;
        if !options.dry_run && summary.entries.iter().any(|e| e.outcome != RediffOutcome::UntrackedAddition) {
            let stored = patchfile::store_patch_set(&set)?;
            tracing::info!(
                set = %spec.label,
                written = stored.written.len(),
                deleted = stored.deleted.len(),
                "patch files updated"
            );
        }
        patch_sets.push(summary);
    }

    let report = RediffReport {
        fork: node.name.clone(),
        dry_run: options.dry_run,
        patch_sets,
    };

    if !options.dry_run && report.has_changes() {
        refresh_stamp(chain, position, state_dir)?;
    }
    for (label, paths) in report.untracked() {
        tracing::warn!(set = %label, count = paths.len(), "untracked additions left out of the patches");
    }
    Ok(report)
}

/// After a rediff the output tree is exactly what the new patches produce;
/// re-fingerprint it so drift does not flag the node's own patches.
fn refresh_stamp(chain: &ResolvedChain, position: usize, state_dir: &Path) -> Result<()> {
    let node = &chain.nodes[position];
    let Some(old) = stamp::read_stamp(state_dir, &node.name)? else {
        return Ok(());
    };
    if old.status != StampStatus::Complete || old.revision != chain.upstream.revision {
        return Ok(());
    }
    let fingerprints = stamp::chain_fingerprints(&chain.upstream, &chain.nodes[..=position])?;
    let Some(current) = fingerprints.last() else {
        return Ok(());
    };
    // Same patches on disk: keep the stamp so descendants stay fresh.
    if current.patches == old.patches_fingerprint {
        return Ok(());
    }
    let mut fresh = current.stamp(node, &chain.upstream, StampStatus::Complete);
    // The tree was still built on whatever parent it was built on.
    fresh.parent_fingerprint = old.parent_fingerprint;
    stamp::write_stamp(state_dir, &fresh)
}

fn rediff_set(
    node: &ForkNode,
    set: &mut PatchSet,
    input: &Path,
    options: &RediffOptions,
) -> Result<SetRediff> {
    let spec = set.spec.clone();
    let base_root = input.join(&spec.upstream_path);
    let out_root = node.output_dir.join(&spec.output_path);

    let paths: BTreeSet<String> = match spec.kind {
        PatchSetKind::File => BTreeSet::from([spec.file_unit_path()]),
        PatchSetKind::Dir => {
            let mut paths = tree::list_included(&base_root, &spec.excludes)?;
            paths.extend(tree::list_included(&out_root, &spec.excludes)?);
            paths.extend(
                set.units
                    .iter()
                    .map(|u| u.path.clone())
                    .filter(|p| !spec.excludes.is_excluded(p)),
            );
            paths
        }
    };

    let mut summary = SetRediff {
        label: spec.label.clone(),
        entries: Vec::new(),
        unchanged: 0,
    };

    for path in paths {
        let base_file = unit_target(&spec, &base_root, &path);
        let out_file = unit_target(&spec, &out_root, &path);
        let had_unit = set.unit(&path).is_some();

        // Byte-identical files without a unit need no further work.
        if !had_unit && same_bytes(&base_file, &out_file)? {
            continue;
        }
        // Untracked additions are reported without reading them, binary or not.
        if !had_unit && !options.track_additions && !base_file.exists() && out_file.is_file() {
            summary.entries.push(RediffEntry {
                path,
                outcome: RediffOutcome::UntrackedAddition,
            });
            continue;
        }

        let read = |file: &Path| {
            read_text(file).map_err(|e| match e {
                TextError::Binary => ForkError::BinaryFile {
                    fork: node.name.clone(),
                    patch_set: spec.label.clone(),
                    path: path.clone(),
                },
                TextError::Io(source) => ForkError::Io {
                    path: file.to_path_buf(),
                    source,
                },
            })
        };
        let base = read(&base_file)?;
        let current = read(&out_file)?;

        let outcome = match set.remove(&path) {
            Some(unit) => rediff_unit(node, &spec, unit, base, current, options, set)?,
            None => new_unit(base, current, &path, options, set),
        };
        match outcome {
            Some(outcome) => {
                tracing::debug!(set = %spec.label, path = %path, ?outcome, "rediffed");
                summary.entries.push(RediffEntry { path, outcome });
            }
            None if had_unit => summary.unchanged += 1,
            None => {}
        }
    }
    Ok(summary)
}

/// Rediff a tracked file. The unit is re-inserted into `set` unless removed.
fn rediff_unit(
    node: &ForkNode,
    spec: &PatchSetSpec,
    mut unit: PatchUnit,
    base: Option<String>,
    current: Option<String>,
    options: &RediffOptions,
    set: &mut PatchSet,
) -> Result<Option<RediffOutcome>> {
    if base == current {
        return Ok(Some(RediffOutcome::Removed));
    }

    let Some(last) = unit.fragments.pop() else {
        // A unit without fragments is dropped like an emptied one.
        return Ok(Some(RediffOutcome::Removed));
    };

    let mut prior = base;
    for (index, fragment) in unit.fragments.iter().enumerate() {
        prior = apply_file_diff(prior.as_deref(), &fragment.diff).map_err(|reason| {
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

    if prior == current {
        set.upsert(unit);
        return Ok(Some(RediffOutcome::Updated {
            fragment_dropped: true,
        }));
    }

    // `prior != current`, so the diff is never empty.
    let Some(diff) = diff_texts(
        &unit.path,
        prior.as_deref(),
        current.as_deref(),
        options.context_lines,
    ) else {
        set.upsert(unit);
        return Ok(Some(RediffOutcome::Updated {
            fragment_dropped: true,
        }));
    };

    let outcome = if diff == last.diff && options.metadata.is_none() {
        None
    } else {
        Some(RediffOutcome::Updated {
            fragment_dropped: false,
        })
    };
    let meta = options.metadata.clone().unwrap_or(last.meta);
    unit.fragments.push(PatchFragment { meta, diff });
    set.upsert(unit);
    Ok(outcome)
}

/// Handle a changed file that has no unit yet.
fn new_unit(
    base: Option<String>,
    current: Option<String>,
    path: &str,
    options: &RediffOptions,
    set: &mut PatchSet,
) -> Option<RediffOutcome> {
    if base.is_none() && current.is_some() && !options.track_additions {
        return Some(RediffOutcome::UntrackedAddition);
    }
    let diff = diff_texts(path, base.as_deref(), current.as_deref(), options.context_lines)?;
    let needs_metadata = options.metadata.is_none();
    let meta = options
        .metadata
        .clone()
        .unwrap_or_else(|| FragmentMeta::placeholder(path));
    set.upsert(PatchUnit::single(PatchFragment { meta, diff }));
    Some(RediffOutcome::Added { needs_metadata })
}

fn same_bytes(a: &Path, b: &Path) -> Result<bool> {
    let read = |p: &Path| match fs::read(p) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_at(p)(e)),
    };
    Ok(read(a)? == read(b)?)
}
