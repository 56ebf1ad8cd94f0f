//! Drift detection: is each materialized tree still what its inputs produce?
//!
//! Compares the stamp written by the last apply of each node against the
//! configured upstream revision and the current patch files. Nothing is
//! rebuilt; the report says which trees need `forkstack apply`.

use std::path::Path;

use serde::Serialize;

use crate::chain::ResolvedChain;
use crate::error::{ForkError, Result};
use crate::model::types::{ForkName, UpstreamName};
use crate::stamp::{self, StampStatus};

/// Freshness of one materialized tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DriftStatus {
    /// Built from the current revision and patches.
    Fresh,
    /// Built from a different upstream revision.
    Stale,
    /// Never built (or the output directory is gone).
    NeverApplied,
    /// The last apply failed, was cancelled or never finished.
    Incomplete {
        /// Last recorded status (`failed`, `cancelled`, `in_progress`).
        last: String,
    },
    /// The node's own patch files changed since it was built.
    PatchesChanged,
    /// A fork up the chain was rebuilt or changed since this tree was built.
    ParentChanged,
}

impl DriftStatus {
    /// Returns `true` for [`DriftStatus::Fresh`].
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }

    fn describe(&self) -> String {
        match self {
            Self::Fresh => "fresh".to_owned(),
            Self::Stale => "upstream revision changed".to_owned(),
            Self::NeverApplied => "never applied".to_owned(),
            Self::Incomplete { last } => format!("last apply {last}"),
            Self::PatchesChanged => "patches changed since last apply".to_owned(),
            Self::ParentChanged => "parent fork changed since last apply".to_owned(),
        }
    }
}

/// Drift of one fork.
#[derive(Clone, Debug, Serialize)]
pub struct DriftEntry {
    /// The fork.
    pub fork: ForkName,
    /// Freshness.
    #[serde(flatten)]
    pub status: DriftStatus,
    /// Revision recorded at the last apply.
    pub recorded_revision: Option<String>,
    /// Revision currently configured.
    pub configured_revision: String,
}

/// Drift of a whole chain.
#[derive(Clone, Debug, Serialize)]
pub struct DriftReport {
    /// Root upstream.
    pub upstream: UpstreamName,
    /// One entry per node, root first.
    pub entries: Vec<DriftEntry>,
}

impl DriftReport {
    /// Returns `true` if every tree is fresh.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.entries.iter().all(|e| e.status.is_fresh())
    }

    /// Fail on the first tree that is not fresh.
    ///
    /// # Errors
    /// Returns [`ForkError::StaleTree`] naming the fork and why.
    pub fn ensure_fresh(&self) -> Result<()> {
        match self.entries.iter().find(|e| !e.status.is_fresh()) {
            Some(entry) => Err(ForkError::StaleTree {
                fork: entry.fork.clone(),
                upstream: self.upstream.clone(),
                recorded: entry.recorded_revision.clone(),
                configured: entry.configured_revision.clone(),
                detail: entry.status.describe(),
            }),
            None => Ok(()),
        }
    }
}

/// Check every node of `chain` against its stamp.
///
/// # Errors
/// Returns [`ForkError::Io`] if stamps or patch files cannot be read.
pub fn check_drift(chain: &ResolvedChain, state_dir: &Path) -> Result<DriftReport> {
    let expected = stamp::chain_fingerprints(&chain.upstream, &chain.nodes)?;
    let configured = &chain.upstream.revision;

    // Chain fingerprint recorded by the previous node's stamp.
    let mut parent_recorded: Option<String> = None;
    let mut entries = Vec::with_capacity(chain.nodes.len());

    for (node, fingerprint) in chain.nodes.iter().zip(&expected) {
        let stamp = stamp::read_stamp(state_dir, &node.name)?;
        let status = match &stamp {
            None => DriftStatus::NeverApplied,
            Some(_) if !node.output_dir.is_dir() => DriftStatus::NeverApplied,
            Some(s) if s.status != StampStatus::Complete => DriftStatus::Incomplete {
                last: s.status.as_str().to_owned(),
            },
            Some(s) if &s.revision != configured || s.upstream != chain.upstream.name => {
                DriftStatus::Stale
            }
            Some(s) if s.patches_fingerprint != fingerprint.patches => DriftStatus::PatchesChanged,
            Some(s) if s.parent_fingerprint != parent_recorded => DriftStatus::ParentChanged,
            Some(_) => DriftStatus::Fresh,
        };
        tracing::debug!(fork = %node.name, status = %status.describe(), "drift checked");

        parent_recorded = stamp.as_ref().map(|s| s.chain_fingerprint.clone());
        entries.push(DriftEntry {
            fork: node.name.clone(),
            status,
            recorded_revision: stamp.map(|s| s.revision),
            configured_revision: configured.clone(),
        });
    }

    Ok(DriftReport {
        upstream: chain.upstream.name.clone(),
        entries,
    })
}
