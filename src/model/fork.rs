//! Fork nodes: one tier of the fork chain.

use std::path::PathBuf;

use super::patch::PatchSetSpec;
use super::types::{ForkName, ParentRef};

/// One tier in the fork chain.
///
/// A node layers its patch sets on top of its parent's tree and materializes
/// the result under `output_dir`, which it exclusively owns.
#[derive(Clone, Debug)]
pub struct ForkNode {
    /// Unique name of this fork.
    pub name: ForkName,
    /// What this fork is layered on.
    pub parent: ParentRef,
    /// Absolute directory the node's tree is materialized into.
    pub output_dir: PathBuf,
    /// Patch sets, applied in this order.
    pub patch_sets: Vec<PatchSetSpec>,
}

impl ForkNode {
    /// The fork this node is a fork of, if it is not a chain root.
    #[must_use]
    pub const fn fork_parent(&self) -> Option<&ForkName> {
        match &self.parent {
            ParentRef::Fork(name) => Some(name),
            ParentRef::Upstream(_) => None,
        }
    }

    /// Returns `true` if this node sits directly on an upstream snapshot.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        matches!(self.parent, ParentRef::Upstream(_))
    }
}
