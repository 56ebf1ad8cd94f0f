//! Data model: names, fork nodes, patch units and sets.

pub mod exclude;
pub mod fork;
pub mod patch;
pub mod types;

pub use exclude::ExclusionSet;
pub use fork::ForkNode;
pub use patch::{FragmentMeta, PatchFragment, PatchSet, PatchSetKind, PatchSetSpec, PatchUnit};
pub use types::{ForkName, ParentRef, SetLabel, UpstreamName, UpstreamRef};
