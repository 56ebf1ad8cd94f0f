//! Fork chain resolution.
//!
//! Given the node table and a leaf fork, [`resolve_chain`] walks parent links
//! up to the root upstream and returns the nodes root-first. Resolution is a
//! pure function of its inputs: the same table and leaf always produce the same
//! chain, and sibling branches never appear in it.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::{ForkError, Result};
use crate::model::fork::ForkNode;
use crate::model::types::{ForkName, ParentRef, UpstreamName, UpstreamRef};

/// A linear, root-first fork chain.
#[derive(Clone, Debug)]
pub struct ResolvedChain {
    /// The upstream snapshot the root node sits on.
    pub upstream: UpstreamRef,
    /// Nodes, root-most first, ending with the requested leaf.
    pub nodes: Vec<ForkNode>,
}

impl ResolvedChain {
    /// The requested leaf node.
    #[must_use]
    pub fn leaf(&self) -> &ForkNode {
        // A chain always holds at least its leaf.
        &self.nodes[self.nodes.len() - 1]
    }

    /// Position of `name` in the chain.
    #[must_use]
    pub fn position(&self, name: &ForkName) -> Option<usize> {
        self.nodes.iter().position(|n| &n.name == name)
    }

    /// The chain up to and including `name`, or `None` if it is not part of it.
    #[must_use]
    pub fn truncated_at(&self, name: &ForkName) -> Option<Self> {
        let end = self.position(name)?;
        Some(Self {
            upstream: self.upstream.clone(),
            nodes: self.nodes[..=end].to_vec(),
        })
    }

    /// Fork names in application order.
    #[must_use]
    pub fn names(&self) -> Vec<&ForkName> {
        self.nodes.iter().map(|n| &n.name).collect()
    }

    /// A serializable summary for `forkstack chain`.
    #[must_use]
    pub fn summary(&self) -> ChainSummary {
        ChainSummary {
            upstream: self.upstream.name.clone(),
            repo: self.upstream.repo.clone(),
            revision: self.upstream.revision.clone(),
            forks: self
                .nodes
                .iter()
                .map(|n| ChainEntry {
                    name: n.name.clone(),
                    output_dir: n.output_dir.display().to_string(),
                    patch_sets: n.patch_sets.iter().map(|s| s.label.to_string()).collect(),
                })
                .collect(),
        }
    }
}

/// Serializable view of a [`ResolvedChain`].
#[derive(Clone, Debug, Serialize)]
pub struct ChainSummary {
    /// Root upstream name.
    pub upstream: UpstreamName,
    /// Root upstream repository.
    pub repo: String,
    /// Root upstream revision.
    pub revision: String,
    /// Forks in application order.
    pub forks: Vec<ChainEntry>,
}

/// One fork in a [`ChainSummary`].
#[derive(Clone, Debug, Serialize)]
pub struct ChainEntry {
    /// Fork name.
    pub name: ForkName,
    /// Output directory.
    pub output_dir: String,
    /// Patch set labels, in order.
    pub patch_sets: Vec<String>,
}

/// Resolve the chain ending at `leaf`.
///
/// # Errors
/// - [`ForkError::UnknownFork`] if `leaf` is not in `nodes`.
/// - [`ForkError::UnresolvedParent`] if some node's parent is missing.
/// - [`ForkError::CycleDetected`] if walking parents revisits a node.
pub fn resolve_chain(
    nodes: &BTreeMap<ForkName, ForkNode>,
    upstreams: &BTreeMap<UpstreamName, UpstreamRef>,
    leaf: &ForkName,
) -> Result<ResolvedChain> {
    let mut current = nodes.get(leaf).ok_or_else(|| ForkError::UnknownFork {
        name: leaf.to_string(),
    })?;

    let mut walk: Vec<&ForkNode> = Vec::new();
    let mut seen: BTreeSet<&ForkName> = BTreeSet::new();

    loop {
        if !seen.insert(&current.name) {
            let start = walk
                .iter()
                .position(|n| n.name == current.name)
                .unwrap_or_default();
            let mut cycle: Vec<ForkName> = walk[start..].iter().map(|n| n.name.clone()).collect();
            cycle.push(current.name.clone());
            return Err(ForkError::CycleDetected { cycle });
        }
        walk.push(current);

        match &current.parent {
            ParentRef::Upstream(name) => {
                let upstream = upstreams.get(name).ok_or_else(|| ForkError::UnresolvedParent {
                    fork: current.name.clone(),
                    parent: current.parent.clone(),
                })?;
                walk.reverse();
                return Ok(ResolvedChain {
                    upstream: upstream.clone(),
                    nodes: walk.into_iter().cloned().collect(),
                });
            }
            ParentRef::Fork(name) => {
                current = nodes.get(name).ok_or_else(|| ForkError::UnresolvedParent {
                    fork: current.name.clone(),
                    parent: current.parent.clone(),
                })?;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fork(name: &str) -> ForkName {
        ForkName::new(name).unwrap()
    }

    fn node(name: &str, parent: ParentRef) -> ForkNode {
        ForkNode {
            name: fork(name),
            parent,
            output_dir: PathBuf::from(format!("/work/{name}")),
            patch_sets: Vec::new(),
        }
    }

    fn upstreams() -> BTreeMap<UpstreamName, UpstreamRef> {
        let name = UpstreamName::new("paper").unwrap();
        BTreeMap::from([(
            name.clone(),
            UpstreamRef::new(name, "PaperMC/Paper".to_owned(), "abc123".to_owned()),
        )])
    }

    fn table(nodes: Vec<ForkNode>) -> BTreeMap<ForkName, ForkNode> {
        nodes.into_iter().map(|n| (n.name.clone(), n)).collect()
    }

    fn up() -> ParentRef {
        ParentRef::Upstream(UpstreamName::new("paper").unwrap())
    }

    #[test]
    fn three_tier_chain_is_root_first() {
        let nodes = table(vec![
            node("nycticorax", ParentRef::Fork(fork("sapling"))),
            node("leaf", up()),
            node("sapling", ParentRef::Fork(fork("leaf"))),
        ]);
        let chain = resolve_chain(&nodes, &upstreams(), &fork("nycticorax")).unwrap();
        let names: Vec<&str> = chain.names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["leaf", "sapling", "nycticorax"]);
        assert_eq!(chain.upstream.revision, "abc123");
        assert_eq!(chain.leaf().name.as_str(), "nycticorax");
    }

    #[test]
    fn siblings_are_excluded() {
        let nodes = table(vec![
            node("root", up()),
            node("left", ParentRef::Fork(fork("root"))),
            node("right", ParentRef::Fork(fork("root"))),
        ]);
        let chain = resolve_chain(&nodes, &upstreams(), &fork("right")).unwrap();
        let names: Vec<&str> = chain.names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["root", "right"]);
    }

    #[test]
    fn cycle_is_detected_with_path() {
        let nodes = table(vec![
            node("a", ParentRef::Fork(fork("b"))),
            node("b", ParentRef::Fork(fork("c"))),
            node("c", ParentRef::Fork(fork("b"))),
        ]);
        let err = resolve_chain(&nodes, &upstreams(), &fork("a")).unwrap_err();
        match err {
            ForkError::CycleDetected { cycle } => {
                let names: Vec<&str> = cycle.iter().map(ForkName::as_str).collect();
                assert_eq!(names, vec!["b", "c", "b"]);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let nodes = table(vec![node("a", ParentRef::Fork(fork("a")))]);
        let err = resolve_chain(&nodes, &upstreams(), &fork("a")).unwrap_err();
        assert_eq!(err.kind(), "cycle_detected");
    }

    #[test]
    fn missing_fork_parent_is_unresolved() {
        let nodes = table(vec![node("a", ParentRef::Fork(fork("ghost")))]);
        let err = resolve_chain(&nodes, &upstreams(), &fork("a")).unwrap_err();
        match err {
            ForkError::UnresolvedParent { fork: f, parent } => {
                assert_eq!(f.as_str(), "a");
                assert_eq!(parent, ParentRef::Fork(fork("ghost")));
            }
            other => panic!("expected unresolved parent, got {other}"),
        }
    }

    #[test]
    fn missing_upstream_is_unresolved() {
        let nodes = table(vec![node(
            "a",
            ParentRef::Upstream(UpstreamName::new("purpur").unwrap()),
        )]);
        let err = resolve_chain(&nodes, &upstreams(), &fork("a")).unwrap_err();
        assert_eq!(err.kind(), "unresolved_parent");
    }

    #[test]
    fn unknown_leaf() {
        let err = resolve_chain(&BTreeMap::new(), &upstreams(), &fork("nope")).unwrap_err();
        assert_eq!(err.kind(), "unknown_fork");
    }

    #[test]
    fn truncated_at_stops_at_node() {
        let nodes = table(vec![
            node("a", up()),
            node("b", ParentRef::Fork(fork("a"))),
            node("c", ParentRef::Fork(fork("b"))),
        ]);
        let chain = resolve_chain(&nodes, &upstreams(), &fork("c")).unwrap();
        let sub = chain.truncated_at(&fork("b")).unwrap();
        assert_eq!(sub.nodes.len(), 2);
        assert!(chain.truncated_at(&fork("zzz")).is_none());
    }
}
