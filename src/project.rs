//! Project facade: configuration plus the engine operations.
//!
//! [`Project`] is what the CLI talks to. It loads `forkstack.toml`, resolves
//! chains on demand and runs apply, rediff, drift and manifest against the
//! configured state directory and snapshot provider.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::instrument;

use crate::apply::{ApplyOptions, ApplyReport, apply_chain};
use crate::chain::{ResolvedChain, resolve_chain};
use crate::config::{ConfigError, ProjectConfig, ProjectLayout};
use crate::drift::{DriftReport, check_drift};
use crate::error::{ForkError, Result, io_at};
use crate::manifest::{BuildInfo, BuildManifest};
use crate::model::types::{ForkName, UpstreamName};
use crate::rediff::{RediffOptions, RediffReport, rediff_node};
use crate::snapshot::{DirectorySnapshots, SnapshotProvider};

/// A loaded fork project.
pub struct Project {
    layout: ProjectLayout,
    snapshots: Box<dyn SnapshotProvider>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("base_dir", &self.layout.base_dir)
            .field("forks", &self.layout.nodes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Load and validate the project described by `config_path`.
    ///
    /// Relative paths in the file are resolved against its directory.
    ///
    /// # Errors
    /// Returns [`ForkError::Config`] or [`ForkError::OutputPathConflict`] for
    /// an invalid configuration.
    pub fn open(config_path: &Path) -> Result<Self> {
        let config_path = std::path::absolute(config_path).map_err(io_at(config_path))?;
        let config = ProjectConfig::load(&config_path)?;
        let base_dir = config_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let layout = config.resolve(&base_dir).map_err(|e| match e {
            ForkError::Config { detail, .. } => ForkError::Config {
                path: config_path.clone(),
                detail,
            },
            other => other,
        })?;
        tracing::debug!(
            config = %config_path.display(),
            forks = layout.nodes.len(),
            upstreams = layout.upstreams.len(),
            "project loaded"
        );
        Ok(Self::from_layout(layout))
    }

    /// Wrap an already resolved layout, serving snapshots from its
    /// snapshot root.
    #[must_use]
    pub fn from_layout(layout: ProjectLayout) -> Self {
        let snapshots = layout.snapshot_paths.iter().fold(
            DirectorySnapshots::new(&layout.snapshot_root),
            |snaps, (name, path)| snaps.with_override(name.clone(), path),
        );
        Self {
            layout,
            snapshots: Box::new(snapshots),
        }
    }

    /// Replace the snapshot provider.
    #[must_use]
    pub fn with_snapshots(mut self, snapshots: Box<dyn SnapshotProvider>) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// The validated configuration.
    #[must_use]
    pub const fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Apply options seeded from `[apply]`.
    #[must_use]
    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            parallel: self.layout.apply.parallel,
            ..ApplyOptions::default()
        }
    }

    /// Rediff options seeded from `[apply]`.
    #[must_use]
    pub fn rediff_options(&self) -> RediffOptions {
        RediffOptions {
            context_lines: self.layout.apply.context_lines,
            ..RediffOptions::default()
        }
    }

    /// Resolve the chain ending at `fork` (or the default leaf).
    ///
    /// # Errors
    /// See [`resolve_chain`] and [`ProjectLayout::leaf`].
    pub fn chain(&self, fork: Option<&str>) -> Result<ResolvedChain> {
        let leaf = self.layout.leaf(fork)?;
        resolve_chain(&self.layout.nodes, &self.layout.upstreams, &leaf)
    }

    /// Materialize the chain ending at `fork`.
    ///
    /// # Errors
    /// See [`apply_chain`].
    #[instrument(skip_all, fields(fork = fork.unwrap_or("<default>")))]
    pub fn apply(&self, fork: Option<&str>, options: &ApplyOptions) -> Result<ApplyReport> {
        let chain = self.chain(fork)?;
        apply_chain(&chain, self.snapshots.as_ref(), &self.layout.state_dir, options)
    }

    /// Regenerate the patches of `fork` from its output tree.
    ///
    /// # Errors
    /// See [`rediff_node`].
    pub fn rediff(&self, fork: &str, options: &RediffOptions) -> Result<RediffReport> {
        let chain = self.chain(Some(fork))?;
        let leaf = chain.leaf().name.clone();
        rediff_node(&chain, &leaf, self.snapshots.as_ref(), &self.layout.state_dir, options)
    }

    /// Check drift of the chain ending at `fork`, or of every chain (one per
    /// fork nobody forks), optionally only those rooted at `upstream`.
    ///
    /// # Errors
    /// Returns [`ForkError::Config`] for an unknown upstream, and resolution
    /// or I/O errors otherwise.
    pub fn drift(&self, upstream: Option<&str>, fork: Option<&str>) -> Result<Vec<DriftReport>> {
        let upstream = upstream
            .map(|name| {
                UpstreamName::new(name)
                    .ok()
                    .filter(|n| self.layout.upstreams.contains_key(n))
                    .ok_or_else(|| {
                        ForkError::from(ConfigError {
                            path: None,
                            message: format!("upstream '{name}' is not configured"),
                        })
                    })
            })
            .transpose()?;

        let leaves: Vec<ForkName> = match fork {
            Some(name) => vec![self.layout.leaf(Some(name))?],
            None => self
                .layout
                .nodes
                .keys()
                .filter(|name| {
                    !self
                        .layout
                        .nodes
                        .values()
                        .any(|n| n.fork_parent() == Some(*name))
                })
                .cloned()
                .collect(),
        };

        let mut reports = Vec::new();
        for leaf in leaves {
            let chain = resolve_chain(&self.layout.nodes, &self.layout.upstreams, &leaf)?;
            if upstream.as_ref().is_some_and(|u| *u != chain.upstream.name) {
                continue;
            }
            reports.push(check_drift(&chain, &self.layout.state_dir)?);
        }
        Ok(reports)
    }

    /// Describe the materialized leaf of the chain ending at `fork`.
    ///
    /// # Errors
    /// Returns [`ForkError::Config`] without a `[brand]` table and
    /// [`ForkError::NotMaterialized`] if the leaf tree does not exist.
    pub fn manifest(&self, fork: Option<&str>, build: &BuildInfo) -> Result<BuildManifest> {
        let brand = self.layout.brand.as_ref().ok_or_else(|| {
            ForkError::from(ConfigError {
                path: None,
                message: "a [brand] table is required to write a build manifest".to_owned(),
            })
        })?;
        let chain = self.chain(fork)?;
        if !chain.leaf().output_dir.is_dir() {
            return Err(ForkError::NotMaterialized {
                fork: chain.leaf().name.clone(),
            });
        }
        Ok(BuildManifest::new(brand, &chain, build, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree;
    use tempfile::TempDir;

    fn project(tmp: &TempDir) -> Project {
        let root = tmp.path();
        tree::write_file(&root.join("upstream/paper/r1/src/f.txt"), b"A\n").unwrap();
        tree::write_file(
            &root.join("forkstack.toml"),
            br#"
[upstreams.paper]
repo = "PaperMC/Paper"
revision = "r1"

[forks.one]
upstream = "paper"
output_dir = "work/one"
[[forks.one.patch_sets]]
label = "main"
upstream_path = "src"
patches = "patches/one"

[forks.two]
forks = "one"
output_dir = "work/two"

[brand]
name = "Two"
id = "example:two"
version = "1.0"
"#,
        )
        .unwrap();
        Project::open(&root.join("forkstack.toml")).unwrap()
    }

    #[test]
    fn open_resolves_relative_to_config() {
        let tmp = TempDir::new().unwrap();
        let p = project(&tmp);
        let chain = p.chain(None).unwrap();
        assert_eq!(chain.leaf().name.as_str(), "two");
        assert_eq!(chain.nodes[0].output_dir, tmp.path().join("work/one"));
    }

    #[test]
    fn apply_drift_manifest_flow() {
        let tmp = TempDir::new().unwrap();
        let p = project(&tmp);
        assert_eq!(
            p.manifest(None, &BuildInfo::default()).unwrap_err().kind(),
            "not_materialized"
        );
        p.apply(None, &p.apply_options()).unwrap();
        assert!(tmp.path().join("work/two/src/f.txt").is_file());

        let reports = p.drift(None, None).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_fresh());
        assert!(p.drift(Some("paper"), None).unwrap()[0].is_fresh());
        assert_eq!(p.drift(Some("purpur"), None).unwrap_err().kind(), "config");

        let manifest = p
            .manifest(
                None,
                &BuildInfo {
                    commit: "0123456789".to_owned(),
                    ..BuildInfo::default()
                },
            )
            .unwrap();
        assert_eq!(manifest.implementation_version(), "1.0-DEV-0123456");
    }

    #[test]
    fn config_errors_name_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("forkstack.toml");
        tree::write_file(&path, b"[forks.a]\noutput_dir = \"o\"\n").unwrap();
        let err = Project::open(&path).unwrap_err();
        assert!(err.to_string().contains("forkstack.toml"), "{err}");
    }
}
