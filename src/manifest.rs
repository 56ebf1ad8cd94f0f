//! Build identity handed to the packaging step.
//!
//! Once the leaf tree is materialized, the packaging pipeline needs to know
//! what it is packaging. [`BuildManifest`] records the brand, the upstream
//! revision the chain was built on, and the build's own identity, and renders
//! the attributes the packager stamps into the JAR manifest.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::ResolvedChain;
use crate::config::BrandConfig;
use crate::error::{ForkError, Result};
use crate::model::types::{ForkName, UpstreamName};
use crate::tree;

/// File name of the manifest written into the leaf output directory.
pub const MANIFEST_FILE_NAME: &str = "forkstack-manifest.json";

/// Length of the abbreviated commit hash.
pub const SHORT_COMMIT_LEN: usize = 7;

/// Version segment used when there is no CI build number.
pub const DEV_BUILD: &str = "DEV";

/// Inputs describing the build itself, as opposed to the fork chain.
#[derive(Clone, Debug, Default)]
pub struct BuildInfo {
    /// CI build number, if any.
    pub build_number: Option<u64>,
    /// Commit hash of the project repository (abbreviated on use).
    pub commit: String,
    /// Branch name, if known.
    pub branch: Option<String>,
    /// Commit date, if known.
    pub commit_date: Option<String>,
}

/// Build identity of a packaged leaf tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Product name.
    pub brand_name: String,
    /// Product id.
    pub brand_id: String,
    /// Vendor, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Product version.
    pub version: String,
    /// Root upstream of the chain.
    pub upstream: UpstreamName,
    /// Upstream repository.
    pub upstream_repo: String,
    /// Upstream revision the chain was built on.
    pub upstream_revision: String,
    /// Fork chain, root first.
    pub forks: Vec<ForkName>,
    /// CI build number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<u64>,
    /// Abbreviated commit hash.
    pub commit: String,
    /// Branch name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Commit date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_date: Option<String>,
    /// When the manifest was produced.
    pub build_time: DateTime<Utc>,
    /// The leaf tree being packaged.
    pub tree: PathBuf,
}

impl BuildManifest {
    /// Describe the leaf of `chain`.
    #[must_use]
    pub fn new(brand: &BrandConfig, chain: &ResolvedChain, build: &BuildInfo, build_time: DateTime<Utc>) -> Self {
        Self {
            brand_name: brand.name.clone(),
            brand_id: brand.id.clone(),
            vendor: brand.vendor.clone(),
            version: brand.version.clone(),
            upstream: chain.upstream.name.clone(),
            upstream_repo: chain.upstream.repo.clone(),
            upstream_revision: chain.upstream.revision.clone(),
            forks: chain.nodes.iter().map(|n| n.name.clone()).collect(),
            build_number: build.build_number,
            commit: short_commit(&build.commit),
            branch: build.branch.clone(),
            commit_date: build.commit_date.clone(),
            build_time,
            tree: chain.leaf().output_dir.clone(),
        }
    }

    /// `<version>-<build number or DEV>-<short commit>`.
    #[must_use]
    pub fn implementation_version(&self) -> String {
        let build = self
            .build_number
            .map_or_else(|| DEV_BUILD.to_owned(), |n| n.to_string());
        format!("{}-{build}-{}", self.version, self.commit)
    }

    /// JAR manifest attributes, in the order the packager writes them.
    #[must_use]
    pub fn jar_attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![
            ("Implementation-Title", self.brand_name.clone()),
            ("Implementation-Version", self.implementation_version()),
        ];
        if let Some(vendor) = self.commit_date.as_ref().or(self.vendor.as_ref()) {
            attrs.push(("Implementation-Vendor", vendor.clone()));
        }
        attrs.push(("Specification-Title", self.brand_name.clone()));
        attrs.push(("Specification-Version", self.version.clone()));
        if let Some(vendor) = &self.vendor {
            attrs.push(("Specification-Vendor", vendor.clone()));
        }
        attrs.push(("Brand-Id", self.brand_id.clone()));
        attrs.push(("Brand-Name", self.brand_name.clone()));
        attrs.push((
            "Build-Number",
            self.build_number.map(|n| n.to_string()).unwrap_or_default(),
        ));
        attrs.push((
            "Build-Time",
            self.build_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        ));
        if let Some(branch) = &self.branch {
            attrs.push(("Git-Branch", branch.clone()));
        }
        attrs.push(("Git-Commit", self.commit.clone()));
        attrs
    }

    /// Render `jar_attributes` as `Name: value` lines.
    #[must_use]
    pub fn render_attributes(&self) -> String {
        self.jar_attributes()
            .into_iter()
            .map(|(k, v)| format!("{k}: {v}\n"))
            .collect()
    }

    /// Write the manifest as pretty JSON.
    ///
    /// # Errors
    /// Returns [`ForkError::Io`] on failure.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self).map_err(|e| ForkError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        json.push('\n');
        tree::write_atomic(path, json.as_bytes())
    }

    /// Default location: inside the leaf tree.
    #[must_use]
    pub fn default_path(&self) -> PathBuf {
        self.tree.join(MANIFEST_FILE_NAME)
    }
}

fn short_commit(commit: &str) -> String {
    commit.trim().chars().take(SHORT_COMMIT_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fork::ForkNode;
    use crate::model::types::{ParentRef, UpstreamRef};

    fn chain() -> ResolvedChain {
        let upstream = UpstreamRef::new(
            UpstreamName::new("leaf").unwrap(),
            "Winds-Studio/Leaf".to_owned(),
            "4f1c2d9".to_owned(),
        );
        ResolvedChain {
            nodes: vec![ForkNode {
                name: ForkName::new("nycticorax").unwrap(),
                parent: ParentRef::Upstream(upstream.name.clone()),
                output_dir: PathBuf::from("/work/nycticorax"),
                patch_sets: Vec::new(),
            }],
            upstream,
        }
    }

    fn brand() -> BrandConfig {
        BrandConfig {
            name: "Nycticorax".to_owned(),
            id: "winds-studio:nycticorax".to_owned(),
            vendor: Some("Winds Studio".to_owned()),
            version: "1.21.8".to_owned(),
        }
    }

    fn build_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn dev_build_version() {
        let m = BuildManifest::new(
            &brand(),
            &chain(),
            &BuildInfo {
                commit: "abcdef0123456789".to_owned(),
                ..BuildInfo::default()
            },
            build_time(),
        );
        assert_eq!(m.commit, "abcdef0");
        assert_eq!(m.implementation_version(), "1.21.8-DEV-abcdef0");
    }

    #[test]
    fn ci_build_attributes() {
        let m = BuildManifest::new(
            &brand(),
            &chain(),
            &BuildInfo {
                build_number: Some(42),
                commit: "abcdef0".to_owned(),
                branch: Some("ver/1.21.8".to_owned()),
                commit_date: None,
            },
            build_time(),
        );
        let attrs = m.render_attributes();
        assert!(attrs.contains("Implementation-Version: 1.21.8-42-abcdef0\n"), "{attrs}");
        assert!(attrs.contains("Brand-Id: winds-studio:nycticorax\n"));
        assert!(attrs.contains("Build-Number: 42\n"));
        assert!(attrs.contains("Build-Time: 2025-06-01T10:00:00.000Z\n"));
        assert!(attrs.contains("Git-Branch: ver/1.21.8\n"));
        assert!(attrs.contains("Implementation-Vendor: Winds Studio\n"));
    }

    #[test]
    fn write_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let m = BuildManifest::new(
            &brand(),
            &chain(),
            &BuildInfo {
                commit: "abc".to_owned(),
                ..BuildInfo::default()
            },
            build_time(),
        );
        let path = tmp.path().join(MANIFEST_FILE_NAME);
        m.write(&path).unwrap();
        let back: BuildManifest =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, m);
        assert_eq!(m.default_path(), PathBuf::from("/work/nycticorax/forkstack-manifest.json"));
    }
}
