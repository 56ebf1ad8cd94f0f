//! Project configuration (`forkstack.toml`).
//!
//! Defines the typed configuration for a fork project: the upstreams a chain
//! can start from, the forks layered on them with their patch sets, and a few
//! engine settings. [`ProjectConfig::resolve`] turns the parsed file into a
//! [`ProjectLayout`] with absolute paths, resolved upstream revisions and a
//! validated node table.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::{ForkError, Result};
use crate::model::exclude::ExclusionSet;
use crate::model::fork::ForkNode;
use crate::model::patch::{PatchSetKind, PatchSetSpec};
use crate::model::types::{ForkName, ParentRef, SetLabel, UpstreamName, UpstreamRef};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "forkstack.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level project configuration, as written in `forkstack.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// The fork `apply` and `drift` operate on when none is given.
    #[serde(default)]
    pub active_fork: Option<ForkName>,

    /// Where stamps and locks live (default: `.forkstack`).
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Root of checked-out upstream snapshots (default: `upstream`).
    #[serde(default = "default_snapshot_root")]
    pub snapshot_root: PathBuf,

    /// Apply engine settings.
    #[serde(default)]
    pub apply: ApplyConfig,

    /// Upstream snapshots, keyed by name.
    #[serde(default)]
    pub upstreams: BTreeMap<UpstreamName, UpstreamConfig>,

    /// Forks, keyed by name.
    #[serde(default)]
    pub forks: BTreeMap<ForkName, ForkConfig>,

    /// Branding used for the packaging manifest.
    #[serde(default)]
    pub brand: Option<BrandConfig>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".forkstack")
}

fn default_snapshot_root() -> PathBuf {
    PathBuf::from("upstream")
}

// ---------------------------------------------------------------------------
// ApplyConfig
// ---------------------------------------------------------------------------

/// Apply and rediff behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplyConfig {
    /// Apply the patch sets of one node in parallel (default: true).
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Lines of context written around each rediffed hunk (default: 3).
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            context_lines: default_context_lines(),
        }
    }
}

const fn default_parallel() -> bool {
    true
}

const fn default_context_lines() -> usize {
    crate::diff::DEFAULT_CONTEXT
}

// ---------------------------------------------------------------------------
// UpstreamConfig
// ---------------------------------------------------------------------------

/// One upstream snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Repository identity, e.g. `PaperMC/Paper`.
    pub repo: String,

    /// Which revision of the repository to build on.
    pub revision: RevisionSource,

    /// Explicit snapshot directory, overriding `<snapshot_root>/<name>/<revision>`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Where an upstream revision comes from.
///
/// ```toml
/// revision = "4f1c2d9"
/// revision = { property = "paperCommit", file = "gradle.properties" }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RevisionSource {
    /// A literal tag, branch or commit hash.
    Literal(String),
    /// A key in a `key=value` properties file.
    Property {
        /// Property key.
        property: String,
        /// Properties file, relative to the config file.
        #[serde(default = "default_properties_file")]
        file: PathBuf,
    },
}

fn default_properties_file() -> PathBuf {
    PathBuf::from("gradle.properties")
}

impl fmt::Display for RevisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(rev) => f.write_str(rev),
            Self::Property { property, file } => {
                write!(f, "{property} in {}", file.display())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ForkConfig / PatchSetConfig
// ---------------------------------------------------------------------------

/// One fork in the chain.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForkConfig {
    /// The upstream this fork sits on directly.
    #[serde(default)]
    pub upstream: Option<UpstreamName>,

    /// The fork this fork is a fork of.
    #[serde(default)]
    pub forks: Option<ForkName>,

    /// Where the fork's tree is materialized.
    pub output_dir: PathBuf,

    /// Patch sets, applied in this order.
    #[serde(default)]
    pub patch_sets: Vec<PatchSetConfig>,
}

/// One patch set of a fork.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchSetConfig {
    /// Source-root label.
    pub label: SetLabel,

    /// `dir` (default) or `file`.
    #[serde(default)]
    pub kind: PatchSetKind,

    /// Path within the input tree.
    pub upstream_path: PathBuf,

    /// Path within the fork's output directory (default: `upstream_path`).
    #[serde(default)]
    pub output_path: Option<PathBuf>,

    /// Patch storage: a directory for `dir` sets, a file for `file` sets.
    pub patches: PathBuf,

    /// Paths never copied, patched or regenerated.
    #[serde(default)]
    pub excludes: Vec<String>,
}

// ---------------------------------------------------------------------------
// BrandConfig
// ---------------------------------------------------------------------------

/// Identity of the final product, for the packaging manifest.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrandConfig {
    /// Display name, e.g. `Nycticorax`.
    pub name: String,
    /// Brand id, e.g. `winds-studio:nycticorax`.
    pub id: String,
    /// Vendor name.
    #[serde(default)]
    pub vendor: Option<String>,
    /// Product version, e.g. `1.21.8`.
    pub version: String,
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// A configuration error with optional file path context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// The path of the config file (if known).
    pub path: Option<PathBuf>,
    /// Human-readable description of the problem.
    pub message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: {}", path.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for ForkError {
    fn from(e: ConfigError) -> Self {
        Self::Config {
            path: e.path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME)),
            detail: e.message,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl ProjectConfig {
    /// Load configuration from a TOML file.
    ///
    /// Unlike most tools' config files, a missing `forkstack.toml` is an
    /// error: a project without a fork chain has nothing to do.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError {
            path: Some(path.to_owned()),
            message: if e.kind() == std::io::ErrorKind::NotFound {
                "file not found (run from the project root or pass --config)".to_owned()
            } else {
                format!("could not read file: {e}")
            },
        })?;
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML, invalid names or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError::new(message)
        })
    }

    /// Validate the configuration and resolve it against `base_dir`, the
    /// directory containing the config file.
    ///
    /// Parent references are not checked here; the chain resolver reports
    /// dangling ones for the chain actually requested.
    ///
    /// # Errors
    /// Returns [`ForkError::Config`] for invalid entries and unreadable
    /// revision properties, and [`ForkError::OutputPathConflict`] when two
    /// forks or patch sets write to overlapping paths.
    pub fn resolve(&self, base_dir: &Path) -> Result<ProjectLayout> {
        let abs = |p: &Path| normalize(&base_dir.join(p));

        let mut upstreams = BTreeMap::new();
        let mut snapshot_paths = BTreeMap::new();
        for (name, up) in &self.upstreams {
            let revision = match &up.revision {
                RevisionSource::Literal(rev) => rev.trim().to_owned(),
                RevisionSource::Property { property, file } => {
                    read_property(&abs(file), property)?
                }
            };
            if revision.is_empty() {
                return Err(ConfigError::new(format!("upstream '{name}' has an empty revision")).into());
            }
            upstreams.insert(
                name.clone(),
                UpstreamRef::new(name.clone(), up.repo.clone(), revision),
            );
            if let Some(path) = &up.path {
                snapshot_paths.insert(name.clone(), abs(path));
            }
        }

        let mut nodes = BTreeMap::new();
        for (name, fork) in &self.forks {
            let parent = match (&fork.upstream, &fork.forks) {
                (Some(up), None) => ParentRef::Upstream(up.clone()),
                (None, Some(parent)) => ParentRef::Fork(parent.clone()),
                (Some(_), Some(_)) => {
                    return Err(ConfigError::new(format!(
                        "fork '{name}' sets both `upstream` and `forks`; pick one"
                    ))
                    .into());
                }
                (None, None) => {
                    return Err(ConfigError::new(format!(
                        "fork '{name}' needs either `upstream = \"...\"` or `forks = \"...\"`"
                    ))
                    .into());
                }
            };
            let output_dir = abs(&fork.output_dir);
            let mut patch_sets = Vec::with_capacity(fork.patch_sets.len());
            for set in &fork.patch_sets {
                patch_sets.push(resolve_patch_set(name, set, &abs)?);
            }
            nodes.insert(
                name.clone(),
                ForkNode {
                    name: name.clone(),
                    parent,
                    output_dir,
                    patch_sets,
                },
            );
        }

        check_outputs(&nodes)?;

        if let Some(active) = &self.active_fork
            && !nodes.contains_key(active)
        {
            return Err(ForkError::UnknownFork {
                name: active.to_string(),
            });
        }

        Ok(ProjectLayout {
            base_dir: base_dir.to_path_buf(),
            active_fork: self.active_fork.clone(),
            state_dir: abs(&self.state_dir),
            snapshot_root: abs(&self.snapshot_root),
            apply: self.apply,
            upstreams,
            snapshot_paths,
            nodes,
            brand: self.brand.clone(),
        })
    }
}

fn resolve_patch_set(
    fork: &ForkName,
    set: &PatchSetConfig,
    abs: &impl Fn(&Path) -> PathBuf,
) -> Result<PatchSetSpec> {
    let label = &set.label;
    let relative = |what: &str, p: &Path| -> Result<PathBuf> {
        let clean = normalize(p);
        if clean.is_absolute() || clean.starts_with("..") {
            return Err(ConfigError::new(format!(
                "fork '{fork}', patch set '{label}': {what} must be a relative path inside the tree, got '{}'",
                p.display()
            ))
            .into());
        }
        Ok(clean)
    };
    let upstream_path = relative("upstream_path", &set.upstream_path)?;
    let output_path = relative(
        "output_path",
        set.output_path.as_deref().unwrap_or(&set.upstream_path),
    )?;

    if set.kind == PatchSetKind::File {
        if !set.excludes.is_empty() {
            return Err(ConfigError::new(format!(
                "fork '{fork}', patch set '{label}': a `file` patch set cannot have excludes"
            ))
            .into());
        }
        if upstream_path.file_name().is_none() || output_path.file_name().is_none() {
            return Err(ConfigError::new(format!(
                "fork '{fork}', patch set '{label}': a `file` patch set needs file paths"
            ))
            .into());
        }
    }

    let excludes = ExclusionSet::new(&set.excludes).map_err(|e| {
        ConfigError::new(format!(
            "fork '{fork}', patch set '{label}': invalid exclude pattern: {e}"
        ))
    })?;

    Ok(PatchSetSpec {
        label: label.clone(),
        kind: set.kind,
        upstream_path,
        output_path,
        patches: abs(&set.patches),
        excludes,
    })
}

/// Read `key` from a `key=value` properties file.
fn read_property(file: &Path, key: &str) -> Result<String> {
    let text = std::fs::read_to_string(file).map_err(|e| {
        ConfigError::new(format!("cannot read properties file {}: {e}", file.display()))
    })?;
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
        .filter_map(|l| l.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim().to_owned())
        .ok_or_else(|| {
            ConfigError::new(format!("property '{key}' not found in {}", file.display())).into()
        })
}

/// Lexically normalize a path: drop `.` components and fold `..` into its
/// parent where possible.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Returns `true` if one path contains the other.
fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

fn check_outputs(nodes: &BTreeMap<ForkName, ForkNode>) -> Result<()> {
    let all: Vec<&ForkNode> = nodes.values().collect();
    for (i, a) in all.iter().enumerate() {
        for b in &all[i + 1..] {
            if overlaps(&a.output_dir, &b.output_dir) {
                return Err(ForkError::OutputPathConflict {
                    first: format!("fork '{}'", a.name),
                    second: format!("fork '{}'", b.name),
                    path: a.output_dir.clone(),
                });
            }
        }
        for set in &a.patch_sets {
            if let Some(owner) = all.iter().find(|n| set.patches.starts_with(&n.output_dir)) {
                return Err(ConfigError::new(format!(
                    "fork '{}', patch set '{}': patches live inside the output directory of fork '{}', which is wiped on every apply",
                    a.name, set.label, owner.name
                ))
                .into());
            }
        }
        check_set_outputs(a)?;
    }
    Ok(())
}

/// Two sets of one fork may only nest when the outer set excludes the inner
/// set's output.
fn check_set_outputs(node: &ForkNode) -> Result<()> {
    let sets = &node.patch_sets;
    for (i, a) in sets.iter().enumerate() {
        for b in &sets[i + 1..] {
            if !overlaps(&a.output_path, &b.output_path) {
                continue;
            }
            let (outer, inner) = if b.output_path.starts_with(&a.output_path) {
                (a, b)
            } else {
                (b, a)
            };
            let carved_out = inner
                .output_path
                .strip_prefix(&outer.output_path)
                .ok()
                .filter(|rel| !rel.as_os_str().is_empty())
                .is_some_and(|rel| {
                    outer.kind == PatchSetKind::Dir
                        && outer.excludes.is_excluded(&crate::tree::rel_to_slash(rel))
                });
            if !carved_out {
                return Err(ForkError::OutputPathConflict {
                    first: format!("{}/{}", node.name, outer.label),
                    second: format!("{}/{}", node.name, inner.label),
                    path: node.output_dir.join(&inner.output_path),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ProjectLayout
// ---------------------------------------------------------------------------

/// A validated configuration with absolute paths.
#[derive(Clone, Debug)]
pub struct ProjectLayout {
    /// Directory containing the config file.
    pub base_dir: PathBuf,
    /// Default leaf fork.
    pub active_fork: Option<ForkName>,
    /// Absolute state directory (stamps, locks).
    pub state_dir: PathBuf,
    /// Absolute snapshot root.
    pub snapshot_root: PathBuf,
    /// Apply settings.
    pub apply: ApplyConfig,
    /// Upstreams with resolved revisions.
    pub upstreams: BTreeMap<UpstreamName, UpstreamRef>,
    /// Explicit snapshot directories.
    pub snapshot_paths: BTreeMap<UpstreamName, PathBuf>,
    /// The node table.
    pub nodes: BTreeMap<ForkName, ForkNode>,
    /// Branding, if configured.
    pub brand: Option<BrandConfig>,
}

impl ProjectLayout {
    /// The fork to operate on: `requested`, else `active_fork`, else the only
    /// fork nobody forks.
    ///
    /// # Errors
    /// Returns [`ForkError::UnknownFork`] for an unknown name and
    /// [`ForkError::Config`] when no leaf can be chosen.
    pub fn leaf(&self, requested: Option<&str>) -> Result<ForkName> {
        if let Some(name) = requested {
            return ForkName::new(name)
                .ok()
                .filter(|n| self.nodes.contains_key(n))
                .ok_or_else(|| ForkError::UnknownFork {
                    name: name.to_owned(),
                });
        }
        if let Some(active) = &self.active_fork {
            return Ok(active.clone());
        }
        let mut leaves = self.nodes.keys().filter(|name| {
            !self
                .nodes
                .values()
                .any(|n| n.fork_parent() == Some(*name))
        });
        match (leaves.next(), leaves.next()) {
            (Some(only), None) => Ok(only.clone()),
            _ => Err(ConfigError::new(
                "cannot choose a fork: set `active_fork` or pass --fork",
            )
            .into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
active_fork = "nycticorax"

[upstreams.leaf]
repo = "Winds-Studio/Leaf"
revision = "4f1c2d9"

[forks.sapling]
upstream = "leaf"
output_dir = "work/sapling"

[[forks.sapling.patch_sets]]
label = "leafServer"
upstream_path = "leaf-server"
patches = "sapling-server/leaf-patches"
excludes = ["build.gradle.kts"]

[[forks.sapling.patch_sets]]
label = "leafServerBuild"
kind = "file"
upstream_path = "leaf-server/build.gradle.kts"
patches = "sapling-server/build.gradle.kts.patch"

[forks.nycticorax]
forks = "sapling"
output_dir = "work/nycticorax"

[brand]
name = "Nycticorax"
id = "winds-studio:nycticorax"
version = "1.21.8"
"#;

    #[test]
    fn defaults_all_fields() {
        let cfg = ProjectConfig::parse("").unwrap();
        assert_eq!(cfg.state_dir, PathBuf::from(".forkstack"));
        assert_eq!(cfg.snapshot_root, PathBuf::from("upstream"));
        assert!(cfg.apply.parallel);
        assert_eq!(cfg.apply.context_lines, 3);
        assert!(cfg.forks.is_empty());
        assert!(cfg.brand.is_none());
    }

    #[test]
    fn parses_sample() {
        let cfg = ProjectConfig::parse(SAMPLE).unwrap();
        let sapling = &cfg.forks[&ForkName::new("sapling").unwrap()];
        assert_eq!(sapling.patch_sets.len(), 2);
        assert_eq!(sapling.patch_sets[1].kind, PatchSetKind::File);
        assert_eq!(
            cfg.upstreams[&UpstreamName::new("leaf").unwrap()].revision,
            RevisionSource::Literal("4f1c2d9".to_owned())
        );
    }

    #[test]
    fn resolves_paths_and_parents() {
        let layout = ProjectConfig::parse(SAMPLE)
            .unwrap()
            .resolve(Path::new("/proj"))
            .unwrap();
        let sapling = &layout.nodes[&ForkName::new("sapling").unwrap()];
        assert_eq!(sapling.output_dir, PathBuf::from("/proj/work/sapling"));
        assert!(sapling.is_root());
        assert_eq!(sapling.patch_sets[0].output_path, PathBuf::from("leaf-server"));
        assert_eq!(
            sapling.patch_sets[1].patches,
            PathBuf::from("/proj/sapling-server/build.gradle.kts.patch")
        );
        let nyc = &layout.nodes[&ForkName::new("nycticorax").unwrap()];
        assert_eq!(nyc.fork_parent(), Some(&sapling.name));
        assert_eq!(layout.state_dir, PathBuf::from("/proj/.forkstack"));
        assert_eq!(layout.leaf(None).unwrap().as_str(), "nycticorax");
    }

    #[test]
    fn unknown_field_is_rejected_with_line() {
        let err = ProjectConfig::parse("[apply]\nparalel = false\n").unwrap_err();
        assert!(err.message.contains("line 2"), "{}", err.message);
    }

    #[test]
    fn invalid_name_is_rejected() {
        let err = ProjectConfig::parse("[forks.\"bad name\"]\nupstream = \"x\"\noutput_dir = \"o\"\n")
            .unwrap_err();
        assert!(err.message.contains("name"), "{}", err.message);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let err = ProjectConfig::load(Path::new("/nonexistent/forkstack.toml")).unwrap_err();
        assert_eq!(
            err.path.as_deref(),
            Some(Path::new("/nonexistent/forkstack.toml"))
        );
        assert!(err.message.contains("not found"));
    }

    #[test]
    fn fork_needs_exactly_one_parent() {
        let both = "[forks.a]\nupstream = \"u\"\nforks = \"b\"\noutput_dir = \"o\"\n";
        let err = ProjectConfig::parse(both).unwrap().resolve(Path::new("/p")).unwrap_err();
        assert_eq!(err.kind(), "config");

        let neither = "[forks.a]\noutput_dir = \"o\"\n";
        let err = ProjectConfig::parse(neither).unwrap().resolve(Path::new("/p")).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn file_set_with_excludes_is_rejected() {
        let toml = r#"
[forks.a]
upstream = "u"
output_dir = "o"
[[forks.a.patch_sets]]
label = "f"
kind = "file"
upstream_path = "x/build.gradle.kts"
patches = "p.patch"
excludes = ["nope"]
"#;
        let err = ProjectConfig::parse(toml).unwrap().resolve(Path::new("/p")).unwrap_err();
        assert!(err.to_string().contains("cannot have excludes"), "{err}");
    }

    #[test]
    fn overlapping_fork_outputs_conflict() {
        let toml = r#"
[forks.a]
upstream = "u"
output_dir = "work"
[forks.b]
forks = "a"
output_dir = "work/b"
"#;
        let err = ProjectConfig::parse(toml).unwrap().resolve(Path::new("/p")).unwrap_err();
        assert_eq!(err.kind(), "output_path_conflict");
    }

    #[test]
    fn nested_set_must_be_excluded_by_outer_set() {
        let toml = |excludes: &str| {
            format!(
                r#"
[forks.a]
upstream = "u"
output_dir = "o"
[[forks.a.patch_sets]]
label = "server"
upstream_path = "server"
patches = "patches/server"
excludes = [{excludes}]
[[forks.a.patch_sets]]
label = "build"
kind = "file"
upstream_path = "server/build.gradle.kts"
patches = "patches/build.gradle.kts.patch"
"#
            )
        };
        let err = ProjectConfig::parse(&toml(""))
            .unwrap()
            .resolve(Path::new("/p"))
            .unwrap_err();
        assert_eq!(err.kind(), "output_path_conflict");

        ProjectConfig::parse(&toml("\"build.gradle.kts\""))
            .unwrap()
            .resolve(Path::new("/p"))
            .unwrap();
    }

    #[test]
    fn patches_inside_output_dir_are_rejected() {
        let toml = r#"
[forks.a]
upstream = "u"
output_dir = "o"
[[forks.a.patch_sets]]
label = "s"
upstream_path = "s"
patches = "o/patches"
"#;
        let err = ProjectConfig::parse(toml).unwrap().resolve(Path::new("/p")).unwrap_err();
        assert!(err.to_string().contains("wiped"), "{err}");
    }

    #[test]
    fn revision_from_properties_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("gradle.properties"),
            "# comment\ngroup=cn.dreeam\npaperCommit = 0123abc\n",
        )
        .unwrap();
        let toml = r#"
[upstreams.paper]
repo = "PaperMC/Paper"
revision = { property = "paperCommit" }
"#;
        let layout = ProjectConfig::parse(toml).unwrap().resolve(dir.path()).unwrap();
        let up = &layout.upstreams[&UpstreamName::new("paper").unwrap()];
        assert_eq!(up.revision, "0123abc");

        let missing = toml.replace("paperCommit", "leafCommit");
        let err = ProjectConfig::parse(&missing).unwrap().resolve(dir.path()).unwrap_err();
        assert!(err.to_string().contains("leafCommit"));
    }

    #[test]
    fn escaping_set_paths_are_rejected() {
        let toml = r#"
[forks.a]
upstream = "u"
output_dir = "o"
[[forks.a.patch_sets]]
label = "s"
upstream_path = "../outside"
patches = "p"
"#;
        let err = ProjectConfig::parse(toml).unwrap().resolve(Path::new("/p")).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn leaf_defaults_to_single_unforked_fork() {
        let toml = r#"
[forks.a]
upstream = "u"
output_dir = "a"
[forks.b]
forks = "a"
output_dir = "b"
"#;
        let layout = ProjectConfig::parse(toml).unwrap().resolve(Path::new("/p")).unwrap();
        assert_eq!(layout.leaf(None).unwrap().as_str(), "b");
        assert_eq!(layout.leaf(Some("a")).unwrap().as_str(), "a");
        assert_eq!(layout.leaf(Some("zzz")).unwrap_err().kind(), "unknown_fork");
    }

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
    }
}
