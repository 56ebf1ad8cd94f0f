//! Shared test helpers for forkstack integration tests.
//!
//! All tests use temp directories. Each test gets its own project via
//! [`TestProject::new`]: a `forkstack.toml` plus an upstream snapshot root
//! laid out as `upstream/<name>/<revision>/`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use forkstack::Project;
use tempfile::TempDir;

/// A two-tier chain: `paper` -> `one` -> `two`, both with a `main` set over
/// `src/`. `{apply}` is replaced by extra `[apply]` keys.
pub const TWO_TIER: &str = r#"
[apply]
{apply}

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
excludes = ["generated/"]

[forks.two]
forks = "one"
output_dir = "work/two"

[[forks.two.patch_sets]]
label = "main"
upstream_path = "src"
patches = "patches/two"
"#;

pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    /// Write `config` as `forkstack.toml` in a fresh temp dir.
    pub fn new(config: &str) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let project = Self { dir };
        project.write("forkstack.toml", config);
        project
    }

    /// The two-tier chain with default `[apply]` settings.
    pub fn two_tier() -> Self {
        Self::new(&TWO_TIER.replace("{apply}", ""))
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("forkstack.toml")
    }

    pub fn open(&self) -> Project {
        Project::open(&self.config_path()).expect("failed to open project")
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path().join(rel);
        std::fs::create_dir_all(path.parent().expect("relative path has a parent"))
            .expect("failed to create parent dirs");
        std::fs::write(&path, content).expect("failed to write file");
    }

    pub fn read(&self, rel: &str) -> Option<String> {
        std::fs::read_to_string(self.path().join(rel)).ok()
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.path().join(rel)).expect("failed to remove file");
    }

    /// Write a file into the snapshot of `upstream` at `revision`.
    pub fn upstream_file(&self, upstream: &str, revision: &str, rel: &str, content: &str) {
        self.write(&format!("upstream/{upstream}/{revision}/{rel}"), content);
    }

    /// Every file under `rel`, as sorted `(path, bytes)` pairs.
    pub fn snapshot_tree(&self, rel: &str) -> Vec<(String, Vec<u8>)> {
        let root = self.path().join(rel);
        forkstack::tree::list_files(&root)
            .expect("failed to list tree")
            .into_iter()
            .map(|p| {
                let bytes = std::fs::read(root.join(&p)).expect("failed to read file");
                (forkstack::tree::rel_to_slash(&p), bytes)
            })
            .collect()
    }
}

/// Apply the default chain, panicking on failure.
pub fn apply_ok(project: &Project) {
    project
        .apply(None, &project.apply_options())
        .unwrap_or_else(|e| panic!("apply failed: {e}"));
}

/// Rediff `fork` with default options, panicking on failure.
pub fn rediff_ok(project: &Project, fork: &str) -> forkstack::rediff::RediffReport {
    let mut options = project.rediff_options();
    options.track_additions = true;
    project
        .rediff(fork, &options)
        .unwrap_or_else(|e| panic!("rediff {fork} failed: {e}"))
}

/// Build scenario A's patches: `one` rewrites B to X, `two` rewrites C to Y.
pub fn build_scenario_a(tp: &TestProject) -> Project {
    tp.upstream_file("paper", "r1", "src/file.txt", "A\nB\nC\n");
    let project = tp.open();
    apply_ok(&project);

    tp.write("work/one/src/file.txt", "A\nX\nC\n");
    rediff_ok(&project, "one");
    apply_ok(&project);

    tp.write("work/two/src/file.txt", "A\nX\nY\n");
    rediff_ok(&project, "two");
    apply_ok(&project);
    project
}
