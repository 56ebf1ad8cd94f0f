//! On-disk patch storage.
//!
//! A directory patch set stores unit `<path>` at `<patches_dir>/<path>.patch`;
//! a file patch set stores its single unit at its configured patch file. Each
//! patch file is a concatenation of fragments in application order:
//!
//! ```text
//! From: Jane Doe <jane@example.com>
//! Date: 2025-03-01T12:00:00Z
//! Subject: [PATCH] Tune entity ticking
//!
//! Optional message body.
//! ---
//! diff --git a/src/Foo.java b/src/Foo.java
//! --- a/src/Foo.java
//! +++ b/src/Foo.java
//! @@ -1,3 +1,3 @@
//!  ...
//! ```
//!
//! The body ends at the first `---` line directly followed by a diff header
//! (`diff ` or `--- `), so bodies may contain `---` and `From: ` lines. Once
//! inside a diff, a line starting with `From: ` begins the next fragment:
//! diff lines start with one of ` +-@\`, so the marker cannot occur there.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat};

use crate::diff::{FileDiff, parse_file_diff};
use crate::error::{ForkError, Result, io_at};
use crate::model::patch::{
    FragmentMeta, PatchFragment, PatchSet, PatchSetKind, PatchSetSpec, PatchUnit,
};
use crate::tree::{self, rel_to_slash};

/// Extension of per-unit patch files in a directory patch set.
pub const PATCH_EXTENSION: &str = "patch";

const FROM: &str = "From: ";
const DATE: &str = "Date: ";
const SUBJECT: &str = "Subject: ";
const SUBJECT_TAG: &str = "[PATCH] ";
const SEPARATOR: &str = "---";

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render one fragment in canonical form.
#[must_use]
pub fn render_fragment(fragment: &PatchFragment) -> String {
    let meta = &fragment.meta;
    let mut out = String::new();
    out.push_str(FROM);
    out.push_str(&meta.author_name);
    out.push_str(" <");
    out.push_str(&meta.author_email);
    out.push_str(">\n");
    out.push_str(DATE);
    out.push_str(&meta.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    out.push('\n');
    out.push_str(SUBJECT);
    out.push_str(SUBJECT_TAG);
    out.push_str(&meta.title);
    out.push_str("\n\n");
    if let Some(body) = meta.body.as_deref().filter(|b| !b.is_empty()) {
        out.push_str(body);
        out.push('\n');
    }
    out.push_str(SEPARATOR);
    out.push('\n');
    out.push_str(&fragment.diff.render());
    out
}

/// Render a whole unit: its fragments, concatenated in order.
#[must_use]
pub fn render_unit(unit: &PatchUnit) -> String {
    unit.fragments.iter().map(render_fragment).collect()
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a patch file into its fragments.
///
/// `file` is only used for error locators.
///
/// # Errors
/// Returns [`ForkError::PatchParse`] naming the 1-based line of the problem.
pub fn parse_patch_file(text: &str, file: &Path) -> Result<Vec<PatchFragment>> {
    let lines: Vec<&str> = text
        .split_inclusive('\n')
        .map(|l| l.strip_suffix('\n').unwrap_or(l))
        .collect();

    let err = |line: usize, detail: String| ForkError::PatchParse {
        file: file.to_path_buf(),
        line,
        detail,
    };

    let mut pos = lines.iter().position(|l| !l.trim().is_empty()).ok_or_else(|| {
        err(1, "no fragments (expected a 'From: ' header)".to_owned())
    })?;
    if !lines[pos].starts_with(FROM) {
        return Err(err(pos + 1, "text before the first 'From: ' header".to_owned()));
    }

    let mut fragments = Vec::new();
    while pos < lines.len() {
        let (fragment, next) = parse_fragment(&lines, pos, &err)?;
        fragments.push(fragment);
        pos = next;
    }
    Ok(fragments)
}

/// Parse the fragment whose `From: ` header is at `start`. Returns it with
/// the index of the next fragment's header (or `lines.len()`).
fn parse_fragment(
    lines: &[&str],
    start: usize,
    err: &impl Fn(usize, String) -> ForkError,
) -> Result<(PatchFragment, usize)> {
    let from = &lines[start][FROM.len()..];
    let (author_name, author_email) = parse_author(from)
        .ok_or_else(|| err(start + 1, format!("malformed author {from:?}, expected 'Name <email>'")))?;

    let date = lines
        .get(start + 1)
        .and_then(|l| l.strip_prefix(DATE))
        .ok_or_else(|| err(start + 2, "missing 'Date: ' header".to_owned()))?;
    let timestamp = DateTime::parse_from_rfc3339(date.trim())
        .map_err(|e| err(start + 2, format!("invalid date {date:?}: {e}")))?;

    let subject = lines
        .get(start + 2)
        .and_then(|l| l.strip_prefix(SUBJECT))
        .ok_or_else(|| err(start + 3, "missing 'Subject: ' header".to_owned()))?;
    let title = subject.strip_prefix(SUBJECT_TAG).unwrap_or(subject).to_owned();

    if lines.get(start + 3).is_some_and(|l| !l.is_empty()) {
        return Err(err(start + 4, "expected a blank line after the headers".to_owned()));
    }

    let body_start = start + 4;
    let separator = (body_start..lines.len())
        .find(|&i| {
            lines[i] == SEPARATOR
                && lines
                    .get(i + 1)
                    .is_some_and(|next| next.starts_with("diff ") || next.starts_with("--- "))
        })
        .ok_or_else(|| err(start + 4, "missing '---' separator before the diff".to_owned()))?;
    let body = lines[body_start..separator].join("\n");

    let diff_start = separator + 1;
    let next = (diff_start..lines.len())
        .find(|&i| lines[i].starts_with(FROM))
        .unwrap_or(lines.len());
    let diff: FileDiff = parse_file_diff(&lines[diff_start..next])
        .map_err(|e| err(diff_start + e.line, e.detail))?;

    let mut meta = FragmentMeta::new(title, author_name, author_email, timestamp);
    meta.body = (!body.is_empty()).then_some(body);
    Ok((PatchFragment { meta, diff }, next))
}

fn parse_author(raw: &str) -> Option<(String, String)> {
    let open = raw.rfind(" <")?;
    let email = raw[open + 2..].strip_suffix('>')?;
    Some((raw[..open].to_owned(), email.to_owned()))
}

// ---------------------------------------------------------------------------
// Loading and storing patch sets
// ---------------------------------------------------------------------------

/// Path of the patch file that stores `unit_path` for this set.
#[must_use]
pub fn unit_file(spec: &PatchSetSpec, unit_path: &str) -> PathBuf {
    match spec.kind {
        PatchSetKind::File => spec.patches.clone(),
        PatchSetKind::Dir => spec.patches.join(format!("{unit_path}.{PATCH_EXTENSION}")),
    }
}

/// Load every unit of a patch set from disk.
///
/// A missing patches directory (or file) is an empty set.
///
/// # Errors
/// Returns [`ForkError::PatchParse`] for malformed files or fragments whose
/// target does not match their file, and [`ForkError::Io`] on read failures.
pub fn load_patch_set(spec: &PatchSetSpec) -> Result<PatchSet> {
    let mut units = Vec::new();
    match spec.kind {
        PatchSetKind::File => {
            if spec.patches.is_file() {
                let unit_path = spec.file_unit_path();
                units.push(load_unit(&spec.patches, &unit_path)?);
            }
        }
        PatchSetKind::Dir => {
            if spec.patches.is_dir() {
                for rel in tree::list_files(&spec.patches)? {
                    let rel = rel_to_slash(&rel);
                    let Some(unit_path) = rel.strip_suffix(&format!(".{PATCH_EXTENSION}")) else {
                        continue;
                    };
                    let file = spec.patches.join(&rel);
                    units.push(load_unit(&file, unit_path)?);
                }
            }
        }
    }
    Ok(PatchSet::new(spec.clone(), units))
}

fn load_unit(file: &Path, unit_path: &str) -> Result<PatchUnit> {
    let text = fs::read_to_string(file).map_err(io_at(file))?;
    let fragments = parse_patch_file(&text, file)?;
    for fragment in &fragments {
        if fragment.target() != unit_path {
            return Err(ForkError::PatchParse {
                file: file.to_path_buf(),
                line: 1,
                detail: format!(
                    "fragment targets '{}' but the file stores '{unit_path}'",
                    fragment.target()
                ),
            });
        }
    }
    Ok(PatchUnit {
        path: unit_path.to_owned(),
        fragments,
    })
}

/// What [`store_patch_set`] changed on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreOutcome {
    /// Patch files created or rewritten.
    pub written: Vec<PathBuf>,
    /// Patch files deleted because their unit is gone.
    pub deleted: Vec<PathBuf>,
}

/// Write a patch set back to disk.
///
/// Files whose content is unchanged are left untouched; patch files for units
/// no longer in the set are deleted, along with directories they leave empty.
///
/// # Errors
/// Returns [`ForkError::Io`] on write or delete failures.
pub fn store_patch_set(set: &PatchSet) -> Result<StoreOutcome> {
    let spec = &set.spec;
    let mut outcome = StoreOutcome::default();
    let mut keep = BTreeSet::new();

    for unit in &set.units {
        let file = unit_file(spec, &unit.path);
        let text = render_unit(unit);
        keep.insert(file.clone());
        if fs::read_to_string(&file).is_ok_and(|existing| existing == text) {
            continue;
        }
        tree::write_atomic(&file, text.as_bytes())?;
        outcome.written.push(file);
    }

    match spec.kind {
        PatchSetKind::File => {
            if set.units.is_empty() && spec.patches.is_file() {
                fs::remove_file(&spec.patches).map_err(io_at(&spec.patches))?;
                outcome.deleted.push(spec.patches.clone());
            }
        }
        PatchSetKind::Dir => {
            if spec.patches.is_dir() {
                for rel in tree::list_files(&spec.patches)? {
                    let file = spec.patches.join(&rel);
                    let is_patch = file.extension().is_some_and(|e| e == PATCH_EXTENSION);
                    if is_patch && !keep.contains(&file) {
                        fs::remove_file(&file).map_err(io_at(&file))?;
                        outcome.deleted.push(file);
                    }
                }
                tree::prune_empty_dirs(&spec.patches)?;
            }
        }
    }
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_texts;
    use crate::model::exclude::ExclusionSet;
    use crate::model::types::SetLabel;
    use tempfile::TempDir;

    fn meta(title: &str) -> FragmentMeta {
        FragmentMeta::new(
            title,
            "Jane Doe",
            "jane@example.com",
            DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z").unwrap(),
        )
    }

    fn fragment(path: &str, old: &str, new: &str, title: &str) -> PatchFragment {
        PatchFragment {
            meta: meta(title),
            diff: diff_texts(path, Some(old), Some(new), 3).unwrap(),
        }
    }

    fn dir_spec(root: &Path) -> PatchSetSpec {
        PatchSetSpec {
            label: SetLabel::new("server").unwrap(),
            kind: PatchSetKind::Dir,
            upstream_path: PathBuf::new(),
            output_path: PathBuf::new(),
            patches: root.join("patches"),
            excludes: ExclusionSet::empty(),
        }
    }

    #[test]
    fn renders_canonical_fragment() {
        let text = render_fragment(&fragment("file.txt", "A\nB\nC\n", "A\nX\nC\n", "Swap B"));
        assert_eq!(
            text,
            "From: Jane Doe <jane@example.com>\n\
             Date: 2025-03-01T12:00:00Z\n\
             Subject: [PATCH] Swap B\n\
             \n\
             ---\n\
             diff --git a/file.txt b/file.txt\n\
             --- a/file.txt\n\
             +++ b/file.txt\n\
             @@ -1,3 +1,3 @@\n \
             A\n\
             -B\n\
             +X\n \
             C\n"
        );
    }

    #[test]
    fn multi_fragment_file_round_trips_exactly() {
        let mut first = fragment("f.txt", "A\nB\nC\n", "A\nX\nC\n", "First");
        first.meta.body = Some("Explains why.\n\nSecond paragraph.".to_owned());
        let second = fragment("f.txt", "A\nX\nC\n", "A\nX\nY\n", "Second");
        let unit = PatchUnit {
            path: "f.txt".to_owned(),
            fragments: vec![first, second],
        };
        let text = render_unit(&unit);
        let parsed = parse_patch_file(&text, Path::new("f.txt.patch")).unwrap();
        assert_eq!(parsed, unit.fragments);
        let again = render_unit(&PatchUnit {
            path: "f.txt".to_owned(),
            fragments: parsed,
        });
        assert_eq!(again, text);
    }

    #[test]
    fn parse_reports_line_of_bad_date() {
        let text = "From: A <a@b>\nDate: yesterday\nSubject: [PATCH] x\n\n---\n";
        let err = parse_patch_file(text, Path::new("x.patch")).unwrap_err();
        match err {
            ForkError::PatchParse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_reports_line_inside_diff() {
        let text = "From: A <a@b>\nDate: 2025-01-01T00:00:00Z\nSubject: [PATCH] x\n\n---\n--- a/f\n+++ b/f\n@@ bogus\n";
        let err = parse_patch_file(text, Path::new("x.patch")).unwrap_err();
        match err {
            ForkError::PatchParse { line, .. } => assert_eq!(line, 8),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_rejects_leading_garbage() {
        let text = "hello\nFrom: A <a@b>\n";
        assert!(parse_patch_file(text, Path::new("x.patch")).is_err());
    }

    fn round_trip_body(body: &str) {
        let mut first = fragment("f.txt", "A\nB\n", "A\nX\n", "First");
        first.meta.body = Some(body.to_owned());
        let second = fragment("f.txt", "A\nX\n", "A\nY\n", "Second");
        let unit = PatchUnit {
            path: "f.txt".to_owned(),
            fragments: vec![first, second],
        };
        let text = render_unit(&unit);
        let parsed = parse_patch_file(&text, Path::new("f.txt.patch")).unwrap();
        assert_eq!(parsed, unit.fragments, "body {body:?}");
    }

    #[test]
    fn body_may_quote_author_line() {
        round_trip_body("From: Alice <alice@example.com>\nreported it");
    }

    #[test]
    fn body_may_contain_separator_line() {
        round_trip_body("---\ntrailer");
        round_trip_body("Fixes: crash\n---\n--\nFrom: nobody");
    }

    #[test]
    fn blank_lines_between_fragments_are_ignored() {
        let first = render_fragment(&fragment("f.txt", "A\n", "B\n", "First"));
        let second = render_fragment(&fragment("f.txt", "B\n", "C\n", "Second"));
        let text = format!("\n{first}\n\n{second}\n");
        let parsed = parse_patch_file(&text, Path::new("f.txt.patch")).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].meta.title, "First");
        assert_eq!(parsed[1].meta.title, "Second");
    }

    #[test]
    fn store_then_load_dir_set() {
        let tmp = TempDir::new().unwrap();
        let spec = dir_spec(tmp.path());
        let set = PatchSet::new(
            spec.clone(),
            vec![
                PatchUnit::single(fragment("src/b.txt", "1\n", "2\n", "B")),
                PatchUnit::single(fragment("a.txt", "x\n", "y\n", "A")),
            ],
        );
        let outcome = store_patch_set(&set).unwrap();
        assert_eq!(outcome.written.len(), 2);
        assert!(tmp.path().join("patches/src/b.txt.patch").is_file());

        let loaded = load_patch_set(&spec).unwrap();
        assert_eq!(loaded.units, set.units);

        // Storing again writes nothing.
        let again = store_patch_set(&loaded).unwrap();
        assert!(again.written.is_empty());
        assert!(again.deleted.is_empty());
    }

    #[test]
    fn store_deletes_removed_units_and_empty_dirs() {
        let tmp = TempDir::new().unwrap();
        let spec = dir_spec(tmp.path());
        let mut set = PatchSet::new(
            spec.clone(),
            vec![PatchUnit::single(fragment("deep/dir/c.txt", "1\n", "2\n", "C"))],
        );
        store_patch_set(&set).unwrap();
        set.remove("deep/dir/c.txt");
        let outcome = store_patch_set(&set).unwrap();
        assert_eq!(outcome.deleted.len(), 1);
        assert!(!tmp.path().join("patches/deep").exists());
        assert!(load_patch_set(&spec).unwrap().units.is_empty());
    }

    #[test]
    fn load_rejects_mismatched_target() {
        let tmp = TempDir::new().unwrap();
        let spec = dir_spec(tmp.path());
        let text = render_fragment(&fragment("other.txt", "1\n", "2\n", "X"));
        fs::create_dir_all(&spec.patches).unwrap();
        fs::write(spec.patches.join("mine.txt.patch"), text).unwrap();
        let err = load_patch_set(&spec).unwrap_err();
        assert!(err.to_string().contains("other.txt"));
    }

    #[test]
    fn missing_patch_dir_is_empty_set() {
        let tmp = TempDir::new().unwrap();
        let set = load_patch_set(&dir_spec(tmp.path())).unwrap();
        assert!(set.units.is_empty());
    }

    #[test]
    fn file_set_uses_single_patch_file() {
        let tmp = TempDir::new().unwrap();
        let spec = PatchSetSpec {
            kind: PatchSetKind::File,
            upstream_path: PathBuf::from("leaf-server/build.gradle.kts"),
            output_path: PathBuf::from("sapling-server/build.gradle.kts"),
            patches: tmp.path().join("sapling-server/build.gradle.kts.patch"),
            ..dir_spec(tmp.path())
        };
        let set = PatchSet::new(
            spec.clone(),
            vec![PatchUnit::single(fragment("build.gradle.kts", "a\n", "b\n", "Brand"))],
        );
        store_patch_set(&set).unwrap();
        assert!(spec.patches.is_file());
        let loaded = load_patch_set(&spec).unwrap();
        assert_eq!(loaded.units.len(), 1);

        let empty = PatchSet::new(spec.clone(), Vec::new());
        let outcome = store_patch_set(&empty).unwrap();
        assert_eq!(outcome.deleted, vec![spec.patches.clone()]);
    }
}
