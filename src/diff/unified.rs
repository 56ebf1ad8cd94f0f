//! Unified-diff model, rendering and parsing.
//!
//! A [`FileDiff`] is the diff of exactly one file. Line text is stored with its
//! trailing `\n` when the line had one; a line without a terminator is
//! rendered followed by `\ No newline at end of file`, and the marker is folded
//! back into the preceding line on parse.

use std::fmt::Write as _;

use thiserror::Error;

use super::myers::{self, DiffOp};

/// Marker line emitted after a line that lacks a trailing newline.
pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Default number of context lines around each change.
pub const DEFAULT_CONTEXT: usize = 3;

const DEV_NULL: &str = "/dev/null";

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// One line of a hunk body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HunkLine {
    /// Present in both old and new.
    Context(String),
    /// Present only in old.
    Remove(String),
    /// Present only in new.
    Add(String),
}

impl HunkLine {
    const fn prefix(&self) -> char {
        match self {
            Self::Context(_) => ' ',
            Self::Remove(_) => '-',
            Self::Add(_) => '+',
        }
    }

    fn text(&self) -> &str {
        match self {
            Self::Context(t) | Self::Remove(t) | Self::Add(t) => t,
        }
    }

    fn text_mut(&mut self) -> &mut String {
        match self {
            Self::Context(t) | Self::Remove(t) | Self::Add(t) => t,
        }
    }
}

/// A contiguous region of change with its surrounding context.
///
/// `old_start`/`new_start` are 1-based line numbers as they appear in the
/// `@@` header. For an empty range the start is the line *before* the range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hunk {
    /// First old line covered (1-based).
    pub old_start: usize,
    /// Number of old lines covered.
    pub old_len: usize,
    /// First new line covered (1-based).
    pub new_start: usize,
    /// Number of new lines covered.
    pub new_len: usize,
    /// Hunk body, in order.
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Lines the hunk expects to find (context and removals), in order.
    pub fn old_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            HunkLine::Context(t) | HunkLine::Remove(t) => Some(t.as_str()),
            HunkLine::Add(_) => None,
        })
    }

    /// Lines the hunk leaves behind (context and additions), in order.
    pub fn new_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            HunkLine::Context(t) | HunkLine::Add(t) => Some(t.as_str()),
            HunkLine::Remove(_) => None,
        })
    }

    /// 0-based index of the first old line this hunk touches.
    #[must_use]
    pub const fn old_index(&self) -> usize {
        if self.old_len == 0 {
            self.old_start
        } else {
            self.old_start - 1
        }
    }
}

/// Whether a diff modifies, creates, or deletes its file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffMode {
    /// The file exists before and after.
    Modify,
    /// The file does not exist before (`--- /dev/null`).
    Create,
    /// The file does not exist after (`+++ /dev/null`).
    Delete,
}

/// The unified diff of a single file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDiff {
    /// Target path, `/`-separated, relative to the patch set root.
    pub path: String,
    /// Modify, create, or delete.
    pub mode: DiffMode,
    /// Hunks in file order.
    pub hunks: Vec<Hunk>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Split text into lines, each keeping its trailing `\n` if it has one.
#[must_use]
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Diff two versions of a file.
///
/// `None` means the file is absent on that side. Returns `None` when both
/// sides are identical (or both absent).
#[must_use]
pub fn diff_texts(
    path: &str,
    old: Option<&str>,
    new: Option<&str>,
    context: usize,
) -> Option<FileDiff> {
    let mode = match (old, new) {
        (None, None) => return None,
        (None, Some(_)) => DiffMode::Create,
        (Some(_), None) => DiffMode::Delete,
        (Some(a), Some(b)) if a == b => return None,
        (Some(_), Some(_)) => DiffMode::Modify,
    };
    let old_lines = split_lines(old.unwrap_or(""));
    let new_lines = split_lines(new.unwrap_or(""));
    let ops = myers::diff(&old_lines, &new_lines);
    let hunks = build_hunks(&old_lines, &new_lines, &ops, context);
    Some(FileDiff {
        path: path.to_owned(),
        mode,
        hunks,
    })
}

fn build_hunks(old: &[&str], new: &[&str], ops: &[DiffOp], context: usize) -> Vec<Hunk> {
    // Position (old, new) reached before each op.
    let mut positions = Vec::with_capacity(ops.len() + 1);
    let (mut o, mut n) = (0usize, 0usize);
    for op in ops {
        positions.push((o, n));
        match op {
            DiffOp::Equal { .. } => {
                o += 1;
                n += 1;
            }
            DiffOp::Delete { .. } => o += 1,
            DiffOp::Insert { .. } => n += 1,
        }
    }
    positions.push((o, n));

    let changes: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| !op.is_equal())
        .map(|(i, _)| i)
        .collect();

    let mut hunks = Vec::new();
    let mut i = 0;
    while i < changes.len() {
        let first = changes[i];
        let mut last = first;
        let mut j = i + 1;
        while j < changes.len() && changes[j] - last <= 2 * context + 1 {
            last = changes[j];
            j += 1;
        }
        let start = first.saturating_sub(context);
        let end = (last + context + 1).min(ops.len());

        let mut lines = Vec::with_capacity(end - start);
        for op in &ops[start..end] {
            lines.push(match *op {
                DiffOp::Equal { old: oi, .. } => HunkLine::Context(old[oi].to_owned()),
                DiffOp::Delete { old: oi } => HunkLine::Remove(old[oi].to_owned()),
                DiffOp::Insert { new: ni } => HunkLine::Add(new[ni].to_owned()),
            });
        }
        let (old_from, new_from) = positions[start];
        let (old_to, new_to) = positions[end];
        let old_len = old_to - old_from;
        let new_len = new_to - new_from;
        hunks.push(Hunk {
            old_start: if old_len == 0 { old_from } else { old_from + 1 },
            old_len,
            new_start: if new_len == 0 { new_from } else { new_from + 1 },
            new_len,
            lines,
        });
        i = j;
    }
    hunks
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

impl FileDiff {
    /// Render as git-style unified diff text. Always ends with `\n`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "diff --git a/{0} b/{0}", self.path);
        match self.mode {
            DiffMode::Create => {
                let _ = writeln!(out, "--- {DEV_NULL}");
                let _ = writeln!(out, "+++ b/{}", self.path);
            }
            DiffMode::Delete => {
                let _ = writeln!(out, "--- a/{}", self.path);
                let _ = writeln!(out, "+++ {DEV_NULL}");
            }
            DiffMode::Modify => {
                let _ = writeln!(out, "--- a/{}", self.path);
                let _ = writeln!(out, "+++ b/{}", self.path);
            }
        }
        for hunk in &self.hunks {
            let _ = writeln!(
                out,
                "@@ -{},{} +{},{} @@",
                hunk.old_start, hunk.old_len, hunk.new_start, hunk.new_len
            );
            for line in &hunk.lines {
                out.push(line.prefix());
                let text = line.text();
                out.push_str(text);
                if !text.ends_with('\n') {
                    out.push('\n');
                    out.push_str(NO_NEWLINE_MARKER);
                    out.push('\n');
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// A malformed unified diff.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("line {line}: {detail}")]
pub struct DiffParseError {
    /// 1-based line number within the parsed text.
    pub line: usize,
    /// What was wrong.
    pub detail: String,
}

fn parse_err(line: usize, detail: impl Into<String>) -> DiffParseError {
    DiffParseError {
        line,
        detail: detail.into(),
    }
}

/// Parse the diff of one file.
///
/// `lines` are raw lines without their `\n` terminator. Extended git header
/// lines (`index`, `new file mode`, ...) between `diff --git` and `---` are
/// ignored.
///
/// # Errors
/// Returns [`DiffParseError`] on missing file headers, malformed `@@` headers,
/// or hunk bodies whose line counts disagree with their headers.
pub fn parse_file_diff(lines: &[&str]) -> Result<FileDiff, DiffParseError> {
    let mut pos = 0;
    while pos < lines.len() && !lines[pos].starts_with("--- ") {
        let line = lines[pos];
        if line.starts_with("@@") || line.starts_with("+++ ") {
            return Err(parse_err(pos + 1, "hunk or '+++' before '---' header"));
        }
        pos += 1;
    }
    let old_header = lines
        .get(pos)
        .ok_or_else(|| parse_err(pos + 1, "missing '--- ' file header"))?;
    let new_header = lines
        .get(pos + 1)
        .filter(|l| l.starts_with("+++ "))
        .ok_or_else(|| parse_err(pos + 2, "missing '+++ ' file header"))?;

    let old_path = header_path(&old_header[4..], "a/");
    let new_path = header_path(&new_header[4..], "b/");
    let (path, mode) = match (old_path, new_path) {
        (None, None) => return Err(parse_err(pos + 1, "both sides are /dev/null")),
        (None, Some(p)) => (p, DiffMode::Create),
        (Some(p), None) => (p, DiffMode::Delete),
        (Some(a), Some(b)) => {
            if a != b {
                return Err(parse_err(
                    pos + 1,
                    format!("renames are not supported ('{a}' -> '{b}')"),
                ));
            }
            (a, DiffMode::Modify)
        }
    };
    pos += 2;

    let mut hunks = Vec::new();
    while pos < lines.len() {
        let header = lines[pos];
        if lines[pos..].iter().all(|l| l.is_empty()) {
            break;
        }
        let mut hunk = parse_hunk_header(header).ok_or_else(|| {
            parse_err(pos + 1, format!("expected '@@ -l,s +l,s @@', found {header:?}"))
        })?;
        pos += 1;

        let (mut old_seen, mut new_seen) = (0usize, 0usize);
        while old_seen < hunk.old_len || new_seen < hunk.new_len {
            let Some(raw) = lines.get(pos) else {
                return Err(parse_err(pos + 1, "hunk body ends early"));
            };
            let (kind, text) = match raw.chars().next() {
                Some(' ') => (' ', &raw[1..]),
                Some('-') => ('-', &raw[1..]),
                Some('+') => ('+', &raw[1..]),
                // Some editors strip the single space of an empty context line.
                None => (' ', ""),
                Some('\\') => {
                    mark_no_newline(&mut hunk, pos)?;
                    pos += 1;
                    continue;
                }
                Some(_) => {
                    return Err(parse_err(pos + 1, format!("unexpected hunk line {raw:?}")));
                }
            };
            let text = format!("{text}\n");
            match kind {
                ' ' => {
                    old_seen += 1;
                    new_seen += 1;
                    hunk.lines.push(HunkLine::Context(text));
                }
                '-' => {
                    old_seen += 1;
                    hunk.lines.push(HunkLine::Remove(text));
                }
                _ => {
                    new_seen += 1;
                    hunk.lines.push(HunkLine::Add(text));
                }
            }
            if old_seen > hunk.old_len || new_seen > hunk.new_len {
                return Err(parse_err(pos + 1, "hunk body longer than its header says"));
            }
            pos += 1;
        }
        if lines.get(pos).is_some_and(|l| l.starts_with('\\')) {
            mark_no_newline(&mut hunk, pos)?;
            pos += 1;
        }
        hunks.push(hunk);
    }

    Ok(FileDiff { path, mode, hunks })
}

fn mark_no_newline(hunk: &mut Hunk, pos: usize) -> Result<(), DiffParseError> {
    let last = hunk
        .lines
        .last_mut()
        .ok_or_else(|| parse_err(pos + 1, "no-newline marker without a preceding line"))?;
    let text = last.text_mut();
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(())
}

fn header_path(raw: &str, prefix: &str) -> Option<String> {
    // Drop a trailing tab-separated timestamp, as emitted by `diff -u`.
    let raw = raw.split('\t').next().unwrap_or(raw);
    if raw == DEV_NULL {
        return None;
    }
    Some(raw.strip_prefix(prefix).unwrap_or(raw).to_owned())
}

fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let rest = line.strip_prefix("@@ -")?;
    let end = rest.find(" @@")?;
    let (old, new) = rest[..end].split_once(" +")?;
    let (old_start, old_len) = parse_range(old)?;
    let (new_start, new_len) = parse_range(new)?;
    Some(Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
        lines: Vec::new(),
    })
}

fn parse_range(s: &str) -> Option<(usize, usize)> {
    match s.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((s.parse().ok()?, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_lines(text: &str) -> Vec<&str> {
        text.split_inclusive('\n')
            .map(|l| l.strip_suffix('\n').unwrap_or(l))
            .collect()
    }

    #[test]
    fn identical_texts_have_no_diff() {
        assert!(diff_texts("a.txt", Some("x\n"), Some("x\n"), 3).is_none());
        assert!(diff_texts("a.txt", None, None, 3).is_none());
    }

    #[test]
    fn renders_single_substitution() {
        let diff = diff_texts("file.txt", Some("A\nB\nC\n"), Some("A\nX\nC\n"), 3).unwrap();
        assert_eq!(
            diff.render(),
            "diff --git a/file.txt b/file.txt\n\
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
    fn creation_and_deletion_headers() {
        let created = diff_texts("new.txt", None, Some("hi\n"), 3).unwrap();
        assert_eq!(created.mode, DiffMode::Create);
        assert!(created.render().contains("--- /dev/null\n+++ b/new.txt\n@@ -0,0 +1,1 @@\n+hi\n"));

        let deleted = diff_texts("old.txt", Some("bye\n"), None, 3).unwrap();
        assert_eq!(deleted.mode, DiffMode::Delete);
        assert!(deleted.render().contains("--- a/old.txt\n+++ /dev/null\n@@ -1,1 +0,0 @@\n-bye\n"));
    }

    #[test]
    fn distant_changes_split_into_two_hunks() {
        let old: String = (1..=20).map(|i| format!("{i}\n")).collect();
        let new: String = (1..=20)
            .map(|i| match i {
                2 => "two\n".to_owned(),
                19 => "nineteen\n".to_owned(),
                _ => format!("{i}\n"),
            })
            .collect();
        let diff = diff_texts("n.txt", Some(&old), Some(&new), 3).unwrap();
        assert_eq!(diff.hunks.len(), 2);
        assert_eq!(diff.hunks[0].old_start, 1);
        assert_eq!(diff.hunks[1].old_start, 16);
    }

    #[test]
    fn nearby_changes_share_a_hunk() {
        let old: String = (1..=12).map(|i| format!("{i}\n")).collect();
        let new = old.replace("3\n", "c\n").replace("9\n", "i\n");
        let diff = diff_texts("n.txt", Some(&old), Some(&new), 3).unwrap();
        assert_eq!(diff.hunks.len(), 1);
    }

    #[test]
    fn missing_trailing_newline_round_trips() {
        let diff = diff_texts("f", Some("a\nb"), Some("a\nc"), 3).unwrap();
        let text = diff.render();
        assert!(text.contains("-b\n\\ No newline at end of file\n+c\n\\ No newline at end of file\n"));
        let parsed = parse_file_diff(&raw_lines(&text)).unwrap();
        assert_eq!(parsed, diff);
    }

    #[test]
    fn parse_render_is_identity_for_rendered_text() {
        let diff = diff_texts(
            "src/Main.java",
            Some("class A {\n  int x;\n}\n"),
            Some("class A {\n  int x;\n  int y;\n}\n"),
            3,
        )
        .unwrap();
        let text = diff.render();
        let parsed = parse_file_diff(&raw_lines(&text)).unwrap();
        assert_eq!(parsed.render(), text);
    }

    #[test]
    fn parse_accepts_git_extended_headers_and_short_ranges() {
        let text = "diff --git a/x b/x\nnew file mode 100644\nindex 0000000..e69de29\n--- /dev/null\n+++ b/x\n@@ -0,0 +1 @@\n+only\n";
        let parsed = parse_file_diff(&raw_lines(text)).unwrap();
        assert_eq!(parsed.mode, DiffMode::Create);
        assert_eq!(parsed.hunks[0].new_len, 1);
        assert_eq!(parsed.hunks[0].lines, vec![HunkLine::Add("only\n".to_owned())]);
    }

    #[test]
    fn parse_rejects_short_hunk_body() {
        let text = "--- a/x\n+++ b/x\n@@ -1,3 +1,3 @@\n a\n-b\n";
        let err = parse_file_diff(&raw_lines(text)).unwrap_err();
        assert!(err.detail.contains("ends early"), "{err}");
    }

    #[test]
    fn parse_ignores_trailing_blank_lines() {
        let text = "--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n\n\n";
        let parsed = parse_file_diff(&raw_lines(text)).unwrap();
        assert_eq!(parsed.hunks.len(), 1);

        let text = "--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n\nstray\n";
        assert!(parse_file_diff(&raw_lines(text)).is_err());
    }

    #[test]
    fn parse_rejects_renames() {
        let text = "--- a/x\n+++ b/y\n";
        let err = parse_file_diff(&raw_lines(text)).unwrap_err();
        assert!(err.detail.contains("renames"));
    }

    #[test]
    fn parse_rejects_garbage_header() {
        let text = "--- a/x\n+++ b/x\n@@ nonsense\n";
        let err = parse_file_diff(&raw_lines(text)).unwrap_err();
        assert_eq!(err.line, 3);
    }
}
