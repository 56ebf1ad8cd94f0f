//! Hunk application.
//!
//! Hunks are located by exact match of their context and removed lines. The
//! search starts at the position the header names (shifted by the offset the
//! previous hunk landed at) and walks outward; there is no fuzz factor.

use thiserror::Error;

use super::unified::{DiffMode, FileDiff, Hunk, split_lines};

/// Why a diff could not be applied.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The diff modifies or deletes a file that does not exist.
    #[error("target file does not exist")]
    TargetMissing,

    /// The diff creates a file that already exists.
    #[error("target file already exists")]
    TargetExists,

    /// A hunk's context or removed lines were not found.
    #[error("hunk #{hunk} (expected at line {line}) does not match the file")]
    HunkMismatch {
        /// 1-based hunk number within the fragment.
        hunk: usize,
        /// 1-based line number the hunk header names.
        line: usize,
    },

    /// A deletion diff left content behind.
    #[error("file does not match the content the deletion expects")]
    DeleteMismatch,
}

/// Apply `diff` to the current file content.
///
/// `current` is `None` when the file is absent. Returns the new content, or
/// `None` when the diff deletes the file.
///
/// # Errors
/// Returns [`ApplyError`] when the file's existence does not fit the diff
/// mode or when any hunk fails to match.
pub fn apply_file_diff(current: Option<&str>, diff: &FileDiff) -> Result<Option<String>, ApplyError> {
    let source = match (diff.mode, current) {
        (DiffMode::Create, Some(_)) => return Err(ApplyError::TargetExists),
        (DiffMode::Create, None) => "",
        (DiffMode::Modify | DiffMode::Delete, None) => return Err(ApplyError::TargetMissing),
        (DiffMode::Modify | DiffMode::Delete, Some(text)) => text,
    };
    let patched = apply_hunks(source, &diff.hunks)?;
    if diff.mode == DiffMode::Delete {
        if !patched.is_empty() {
            return Err(ApplyError::DeleteMismatch);
        }
        return Ok(None);
    }
    Ok(Some(patched))
}

/// Apply hunks, in order, to `source`.
///
/// # Errors
/// Returns [`ApplyError::HunkMismatch`] naming the first hunk that does not
/// match.
pub fn apply_hunks(source: &str, hunks: &[Hunk]) -> Result<String, ApplyError> {
    let src = split_lines(source);
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0usize;
    let mut drift: isize = 0;

    for (i, hunk) in hunks.iter().enumerate() {
        let expected: Vec<&str> = hunk.old_lines().collect();
        let anchor = hunk.old_index().saturating_add_signed(drift);
        let found = locate(&src, &expected, anchor, cursor).ok_or(ApplyError::HunkMismatch {
            hunk: i + 1,
            line: hunk.old_start,
        })?;

        for line in &src[cursor..found] {
            out.push_str(line);
        }
        for line in hunk.new_lines() {
            out.push_str(line);
        }
        cursor = found + expected.len();
        drift = offset(found, hunk.old_index());
    }
    for line in &src[cursor..] {
        out.push_str(line);
    }
    Ok(out)
}

#[allow(clippy::cast_possible_wrap)]
const fn offset(found: usize, expected: usize) -> isize {
    found as isize - expected as isize
}

/// Find the position nearest `anchor` (and not before `floor`) where
/// `expected` occurs verbatim in `src`.
fn locate(src: &[&str], expected: &[&str], anchor: usize, floor: usize) -> Option<usize> {
    if expected.len() > src.len() {
        return None;
    }
    let ceiling = src.len() - expected.len();
    if floor > ceiling {
        return None;
    }
    let anchor = anchor.clamp(floor, ceiling);
    let matches = |at: usize| src[at..at + expected.len()] == *expected;

    if matches(anchor) {
        return Some(anchor);
    }
    let mut step = 1;
    loop {
        let below = anchor.checked_sub(step).filter(|&p| p >= floor);
        let above = Some(anchor + step).filter(|&p| p <= ceiling);
        if below.is_none() && above.is_none() {
            return None;
        }
        if let Some(p) = below
            && matches(p)
        {
            return Some(p);
        }
        if let Some(p) = above
            && matches(p)
        {
            return Some(p);
        }
        step += 1;
    }
}
