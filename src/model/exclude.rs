//! Path exclusion predicate for a patch set.
//!
//! Built once per patch set from the configured `excludes` list. Plain
//! entries are path prefixes (`src/minecraft` excludes that path and
//! everything under it); entries containing glob metacharacters are matched
//! with [`glob::Pattern`] against the path and each of its ancestors.

use glob::{MatchOptions, Pattern, PatternError};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled set of excluded paths, relative to a patch set root.
#[derive(Clone, Debug, Default)]
pub struct ExclusionSet {
    prefixes: Vec<String>,
    patterns: Vec<Pattern>,
    raw: Vec<String>,
}

impl ExclusionSet {
    /// Compile the configured exclusion entries.
    ///
    /// # Errors
    /// Returns [`PatternError`] if a glob entry is malformed.
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Result<Self, PatternError> {
        let mut set = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim_start_matches("./").trim_end_matches('/');
            if entry.is_empty() {
                continue;
            }
            set.raw.push(entry.to_owned());
            if entry.contains(['*', '?', '[']) {
                set.patterns.push(Pattern::new(entry)?);
            } else {
                set.prefixes.push(entry.to_owned());
            }
        }
        Ok(set)
    }

    /// An exclusion set that excludes nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing is excluded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.patterns.is_empty()
    }

    /// The entries as configured (normalized).
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.raw
    }

    /// Returns `true` if `rel` (a `/`-separated relative path) is excluded.
    #[must_use]
    pub fn is_excluded(&self, rel: &str) -> bool {
        if self.prefixes.iter().any(|p| {
            rel == p || (rel.len() > p.len() && rel.starts_with(p.as_str()) && rel.as_bytes()[p.len()] == b'/')
        }) {
            return true;
        }
        if self.patterns.is_empty() {
            return false;
        }
        ancestors(rel).any(|candidate| {
            self.patterns
                .iter()
                .any(|p| p.matches_with(candidate, MATCH_OPTIONS))
        })
    }
}

/// `a/b/c` yields `a/b/c`, `a/b`, `a`.
fn ancestors(rel: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(rel);
    std::iter::from_fn(move || {
        let current = next?;
        next = current.rfind('/').map(|i| &current[..i]);
        Some(current)
    })
}
