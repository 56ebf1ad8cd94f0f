//! Line diffs: computing, rendering, parsing and applying unified diffs.
//!
//! The engine treats files as opaque text. A diff is computed line-by-line
//! with [`myers::diff`], grouped into hunks with surrounding context, and
//! applied by exact context match (no fuzz).

pub mod apply;
pub mod myers;
pub mod unified;

pub use apply::{ApplyError, apply_file_diff};
pub use unified::{
    DEFAULT_CONTEXT, DiffMode, DiffParseError, FileDiff, Hunk, HunkLine, diff_texts,
    parse_file_diff,
};
