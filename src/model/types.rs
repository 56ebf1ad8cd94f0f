//! Core naming and reference types.
//!
//! Foundation types used throughout forkstack: fork names, upstream names,
//! patch set labels, upstream references, and the parent link of a fork node.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// The maximum length of any configured name.
pub const MAX_NAME_LEN: usize = 64;

fn validate_name(kind: ErrorKind, s: &str) -> Result<(), ValidationError> {
    let fail = |reason: String| ValidationError {
        kind,
        value: s.to_owned(),
        reason,
    };
    if s.is_empty() {
        return Err(fail("name must not be empty".to_owned()));
    }
    if s.len() > MAX_NAME_LEN {
        return Err(fail(format!(
            "name must be at most {MAX_NAME_LEN} characters, got {}",
            s.len()
        )));
    }
    if s.starts_with('-') {
        return Err(fail("name must not start with a hyphen".to_owned()));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(fail(
            "name must contain only ASCII letters, digits, hyphens (-) and underscores (_)"
                .to_owned(),
        ));
    }
    Ok(())
}

macro_rules! name_type {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a new name, validating its format.
            ///
            /// # Errors
            /// Returns an error if the name is empty, too long, or contains
            /// characters outside `[A-Za-z0-9_-]`.
            pub fn new(s: &str) -> Result<Self, ValidationError> {
                validate_name($kind, s)?;
                Ok(Self(s.to_owned()))
            }

            /// Return the name as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                validate_name($kind, &s)?;
                Ok(Self(s))
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> Self {
                name.0
            }
        }
    };
}

name_type!(
    /// The name of one tier in the fork chain (e.g. `leaf`, `nycticorax`).
    ForkName,
    ErrorKind::ForkName
);

name_type!(
    /// The name of a configured upstream source snapshot (e.g. `paper`).
    UpstreamName,
    ErrorKind::UpstreamName
);

name_type!(
    /// The source-root label of a patch set (e.g. `paperServer`).
    SetLabel,
    ErrorKind::SetLabel
);

// ---------------------------------------------------------------------------
// UpstreamRef
// ---------------------------------------------------------------------------

/// A base source snapshot: repository identity plus a resolved revision.
///
/// Once constructed the revision is concrete; property-file indirection is
/// resolved by the configuration loader before an `UpstreamRef` exists.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpstreamRef {
    /// Configured name of the upstream.
    pub name: UpstreamName,
    /// Repository identity (e.g. `PaperMC/Paper`). Opaque to the engine.
    pub repo: String,
    /// Tag, branch, or commit hash.
    pub revision: String,
}

impl UpstreamRef {
    /// Create a new upstream reference.
    #[must_use]
    pub const fn new(name: UpstreamName, repo: String, revision: String) -> Self {
        Self {
            name,
            repo,
            revision,
        }
    }
}

impl fmt::Display for UpstreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}@{})", self.name, self.repo, self.revision)
    }
}

// ---------------------------------------------------------------------------
// ParentRef
// ---------------------------------------------------------------------------

/// What a fork node is layered on top of.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParentRef {
    /// The node patches a raw upstream snapshot (root of a chain).
    Upstream(UpstreamName),
    /// The node patches another fork's materialized tree.
    Fork(ForkName),
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream(name) => write!(f, "upstream '{name}'"),
            Self::Fork(name) => write!(f, "fork '{name}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Which kind of value failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`ForkName`].
    ForkName,
    /// An [`UpstreamName`].
    UpstreamName,
    /// A [`SetLabel`].
    SetLabel,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForkName => write!(f, "fork name"),
            Self::UpstreamName => write!(f, "upstream name"),
            Self::SetLabel => write!(f, "patch set label"),
        }
    }
}

/// Error returned when a name fails validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
