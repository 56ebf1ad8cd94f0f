//! forkstack library crate: the fork composition and patch-stacking engine.
//!
//! The primary interface is the `forkstack` binary (`crates/forkstack-cli`).
//! This crate holds the engine so the CLI and the integration tests drive the
//! same code:
//!
//! - [`chain`] resolves a leaf fork into a root-first chain
//! - [`apply`] materializes each fork's tree from its parent plus its patches
//! - [`rediff`] regenerates a fork's patches from its edited tree
//! - [`drift`] reports trees that no longer match their inputs
//! - [`manifest`] describes the leaf tree for packaging
//!
//! [`project::Project`] ties these to a `forkstack.toml`.

pub mod apply;
pub mod chain;
pub mod config;
pub mod diff;
pub mod drift;
pub mod error;
pub mod lock;
pub mod manifest;
pub mod model;
pub mod patchfile;
pub mod project;
pub mod rediff;
pub mod snapshot;
pub mod stamp;
pub mod tree;

pub use error::{ForkError, Result};
pub use project::Project;
