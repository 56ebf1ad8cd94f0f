use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use forkstack::Project;

use crate::format::OutputFormat;

mod apply;
mod chain;
mod drift;
mod exit;
mod format;
mod manifest;
mod rediff;
mod telemetry;

/// Fork composition and patch-stacking engine
///
/// forkstack maintains a chain of source forks as stacks of patches. Each
/// fork's tree is its parent's tree with the fork's patches applied, and the
/// chain ends at a pinned upstream snapshot.
///
/// WORKFLOW:
///
///   1. Describe upstreams and forks in forkstack.toml
///   2. Materialize the chain: forkstack apply
///   3. Edit files under a fork's output directory
///   4. Turn the edits back into patches: forkstack rediff <fork>
///   5. After bumping an upstream revision: forkstack drift
///
/// EXIT CODES:
///
///   0 success, 1 unexpected or I/O error, 2 configuration or resolution
///   error, 3 a patch failed to apply or parse, 4 stale or missing trees,
///   5 cancelled, 6 rediff found untracked additions
#[derive(Parser)]
#[command(name = "forkstack")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'forkstack <command> --help' for more information on a specific command.")]
struct Cli {
    /// Project configuration file
    #[arg(long, global = true, env = "FORKSTACK_CONFIG", default_value = "forkstack.toml")]
    config: PathBuf,

    /// Output format: text or json
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Materialize every tree of a fork chain
    ///
    /// Copies the upstream snapshot, then applies each fork's patches in
    /// order. Every output directory is wiped and rebuilt.
    Apply(apply::ApplyArgs),

    /// Regenerate a fork's patches from its edited output tree
    Rediff(rediff::RediffArgs),

    /// Report trees that no longer match their upstream revision or patches
    Drift(drift::DriftArgs),

    /// Print the resolved fork chain, root first
    Chain(chain::ChainArgs),

    /// Write the build manifest for the packaged leaf tree
    Manifest(manifest::ManifestArgs),
}

fn main() -> ExitCode {
    telemetry::init();
    let cli = Cli::parse();
    let format = cli.format;

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::debug!(error = %format!("{err:#}"), "command failed");
            exit::report(&err, format);
            ExitCode::from(exit::code_for(&err))
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let project = Project::open(&cli.config)?;
    match cli.command {
        Commands::Apply(args) => apply::run(&project, &args, cli.format),
        Commands::Rediff(args) => rediff::run(&project, &args, cli.format),
        Commands::Drift(args) => drift::run(&project, &args, cli.format),
        Commands::Chain(args) => chain::run(&project, &args, cli.format),
        Commands::Manifest(args) => manifest::run(&project, &args, cli.format),
    }
}
