use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use forkstack::Project;
use forkstack::manifest::BuildInfo;

use crate::exit;
use crate::format::OutputFormat;

#[derive(Args)]
pub struct ManifestArgs {
    /// Leaf fork to describe (default: active_fork, or the only leaf)
    #[arg(long)]
    pub fork: Option<String>,

    /// CI build number; omitted for local builds
    #[arg(long, env = "BUILD_NUMBER")]
    pub build_number: Option<u64>,

    /// Commit hash of the project repository
    #[arg(long)]
    pub commit: String,

    /// Branch name
    #[arg(long)]
    pub branch: Option<String>,

    /// Commit date
    #[arg(long)]
    pub commit_date: Option<String>,

    /// Where to write the manifest (default: inside the leaf tree)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Also print the JAR manifest attributes
    #[arg(long)]
    pub print_attributes: bool,
}

pub fn run(project: &Project, args: &ManifestArgs, format: OutputFormat) -> Result<u8> {
    let build = BuildInfo {
        build_number: args.build_number,
        commit: args.commit.clone(),
        branch: args.branch.clone(),
        commit_date: args.commit_date.clone(),
    };
    let manifest = project.manifest(args.fork.as_deref(), &build)?;
    let path = args.output.clone().unwrap_or_else(|| manifest.default_path());
    manifest.write(&path)?;
    tracing::info!(path = %path.display(), version = %manifest.implementation_version(), "manifest written");

    match format {
        OutputFormat::Json => println!("{}", format.serialize(&manifest)?),
        OutputFormat::Text => {
            println!(
                "Wrote {} ({})",
                path.display(),
                manifest.implementation_version()
            );
            if args.print_attributes {
                print!("{}", manifest.render_attributes());
            }
        }
    }
    Ok(exit::SUCCESS)
}
