use anyhow::Result;
use clap::Args;
use forkstack::Project;
use forkstack::apply::ApplyReport;

use crate::exit;
use crate::format::OutputFormat;

#[derive(Args)]
pub struct ApplyArgs {
    /// Leaf fork of the chain (default: active_fork, or the only leaf)
    #[arg(long)]
    pub fork: Option<String>,

    /// Apply patch sets one at a time instead of in parallel
    #[arg(long)]
    pub sequential: bool,
}

pub fn run(project: &Project, args: &ApplyArgs, format: OutputFormat) -> Result<u8> {
    let mut options = project.apply_options();
    if args.sequential {
        options.parallel = false;
    }
    let report = project.apply(args.fork.as_deref(), &options)?;

    match format {
        OutputFormat::Json => println!("{}", format.serialize(&report)?),
        OutputFormat::Text => print!("{}", render(&report)),
    }
    Ok(exit::SUCCESS)
}

fn render(report: &ApplyReport) -> String {
    let mut out = format!(
        "upstream {} @ {}\n",
        report.upstream, report.revision
    );
    for node in &report.nodes {
        out.push_str(&format!("  {} -> {}\n", node.fork, node.output_dir.display()));
        for set in &node.patch_sets {
            out.push_str(&format!(
                "    {}: {} file(s) copied, {} fragment(s) applied to {} file(s)\n",
                set.label, set.files_copied, set.fragments_applied, set.units
            ));
        }
    }
    out.push_str(&format!(
        "Applied {} fragment(s) across {} fork(s).\n",
        report.fragments_applied(),
        report.nodes.len()
    ));
    out
}
