use anyhow::Result;
use clap::Args;
use forkstack::Project;
use forkstack::chain::ChainSummary;

use crate::exit;
use crate::format::OutputFormat;

#[derive(Args)]
pub struct ChainArgs {
    /// Leaf fork of the chain (default: active_fork, or the only leaf)
    #[arg(long)]
    pub fork: Option<String>,
}

pub fn run(project: &Project, args: &ChainArgs, format: OutputFormat) -> Result<u8> {
    let summary = project.chain(args.fork.as_deref())?.summary();
    match format {
        OutputFormat::Json => println!("{}", format.serialize(&summary)?),
        OutputFormat::Text => print!("{}", render(&summary)),
    }
    Ok(exit::SUCCESS)
}

fn render(summary: &ChainSummary) -> String {
    let mut out = format!(
        "upstream {} ({} @ {})\n",
        summary.upstream, summary.repo, summary.revision
    );
    for (i, fork) in summary.forks.iter().enumerate() {
        let sets = if fork.patch_sets.is_empty() {
            "no patch sets".to_owned()
        } else {
            fork.patch_sets.join(", ")
        };
        out.push_str(&format!(
            "  {}. {} -> {} [{sets}]\n",
            i + 1,
            fork.name,
            fork.output_dir
        ));
    }
    out
}
