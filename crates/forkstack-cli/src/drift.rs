use anyhow::Result;
use clap::Args;
use forkstack::Project;
use forkstack::drift::{DriftReport, DriftStatus};

use crate::exit;
use crate::format::OutputFormat;

#[derive(Args)]
pub struct DriftArgs {
    /// Only check chains rooted at this upstream
    #[arg(long)]
    pub upstream: Option<String>,

    /// Only check the chain ending at this fork
    #[arg(long)]
    pub fork: Option<String>,
}

pub fn run(project: &Project, args: &DriftArgs, format: OutputFormat) -> Result<u8> {
    let reports = project.drift(args.upstream.as_deref(), args.fork.as_deref())?;
    let fresh = reports.iter().all(DriftReport::is_fresh);

    match format {
        OutputFormat::Json => println!("{}", format.serialize(&reports)?),
        OutputFormat::Text => print!("{}", render(&reports)),
    }
    Ok(if fresh { exit::SUCCESS } else { exit::STALE })
}

fn render(reports: &[DriftReport]) -> String {
    let mut out = String::new();
    for report in reports {
        out.push_str(&format!("upstream {}:\n", report.upstream));
        for entry in &report.entries {
            let status = match &entry.status {
                DriftStatus::Fresh => "fresh".to_owned(),
                DriftStatus::Stale => format!(
                    "stale (built from {}, configured {})",
                    entry.recorded_revision.as_deref().unwrap_or("?"),
                    entry.configured_revision
                ),
                DriftStatus::NeverApplied => "never applied".to_owned(),
                DriftStatus::Incomplete { last } => format!("incomplete (last apply {last})"),
                DriftStatus::PatchesChanged => "patches changed".to_owned(),
                DriftStatus::ParentChanged => "parent changed".to_owned(),
            };
            out.push_str(&format!("  {}: {status}\n", entry.fork));
        }
    }
    if reports.iter().all(DriftReport::is_fresh) {
        out.push_str("All trees are fresh.\n");
    } else {
        out.push_str("Some trees are out of date. Run `forkstack apply`.\n");
    }
    out
}
