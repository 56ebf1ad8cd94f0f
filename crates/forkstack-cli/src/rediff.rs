use anyhow::Result;
use chrono::Local;
use clap::Args;
use forkstack::Project;
use forkstack::model::patch::FragmentMeta;
use forkstack::rediff::{RediffOutcome, RediffReport};

use crate::exit;
use crate::format::OutputFormat;

#[derive(Args)]
pub struct RediffArgs {
    /// Fork whose output tree was edited
    pub fork: String,

    /// Create units for files that exist only in the output tree
    #[arg(long)]
    pub track_additions: bool,

    /// Report what would change without writing patch files
    #[arg(long)]
    pub dry_run: bool,

    /// Title for rewritten and new fragments
    #[arg(long, requires_all = ["author_name", "author_email"])]
    pub title: Option<String>,

    /// Author name for rewritten and new fragments
    #[arg(long, requires = "title")]
    pub author_name: Option<String>,

    /// Author email for rewritten and new fragments
    #[arg(long, requires = "title")]
    pub author_email: Option<String>,
}

impl RediffArgs {
    fn metadata(&self) -> Option<FragmentMeta> {
        match (&self.title, &self.author_name, &self.author_email) {
            (Some(title), Some(name), Some(email)) => Some(FragmentMeta::new(
                title.as_str(),
                name.as_str(),
                email.as_str(),
                Local::now().fixed_offset(),
            )),
            _ => None,
        }
    }
}

pub fn run(project: &Project, args: &RediffArgs, format: OutputFormat) -> Result<u8> {
    let mut options = project.rediff_options();
    options.track_additions = args.track_additions;
    options.dry_run = args.dry_run;
    options.metadata = args.metadata();

    let report = project.rediff(&args.fork, &options)?;

    match format {
        OutputFormat::Json => println!("{}", format.serialize(&report)?),
        OutputFormat::Text => print!("{}", render(&report)),
    }

    if let Err(e) = report.ensure_no_untracked() {
        if !format.is_json() {
            eprintln!("error: {e}");
        }
        return Ok(exit::UNTRACKED);
    }
    Ok(exit::SUCCESS)
}

fn render(report: &RediffReport) -> String {
    let mut out = String::new();
    for set in &report.patch_sets {
        if set.entries.is_empty() {
            continue;
        }
        out.push_str(&format!("{}:\n", set.label));
        for entry in &set.entries {
            let what = match &entry.outcome {
                RediffOutcome::Updated {
                    fragment_dropped: false,
                } => "updated",
                RediffOutcome::Updated {
                    fragment_dropped: true,
                } => "last fragment dropped",
                RediffOutcome::Added {
                    needs_metadata: true,
                } => "added (needs a title)",
                RediffOutcome::Added {
                    needs_metadata: false,
                } => "added",
                RediffOutcome::Removed => "removed",
                RediffOutcome::UntrackedAddition => "untracked",
            };
            out.push_str(&format!("  {}: {what}\n", entry.path));
        }
    }
    if !report.has_changes() {
        out.push_str(&format!("Patches of '{}' are up to date.\n", report.fork));
    } else if report.dry_run {
        out.push_str("Dry run: no patch files written.\n");
    }
    out
}
