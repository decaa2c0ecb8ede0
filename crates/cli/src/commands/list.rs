// `snapkeep list`: backups stored for one user and branch.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use snapkeep_common::refname::BackupRef;
use snapkeep_daemon::backup::list_backups;

use super::{RepoArgs, RepoContext, SlotArgs};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    repo: RepoArgs,
    #[command(flatten)]
    slot: SlotArgs,
    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub user: String,
    pub branch: String,
    pub backups: Vec<BackupRef>,
}

pub fn run(args: ListArgs) -> Result<()> {
    let format = OutputFormat::detect(args.json);
    let repo = RepoContext::open(&args.repo.path)?;
    let target = repo.target(&args.slot)?;
    let backups = list_backups(repo.ports.as_ref(), &target, false)?;

    let result = ListResult {
        user: target.location.identity().to_string(),
        branch: target.location.branch().to_string(),
        backups,
    };
    output::print_output(format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &ListResult) -> String {
    if result.backups.is_empty() {
        return format!("No backups found for {} on {}.", result.user, result.branch);
    }

    let header = format!("Backups for {} on {}:", result.user, result.branch);
    let mut lines = vec![header, String::new()];
    for backup in &result.backups {
        lines.push(format!("  {}  {}", backup.short_hash(), backup.ref_name));
    }
    lines.push(String::new());
    lines.push("To restore a backup, run: snapkeep restore <hash>".to_string());
    lines.join("\n")
}
