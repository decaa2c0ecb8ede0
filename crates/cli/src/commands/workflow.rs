// `snapkeep workflow`: write a GitHub Actions workflow that prunes old backup refs.
//
// Each slot holds only the latest snapshot, so pruning by age removes slots
// whose owner stopped working on that branch.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use super::{RepoArgs, RepoContext};
use crate::exit_code::UsageError;

pub const DEFAULT_CRON: &str = "0 2 * * 0";
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
const WORKFLOW_FILE: &str = "snapkeep-prune.yml";

#[derive(Debug, Args)]
pub struct WorkflowArgs {
    #[command(flatten)]
    repo: RepoArgs,
    /// Cron schedule for the workflow.
    #[arg(short, long, default_value = DEFAULT_CRON)]
    cron: String,
    /// Delete backups older than this many days.
    #[arg(short, long, default_value_t = DEFAULT_RETENTION_DAYS)]
    retention_days: u32,
}

pub fn run(args: WorkflowArgs) -> Result<()> {
    if args.cron.split_whitespace().count() != 5 {
        let message = format!("`{}` is not a five-field cron expression", args.cron);
        return Err(UsageError(message).into());
    }
    if args.retention_days == 0 {
        return Err(UsageError("retention must be at least one day".to_string()).into());
    }

    let repo = RepoContext::open(&args.repo.path)?;
    let path = write_workflow(&repo.path, &args.cron, args.retention_days)?;

    println!("Created {}", path.display());
    println!("  schedule:  {} ({})", args.cron, describe_cron(&args.cron));
    println!("  retention: {} days", args.retention_days);
    println!();
    println!("Commit and push the file to enable it.");
    println!("It can also be run by hand from the Actions tab.");
    Ok(())
}

fn write_workflow(repo_path: &Path, cron: &str, retention_days: u32) -> Result<PathBuf> {
    let dir = repo_path.join(".github").join("workflows");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create `{}`", dir.display()))?;
    let path = dir.join(WORKFLOW_FILE);
    std::fs::write(&path, render_workflow(cron, retention_days))
        .with_context(|| format!("failed to write `{}`", path.display()))?;
    Ok(path)
}

fn describe_cron(cron: &str) -> &'static str {
    match cron {
        "0 2 * * 0" => "weekly at 02:00 on Sunday",
        "0 2 * * 1" => "weekly at 02:00 on Monday",
        "0 2 * * *" => "daily at 02:00",
        "0 */6 * * *" => "every 6 hours",
        "0 0 1 * *" => "monthly on the 1st at midnight",
        _ => "custom schedule",
    }
}

fn render_workflow(cron: &str, retention_days: u32) -> String {
    let description = describe_cron(cron);
    format!(
        r####"name: Prune snapkeep backups

on:
  schedule:
    # {description}
    - cron: '{cron}'
  workflow_dispatch:
    inputs:
      retention_days:
        description: 'Number of days to keep backups'
        required: false
        default: '{retention_days}'
        type: number

jobs:
  prune:
    runs-on: ubuntu-latest
    steps:
      - name: Checkout repository
        uses: actions/checkout@v4
        with:
          fetch-depth: 0

      - name: Prune old backup refs
        env:
          RETENTION_DAYS: ${{{{ inputs.retention_days || {retention_days} }}}}
        run: |
          set -e
          CUTOFF=$(date -d "$RETENTION_DAYS days ago" +%s)
          echo "Pruning backup refs older than $RETENTION_DAYS days"

          git fetch origin '+refs/backups/*:refs/backups/*' || true

          TOTAL=0
          DELETED=0
          while read -r ref timestamp; do
            [ -z "$ref" ] && continue
            TOTAL=$((TOTAL + 1))
            if [ "$timestamp" -lt "$CUTOFF" ]; then
              echo "Deleting $ref ($(date -d "@$timestamp"))"
              git push origin --delete "$ref" || echo "warning: failed to delete $ref"
              git update-ref -d "$ref" || true
              DELETED=$((DELETED + 1))
            fi
          done < <(git for-each-ref --format='%(refname) %(committerdate:unix)' refs/backups/)

          echo "Backup refs: $TOTAL, deleted: $DELETED"
          echo "### snapkeep prune: deleted $DELETED of $TOTAL refs" >> "$GITHUB_STEP_SUMMARY"
"####
    )
}
