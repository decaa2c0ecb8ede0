// `snapkeep restore`: bring a backup back into the working tree.

use anyhow::{Context, Result};
use clap::Args;
use snapkeep_daemon::backup::{restore, RestoreMethod};

use super::{RepoArgs, RepoContext, SlotArgs};

#[derive(Debug, Args)]
pub struct RestoreArgs {
    /// Hash of the backup to restore (see `snapkeep list`).
    hash: String,
    /// `apply` restores staged and unstaged state; `cherry-pick` stages the
    /// changes without committing.
    #[arg(short, long, default_value = "apply")]
    method: RestoreMethod,
    #[command(flatten)]
    repo: RepoArgs,
    #[command(flatten)]
    slot: SlotArgs,
}

pub fn run(args: RestoreArgs) -> Result<()> {
    let repo = RepoContext::open(&args.repo.path)?;
    let target = repo.target(&args.slot)?;

    println!("Fetching {}...", target.location.ref_name());
    restore(repo.ports.as_ref(), &target, &args.hash, args.method)
        .with_context(|| format!("failed to restore {}", args.hash))?;

    println!("{}", success_message(args.method));
    Ok(())
}

fn success_message(method: RestoreMethod) -> &'static str {
    match method {
        RestoreMethod::Apply => "Backup applied to the working tree.",
        RestoreMethod::CherryPick => {
            "Changes replayed into the index (not committed). Review them and commit when ready."
        }
    }
}
