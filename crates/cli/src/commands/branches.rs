// `snapkeep branches`: branches that hold backups for one user.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use snapkeep_common::refname::branches_in;
use snapkeep_daemon::backup::{current_identity, list_all, CycleError};

use super::{RepoArgs, RepoContext};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct BranchesArgs {
    #[command(flatten)]
    repo: RepoArgs,
    /// User identifier (defaults to the current user's).
    #[arg(long)]
    user: Option<String>,
    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchesResult {
    pub user: String,
    pub branches: Vec<String>,
}

pub fn run(args: BranchesArgs) -> Result<()> {
    let format = OutputFormat::detect(args.json);
    let repo = RepoContext::open(&args.repo.path)?;

    let user = match args.user.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(user) => user.to_string(),
        None => current_identity(repo.ports.as_ref(), &repo.global),
    };
    if user.is_empty() {
        return Err(CycleError::MissingIdentity.into());
    }

    let refs = list_all(repo.ports.as_ref(), &repo.remote()?)?;
    let result = BranchesResult { branches: branches_in(&refs, &user), user };
    output::print_output(format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &BranchesResult) -> String {
    if result.branches.is_empty() {
        return format!("No backups found for {}.", result.user);
    }

    let mut lines = vec![format!("Branches with backups for {}:", result.user), String::new()];
    for (idx, branch) in result.branches.iter().enumerate() {
        lines.push(format!("{}. {}", idx + 1, branch));
    }
    lines.push(String::new());
    lines.push("To view a branch's backups, run: snapkeep list --branch <branch>".to_string());
    lines.join("\n")
}
