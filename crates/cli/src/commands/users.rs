// `snapkeep users`: every user with at least one backup in the remote.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use snapkeep_common::refname::users_in;
use snapkeep_daemon::backup::list_all;

use super::{RepoArgs, RepoContext};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct UsersArgs {
    #[command(flatten)]
    repo: RepoArgs,
    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsersResult {
    pub users: Vec<String>,
}

pub fn run(args: UsersArgs) -> Result<()> {
    let format = OutputFormat::detect(args.json);
    let repo = RepoContext::open(&args.repo.path)?;
    let refs = list_all(repo.ports.as_ref(), &repo.remote()?)?;

    let result = UsersResult { users: users_in(&refs) };
    output::print_output(format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &UsersResult) -> String {
    if result.users.is_empty() {
        return "No backup users found.".to_string();
    }

    let mut lines = vec!["Users with backups:".to_string(), String::new()];
    lines.extend(result.users.iter().enumerate().map(|(idx, user)| format!("{}. {user}", idx + 1)));
    lines.push(String::new());
    lines.push("To view a user's backups, run: snapkeep list --user <user>".to_string());
    lines.join("\n")
}
