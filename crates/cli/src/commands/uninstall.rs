// `snapkeep uninstall`: stop backing up a repository.

use anyhow::{Context, Result};
use clap::Args;
use snapkeep_daemon::config::{local_config_path, Registry};

use super::{absolute, RepoArgs};
use super::init::notify_daemon;

#[derive(Debug, Args)]
pub struct UninstallArgs {
    #[command(flatten)]
    repo: RepoArgs,
    /// Keep the repository's `.snapkeep.toml`.
    #[arg(long)]
    keep_config: bool,
}

pub fn run(args: UninstallArgs) -> Result<()> {
    let path = absolute(&args.repo.path)?;

    let mut registry = Registry::load().context("failed to load registry")?;
    registry.remove(&path)?;
    registry.save().context("failed to save registry")?;
    println!("Removed {} from the registry", path.display());

    let config_path = local_config_path(&path);
    if !args.keep_config && config_path.exists() {
        std::fs::remove_file(&config_path)
            .with_context(|| format!("failed to remove `{}`", config_path.display()))?;
        println!("Removed {}", config_path.display());
    }

    notify_daemon()
}
