// `snapkeep init`: configure a repository and register it with the daemon.

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use snapkeep_common::protocol::rpc_methods;
use snapkeep_common::types::ReloadReport;
use snapkeep_daemon::config::{
    local_config_path, LocalConfig, Registry, DEFAULT_INTERVAL_SECS, DEFAULT_ONLY_STAGED,
    DEFAULT_SCAN_SECRETS,
};

use super::{block_on, RepoArgs, RepoContext};
use crate::client::{DaemonClient, DaemonUnavailable};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct InitArgs {
    #[command(flatten)]
    repo: RepoArgs,
    /// Seconds between backup cycles.
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u64,
    /// Scan snapshots with gitleaks before pushing.
    #[arg(short, long, default_value_t = DEFAULT_SCAN_SECRETS, action = ArgAction::Set)]
    scan_secrets: bool,
    /// Back up staged changes only.
    #[arg(short, long, default_value_t = DEFAULT_ONLY_STAGED)]
    only_staged: bool,
}

impl InitArgs {
    fn local_config(&self) -> LocalConfig {
        LocalConfig {
            interval_secs: self.interval.max(1),
            scan_secrets: self.scan_secrets,
            only_staged: self.only_staged,
        }
    }
}

pub fn run(args: InitArgs) -> Result<()> {
    let repo = RepoContext::open(&args.repo.path)?;
    println!("Initializing snapkeep for {}", repo.path.display());

    let config = args.local_config();
    config.save(&repo.path).context("failed to save repository config")?;
    println!("Wrote {}", local_config_path(&repo.path).display());
    println!("  interval: {}s", config.interval_secs);
    println!("  scan secrets: {}", config.scan_secrets);
    println!("  only staged: {}", config.only_staged);

    let mut registry = Registry::load().context("failed to load registry")?;
    if registry.add(repo.path.clone()) {
        registry.save().context("failed to save registry")?;
        println!("Added repository to the registry");
    } else {
        println!("Repository already registered");
    }

    if !repo.global.has_credentials() {
        output::print_warning(
            OutputFormat::Human,
            "NO_CREDENTIALS",
            "no git credentials configured; pushes to HTTP remotes may prompt. \
             Run: snapkeep config set-token <token>",
        );
    }

    notify_daemon()
}

/// Ask a running daemon to pick up the registry change now.
pub(crate) fn notify_daemon() -> Result<()> {
    let client = DaemonClient::from_env()?;
    match block_on(client.call::<ReloadReport>(rpc_methods::DAEMON_RELOAD, None))? {
        Ok(report) => {
            println!("Daemon reloaded ({} repositories watched)", report.workers);
            Ok(())
        }
        Err(error) if error.downcast_ref::<DaemonUnavailable>().is_some() => {
            println!("Daemon is not running; start it with: snapkeepd");
            Ok(())
        }
        Err(error) => Err(error.context("daemon reload failed")),
    }
}
