// CLI subcommand dispatch.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use snapkeep_daemon::backup::{locate, CycleError, Target};
use snapkeep_daemon::config::{FileGlobalConfig, GlobalConfig, GlobalConfigSource};
use snapkeep_daemon::git::{GitCliFactory, GitError, PortsFactory, SnapshotPorts};

pub mod backup;
pub mod branches;
pub mod check;
pub mod config;
pub mod init;
pub mod inspect;
pub mod list;
pub mod restore;
pub mod status;
pub mod uninstall;
pub mod users;
pub mod workflow;

#[derive(Subcommand)]
pub enum Command {
    /// Start backing up a repository
    Init(init::InitArgs),
    /// Stop backing up a repository
    Uninstall(uninstall::UninstallArgs),
    /// Run one backup cycle now
    Backup(backup::BackupArgs),
    /// List backups for the current user and branch
    List(list::ListArgs),
    /// List branches that have backups
    Branches(branches::BranchesArgs),
    /// List users that have backups
    Users(users::UsersArgs),
    /// Restore a backup into the working tree
    Restore(restore::RestoreArgs),
    /// Show what a backup contains
    Inspect(inspect::InspectArgs),
    /// Validate a repository's backup setup
    Check(check::CheckArgs),
    /// Show the daemon's workers
    Status(status::StatusArgs),
    /// Manage global settings
    #[command(subcommand)]
    Config(config::ConfigCommand),
    /// Write a GitHub Actions workflow that prunes old backups
    Workflow(workflow::WorkflowArgs),
}

impl Command {
    /// Whether the user asked for JSON output.
    pub fn json_requested(&self) -> bool {
        match self {
            Command::Backup(args) => args.json,
            Command::List(args) => args.json,
            Command::Branches(args) => args.json,
            Command::Users(args) => args.json,
            Command::Inspect(args) => args.json,
            Command::Check(args) => args.json,
            Command::Status(args) => args.json,
            Command::Config(config::ConfigCommand::Show(args)) => args.json,
            _ => false,
        }
    }
}

pub fn run(cmd: Command) -> Result<()> {
    match cmd {
        Command::Init(args) => init::run(args),
        Command::Uninstall(args) => uninstall::run(args),
        Command::Backup(args) => backup::run(args),
        Command::List(args) => list::run(args),
        Command::Branches(args) => branches::run(args),
        Command::Users(args) => users::run(args),
        Command::Restore(args) => restore::run(args),
        Command::Inspect(args) => inspect::run(args),
        Command::Check(args) => check::run(args),
        Command::Status(args) => status::run(args),
        Command::Config(cmd) => config::run(cmd),
        Command::Workflow(args) => workflow::run(args),
    }
}

// ── Shared arguments ───────────────────────────────────────────────

#[derive(Debug, Clone, Args)]
pub struct RepoArgs {
    /// Path to the repository.
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,
}

/// Explicit owner of the backups to look at.
#[derive(Debug, Clone, Args)]
pub struct SlotArgs {
    /// User identifier (defaults to the current user's).
    #[arg(long)]
    pub user: Option<String>,
    /// Branch (defaults to the current branch).
    #[arg(long)]
    pub branch: Option<String>,
}

// ── Repository context ─────────────────────────────────────────────

/// An opened working copy plus the global config it is read with.
pub struct RepoContext {
    pub path: PathBuf,
    pub ports: Box<dyn SnapshotPorts>,
    pub global: GlobalConfig,
}

impl RepoContext {
    /// Open `path`, failing with `NotARepository` when it is not a git work tree.
    pub fn open(path: &Path) -> Result<Self> {
        let path = absolute(path)?;
        let source = Arc::new(FileGlobalConfig::from_env());
        let global = source.load();
        let ports = GitCliFactory::new(source).open(&path);
        if !ports.is_repository() {
            return Err(CycleError::NotARepository(path).into());
        }
        Ok(Self { path, ports, global })
    }

    pub fn target(&self, slot: &SlotArgs) -> Result<Target> {
        locate(self.ports.as_ref(), &self.global, slot.user.as_deref(), slot.branch.as_deref())
            .context("failed to resolve backup location")
    }

    pub fn remote(&self) -> Result<String> {
        self.ports.default_remote().map_err(|error| {
            match error {
                GitError::NoRemote => CycleError::NoRemote,
                other => CycleError::Remote(other),
            }
            .into()
        })
    }
}

pub fn absolute(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("failed to resolve `{}`", path.display()))
}

/// Run a future on a fresh current-thread runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}
