// One backup cycle: detect, capture, scan, locate, push.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use snapkeep_common::identity::resolve_identity;
use snapkeep_common::refname::{BackupLocation, RefNameError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{GlobalConfig, GlobalConfigSource, LocalConfig};
use crate::git::ports::{GitError, PortsFactory, SnapshotPorts};
use crate::scan::{ScanError, SecretGate};

/// Collaborators a cycle needs. Cheap to clone; shared by every worker.
#[derive(Clone)]
pub struct CycleDeps {
    pub ports: Arc<dyn PortsFactory>,
    pub gate: Arc<dyn SecretGate>,
    pub global_config: Arc<dyn GlobalConfigSource>,
}

impl CycleDeps {
    pub fn new(
        ports: Arc<dyn PortsFactory>,
        gate: Arc<dyn SecretGate>,
        global_config: Arc<dyn GlobalConfigSource>,
    ) -> Self {
        Self { ports, gate, global_config }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NothingToBackUp,
    /// The scanner flagged the snapshot; nothing was pushed.
    SecretsDetected { report: String },
    Pushed { hash: String, location: BackupLocation, scan_skipped: bool },
}

impl CycleOutcome {
    /// Short label used in worker status reports.
    pub fn summary(&self) -> String {
        match self {
            CycleOutcome::NothingToBackUp => "nothing to back up".to_string(),
            CycleOutcome::SecretsDetected { .. } => "secrets detected, push skipped".to_string(),
            CycleOutcome::Pushed { hash, location, .. } => {
                format!("pushed {} to {}", short(hash), location.ref_name())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),
    #[error("failed to read repository status: {0}")]
    Status(#[source] GitError),
    #[error("failed to capture snapshot: {0}")]
    Capture(#[source] GitError),
    #[error("secret scan failed: {0}")]
    Scan(#[source] ScanError),
    #[error(
        "could not determine a user identity; \
         set `git config user.name` or `snapkeep config set-user`"
    )]
    MissingIdentity,
    #[error("failed to determine current branch: {0}")]
    Branch(#[source] GitError),
    #[error("no remote configured")]
    NoRemote,
    #[error("failed to determine remote: {0}")]
    Remote(#[source] GitError),
    #[error("invalid backup location: {0}")]
    Location(#[from] RefNameError),
    #[error("failed to push snapshot: {0}")]
    Transport(#[source] GitError),
}

/// Where backups for the current (identity, branch) live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub remote: String,
    pub location: BackupLocation,
}

/// Identity for this operator in this repository, computed fresh each call.
pub fn current_identity(ports: &dyn SnapshotPorts, global: &GlobalConfig) -> String {
    let name = ports.committer_name().unwrap_or_default();
    let email = ports.committer_email().unwrap_or_default();
    resolve_identity(global.identity_override(), &name, &email)
}

/// Resolve the remote and slot, with optional explicit user/branch.
pub fn locate(
    ports: &dyn SnapshotPorts,
    global: &GlobalConfig,
    user: Option<&str>,
    branch: Option<&str>,
) -> Result<Target, CycleError> {
    let identity = match user.map(str::trim).filter(|u| !u.is_empty()) {
        Some(user) => user.to_string(),
        None => current_identity(ports, global),
    };
    if identity.is_empty() {
        return Err(CycleError::MissingIdentity);
    }

    let branch = match branch.map(str::trim).filter(|b| !b.is_empty()) {
        Some(branch) => branch.to_string(),
        None => ports.current_branch().map_err(CycleError::Branch)?,
    };

    let remote = ports.default_remote().map_err(|error| match error {
        GitError::NoRemote => CycleError::NoRemote,
        other => CycleError::Remote(other),
    })?;

    let location = BackupLocation::new(&identity, &branch)?;
    Ok(Target { remote, location })
}

/// Run one cycle against `repo_path` with the given repository config.
///
/// Never retries. A failure aborts this cycle only.
pub fn run_cycle(
    repo_path: &Path,
    config: &LocalConfig,
    deps: &CycleDeps,
) -> Result<CycleOutcome, CycleError> {
    let ports = deps.ports.open(repo_path);

    if !ports.is_repository() {
        return Err(CycleError::NotARepository(repo_path.to_path_buf()));
    }

    if !ports.has_local_changes().map_err(CycleError::Status)? {
        return Ok(CycleOutcome::NothingToBackUp);
    }

    let hash = ports.capture_snapshot(config.only_staged).map_err(CycleError::Capture)?;
    debug!(repo = %repo_path.display(), hash = %hash, "snapshot captured");

    let mut scan_skipped = false;
    if config.scan_secrets {
        if deps.gate.is_available() {
            let diff = ports.diff(&hash).map_err(CycleError::Capture)?;
            let verdict = deps.gate.scan(&diff).map_err(CycleError::Scan)?;
            if verdict.secrets_found {
                return Ok(CycleOutcome::SecretsDetected { report: verdict.report });
            }
        } else {
            scan_skipped = true;
        }
    }

    let global = deps.global_config.load();
    let target = locate(ports.as_ref(), &global, None, None)?;

    ports
        .push_to_location(&hash, &target.location, &target.remote)
        .map_err(CycleError::Transport)?;

    Ok(CycleOutcome::Pushed { hash, location: target.location, scan_skipped })
}

/// Load the repository config for a cycle, falling back to defaults (with
/// a warning) when the file cannot be parsed.
pub fn load_config_or_default(repo_path: &Path) -> LocalConfig {
    match LocalConfig::load(repo_path) {
        Ok(config) => config,
        Err(error) => {
            warn!(repo = %repo_path.display(), %error, "invalid repository config, using defaults");
            LocalConfig::default()
        }
    }
}

/// Log a cycle result. Nothing past this point sees the error.
pub fn log_cycle_result(repo_path: &Path, result: &Result<CycleOutcome, CycleError>) {
    let repo = repo_path.display();
    match result {
        Ok(CycleOutcome::NothingToBackUp) => {
            debug!(repo = %repo, "no changes to back up");
        }
        Ok(CycleOutcome::SecretsDetected { report }) => {
            warn!(repo = %repo, report = %report.trim(), "secrets detected, backup skipped");
        }
        Ok(CycleOutcome::Pushed { hash, location, scan_skipped }) => {
            if *scan_skipped {
                warn!(repo = %repo, "gitleaks not found, snapshot pushed without a secret scan");
            }
            info!(
                repo = %repo,
                hash = %short(hash),
                location = %location,
                "backup pushed"
            );
        }
        // Changes vanished between the status check and the capture, or
        // only unstaged changes exist in staged-only mode.
        Err(CycleError::Capture(GitError::NoChanges)) => {
            debug!(repo = %repo, "nothing captured");
        }
        Err(error) => {
            warn!(repo = %repo, %error, "backup cycle failed");
        }
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
