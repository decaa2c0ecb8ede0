// Snapshot ports: the version-control primitives the backup core consumes.
//
// Every call is synchronous and may block on the network. The core never
// retries; a failure aborts the current cycle only.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

use snapkeep_common::refname::{BackupLocation, BackupRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    /// Nothing to capture (clean tree, or changes vanished since the check).
    NoChanges,
    /// The repository has no remote to push to.
    NoRemote,
    SpawnFailed { command: String, message: String },
    CommandFailed { command: String, code: Option<i32>, stderr: String },
}

impl Display for GitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitError::NoChanges => write!(f, "no changes to capture"),
            GitError::NoRemote => write!(f, "no remotes configured"),
            GitError::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            GitError::CommandFailed { command, code, stderr } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, stderr.trim())
            }
        }
    }
}

impl Error for GitError {}

pub type GitResult<T> = Result<T, GitError>;

/// Operations on one working copy and its remote.
pub trait SnapshotPorts: Send {
    // ── Repository queries ──────────────────────────────────────────

    fn is_repository(&self) -> bool;

    fn committer_name(&self) -> GitResult<String>;

    fn committer_email(&self) -> GitResult<String>;

    fn current_branch(&self) -> GitResult<String>;

    /// Preferred remote: `origin` when present, else the first one listed.
    fn default_remote(&self) -> GitResult<String>;

    // ── Capture ─────────────────────────────────────────────────────

    /// Uncommitted changes to tracked files exist.
    fn has_local_changes(&self) -> GitResult<bool>;

    /// Create a snapshot object without touching the working tree.
    /// Fails with [`GitError::NoChanges`] when there is nothing to capture.
    fn capture_snapshot(&self, staged_only: bool) -> GitResult<String>;

    fn diff(&self, hash: &str) -> GitResult<String>;

    // ── Remote slots ────────────────────────────────────────────────

    fn push_to_location(&self, hash: &str, location: &BackupLocation, remote: &str)
        -> GitResult<()>;

    fn fetch_location(&self, remote: &str, location: &BackupLocation) -> GitResult<()>;

    fn list_locations_matching(&self, remote: &str, pattern: &str) -> GitResult<Vec<BackupRef>>;

    // ── Restore / inspect ───────────────────────────────────────────

    /// Apply the snapshot to the working tree as a stash.
    fn apply_snapshot(&self, hash: &str) -> GitResult<()>;

    /// Replay the snapshot's changes without committing.
    fn replay_snapshot(&self, hash: &str) -> GitResult<()>;

    fn object_exists(&self, hash: &str) -> bool;

    fn commit_info(&self, hash: &str) -> GitResult<String>;

    fn files_changed(&self, hash: &str) -> GitResult<String>;
}

/// Opens [`SnapshotPorts`] for a repository path.
pub trait PortsFactory: Send + Sync {
    fn open(&self, repo_path: &Path) -> Box<dyn SnapshotPorts>;
}
