// Bringing snapshots back: listing, restore, inspect.

use std::str::FromStr;

use snapkeep_common::refname::{self, BackupRef};
use thiserror::Error;

use crate::backup::cycle::Target;
use crate::git::ports::{GitError, SnapshotPorts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMethod {
    /// `git stash apply`: restores staged and unstaged state.
    #[default]
    Apply,
    /// Replay the changes into the index and working tree without committing.
    CherryPick,
}

impl RestoreMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RestoreMethod::Apply => "apply",
            RestoreMethod::CherryPick => "cherry-pick",
        }
    }
}

impl FromStr for RestoreMethod {
    type Err = RestoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "apply" => Ok(RestoreMethod::Apply),
            "cherry-pick" => Ok(RestoreMethod::CherryPick),
            other => Err(RestoreError::UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("invalid restore method `{0}` (expected `apply` or `cherry-pick`)")]
    UnknownMethod(String),
    #[error("failed to list backups: {0}")]
    Listing(#[source] GitError),
    #[error("failed to fetch {ref_name}: {source}")]
    Fetch {
        ref_name: String,
        #[source]
        source: GitError,
    },
    #[error("snapshot {0} not found locally or in the backup slot")]
    UnknownSnapshot(String),
    #[error("failed to restore snapshot: {0}")]
    Restore(#[source] GitError),
    #[error("failed to read snapshot: {0}")]
    Read(#[source] GitError),
}

/// Snapshots stored for the target's identity, narrowed to its branch unless
/// `all_branches` is set.
pub fn list_backups(
    ports: &dyn SnapshotPorts,
    target: &Target,
    all_branches: bool,
) -> Result<Vec<BackupRef>, RestoreError> {
    let location = &target.location;
    let branch = (!all_branches).then(|| location.branch());
    let pattern = refname::pattern(location.identity(), branch);
    ports.list_locations_matching(&target.remote, &pattern).map_err(RestoreError::Listing)
}

/// Every backup slot in the remote.
pub fn list_all(ports: &dyn SnapshotPorts, remote: &str) -> Result<Vec<BackupRef>, RestoreError> {
    ports.list_locations_matching(remote, &refname::all_pattern()).map_err(RestoreError::Listing)
}

/// Fetch the target slot and restore `hash` into the working tree.
pub fn restore(
    ports: &dyn SnapshotPorts,
    target: &Target,
    hash: &str,
    method: RestoreMethod,
) -> Result<(), RestoreError> {
    fetch(ports, target)?;
    if !ports.object_exists(hash) {
        return Err(RestoreError::UnknownSnapshot(hash.to_string()));
    }

    match method {
        RestoreMethod::Apply => ports.apply_snapshot(hash),
        RestoreMethod::CherryPick => ports.replay_snapshot(hash),
    }
    .map_err(RestoreError::Restore)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    pub hash: String,
    pub commit_info: String,
    pub files_changed: String,
    pub diff: Option<String>,
}

/// Describe a snapshot, fetching the target slot first when the object is
/// not available locally.
pub fn inspect(
    ports: &dyn SnapshotPorts,
    target: &Target,
    hash: &str,
    with_diff: bool,
) -> Result<Inspection, RestoreError> {
    if !ports.object_exists(hash) {
        fetch(ports, target)?;
        if !ports.object_exists(hash) {
            return Err(RestoreError::UnknownSnapshot(hash.to_string()));
        }
    }

    let commit_info = ports.commit_info(hash).map_err(RestoreError::Read)?;
    let files_changed = ports.files_changed(hash).map_err(RestoreError::Read)?;
    let diff = if with_diff { Some(ports.diff(hash).map_err(RestoreError::Read)?) } else { None };

    Ok(Inspection { hash: hash.to_string(), commit_info, files_changed, diff })
}

fn fetch(ports: &dyn SnapshotPorts, target: &Target) -> Result<(), RestoreError> {
    ports.fetch_location(&target.remote, &target.location).map_err(|source| RestoreError::Fetch {
        ref_name: target.location.ref_name(),
        source,
    })
}
