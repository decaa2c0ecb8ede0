// Consistent exit codes for the snapkeep CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   10 = daemon not reachable
//   13 = network error
//   20 = not a git repository
//   21 = secrets detected, nothing pushed

use std::fmt;
use std::process;

use snapkeep_daemon::backup::{CycleError, RestoreError};

use crate::client::{DaemonUnavailable, RemoteError};

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    DaemonDown = 10,
    Network = 13,
    NotARepository = 20,
    SecretsDetected = 21,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.downcast_ref::<DaemonUnavailable>().is_some() {
                return Self::DaemonDown;
            }
            if cause.downcast_ref::<SecretsDetected>().is_some() {
                return Self::SecretsDetected;
            }
            if cause.downcast_ref::<UsageError>().is_some() {
                return Self::Usage;
            }
            if let Some(cycle) = cause.downcast_ref::<CycleError>() {
                return Self::from_cycle_error(cycle);
            }
            if let Some(restore) = cause.downcast_ref::<RestoreError>() {
                return Self::from_restore_error(restore);
            }
            if let Some(remote) = cause.downcast_ref::<RemoteError>() {
                return Self::from_rpc_code(remote.code);
            }
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                return match io_err.kind() {
                    std::io::ErrorKind::TimedOut => Self::Network,
                    _ => Self::Error,
                };
            }
        }

        Self::Error
    }

    fn from_cycle_error(error: &CycleError) -> Self {
        match error {
            CycleError::NotARepository(_) => Self::NotARepository,
            CycleError::Transport(_) => Self::Network,
            _ => Self::Error,
        }
    }

    fn from_restore_error(error: &RestoreError) -> Self {
        match error {
            RestoreError::UnknownMethod(_) => Self::Usage,
            RestoreError::Listing(_) | RestoreError::Fetch { .. } => Self::Network,
            _ => Self::Error,
        }
    }

    /// Map a JSON-RPC error code from the daemon to an exit code.
    pub fn from_rpc_code(code: i32) -> Self {
        use snapkeep_common::protocol::jsonrpc::{INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND};

        match code {
            INVALID_REQUEST | INVALID_PARAMS | METHOD_NOT_FOUND => Self::Usage,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

/// Returned by `snapkeep backup` when the scanner flagged the snapshot.
#[derive(Debug)]
pub struct SecretsDetected {
    pub report: String,
}

impl fmt::Display for SecretsDetected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "secrets detected in the snapshot; nothing was pushed")
    }
}

impl std::error::Error for SecretsDetected {}

/// Invalid argument combination that clap cannot express.
#[derive(Debug)]
pub struct UsageError(pub String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::Context;
    use snapkeep_daemon::git::GitError;

    use super::*;

    #[test]
    fn exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::Error.code(), 1);
        assert_eq!(ExitCode::Usage.code(), 2);
        assert_eq!(ExitCode::DaemonDown.code(), 10);
        assert_eq!(ExitCode::Network.code(), 13);
        assert_eq!(ExitCode::NotARepository.code(), 20);
        assert_eq!(ExitCode::SecretsDetected.code(), 21);
    }

    #[test]
    fn not_a_repository_is_found_under_context() {
        let err = anyhow::Error::new(CycleError::NotARepository(PathBuf::from("/tmp/x")))
            .context("backup failed");
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotARepository);
    }

    #[test]
    fn push_failure_is_network() {
        let err = anyhow::Error::new(CycleError::Transport(GitError::CommandFailed {
            command: "git push".into(),
            code: Some(128),
            stderr: "could not read from remote".into(),
        }));
        assert_eq!(ExitCode::from_error(&err), ExitCode::Network);
    }

    #[test]
    fn secrets_detected_has_its_own_code() {
        let err = anyhow::Error::new(SecretsDetected { report: "leak".into() });
        assert_eq!(ExitCode::from_error(&err), ExitCode::SecretsDetected);
    }

    #[test]
    fn fetch_failure_is_network() {
        let err: anyhow::Result<()> = Err(RestoreError::Fetch {
            ref_name: "refs/backups/jane/main".into(),
            source: GitError::NoRemote,
        })
        .context("restore failed");
        assert_eq!(ExitCode::from_error(&err.unwrap_err()), ExitCode::Network);
    }

    #[test]
    fn usage_error_is_usage() {
        let err = anyhow::Error::new(UsageError("token cannot be empty".into()));
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }

    #[test]
    fn rpc_codes_map_to_usage_or_error() {
        use snapkeep_common::protocol::jsonrpc::{INTERNAL_ERROR, METHOD_NOT_FOUND};
        assert_eq!(ExitCode::from_rpc_code(METHOD_NOT_FOUND), ExitCode::Usage);
        assert_eq!(ExitCode::from_rpc_code(INTERNAL_ERROR), ExitCode::Error);
    }

    #[test]
    fn timeout_is_network() {
        let err = anyhow::Error::new(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connection timed out",
        ));
        assert_eq!(ExitCode::from_error(&err), ExitCode::Network);
    }

    #[test]
    fn generic_error_is_error() {
        let err = anyhow::anyhow!("something went wrong");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Error);
    }
}
