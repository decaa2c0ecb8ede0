// Worker status types shared by the daemon and the CLI.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a single repository worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Registered, loop task not yet running.
    Idle,
    /// Loop task running; cycles fire on every tick.
    Running,
    /// Stop signalled; no further cycles will begin.
    Stopping,
    /// Loop task exited and acknowledged.
    Stopped,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub repo_path: PathBuf,
    pub state: WorkerState,
    pub interval_secs: u64,
    #[serde(default)]
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// One-line summary of the last cycle result.
    #[serde(default)]
    pub last_outcome: Option<String>,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.repo_path.display(), self.state)
    }
}

/// Result of `daemon.status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub workers: Vec<WorkerStatus>,
}

/// Result of `daemon.reload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadReport {
    pub workers: usize,
}
