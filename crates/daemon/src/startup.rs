// Daemon startup: PID file, control socket creation, liveness probe.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::net::UnixListener;
use tracing::info;

use crate::config::{global_dir, REGISTRY_FILE};
use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};

const SOCKET_NAME: &str = "daemon.sock";
/// Diagnostics only; liveness is decided by connecting to the socket.
const PID_FILE_NAME: &str = "daemon.pid";

/// Resolved paths for daemon runtime files.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub base_dir: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub registry_path: PathBuf,
}

impl DaemonPaths {
    /// Paths under the config directory, which is created owner-only.
    pub fn resolve() -> Result<Self> {
        let base_dir = global_dir().context("could not determine config directory")?;
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("failed to create `{}`", base_dir.display()))?;
        ensure_owner_only_dir(&base_dir)?;
        Ok(Self::under(base_dir))
    }

    /// Paths under `base_dir`, without touching the filesystem.
    pub fn under(base_dir: PathBuf) -> Self {
        Self {
            socket_path: base_dir.join(SOCKET_NAME),
            pid_path: base_dir.join(PID_FILE_NAME),
            registry_path: base_dir.join(REGISTRY_FILE),
            base_dir,
        }
    }
}

pub fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    let mut file = fs::File::create(path).context("failed to create PID file")?;
    write!(file, "{pid}").context("failed to write PID")?;
    ensure_owner_only_file(path)?;
    info!(pid, path = %path.display(), "wrote PID file");
    Ok(())
}

pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, "failed to remove PID file");
        }
    }
}

/// Remove a stale socket file and bind a new listener.
pub async fn bind_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        fs::remove_file(path).context("failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(path).context("failed to bind Unix socket")?;
    info!(path = %path.display(), "control socket ready");
    Ok(listener)
}

/// True when something accepts connections on the socket.
pub async fn is_daemon_running(socket_path: &Path) -> bool {
    tokio::net::UnixStream::connect(socket_path).await.is_ok()
}
