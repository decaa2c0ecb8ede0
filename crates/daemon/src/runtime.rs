use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::backup::CycleDeps;
use crate::config::{FileGlobalConfig, GLOBAL_CONFIG_FILE};
use crate::control::{serve_unix_until_shutdown, ControlState};
use crate::git::GitCliFactory;
use crate::scan::GitleaksGate;
use crate::startup::{
    bind_socket, is_daemon_running, remove_pid_file, write_pid_file, DaemonPaths,
};
use crate::watcher::RegistryWatcher;
use crate::worker::WorkerManager;

/// Quiet period after a registry change before workers are reloaded.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

/// Run the daemon with the real git and gitleaks adapters until ctrl-c,
/// SIGTERM or a `daemon.shutdown` request.
pub async fn run_standalone() -> Result<()> {
    let paths = DaemonPaths::resolve()?;
    let global = Arc::new(FileGlobalConfig::new(paths.base_dir.join(GLOBAL_CONFIG_FILE)));
    let deps = CycleDeps::new(
        Arc::new(GitCliFactory::new(global.clone())),
        Arc::new(GitleaksGate::new()),
        global,
    );
    run_with(paths, deps).await
}

pub async fn run_with(paths: DaemonPaths, deps: CycleDeps) -> Result<()> {
    if is_daemon_running(&paths.socket_path).await {
        bail!("a daemon is already running at `{}`", paths.socket_path.display());
    }

    let listener = bind_socket(&paths.socket_path).await?;
    write_pid_file(&paths.pid_path)?;

    let manager = Arc::new(WorkerManager::new(deps));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let state = ControlState::new(Arc::clone(&manager), paths.registry_path.clone())
        .with_shutdown_notifier(shutdown_tx.clone());

    if let Err(error) = state.reload().await {
        warn!(?error, "failed to start workers from registry");
    }

    spawn_signal_listener(shutdown_tx.clone());

    let watch_task = match RegistryWatcher::start(&paths.registry_path) {
        Ok((watcher, changes)) => {
            Some(tokio::spawn(reload_on_change(watcher, changes, state.clone())))
        }
        Err(error) => {
            warn!(?error, "registry watcher unavailable, changes apply on `daemon.reload`");
            None
        }
    };

    info!(socket_path = %paths.socket_path.display(), "daemon started");
    let result = serve_unix_until_shutdown(listener, state, shutdown_rx).await;

    if let Some(task) = watch_task {
        task.abort();
    }
    manager.stop_workers().await;
    cleanup_paths(&paths);
    info!("daemon stopped");
    result.context("daemon exited with error")
}

fn spawn_signal_listener(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = terminate.recv() => {}
                    }
                }
                Err(error) => {
                    warn!(%error, "failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    });
}

async fn reload_on_change(
    watcher: RegistryWatcher,
    mut changes: mpsc::Receiver<()>,
    state: ControlState,
) {
    let _watcher = watcher;
    while changes.recv().await.is_some() {
        tokio::time::sleep(RELOAD_DEBOUNCE).await;
        while changes.try_recv().is_ok() {}

        if let Err(error) = state.reload().await {
            warn!(?error, "registry reload failed");
        }
    }
}

fn cleanup_paths(paths: &DaemonPaths) {
    remove_pid_file(&paths.pid_path);
    let _ = std::fs::remove_file(&paths.socket_path);
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use snapkeep_common::protocol::jsonrpc::{Request, RequestId, Response};
    use snapkeep_common::protocol::rpc_methods::{DAEMON_SHUTDOWN, DAEMON_STATUS};
    use snapkeep_common::types::StatusReport;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixStream;

    use super::{run_with, DaemonPaths};
    use crate::backup::CycleDeps;
    use crate::config::{GlobalConfig, Registry};
    use crate::startup::is_daemon_running;
    use crate::testing::{FakeGate, FakeRepo};

    async fn call(socket_path: &Path, method: &str) -> Response {
        let mut stream = UnixStream::connect(socket_path).await.expect("client should connect");
        let mut encoded = serde_json::to_vec(&Request::new(method, None, RequestId::Number(1)))
            .expect("request should serialize");
        encoded.push(b'\n');
        stream.write_all(&encoded).await.expect("request write should succeed");

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("response should be readable");
        serde_json::from_str(line.trim()).expect("response should decode")
    }

    async fn worker_count(socket_path: &Path) -> usize {
        let response = call(socket_path, DAEMON_STATUS).await;
        let report: StatusReport =
            serde_json::from_value(response.result.expect("status result")).unwrap();
        report.workers.len()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn daemon_follows_registry_and_shuts_down_cleanly() {
        let tmp = TempDir::new().unwrap();
        let paths = DaemonPaths::under(tmp.path().to_path_buf());
        let repo_a = tmp.path().join("a");
        let repo_b = tmp.path().join("b");
        std::fs::create_dir(&repo_a).unwrap();
        std::fs::create_dir(&repo_b).unwrap();
        Registry::new([repo_a.clone()]).save_to(&paths.registry_path).unwrap();

        let deps = CycleDeps::new(
            FakeRepo::default().factory(),
            Arc::new(FakeGate::clean()),
            Arc::new(GlobalConfig::default()),
        );
        let socket_path = paths.socket_path.clone();
        let pid_path = paths.pid_path.clone();
        let registry_path = paths.registry_path.clone();
        let daemon = tokio::spawn(run_with(paths, deps));

        for _ in 0..100 {
            if is_daemon_running(&socket_path).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(worker_count(&socket_path).await, 1);

        Registry::new([repo_a, repo_b]).save_to(&registry_path).unwrap();
        let mut count = 0;
        for _ in 0..100 {
            count = worker_count(&socket_path).await;
            if count == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(count, 2, "registry change should reload workers");

        let response = call(&socket_path, DAEMON_SHUTDOWN).await;
        assert!(response.error.is_none());

        tokio::time::timeout(Duration::from_secs(5), daemon)
            .await
            .expect("daemon should exit after shutdown request")
            .expect("daemon task should not panic")
            .expect("daemon should shut down cleanly");
        assert!(!socket_path.exists());
        assert!(!pid_path.exists());
    }
}
