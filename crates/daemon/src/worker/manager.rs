// Worker manager: owns the set of workers, keyed by repository path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use snapkeep_common::types::WorkerStatus;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::backup::CycleDeps;
use crate::worker::RepositoryWorker;

pub struct WorkerManager {
    deps: CycleDeps,
    workers: Mutex<HashMap<PathBuf, Arc<RepositoryWorker>>>,
}

impl WorkerManager {
    pub fn new(deps: CycleDeps) -> Self {
        Self { deps, workers: Mutex::new(HashMap::new()) }
    }

    /// Start one worker per existing path. Missing paths are skipped with a
    /// warning; paths that already have a worker are left alone.
    pub async fn start_workers(&self, paths: &[PathBuf]) -> usize {
        let mut workers = self.workers.lock().await;
        let mut started = 0;
        for path in paths {
            if !path.exists() {
                warn!(repo = %path.display(), "repository path does not exist, skipping");
                continue;
            }
            if workers.contains_key(path) {
                continue;
            }

            let worker = Arc::new(RepositoryWorker::new(path.clone(), self.deps.clone()));
            tokio::spawn(Arc::clone(&worker).run());
            workers.insert(path.clone(), worker);
            started += 1;
        }
        info!(started, total = workers.len(), "workers started");
        started
    }

    /// Stop every worker concurrently and clear the set. Each stop is
    /// bounded, so this returns even when a worker is mid-cycle.
    pub async fn stop_workers(&self) {
        let mut workers = self.workers.lock().await;
        let count = workers.len();
        let mut stops = JoinSet::new();
        for (_, worker) in workers.drain() {
            stops.spawn(async move { worker.stop().await });
        }
        while let Some(joined) = stops.join_next().await {
            if let Err(error) = joined {
                warn!(%error, "worker stop task failed");
            }
        }
        info!(count, "workers stopped");
    }

    /// Stop all workers, then start from `paths`.
    pub async fn reload_workers(&self, paths: &[PathBuf]) -> usize {
        self.stop_workers().await;
        self.start_workers(paths).await;
        self.worker_count().await
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Statuses of all workers, sorted by repository path.
    pub async fn worker_statuses(&self) -> Vec<WorkerStatus> {
        let workers = self.workers.lock().await;
        let mut statuses: Vec<_> = workers.values().map(|worker| worker.status()).collect();
        statuses.sort_by(|a, b| a.repo_path.cmp(&b.repo_path));
        statuses
    }
}
