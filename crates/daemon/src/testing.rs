// In-memory snapshot ports and secret gate for unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use snapkeep_common::refname::{BackupLocation, BackupRef};

use crate::git::ports::{GitError, GitResult, PortsFactory, SnapshotPorts};
use crate::scan::{ScanError, ScanVerdict, SecretGate};

#[derive(Debug, Clone)]
pub struct FakeState {
    pub is_repository: bool,
    pub dirty: bool,
    pub capture: GitResult<String>,
    pub name: String,
    pub email: String,
    pub branch: String,
    pub remote: Option<String>,
    pub push_error: Option<GitError>,
    /// Delay inside the status check, to simulate a slow cycle.
    pub status_delay: Option<Duration>,
    pub listing: Vec<BackupRef>,
    pub objects: Vec<String>,
    /// Object that becomes available once a fetch happens.
    pub fetch_provides: Option<String>,

    pub opened: Vec<PathBuf>,
    pub status_checks: usize,
    pub captures: usize,
    pub last_staged_only: Option<bool>,
    pub pushes: Vec<(String, String, String)>,
    pub fetches: Vec<String>,
    pub list_patterns: Vec<String>,
    pub applied: Vec<String>,
    pub replayed: Vec<String>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            is_repository: true,
            dirty: true,
            capture: Ok("abc123".to_string()),
            name: "Jane Doe".to_string(),
            email: "jane@corp.io".to_string(),
            branch: "main".to_string(),
            remote: Some("origin".to_string()),
            push_error: None,
            status_delay: None,
            listing: Vec::new(),
            objects: Vec::new(),
            fetch_provides: None,
            opened: Vec::new(),
            status_checks: 0,
            captures: 0,
            last_staged_only: None,
            pushes: Vec::new(),
            fetches: Vec::new(),
            list_patterns: Vec::new(),
            applied: Vec::new(),
            replayed: Vec::new(),
        }
    }
}

/// Shared fake repository. Every port opened from its factory sees the
/// same state, whatever path it was opened for.
#[derive(Debug, Clone, Default)]
pub struct FakeRepo {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRepo {
    pub fn update(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().expect("fake state lock poisoned"));
    }

    pub fn state(&self) -> FakeState {
        self.state.lock().expect("fake state lock poisoned").clone()
    }

    pub fn factory(&self) -> Arc<dyn PortsFactory> {
        Arc::new(self.clone())
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().expect("fake state lock poisoned"))
    }
}

impl PortsFactory for FakeRepo {
    fn open(&self, repo_path: &Path) -> Box<dyn SnapshotPorts> {
        self.with(|s| s.opened.push(repo_path.to_path_buf()));
        Box::new(FakePorts { repo: self.clone() })
    }
}

struct FakePorts {
    repo: FakeRepo,
}

impl SnapshotPorts for FakePorts {
    fn is_repository(&self) -> bool {
        self.repo.with(|s| s.is_repository)
    }

    fn committer_name(&self) -> GitResult<String> {
        Ok(self.repo.with(|s| s.name.clone()))
    }

    fn committer_email(&self) -> GitResult<String> {
        Ok(self.repo.with(|s| s.email.clone()))
    }

    fn current_branch(&self) -> GitResult<String> {
        Ok(self.repo.with(|s| s.branch.clone()))
    }

    fn default_remote(&self) -> GitResult<String> {
        self.repo.with(|s| s.remote.clone()).ok_or(GitError::NoRemote)
    }

    fn has_local_changes(&self) -> GitResult<bool> {
        let (dirty, delay) = self.repo.with(|s| {
            s.status_checks += 1;
            (s.dirty, s.status_delay)
        });
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(dirty)
    }

    fn capture_snapshot(&self, staged_only: bool) -> GitResult<String> {
        self.repo.with(|s| {
            s.captures += 1;
            s.last_staged_only = Some(staged_only);
            s.capture.clone()
        })
    }

    fn diff(&self, _hash: &str) -> GitResult<String> {
        Ok("diff --git a/f b/f\n".to_string())
    }

    fn push_to_location(
        &self,
        hash: &str,
        location: &BackupLocation,
        remote: &str,
    ) -> GitResult<()> {
        self.repo.with(|s| match &s.push_error {
            Some(error) => Err(error.clone()),
            None => {
                s.pushes.push((hash.to_string(), location.ref_name(), remote.to_string()));
                Ok(())
            }
        })
    }

    fn fetch_location(&self, _remote: &str, location: &BackupLocation) -> GitResult<()> {
        self.repo.with(|s| {
            s.fetches.push(location.ref_name());
            if let Some(hash) = s.fetch_provides.take() {
                s.objects.push(hash);
            }
        });
        Ok(())
    }

    fn list_locations_matching(&self, _remote: &str, pattern: &str) -> GitResult<Vec<BackupRef>> {
        Ok(self.repo.with(|s| {
            s.list_patterns.push(pattern.to_string());
            s.listing.clone()
        }))
    }

    fn apply_snapshot(&self, hash: &str) -> GitResult<()> {
        self.repo.with(|s| s.applied.push(hash.to_string()));
        Ok(())
    }

    fn replay_snapshot(&self, hash: &str) -> GitResult<()> {
        self.repo.with(|s| s.replayed.push(hash.to_string()));
        Ok(())
    }

    fn object_exists(&self, hash: &str) -> bool {
        self.repo.with(|s| s.objects.iter().any(|o| o == hash))
    }

    fn commit_info(&self, hash: &str) -> GitResult<String> {
        Ok(format!("Commit: {hash}\n"))
    }

    fn files_changed(&self, _hash: &str) -> GitResult<String> {
        Ok(" f | 1 +\n".to_string())
    }
}

#[derive(Debug, Clone)]
enum GateMode {
    Clean,
    Leaking(String),
    Unavailable,
    Failing,
}

#[derive(Debug, Clone)]
pub struct FakeGate {
    mode: GateMode,
    scans: Arc<AtomicUsize>,
}

impl FakeGate {
    fn with_mode(mode: GateMode) -> Self {
        Self { mode, scans: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn clean() -> Self {
        Self::with_mode(GateMode::Clean)
    }

    pub fn leaking(report: &str) -> Self {
        Self::with_mode(GateMode::Leaking(report.to_string()))
    }

    pub fn unavailable() -> Self {
        Self::with_mode(GateMode::Unavailable)
    }

    pub fn failing() -> Self {
        Self::with_mode(GateMode::Failing)
    }

    pub fn scans(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.scans)
    }
}

impl SecretGate for FakeGate {
    fn is_available(&self) -> bool {
        !matches!(self.mode, GateMode::Unavailable)
    }

    fn scan(&self, _text: &str) -> Result<ScanVerdict, ScanError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            GateMode::Clean | GateMode::Unavailable => Ok(ScanVerdict::clean()),
            GateMode::Leaking(report) => {
                Ok(ScanVerdict { secrets_found: true, report: report.clone() })
            }
            GateMode::Failing => {
                Err(ScanError::Failed { code: Some(2), output: "scanner crashed".to_string() })
            }
        }
    }
}
