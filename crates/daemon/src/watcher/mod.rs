// Registry watcher: inotify/fsevents on the config directory, filtered to
// the registry file. Each relevant event becomes one unit on the channel;
// the runtime debounces them into a worker reload.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

/// Capacity for the change channel. Changes coalesce, so a small buffer is
/// enough.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Watches the directory holding the registry file. Watching the directory
/// rather than the file survives editors and `save_to` replacing the file.
pub struct RegistryWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl RegistryWatcher {
    /// Start watching `registry_path`. Its parent directory must exist.
    pub fn start(registry_path: &Path) -> Result<(Self, mpsc::Receiver<()>)> {
        let dir = registry_path
            .parent()
            .context("registry path has no parent directory")?
            .canonicalize()
            .with_context(|| {
                format!("failed to canonicalize registry directory of {}", registry_path.display())
            })?;
        let file_name = registry_path
            .file_name()
            .context("registry path has no file name")?
            .to_os_string();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let filter_name = file_name.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_registry_change(&event, &filter_name) {
                    // Full means a reload is already pending.
                    if let Err(mpsc::error::TrySendError::Closed(())) = tx.try_send(()) {
                        debug!("registry change channel closed");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "registry watcher error");
            }
        })
        .context("failed to create registry watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch directory: {}", dir.display()))?;

        let path = dir.join(file_name);
        debug!(path = %path.display(), "registry watcher started");
        Ok((Self { _watcher: watcher, path }, rx))
    }

    /// Canonical path of the watched registry file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_registry_change(event: &Event, file_name: &OsString) -> bool {
    let relevant = match &event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    if !relevant {
        trace!(kind = ?event.kind, "skipping non-content event");
        return false;
    }
    event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str()))
}
