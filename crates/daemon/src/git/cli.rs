// Snapshot ports backed by the `git` binary.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use snapkeep_common::refname::{parse_listing, BackupLocation, BackupRef};

use crate::config::GlobalConfigSource;
use crate::git::ports::{GitError, GitResult, PortsFactory, SnapshotPorts};
use crate::security::basic_auth_header;

const STAGED_SNAPSHOT_MESSAGE: &str = "snapkeep: staged snapshot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// HTTP credentials attached to network commands.
#[derive(Clone, PartialEq, Eq)]
pub struct GitCredentials {
    pub user: String,
    pub token: String,
}

impl std::fmt::Debug for GitCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCredentials").field("user", &self.user).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct GitCli<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    executor: E,
    credentials: Option<GitCredentials>,
}

impl GitCli<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self { repo_path: repo_path.into(), executor: ProcessCommandExecutor, credentials: None }
    }
}

impl<E: CommandExecutor> GitCli<E> {
    pub fn with_executor(repo_path: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_path: repo_path.into(), executor, credentials: None }
    }

    pub fn with_credentials(mut self, credentials: Option<GitCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn parent_count(&self, hash: &str) -> GitResult<usize> {
        let output = self.run(args(&["rev-list", "--parents", "-n", "1", hash]))?;
        Ok(output.split_whitespace().count().saturating_sub(1))
    }

    fn capture_staged(&self) -> GitResult<String> {
        let staged = self.run_raw(args(&["diff", "--cached", "--quiet"]))?;
        if staged.success {
            return Err(GitError::NoChanges);
        }
        let tree = self.run(args(&["write-tree"]))?.trim().to_string();
        let hash = self
            .run(args(&["commit-tree", &tree, "-p", "HEAD", "-m", STAGED_SNAPSHOT_MESSAGE]))?
            .trim()
            .to_string();
        if hash.is_empty() {
            return Err(GitError::NoChanges);
        }
        Ok(hash)
    }

    /// Run a command that talks to a remote, with credentials when configured.
    fn run_network(&self, rest: Vec<String>) -> GitResult<String> {
        let Some(credentials) = &self.credentials else {
            return self.run(rest);
        };

        let header = basic_auth_header(&credentials.user, &credentials.token);
        let label = format!("git -c http.extraHeader=<redacted> {}", rest.join(" "));
        let mut full = vec!["-c".to_string(), format!("http.extraHeader={header}")];
        full.extend(rest);
        self.run_labelled(full, label)
    }

    fn run(&self, args: Vec<String>) -> GitResult<String> {
        let label = format!("git {}", args.join(" "));
        self.run_labelled(args, label)
    }

    fn run_labelled(&self, args: Vec<String>, command: String) -> GitResult<String> {
        let result = self.execute(&args, &command)?;

        if result.success {
            return Ok(result.stdout);
        }

        let stderr = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };

        Err(GitError::CommandFailed { command, code: result.code, stderr })
    }

    fn run_raw(&self, args: Vec<String>) -> GitResult<CommandResult> {
        let label = format!("git {}", args.join(" "));
        self.execute(&args, &label)
    }

    fn execute(&self, args: &[String], command: &str) -> GitResult<CommandResult> {
        self.executor.execute("git", args, &self.repo_path).map_err(|error| {
            GitError::SpawnFailed { command: command.to_string(), message: error.to_string() }
        })
    }
}

impl<E: CommandExecutor> SnapshotPorts for GitCli<E> {
    fn is_repository(&self) -> bool {
        self.run(args(&["rev-parse", "--git-dir"])).is_ok()
    }

    fn committer_name(&self) -> GitResult<String> {
        Ok(self.run(args(&["config", "user.name"]))?.trim().to_string())
    }

    fn committer_email(&self) -> GitResult<String> {
        Ok(self.run(args(&["config", "user.email"]))?.trim().to_string())
    }

    fn current_branch(&self) -> GitResult<String> {
        Ok(self.run(args(&["rev-parse", "--abbrev-ref", "HEAD"]))?.trim().to_string())
    }

    fn default_remote(&self) -> GitResult<String> {
        let output = self.run(args(&["remote"]))?;
        let remotes: Vec<&str> = output.lines().map(str::trim).filter(|r| !r.is_empty()).collect();
        if remotes.contains(&"origin") {
            return Ok("origin".to_string());
        }
        remotes.first().map(|r| r.to_string()).ok_or(GitError::NoRemote)
    }

    fn has_local_changes(&self) -> GitResult<bool> {
        let output = self.run(args(&["status", "--porcelain", "--untracked-files=no"]))?;
        Ok(!output.trim().is_empty())
    }

    fn capture_snapshot(&self, staged_only: bool) -> GitResult<String> {
        if staged_only {
            return self.capture_staged();
        }
        let hash = self.run(args(&["stash", "create"]))?.trim().to_string();
        if hash.is_empty() {
            return Err(GitError::NoChanges);
        }
        Ok(hash)
    }

    fn diff(&self, hash: &str) -> GitResult<String> {
        let base = format!("{hash}^1");
        self.run(args(&["diff", "--no-color", &base, hash]))
    }

    fn push_to_location(
        &self,
        hash: &str,
        location: &BackupLocation,
        remote: &str,
    ) -> GitResult<()> {
        let refspec = location.push_refspec(hash);
        self.run_network(args(&["push", "--force", remote, &refspec])).map(|_| ())
    }

    fn fetch_location(&self, remote: &str, location: &BackupLocation) -> GitResult<()> {
        let ref_name = location.ref_name();
        let refspec = format!("+{ref_name}:{ref_name}");
        self.run_network(args(&["fetch", remote, &refspec])).map(|_| ())
    }

    fn list_locations_matching(&self, remote: &str, pattern: &str) -> GitResult<Vec<BackupRef>> {
        let output = self.run_network(args(&["ls-remote", remote, pattern]))?;
        Ok(parse_listing(&output))
    }

    fn apply_snapshot(&self, hash: &str) -> GitResult<()> {
        self.run(args(&["stash", "apply", hash])).map(|_| ())
    }

    fn replay_snapshot(&self, hash: &str) -> GitResult<()> {
        let mut cherry_pick = args(&["cherry-pick", "--no-commit"]);
        if self.parent_count(hash)? > 1 {
            cherry_pick.extend(args(&["-m", "1"]));
        }
        cherry_pick.push(hash.to_string());
        self.run(cherry_pick).map(|_| ())
    }

    fn object_exists(&self, hash: &str) -> bool {
        let object = format!("{hash}^{{commit}}");
        self.run(args(&["cat-file", "-e", &object])).is_ok()
    }

    fn commit_info(&self, hash: &str) -> GitResult<String> {
        self.run(args(&[
            "log",
            "-1",
            "--format=Commit: %H%nAuthor: %an <%ae>%nDate: %ad%nMessage: %s",
            hash,
        ]))
    }

    fn files_changed(&self, hash: &str) -> GitResult<String> {
        let base = format!("{hash}^1");
        self.run(args(&["diff", "--stat", &base, hash]))
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// Opens [`GitCli`] ports, reading credentials from the global config on
/// every open so token changes apply on the next cycle.
pub struct GitCliFactory {
    global: Arc<dyn GlobalConfigSource>,
}

impl GitCliFactory {
    pub fn new(global: Arc<dyn GlobalConfigSource>) -> Self {
        Self { global }
    }
}

impl PortsFactory for GitCliFactory {
    fn open(&self, repo_path: &Path) -> Box<dyn SnapshotPorts> {
        let config = self.global.load();
        let credentials = config.git_token.filter(|token| !token.is_empty()).map(|token| {
            GitCredentials { user: config.git_user.clone().unwrap_or_default(), token }
        });
        Box::new(GitCli::new(repo_path).with_credentials(credentials))
    }
}
