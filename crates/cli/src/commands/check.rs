// `snapkeep check`: validate a repository's backup setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use snapkeep_common::refname::BackupLocation;
use snapkeep_daemon::backup::current_identity;
use snapkeep_daemon::config::{
    global_dir, local_config_path, FileGlobalConfig, GlobalConfig, GlobalConfigSource, LocalConfig,
    Registry,
};
use snapkeep_daemon::git::{GitCliFactory, PortsFactory, SnapshotPorts};
use snapkeep_daemon::scan::{GitleaksGate, SecretGate};
use snapkeep_daemon::startup::{is_daemon_running, DaemonPaths};

use super::{absolute, block_on, RepoArgs};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    repo: RepoArgs,
    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl CheckStatus {
    fn label(self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckItem {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub repo_path: PathBuf,
    pub checks: Vec<CheckItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_ref: Option<String>,
}

impl CheckReport {
    fn new(repo_path: &Path) -> Self {
        Self { repo_path: repo_path.to_path_buf(), checks: Vec::new(), backup_ref: None }
    }

    fn record(&mut self, name: &'static str, status: CheckStatus, detail: impl Into<String>) {
        self.checks.push(CheckItem { name, status, detail: detail.into() });
    }

    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    pub fn warning_count(&self) -> usize {
        self.checks.iter().filter(|c| c.status == CheckStatus::Warn).count()
    }
}

/// Facts gathered outside the repository.
struct Environment {
    global: GlobalConfig,
    registry: Result<Registry, String>,
    gitleaks_available: bool,
    daemon_running: bool,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let format = OutputFormat::detect(args.json);
    let path = absolute(&args.repo.path)?;

    let source = Arc::new(FileGlobalConfig::from_env());
    let global = source.load();
    let ports = GitCliFactory::new(source).open(&path);

    let socket_path = global_dir().map(|dir| DaemonPaths::under(dir).socket_path);
    let daemon_running = match socket_path {
        Some(socket_path) => block_on(async move { is_daemon_running(&socket_path).await })?,
        None => false,
    };
    let env = Environment {
        global,
        registry: Registry::load().map_err(|error| error.to_string()),
        gitleaks_available: GitleaksGate::new().is_available(),
        daemon_running,
    };

    let report = evaluate(&path, ports.as_ref(), &env);
    output::print_output(format, &report, format_human)?;
    if report.has_failures() {
        bail!("configuration check failed");
    }
    Ok(())
}

fn evaluate(path: &Path, ports: &dyn SnapshotPorts, env: &Environment) -> CheckReport {
    let mut report = CheckReport::new(path);
    let is_repository = ports.is_repository();

    if is_repository {
        report.record("repository", CheckStatus::Pass, "valid git repository");
    } else {
        report.record("repository", CheckStatus::Fail, "not a git repository");
    }

    let config_path = local_config_path(path);
    if !config_path.exists() {
        report.record(
            "config",
            CheckStatus::Warn,
            format!("{} not found, defaults apply. Run: snapkeep init", config_path.display()),
        );
    } else {
        match LocalConfig::load(path) {
            Ok(config) => report.record(
                "config",
                CheckStatus::Pass,
                format!(
                    "interval {}s, scan secrets {}, only staged {}",
                    config.interval_secs, config.scan_secrets, config.only_staged
                ),
            ),
            Err(error) => report.record("config", CheckStatus::Fail, error.to_string()),
        }
    }

    match &env.registry {
        Ok(registry) if registry.contains(path) => {
            report.record("registry", CheckStatus::Pass, "repository is registered");
        }
        Ok(_) => report.record(
            "registry",
            CheckStatus::Warn,
            "repository is not registered. Run: snapkeep init",
        ),
        Err(error) => report.record("registry", CheckStatus::Fail, error.clone()),
    }

    if is_repository {
        check_repository(ports, env, &mut report);
    }

    if env.gitleaks_available {
        report.record("gitleaks", CheckStatus::Pass, "gitleaks is available");
    } else {
        report.record(
            "gitleaks",
            CheckStatus::Warn,
            "gitleaks not found in PATH; snapshots are pushed unscanned",
        );
    }

    if env.daemon_running {
        report.record("daemon", CheckStatus::Pass, "daemon is running");
    } else {
        let detail = "daemon is not running. Start it with: snapkeepd";
        report.record("daemon", CheckStatus::Warn, detail);
    }

    report
}

fn check_repository(ports: &dyn SnapshotPorts, env: &Environment, report: &mut CheckReport) {
    let identity = current_identity(ports, &env.global);
    if identity.is_empty() {
        report.record(
            "identity",
            CheckStatus::Fail,
            "no user identity. Run: git config user.name <name> (or snapkeep config set-user)",
        );
    } else {
        let detail = format!("{identity} ({})", identity_source(ports, env));
        report.record("identity", CheckStatus::Pass, detail);
    }

    match ports.default_remote() {
        Ok(remote) => report.record("remote", CheckStatus::Pass, remote),
        Err(error) => report.record(
            "remote",
            CheckStatus::Fail,
            format!("{error}. Run: git remote add origin <url>"),
        ),
    }

    match ports.current_branch() {
        Ok(branch) => {
            report.backup_ref = BackupLocation::new(&identity, &branch).ok().map(|l| l.ref_name());
            report.record("branch", CheckStatus::Pass, branch);
        }
        Err(error) => report.record("branch", CheckStatus::Warn, error.to_string()),
    }
}

fn identity_source(ports: &dyn SnapshotPorts, env: &Environment) -> &'static str {
    if !env.global.identity_override().trim().is_empty() {
        "from snapkeep config"
    } else if ports.committer_name().is_ok_and(|name| !name.trim().is_empty()) {
        "from git user.name"
    } else {
        "from git user.email"
    }
}

fn format_human(report: &CheckReport) -> String {
    let mut lines = vec![format!("Checking {}", report.repo_path.display()), String::new()];
    for check in &report.checks {
        lines.push(format!("[{}] {}: {}", check.status.label(), check.name, check.detail));
    }
    if let Some(backup_ref) = &report.backup_ref {
        lines.push(format!("       backups go to {backup_ref}"));
    }

    lines.push(String::new());
    let warnings = report.warning_count();
    lines.push(if report.has_failures() {
        "Setup has errors that need to be fixed.".to_string()
    } else if warnings > 0 {
        format!("Setup works with {warnings} warning(s).")
    } else {
        "Setup is valid.".to_string()
    });
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use tempfile::TempDir;

    use super::*;

    fn env(registry: Registry) -> Environment {
        Environment {
            global: GlobalConfig::default(),
            registry: Ok(registry),
            gitleaks_available: false,
            daemon_running: true,
        }
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn open(path: &Path) -> Box<dyn SnapshotPorts> {
        GitCliFactory::new(Arc::new(GlobalConfig::default())).open(path)
    }

    fn status_of(report: &CheckReport, name: &str) -> CheckStatus {
        report.checks.iter().find(|c| c.name == name).expect("check should be present").status
    }

    #[test]
    fn plain_directory_fails_repository_check() {
        let tmp = TempDir::new().unwrap();
        let report = evaluate(tmp.path(), open(tmp.path()).as_ref(), &env(Registry::default()));

        assert_eq!(status_of(&report, "repository"), CheckStatus::Fail);
        assert!(report.checks.iter().all(|c| c.name != "remote"));
        assert!(report.has_failures());
    }

    #[test]
    fn configured_repository_passes_with_warnings() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().canonicalize().unwrap();
        git(&repo, &["init", "-b", "main"]);
        git(&repo, &["config", "user.name", "Jane Doe"]);
        git(&repo, &["config", "user.email", "jane@example.test"]);
        git(&repo, &["config", "commit.gpgsign", "false"]);
        git(&repo, &["commit", "--allow-empty", "-m", "initial"]);
        git(&repo, &["remote", "add", "origin", "https://example.test/notes.git"]);
        LocalConfig::default().save(&repo).unwrap();

        let report = evaluate(&repo, open(&repo).as_ref(), &env(Registry::new([repo.clone()])));

        assert_eq!(status_of(&report, "repository"), CheckStatus::Pass);
        assert_eq!(status_of(&report, "config"), CheckStatus::Pass);
        assert_eq!(status_of(&report, "registry"), CheckStatus::Pass);
        assert_eq!(status_of(&report, "identity"), CheckStatus::Pass);
        assert_eq!(status_of(&report, "remote"), CheckStatus::Pass);
        assert_eq!(status_of(&report, "gitleaks"), CheckStatus::Warn);
        assert_eq!(report.backup_ref.as_deref(), Some("refs/backups/Jane_Doe/main"));
        assert!(!report.has_failures());
        assert!(format_human(&report).contains("1 warning(s)"));
    }

    #[test]
    fn unregistered_repository_without_config_warns() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().canonicalize().unwrap();
        git(&repo, &["init", "-b", "main"]);

        let report = evaluate(&repo, open(&repo).as_ref(), &env(Registry::default()));
        assert_eq!(status_of(&report, "config"), CheckStatus::Warn);
        assert_eq!(status_of(&report, "registry"), CheckStatus::Warn);
        assert_eq!(status_of(&report, "remote"), CheckStatus::Fail);
    }

    #[test]
    fn human_format_summarises_failures() {
        let mut report = CheckReport::new(Path::new("/work/notes"));
        report.record("repository", CheckStatus::Fail, "not a git repository");
        let output = format_human(&report);
        assert!(output.contains("[FAIL] repository: not a git repository"));
        assert!(output.ends_with("Setup has errors that need to be fixed."));
    }
}
