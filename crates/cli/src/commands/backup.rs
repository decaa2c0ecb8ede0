// `snapkeep backup`: one immediate backup cycle.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use snapkeep_daemon::backup::{
    load_config_or_default, run_cycle, CycleDeps, CycleError, CycleOutcome,
};
use snapkeep_daemon::config::FileGlobalConfig;
use snapkeep_daemon::git::{GitCliFactory, GitError};
use snapkeep_daemon::scan::GitleaksGate;

use super::{absolute, RepoArgs};
use crate::exit_code::SecretsDetected;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct BackupArgs {
    #[command(flatten)]
    repo: RepoArgs,
    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BackupReport {
    NothingToBackUp,
    Pushed { hash: String, ref_name: String, scan_skipped: bool },
}

pub fn run(args: BackupArgs) -> Result<()> {
    let format = OutputFormat::detect(args.json);
    let path = absolute(&args.repo.path)?;

    let global = Arc::new(FileGlobalConfig::from_env());
    let deps = CycleDeps::new(
        Arc::new(GitCliFactory::new(global.clone())),
        Arc::new(GitleaksGate::new()),
        global,
    );
    let config = load_config_or_default(&path);

    let report = match settle(run_cycle(&path, &config, &deps))? {
        CycleOutcome::NothingToBackUp => BackupReport::NothingToBackUp,
        CycleOutcome::SecretsDetected { report } => {
            eprintln!("{}", report.trim_end());
            return Err(SecretsDetected { report }.into());
        }
        CycleOutcome::Pushed { hash, location, scan_skipped } => {
            if scan_skipped {
                output::print_warning(
                    format,
                    "SCAN_SKIPPED",
                    "gitleaks not found; snapshot pushed without a secret scan",
                );
            }
            BackupReport::Pushed { hash, ref_name: location.ref_name(), scan_skipped }
        }
    };

    output::print_output(format, &report, format_human)?;
    Ok(())
}

/// Changes that vanish between the status check and the capture (or are
/// all unstaged in staged-only mode) mean there was nothing to back up.
fn settle(result: Result<CycleOutcome, CycleError>) -> Result<CycleOutcome, CycleError> {
    match result {
        Err(CycleError::Capture(GitError::NoChanges)) => Ok(CycleOutcome::NothingToBackUp),
        other => other,
    }
}

fn format_human(report: &BackupReport) -> String {
    match report {
        BackupReport::NothingToBackUp => "Nothing to back up.".to_string(),
        BackupReport::Pushed { hash, ref_name, .. } => {
            let short = hash.get(..12).unwrap_or(hash);
            format!("Backed up {short} to {ref_name}")
        }
    }
}
