// `snapkeep status`: the daemon's workers.

use anyhow::Result;
use clap::Args;
use snapkeep_common::protocol::rpc_methods;
use snapkeep_common::types::StatusReport;

use super::block_on;
use crate::client::DaemonClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let format = OutputFormat::detect(args.json);
    let client = DaemonClient::from_env()?;
    let report: StatusReport = block_on(client.call(rpc_methods::DAEMON_STATUS, None))??;
    output::print_output(format, &report, format_human)?;
    Ok(())
}

fn format_human(report: &StatusReport) -> String {
    if report.workers.is_empty() {
        return "Daemon is running; no repositories are registered. Run: snapkeep init".to_string();
    }

    let mut lines = vec![format!("Workers ({})", report.workers.len())];
    for worker in &report.workers {
        lines.push(format!(
            "  {}  {}  every {}s",
            worker.repo_path.display(),
            worker.state,
            worker.interval_secs
        ));
        match (&worker.last_outcome, worker.last_cycle_at) {
            (Some(outcome), Some(at)) => {
                let at = at.format("%Y-%m-%d %H:%M:%S UTC");
                lines.push(format!("    last cycle {at}: {outcome}"));
            }
            (Some(outcome), None) => lines.push(format!("    last cycle: {outcome}")),
            _ => lines.push("    no cycle yet".to_string()),
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};
    use snapkeep_common::types::{WorkerState, WorkerStatus};

    use super::*;

    fn worker(outcome: Option<&str>) -> WorkerStatus {
        WorkerStatus {
            repo_path: PathBuf::from("/work/notes"),
            state: WorkerState::Running,
            interval_secs: 60,
            last_cycle_at: outcome.map(|_| Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
            last_outcome: outcome.map(str::to_string),
        }
    }

    #[test]
    fn human_format_shows_each_worker() {
        let report = StatusReport { workers: vec![worker(Some("nothing to back up"))] };
        let output = format_human(&report);
        assert!(output.contains("/work/notes  running  every 60s"));
        assert!(output.contains("last cycle 2026-03-01 12:00:00 UTC: nothing to back up"));
    }

    #[test]
    fn human_format_before_first_cycle() {
        let output = format_human(&StatusReport { workers: vec![worker(None)] });
        assert!(output.contains("no cycle yet"));
    }

    #[test]
    fn human_format_without_workers() {
        assert!(format_human(&StatusReport::default()).contains("snapkeep init"));
    }
}
