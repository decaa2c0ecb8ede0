// `snapkeep inspect`: commit info, changed files and optionally the diff of a backup.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use snapkeep_daemon::backup::{inspect, Inspection};

use super::{RepoArgs, RepoContext, SlotArgs};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Hash of the backup to inspect.
    hash: String,
    /// Include the full diff.
    #[arg(long)]
    diff: bool,
    #[command(flatten)]
    repo: RepoArgs,
    #[command(flatten)]
    slot: SlotArgs,
    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectResult {
    pub hash: String,
    pub commit_info: String,
    pub files_changed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl From<Inspection> for InspectResult {
    fn from(inspection: Inspection) -> Self {
        Self {
            hash: inspection.hash,
            commit_info: inspection.commit_info,
            files_changed: inspection.files_changed,
            diff: inspection.diff,
        }
    }
}

pub fn run(args: InspectArgs) -> Result<()> {
    let format = OutputFormat::detect(args.json);
    let repo = RepoContext::open(&args.repo.path)?;
    let target = repo.target(&args.slot)?;

    let inspection = inspect(repo.ports.as_ref(), &target, &args.hash, args.diff)
        .with_context(|| format!("failed to inspect {}", args.hash))?;
    output::print_output(format, &InspectResult::from(inspection), format_human)?;
    Ok(())
}

fn format_human(result: &InspectResult) -> String {
    let mut out = String::new();
    out.push_str(result.commit_info.trim_end());
    out.push_str("\n\nFiles changed:\n");
    out.push_str(result.files_changed.trim_end());
    match &result.diff {
        Some(diff) => {
            out.push_str("\n\n");
            out.push_str(diff.trim_end());
        }
        None => {
            out.push_str(&format!(
                "\n\nTo see the full diff, run: snapkeep inspect {} --diff",
                result.hash
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(diff: Option<&str>) -> InspectResult {
        InspectResult {
            hash: "abc123".into(),
            commit_info: "Commit: abc123\nMessage: WIP on main\n".into(),
            files_changed: " README.md | 2 +-\n".into(),
            diff: diff.map(str::to_string),
        }
    }

    #[test]
    fn human_format_suggests_diff_when_omitted() {
        let output = format_human(&sample(None));
        assert!(output.starts_with("Commit: abc123"));
        assert!(output.contains("Files changed:\n README.md | 2 +-"));
        assert!(output.contains("snapkeep inspect abc123 --diff"));
    }

    #[test]
    fn human_format_appends_diff() {
        let output = format_human(&sample(Some("diff --git a/README.md b/README.md\n")));
        assert!(output.ends_with("diff --git a/README.md b/README.md"));
        assert!(!output.contains("--diff"));
    }

    #[test]
    fn json_omits_missing_diff() {
        let mut buf = Vec::new();
        output::write_output(&mut buf, OutputFormat::Json, &sample(None), format_human).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert!(parsed.get("diff").is_none());
        assert_eq!(parsed["hash"], "abc123");
    }
}
