// `snapkeep config`: global settings (identity override and access token).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use snapkeep_daemon::config::{global_config_path, GlobalConfig};
use snapkeep_daemon::security::mask_token;

use crate::exit_code::UsageError;
use crate::output::{self, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Set the user identifier used in backup refs
    SetUser { name: String },
    /// Set the personal access token used for HTTP remotes
    SetToken(SetTokenArgs),
    /// Show the global settings (token masked)
    Show(ShowArgs),
    /// Remove the user identifier and token
    Clear,
}

#[derive(Debug, Args)]
pub struct SetTokenArgs {
    token: String,
    /// Also set the user identifier.
    #[arg(short, long)]
    user: Option<String>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    pub path: PathBuf,
    pub git_user: Option<String>,
    /// Masked.
    pub git_token: Option<String>,
}

pub fn run(cmd: ConfigCommand) -> Result<()> {
    let path = global_config_path().context("could not determine config directory")?;
    match cmd {
        ConfigCommand::SetUser { name } => {
            let name = non_empty(&name, "user name")?;
            update(&path, |config| config.git_user = Some(name))?;
            println!("User identifier saved to {}", path.display());
        }
        ConfigCommand::SetToken(args) => {
            let token = non_empty(&args.token, "token")?;
            let user = args.user.as_deref().map(|u| non_empty(u, "user name")).transpose()?;
            update(&path, |config| {
                config.git_token = Some(token);
                if user.is_some() {
                    config.git_user = user;
                }
            })?;
            println!("Token saved to {} (owner-only)", path.display());
        }
        ConfigCommand::Show(args) => {
            let view = view(&path, &load(&path)?);
            output::print_output(OutputFormat::detect(args.json), &view, format_human)?;
            return Ok(());
        }
        ConfigCommand::Clear => {
            update(&path, |config| *config = GlobalConfig::default())?;
            println!("Credentials cleared");
        }
    }
    println!("Changes apply from the next backup cycle.");
    Ok(())
}

fn non_empty(value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(UsageError(format!("{what} cannot be empty")).into());
    }
    Ok(value.to_string())
}

fn load(path: &Path) -> Result<GlobalConfig> {
    if !path.exists() {
        return Ok(GlobalConfig::default());
    }
    GlobalConfig::load_from(path).with_context(|| format!("failed to read `{}`", path.display()))
}

fn update(path: &Path, change: impl FnOnce(&mut GlobalConfig)) -> Result<()> {
    let mut config = load(path)?;
    change(&mut config);
    config.save_to(path).with_context(|| format!("failed to write `{}`", path.display()))
}

fn view(path: &Path, config: &GlobalConfig) -> ConfigView {
    ConfigView {
        path: path.to_path_buf(),
        git_user: config.git_user.clone().filter(|u| !u.is_empty()),
        git_token: config.git_token.as_deref().filter(|t| !t.is_empty()).map(mask_token),
    }
}

fn format_human(view: &ConfigView) -> String {
    let mut lines = vec![format!("Config: {}", view.path.display())];
    lines.push(format!("  user:  {}", view.git_user.as_deref().unwrap_or("(from git config)")));
    lines.push(format!("  token: {}", view.git_token.as_deref().unwrap_or("(not set)")));
    lines.join("\n")
}
