// Configuration files for the daemon and CLI.
//
// Global config: `<config dir>/config.toml`
// Registry:      `<config dir>/registry.toml`
// Local config:  `<repo>/.snapkeep.toml`
//
// `<config dir>` is `$SNAPKEEP_HOME` when set, else `<platform config dir>/snapkeep`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};

/// Environment override for the global config directory.
pub const HOME_ENV: &str = "SNAPKEEP_HOME";

/// File name of the per-repository config.
pub const LOCAL_CONFIG_FILE: &str = ".snapkeep.toml";

pub const GLOBAL_CONFIG_FILE: &str = "config.toml";
pub const REGISTRY_FILE: &str = "registry.toml";

pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SCAN_SECRETS: bool = true;
pub const DEFAULT_ONLY_STAGED: bool = false;
/// Longest accepted backup interval (one week).
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Root directory for global state.
pub fn global_dir() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(explicit));
    }
    dirs::config_dir().map(|d| d.join("snapkeep"))
}

/// Path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join(GLOBAL_CONFIG_FILE))
}

/// Path to the registry of monitored repositories.
pub fn registry_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join(REGISTRY_FILE))
}

/// Path to the local config file of a repository.
pub fn local_config_path(repo_path: &Path) -> PathBuf {
    repo_path.join(LOCAL_CONFIG_FILE)
}

fn home_not_found() -> ConfigError {
    ConfigError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "could not determine config directory",
    ))
}

fn write_private(path: &Path, contents: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        ensure_owner_only_dir(parent)
            .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))?;
    }
    std::fs::write(path, contents).map_err(ConfigError::Io).and_then(|_| {
        ensure_owner_only_file(path)
            .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))
    })
}

// ── Global config ──────────────────────────────────────────────────

/// Operator-wide settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Identity override for backup refs. Wins over the git committer name.
    pub git_user: Option<String>,
    /// Personal access token sent to HTTP remotes so pushes never prompt.
    pub git_token: Option<String>,
}

impl GlobalConfig {
    /// Load from the global config path. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = global_config_path().ok_or_else(home_not_found)?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories, owner-only).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        write_private(path, &contents)
    }

    pub fn identity_override(&self) -> &str {
        self.git_user.as_deref().unwrap_or("")
    }

    pub fn has_credentials(&self) -> bool {
        self.git_user.as_deref().is_some_and(|u| !u.is_empty())
            || self.git_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Where a cycle reads the global config from. Loaded fresh on every cycle.
pub trait GlobalConfigSource: Send + Sync {
    fn load(&self) -> GlobalConfig;
}

/// Reads the global config file, defaulting on absence or parse failure.
#[derive(Debug, Clone)]
pub struct FileGlobalConfig {
    path: Option<PathBuf>,
}

impl FileGlobalConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()) }
    }

    pub fn from_env() -> Self {
        Self { path: global_config_path() }
    }
}

impl GlobalConfigSource for FileGlobalConfig {
    fn load(&self) -> GlobalConfig {
        self.path.as_deref().and_then(|p| GlobalConfig::load_from(p).ok()).unwrap_or_default()
    }
}

impl GlobalConfigSource for GlobalConfig {
    fn load(&self) -> GlobalConfig {
        self.clone()
    }
}

// ── Local config ───────────────────────────────────────────────────

/// Per-repository settings at `<repo>/.snapkeep.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalConfig {
    /// Backup interval in seconds.
    pub interval_secs: u64,
    /// Run the secret scanner over each snapshot before pushing.
    pub scan_secrets: bool,
    /// Capture staged changes only.
    pub only_staged: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            scan_secrets: DEFAULT_SCAN_SECRETS,
            only_staged: DEFAULT_ONLY_STAGED,
        }
    }
}

impl LocalConfig {
    /// Load from `<repo>/.snapkeep.toml`. Returns defaults if the file
    /// doesn't exist; parse failures are reported.
    pub fn load(repo_path: &Path) -> Result<Self, ConfigError> {
        let path = local_config_path(repo_path);
        match Self::load_from(&path) {
            Err(ConfigError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    pub fn save(&self, repo_path: &Path) -> Result<(), ConfigError> {
        self.save_to(&local_config_path(repo_path))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Timer period, clamped to `1..=MAX_INTERVAL_SECS` seconds.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.clamp(1, MAX_INTERVAL_SECS))
    }
}

// ── Registry ───────────────────────────────────────────────────────

/// Ordered, de-duplicated set of monitored repository paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Registry {
    repositories: Vec<PathBuf>,
}

impl Registry {
    pub fn new(repositories: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut registry = Self::default();
        for path in repositories {
            registry.add(path);
        }
        registry
    }

    /// Load from the registry path. A missing or empty file is an empty registry.
    pub fn load() -> Result<Self, ConfigError> {
        let path = registry_path().ok_or_else(home_not_found)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(error) => return Err(ConfigError::Io(error)),
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: Self = toml::from_str(&contents).map_err(ConfigError::Parse)?;
        Ok(Self::new(parsed.repositories))
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = registry_path().ok_or_else(home_not_found)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        write_private(path, &contents)
    }

    /// Add a path. Returns `false` when it was already present.
    pub fn add(&mut self, path: PathBuf) -> bool {
        if self.contains(&path) {
            return false;
        }
        self.repositories.push(path);
        true
    }

    pub fn remove(&mut self, path: &Path) -> Result<(), ConfigError> {
        let before = self.repositories.len();
        self.repositories.retain(|existing| existing != path);
        if self.repositories.len() == before {
            return Err(ConfigError::NotRegistered(path.to_path_buf()));
        }
        Ok(())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.repositories.iter().any(|existing| existing == path)
    }

    pub fn repositories(&self) -> Vec<PathBuf> {
        self.repositories.clone()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    NotRegistered(PathBuf),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
            Self::NotRegistered(path) => {
                write!(f, "repository not found in registry: {}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}
