//! Layered harness configuration: built-in defaults, then a TOML file, then
//! `PTH_*` environment overrides.

use crate::error::{HarnessError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PTH_CONFIG";

/// Directory of the user's global configuration, if a home directory exists.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "pth", "pth").map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".claude")
        .join("plugins")
        .join("cache")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// First component of every session branch name.
    pub branch_prefix: String,
    /// Where session workspaces are created.
    pub worktree_dir: PathBuf,
    pub git_timeout_secs: u64,
    pub build_timeout_secs: u64,
    /// Completed iterations retained for trend classification and reports.
    pub history_window: usize,
    /// Installed-plugin cache that `sync_to_cache` writes into.
    pub cache_dir: PathBuf,
    /// How many commits `get_fix_history` scans.
    pub max_log_records: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            branch_prefix: "pth".to_string(),
            worktree_dir: std::env::temp_dir(),
            git_timeout_secs: 60,
            build_timeout_secs: 120,
            history_window: 100,
            cache_dir: default_cache_dir(),
            max_log_records: 200,
        }
    }
}

impl HarnessConfig {
    /// Resolve the full configuration for this process.
    ///
    /// `explicit` (from `--config`) wins over `PTH_CONFIG`, which wins over the
    /// global file. An explicit file must exist; the global one is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => match global_config_dir().map(|dir| dir.join("config.toml")) {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.merge_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::storage(path, "failed to read config file", e))?;
        Self::from_toml(&text).map_err(|e| match e {
            HarnessError::InvalidRequest(msg) => {
                HarnessError::InvalidRequest(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| HarnessError::InvalidRequest(format!("invalid config: {e}")))
    }

    /// Apply `PTH_*` overrides. Unparseable numbers are ignored with a warning.
    pub fn merge_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = lookup("PTH_BRANCH_PREFIX") {
            self.branch_prefix = prefix;
        }
        if let Some(dir) = lookup("PTH_WORKTREE_DIR") {
            self.worktree_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("PTH_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        for (key, slot) in [
            ("PTH_GIT_TIMEOUT_SECS", &mut self.git_timeout_secs),
            ("PTH_BUILD_TIMEOUT_SECS", &mut self.build_timeout_secs),
        ] {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse() {
                    Ok(value) => *slot = value,
                    Err(_) => tracing::warn!("Ignoring {}={:?}: not a number of seconds", key, raw),
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let prefix = self.branch_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.contains(char::is_whitespace) {
            return Err(HarnessError::InvalidRequest(format!(
                "branch_prefix must be a non-empty ref component, got {:?}",
                self.branch_prefix
            )));
        }
        if self.git_timeout_secs == 0 || self.build_timeout_secs == 0 {
            return Err(HarnessError::InvalidRequest(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if self.history_window == 0 || self.max_log_records == 0 {
            return Err(HarnessError::InvalidRequest(
                "history_window and max_log_records must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}
