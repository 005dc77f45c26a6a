//! Configuration management for tsk
//!
//! Loads the JSON process list and resolves paths relative to the home
//! directory.

use crate::constants::{DEFAULT_CONFIG_FILE, DEFAULT_LOG_ARCHIVE, DEFAULT_LOG_DIR};
use crate::error::{Result, TskError};
use crate::process::CommandLine;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory for log files, `~` allowed
    #[serde(default = "default_log_dir")]
    pub logs: String,
    /// Supervised processes, in menu order
    #[serde(default)]
    pub processes: Vec<ProcessConfig>,
}

/// One supervised process
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    pub name: String,
    pub cmd: CommandLine,
    #[serde(default)]
    pub stop: Option<CommandLine>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default = "default_log_archive")]
    pub log_archive: usize,
    /// Seconds to wait for exit after the stop command; unbounded if absent
    #[serde(default)]
    pub stop_timeout: Option<u64>,
    /// Kill instead of leaving the stop pending once `stop_timeout` passes
    #[serde(default)]
    pub kill_on_timeout: bool,
}

fn default_log_dir() -> String {
    format!("~/{}", DEFAULT_LOG_DIR)
}

fn default_log_archive() -> usize {
    DEFAULT_LOG_ARCHIVE
}

impl ProcessConfig {
    /// Minimal definition with defaults for every optional field
    pub fn new(name: impl Into<String>, cmd: impl Into<CommandLine>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            stop: None,
            cwd: None,
            log_archive: DEFAULT_LOG_ARCHIVE,
            stop_timeout: None,
            kill_on_timeout: false,
        }
    }

    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout.map(Duration::from_secs)
    }
}

impl Config {
    /// Read and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TskError::ConfigNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration text
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for process in &self.processes {
            if process.name.trim().is_empty() {
                return Err(TskError::Config("process name cannot be empty".to_string()));
            }
            if !seen.insert(process.name.as_str()) {
                return Err(TskError::DuplicateProcess(process.name.clone()));
            }
            if process.cmd.is_empty() {
                return Err(TskError::EmptyCommand(process.name.clone()));
            }
            if process.stop.as_ref().is_some_and(CommandLine::is_empty) {
                return Err(TskError::EmptyCommand(process.name.clone()));
            }
        }
        Ok(())
    }

    /// Expanded log directory
    pub fn log_dir(&self) -> PathBuf {
        expand_home(&self.logs)
    }

    /// Create the log directory if it does not exist yet
    pub fn ensure_log_dir(&self) -> Result<PathBuf> {
        let dir = self.log_dir();
        fs::create_dir_all(&dir).map_err(TskError::Io)?;
        Ok(dir)
    }
}

/// `~/.tsk.json`, or a relative path if the home directory is unknown
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\"))
    };

    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
