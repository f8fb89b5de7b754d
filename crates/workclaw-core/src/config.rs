//! WorkClaw configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, WorkClawError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkClawConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl WorkClawConfig {
    /// Load config from the default path (~/.workclaw/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WorkClawError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| WorkClawError::Config(format!("Failed to parse config: {e}")))?;
        config.dispatch.validate()?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| WorkClawError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the WorkClaw home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".workclaw")
    }
}

/// Background dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Max jobs running at once. Extra jobs wait in the backlog.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Upper bound for a single executor run, unless the job overrides it.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Reserved. Not enforced by the dispatcher.
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    /// Allow `auto_dispatch` to turn detected triggers into jobs.
    #[serde(default = "bool_true")]
    pub auto_dispatch: bool,
    /// Order the backlog by priority. Off = plain FIFO.
    #[serde(default = "bool_true")]
    pub priority_queue: bool,
    /// Lifecycle events kept in memory for late observers.
    #[serde(default = "default_event_history")]
    pub event_history: usize,
    /// Delay between phases of the simulated executors.
    #[serde(default = "default_simulated_step_ms")]
    pub simulated_step_ms: u64,
}

fn default_max_concurrent() -> usize { 10 }
fn default_timeout_secs() -> u64 { 300 }
fn default_memory_limit_mb() -> u64 { 1024 }
fn default_event_history() -> usize { 100 }
fn default_simulated_step_ms() -> u64 { 250 }
fn bool_true() -> bool { true }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            default_timeout_secs: default_timeout_secs(),
            memory_limit_mb: default_memory_limit_mb(),
            auto_dispatch: true,
            priority_queue: true,
            event_history: default_event_history(),
            simulated_step_ms: default_simulated_step_ms(),
        }
    }
}

impl DispatchConfig {
    /// Reject values the dispatcher can not run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(WorkClawError::Config(
                "dispatch.max_concurrent must be at least 1".into(),
            ));
        }
        if self.default_timeout_secs == 0 {
            return Err(WorkClawError::Config(
                "dispatch.default_timeout_secs must be at least 1".into(),
            ));
        }
        if self.event_history == 0 {
            return Err(WorkClawError::Config(
                "dispatch.event_history must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Default executor timeout as a `Duration`.
    pub fn default_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.default_timeout_secs)
    }
}
