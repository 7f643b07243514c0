//! Runtime configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via MAGPIE_CONFIG)
//! 3. Environment variables

use crate::machine::RunOptions;
use crate::strategy::Strategy;
use crate::sync::{Shared, Timing};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output artifacts.
    pub output: OutputConfig,
    /// Default run options for sessions.
    pub run: RunConfig,
    /// Polling intervals.
    pub timing: TimingConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Self::default();

        // Load from file if specified
        if let Ok(path) = std::env::var("MAGPIE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.output.apply_env_overrides();
        self.run.apply_env_overrides();
        self.timing.apply_env_overrides();
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.run.validate()?;
        self.timing.validate()
    }

    /// Run options for a session, from the `run` section.
    pub fn run_options(&self) -> RunOptions {
        self.run.to_options()
    }

    /// Shared state using the configured polling intervals.
    pub fn shared(&self) -> Arc<Shared> {
        Shared::with_timing(self.timing.to_timing())
    }
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for CSV logs and graph exports. Nothing is written when unset.
    pub dir: Option<PathBuf>,
    /// Write one transition log per session.
    pub transition_log: bool,
    /// Write the event log once all sessions finish.
    pub event_log: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            transition_log: true,
            event_log: true,
        }
    }
}

impl OutputConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("MAGPIE_OUTPUT_DIR") {
            if !dir.is_empty() {
                self.dir = Some(PathBuf::from(dir));
            }
        }
    }

    /// Directory for transition logs, if they are enabled.
    pub fn transition_log_dir(&self) -> Option<&Path> {
        self.dir.as_deref().filter(|_| self.transition_log)
    }

    /// Directory for the event log, if it is enabled.
    pub fn event_log_dir(&self) -> Option<&Path> {
        self.dir.as_deref().filter(|_| self.event_log)
    }
}

/// Default run options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub strategy: Strategy,
    /// Maximum number of transitions per session. Unlimited when unset.
    pub max_transitions: Option<u64>,
    /// Maximum run time per session in seconds. Unlimited when unset.
    pub max_run_time_secs: Option<u64>,
    pub stop_on_fail: bool,
    pub stop_at_state: Option<String>,
}

impl RunConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(strategy) = std::env::var("MAGPIE_STRATEGY") {
            if let Ok(parsed) = strategy.parse() {
                self.strategy = parsed;
            }
        }

        if let Ok(max) = std::env::var("MAGPIE_MAX_TRANSITIONS") {
            if let Ok(n) = max.parse() {
                self.max_transitions = Some(n);
            }
        }

        if let Ok(max) = std::env::var("MAGPIE_MAX_RUN_TIME_SECS") {
            if let Ok(secs) = max.parse() {
                self.max_run_time_secs = Some(secs);
            }
        }

        if let Ok(stop) = std::env::var("MAGPIE_STOP_ON_FAIL") {
            self.stop_on_fail = stop == "1" || stop.to_lowercase() == "true";
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.strategy == Strategy::FullCoverage {
            return Err(ConfigError::ValidationError(format!(
                "strategy {} is not implemented",
                self.strategy
            )));
        }
        if self.strategy == Strategy::ShortestPath && self.stop_at_state.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "strategy {} requires run.stop_at_state",
                self.strategy
            )));
        }
        Ok(())
    }

    pub fn to_options(&self) -> RunOptions {
        RunOptions {
            max_run_time: self.max_run_time_secs.map(Duration::from_secs),
            max_transitions: self.max_transitions,
            stop_on_fail: self.stop_on_fail,
            stop_at_state: self.stop_at_state.clone(),
            strategy: self.strategy,
        }
    }
}

/// Polling intervals in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait before retrying when no transition is allowed.
    pub selection_retry_ms: u64,
    pub pause_poll_ms: u64,
    pub event_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            selection_retry_ms: 100,
            pause_poll_ms: 500,
            event_poll_ms: 250,
        }
    }
}

impl TimingConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(ms) = std::env::var("MAGPIE_RETRY_INTERVAL_MS") {
            if let Ok(n) = ms.parse() {
                self.selection_retry_ms = n;
            }
        }

        if let Ok(ms) = std::env::var("MAGPIE_PAUSE_POLL_MS") {
            if let Ok(n) = ms.parse() {
                self.pause_poll_ms = n;
            }
        }

        if let Ok(ms) = std::env::var("MAGPIE_EVENT_POLL_MS") {
            if let Ok(n) = ms.parse() {
                self.event_poll_ms = n;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.selection_retry_ms == 0 || self.pause_poll_ms == 0 || self.event_poll_ms == 0 {
            return Err(ConfigError::ValidationError(
                "polling intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_timing(&self) -> Timing {
        Timing {
            selection_retry: Duration::from_millis(self.selection_retry_ms),
            pause_poll: Duration::from_millis(self.pause_poll_ms),
            event_poll: Duration::from_millis(self.event_poll_ms),
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
