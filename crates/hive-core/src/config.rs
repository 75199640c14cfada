//! Configuration for the orchestration core
//!
//! Configuration is layered from defaults, a file (TOML, JSON, or YAML),
//! and `HIVE__`-prefixed environment variables.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-model tool-call capacity
///
/// Some backing models can only issue one tool call per turn; the
/// continuation logic compensates for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallCapacity {
    /// One tool call per turn
    Single,

    /// No per-turn limit
    #[default]
    Unbounded,
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HiveConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Orchestrator settings
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format
    #[serde(default)]
    pub json: bool,
}

/// Orchestrator settings consumed at session-creation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Maximum depth of a synchronous hand-off chain
    #[serde(default = "default_max_switch_depth")]
    pub max_switch_depth: usize,

    /// Maximum unattended turns per sequence
    #[serde(default = "default_max_continuation_iterations")]
    pub max_continuation_iterations: usize,

    /// How many identical turns trigger the no-progress guard
    #[serde(default = "default_no_progress_window")]
    pub no_progress_window: usize,

    /// Tool-call capacity of the backing model
    #[serde(default)]
    pub tool_call_capacity: ToolCallCapacity,

    /// Seconds of Running-idle before a session goes to sleep (None = never)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_sleep_secs: Option<u64>,

    /// Caller-visible timeout for a switch request, in seconds
    #[serde(default = "default_switch_timeout_secs")]
    pub switch_timeout_secs: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_switch_depth() -> usize {
    5
}

fn default_max_continuation_iterations() -> usize {
    10
}

fn default_no_progress_window() -> usize {
    3
}

fn default_switch_timeout_secs() -> u64 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_switch_depth: default_max_switch_depth(),
            max_continuation_iterations: default_max_continuation_iterations(),
            no_progress_window: default_no_progress_window(),
            tool_call_capacity: ToolCallCapacity::Unbounded,
            idle_sleep_secs: None,
            switch_timeout_secs: default_switch_timeout_secs(),
        }
    }
}

/// Load configuration from a file
///
/// Supports TOML, JSON, and YAML formats based on file extension.
/// Environment variables prefixed with `HIVE__` override file values.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<HiveConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(CoreError::config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("HIVE").separator("__"))
        .build()?;

    let config: HiveConfig = settings.try_deserialize()?;

    tracing::info!("Configuration loaded from {}", path.display());

    Ok(config)
}

/// Load configuration with defaults if the file doesn't exist
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> HiveConfig {
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            HiveConfig::default()
        }
    }
}
