//! Hive Core
//!
//! Shared foundation for the hive orchestration workspace: error handling,
//! configuration loading, and logging setup.

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{load_config, load_config_or_default, HiveConfig, OrchestratorSettings, ToolCallCapacity};
pub use error::{CoreError, Result};
pub use logging::init_logging;
