//! Error types shared across the orchestration core

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Base error type for the orchestration core
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration parsing errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] config::ConfigError),

    /// A reasoning-loop turn raised an error
    #[error("Turn execution failed: {0}")]
    TurnExecutionFailed(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a turn execution error
    pub fn turn_failed<S: Into<String>>(msg: S) -> Self {
        Self::TurnExecutionFailed(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}
