//! Logging setup for the orchestration core
//!
//! Structured logging via the `tracing` crate. Call [`init_logging`] once at
//! process startup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (e.g., "info", "debug", "trace")
    pub level: String,
    /// Whether to use JSON format (vs. human-readable)
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Initialize logging for the application
///
/// Sets up a tracing subscriber with the specified configuration.
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        // JSON format for production/structured logging
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        // Human-readable format for development
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init();
    }

    tracing::info!("Logging initialized at level: {}", config.level);
}
