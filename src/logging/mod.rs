//! Logging initialization for hosts of the core.
//!
//! # Environment variables
//!
//! - `RUST_LOG`: standard tracing filter (e.g. `info`, `terminal_core=debug`)
//! - `LOG_FORMAT`: `pretty` (default), `compact`, or `json`

use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// Single-line output
    Compact,
    /// JSON for log aggregation
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Build the configuration from the environment.
    pub fn from_env() -> Self {
        let format = match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };
        Self {
            format,
            ..Default::default()
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns an error when a subscriber is already set, which callers may
/// ignore in tests.
pub fn init_logging(config: LogConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let result = match config.format {
        LogFormat::Pretty => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Compact => fmt()
            .with_env_filter(filter)
            .compact()
            .try_init(),
        LogFormat::Json => fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
    };

    result.map_err(|e| e.to_string())
}
