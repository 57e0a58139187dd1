//! Configuration recognized by the core.

use std::path::PathBuf;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{GatewayError, GatewayResult};

/// Core configuration: replay pacing, tick file location, and account
/// identity.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    /// Simulator tick interval in milliseconds
    #[serde(default = "default_speed")]
    pub speed: u64,

    /// Directory of tick files, one file per instrument named after it
    #[serde(default = "default_source")]
    pub source: PathBuf,

    /// Starting account balance
    #[serde(default)]
    pub initial_balance: Decimal,

    /// Identifier passed through to live brokers
    #[serde(default = "default_descriptor")]
    pub descriptor: String,
}

fn default_speed() -> u64 {
    100
}

fn default_source() -> PathBuf {
    PathBuf::from("source")
}

fn default_descriptor() -> String {
    "simulation".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            source: default_source(),
            initial_balance: Decimal::ZERO,
            descriptor: default_descriptor(),
        }
    }
}

impl CoreConfig {
    /// Check the configuration is usable.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.speed == 0 {
            return Err(GatewayError::Configuration(
                "speed must be positive".to_string(),
            ));
        }
        if self.descriptor.trim().is_empty() {
            return Err(GatewayError::Configuration(
                "descriptor must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.speed, 100);
        assert_eq!(config.source, PathBuf::from("source"));
        assert_eq!(config.descriptor, "simulation");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CoreConfig =
            serde_json::from_str(r#"{"speed": 10, "initial_balance": "50000"}"#).unwrap();
        assert_eq!(config.speed, 10);
        assert_eq!(config.initial_balance, Decimal::from(50_000));
        assert_eq!(config.descriptor, "simulation");
    }

    #[test]
    fn test_validation() {
        let mut config = CoreConfig::default();
        config.speed = 0;
        assert!(config.validate().is_err());

        config.speed = 100;
        config.descriptor = " ".into();
        assert!(config.validate().is_err());
    }
}
