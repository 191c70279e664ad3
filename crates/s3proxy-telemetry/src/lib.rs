//! Logging infrastructure for s3proxy.
//!
//! # Usage
//!
//! ```ignore
//! use s3proxy_telemetry::{TelemetryConfig, Telemetry};
//!
//! let config = TelemetryConfig::new().with_log_level("info");
//! let telemetry = Telemetry::init(config)?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::events;

use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Telemetry handle. Holds the resolved configuration; initializing it
/// wires up the global `tracing` subscriber as a side effect.
pub struct Telemetry {
    config: TelemetryConfig,
}

impl Telemetry {
    /// Initialize telemetry with the given configuration.
    pub fn init(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        logging::init_logging(&config)?;
        Ok(Self { config })
    }

    /// Initialize telemetry without setting up logging.
    ///
    /// Use this when logging is already initialized (e.g., in tests).
    pub fn init_without_logging(config: TelemetryConfig) -> Self {
        Self { config }
    }

    /// Get the telemetry configuration.
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_init_without_logging() {
        let config = TelemetryConfig::default();
        let telemetry = Telemetry::init_without_logging(config);
        assert_eq!(telemetry.config().service_name, "s3proxy");
    }
}
