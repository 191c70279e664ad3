//! Structured logging to stdout.
//!
//! Implements 12-factor app logging: structured JSON (or pretty, for local
//! development) written to stdout, no file sinks.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging subsystem.
///
/// Sets up tracing-subscriber with either JSON or pretty format, respecting
/// the configured log level. `RUST_LOG`, if set, takes precedence over
/// `config.log_level`.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => init_json_logging(filter),
        LogFormat::Pretty => init_pretty_logging(filter),
    }
}

/// Initialize JSON logging for production.
fn init_json_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_file(false)
        .with_line_number(false)
        .flatten_event(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

/// Initialize pretty logging for development.
fn init_pretty_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let pretty_layer = fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(pretty_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

/// Standard log event names.
pub mod events {
    /// Proxy is starting up.
    pub const STARTUP: &str = "startup";

    /// Proxy is shutting down.
    pub const SHUTDOWN: &str = "shutdown";

    /// Listener is bound and accepting connections.
    pub const LISTENING: &str = "listening";

    /// A request finished and the primary's response was streamed back.
    pub const REQUEST_COMPLETED: &str = "request_completed";

    /// Forwarding the request to the primary failed.
    pub const DISPATCH_ERROR: &str = "dispatch_error";

    /// The async inventory write for a mutating response failed.
    pub const INVENTORY_FAILURE: &str = "inventory_failure";

    /// The async mirror replay for a mutating response failed.
    pub const MIRROR_FAILURE: &str = "mirror_failure";

    /// Startup configuration failed validation.
    pub const CONFIG_ERROR: &str = "config_error";
}

/// Helper macros for structured logging with standard fields.
///
/// These wrap the tracing macros to ensure consistent event naming.
#[macro_export]
macro_rules! log_startup {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::STARTUP,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_shutdown {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::SHUTDOWN,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_listening {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::LISTENING,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_request_completed {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::REQUEST_COMPLETED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_dispatch_error {
    ($($field:tt)*) => {
        tracing::error!(
            event = $crate::logging::events::DISPATCH_ERROR,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_inventory_failure {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::INVENTORY_FAILURE,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_mirror_failure {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::MIRROR_FAILURE,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_config_error {
    ($($field:tt)*) => {
        tracing::error!(
            event = $crate::logging::events::CONFIG_ERROR,
            $($field)*
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_distinct() {
        let names = [
            events::STARTUP,
            events::SHUTDOWN,
            events::LISTENING,
            events::REQUEST_COMPLETED,
            events::DISPATCH_ERROR,
            events::INVENTORY_FAILURE,
            events::MIRROR_FAILURE,
            events::CONFIG_ERROR,
        ];
        for (i, a) in names.iter().enumerate() {
            for b in names[i + 1..].iter() {
                assert_ne!(a, b);
            }
        }
    }
}
