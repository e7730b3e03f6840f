/*!
 * Logging functionality for Hausflow.
 *
 * This module provides tracing setup and span helpers shared by the gateway
 * components.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Install the global subscriber from the `[logging]` configuration section.
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::config(format!("Invalid log filter {:?}: {}", config.level, e)))?;

    let result = if config.json_format {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .try_init()
    };

    result.map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create a new span for a component
///
/// # Arguments
///
/// * `name` - The name of the component
/// * `id` - An optional ID for the component instance, usually a device address
pub fn component_span(name: &str, id: Option<&str>) -> Span {
    match id {
        Some(id) => tracing::info_span!("component", name = %name, id = %id),
        None => tracing::info_span!("component", name = %name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        // Only the first initialization in a process can succeed.
        let _ = init_from_config(&LoggingConfig::default());
        assert!(init_from_config(&LoggingConfig::default()).is_err());
    }

    #[test]
    fn test_component_span() {
        // Spans are disabled unless some test already installed a subscriber.
        let span = component_span("beacon", Some("00:0d:6f:c6:aa:f5"));
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "component");
        }

        let span = component_span("bridge", None);
        assert!(span.metadata().map_or(true, |m| m.name() == "component"));
    }
}
