//! Configuration types for the evsink-core crate
//!
//! Sinks are cheap to configure: a name used in logs and error messages, and
//! a cap on how many sources may be attached at once.

use crate::error::{Result, SinkError};

/// Default maximum number of attached sources
pub const DEFAULT_MAX_SOURCES: usize = 1024;

/// Configuration for an [`EventSink`](crate::EventSink)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Human-readable name used in logs, stats and errors
    /// Default: "sink"
    pub name: String,

    /// Maximum number of sources attached at the same time
    /// Default: 1024
    pub max_sources: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            name: "sink".to_string(),
            max_sources: DEFAULT_MAX_SOURCES,
        }
    }
}

impl SinkConfig {
    /// Create a new SinkConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a default config with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a config without a practical source limit
    pub fn unbounded() -> Self {
        Self {
            max_sources: usize::MAX,
            ..Default::default()
        }
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the maximum number of attached sources
    pub fn with_max_sources(mut self, max_sources: usize) -> Self {
        self.max_sources = max_sources;
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SinkError::Configuration(
                "Sink name must not be empty".to_string(),
            ));
        }

        if self.max_sources == 0 {
            return Err(SinkError::Configuration(
                "Max sources must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SinkConfig::default();
        assert_eq!(config.name, "sink");
        assert_eq!(config.max_sources, DEFAULT_MAX_SOURCES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(SinkConfig::named("io").name, "io");
        assert_eq!(SinkConfig::unbounded().max_sources, usize::MAX);

        let config = SinkConfig::new().with_name("timers").with_max_sources(8);
        assert_eq!(config.name, "timers");
        assert_eq!(config.max_sources, 8);
    }

    #[test]
    fn test_validation_failures() {
        let config = SinkConfig::named("  ");
        assert!(matches!(config.validate(), Err(SinkError::Configuration(_))));

        let config = SinkConfig::default().with_max_sources(0);
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Max sources must be greater than 0"
        );
    }
}
