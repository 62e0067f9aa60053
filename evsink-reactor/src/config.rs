//! Configuration for event loops

use std::time::Duration;

use evsink_core::SinkConfig;

use crate::error::{ReactorError, Result};

/// Configuration for an [`EventLoop`](crate::EventLoop)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Name of the spawned loop thread
    /// Default: "evsink-loop"
    pub thread_name: String,

    /// How long the loop waits without any signal before calling the
    /// consumer's idle hook
    /// Default: None (wait indefinitely)
    pub idle_timeout: Option<Duration>,

    /// Configuration of the sink the loop owns
    pub sink: SinkConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            thread_name: "evsink-loop".to_string(),
            idle_timeout: None,
            sink: SinkConfig::named("evsink-loop"),
        }
    }
}

impl LoopConfig {
    /// Create a new LoopConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config whose thread and sink share `name`
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            sink: SinkConfig::named(name.clone()),
            thread_name: name,
            ..Default::default()
        }
    }

    /// Create a config that ticks the idle hook every `interval`
    pub fn ticking(interval: Duration) -> Self {
        Self {
            idle_timeout: Some(interval),
            ..Default::default()
        }
    }

    /// Set the thread name
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set the sink configuration
    pub fn with_sink(mut self, sink: SinkConfig) -> Self {
        self.sink = sink;
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.thread_name.trim().is_empty() {
            return Err(ReactorError::Configuration(
                "Thread name must not be empty".to_string(),
            ));
        }

        if self.thread_name.contains('\0') {
            return Err(ReactorError::Configuration(
                "Thread name must not contain NUL bytes".to_string(),
            ));
        }

        if self.idle_timeout == Some(Duration::ZERO) {
            return Err(ReactorError::Configuration(
                "Idle timeout must be greater than 0".to_string(),
            ));
        }

        self.sink.validate()?;
        Ok(())
    }
}
