use evsink_core::SinkError;
use thiserror::Error;

/// Errors that can occur while running an event loop
#[derive(Error, Debug)]
pub enum ReactorError {
    /// The loop thread could not be spawned
    #[error("Failed to spawn loop thread '{thread}': {source}")]
    Spawn {
        thread: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid loop configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The loop has already been shut down
    #[error("Event loop has already stopped")]
    Stopped,

    /// The loop thread panicked while running the consumer
    #[error("Event loop thread '{0}' panicked")]
    Panicked(String),

    /// The loop was spawned without a commit closure
    #[error("Event loop '{0}' does not accept committed events")]
    CommitUnsupported(String),

    /// Error from the underlying sink
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Result type for reactor operations
pub type Result<T> = std::result::Result<T, ReactorError>;
