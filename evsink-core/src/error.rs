//! Error types for the evsink-core crate.

use crate::id::SinkId;

/// Error returned by a handler's commit hook
///
/// Handlers may fail with any error type; the sink boxes it and hands it back
/// to the committing caller untouched.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when talking to a sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The handler's `on_commit_event` returned an error
    #[error("Commit handler for {sink} failed: {source}")]
    Handler {
        /// Name of the sink whose handler failed
        sink: String,
        /// The error produced by the handler
        #[source]
        source: HandlerError,
    },

    /// The sink is tearing down and accepts no new sources
    #[error("Sink {0} is closed")]
    Closed(SinkId),

    /// The registry already holds the maximum number of sources
    #[error("Sink registry is full (max {max_sources} sources)")]
    RegistryFull {
        /// Configured limit
        max_sources: usize,
    },

    /// The sink behind a port has already been dropped
    #[error("Sink is no longer alive")]
    Gone,

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SinkError {
    /// Returns the handler error if this is a commit failure
    pub fn handler_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            SinkError::Handler { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using SinkError.
pub type Result<T> = std::result::Result<T, SinkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct DiskOnFire;

    #[test]
    fn test_sink_error_display() {
        let error = SinkError::Handler {
            sink: "reactor".to_string(),
            source: Box::new(DiskOnFire),
        };
        assert_eq!(error.to_string(), "Commit handler for reactor failed: disk on fire");

        let id = SinkId::next();
        let error = SinkError::Closed(id);
        assert_eq!(error.to_string(), format!("Sink {} is closed", id));

        let error = SinkError::RegistryFull { max_sources: 4 };
        assert_eq!(error.to_string(), "Sink registry is full (max 4 sources)");

        assert_eq!(SinkError::Gone.to_string(), "Sink is no longer alive");

        let error = SinkError::Configuration("empty name".to_string());
        assert_eq!(error.to_string(), "Configuration error: empty name");
    }

    #[test]
    fn test_handler_error_is_source() {
        let error = SinkError::Handler {
            sink: "reactor".to_string(),
            source: Box::new(DiskOnFire),
        };

        let source = error.source().expect("handler error should be chained");
        assert!(source.downcast_ref::<DiskOnFire>().is_some());
        assert!(error.handler_error().is_some());
        assert!(SinkError::RegistryFull { max_sources: 1 }.handler_error().is_none());
    }
}
