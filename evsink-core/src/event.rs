//! Event payloads delivered from sources into sinks
//!
//! The core never inspects an event beyond its kind. Payload encoding is
//! entirely up to the producer and consumer that agree on the type.
//!
//! # Example
//!
//! ```rust
//! use evsink_core::Event;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum Io {
//!     Readable(u32),
//!     Closed(u32),
//! }
//!
//! impl Event for Io {
//!     fn kind(&self) -> &'static str {
//!         match self {
//!             Io::Readable(_) => "io.readable",
//!             Io::Closed(_) => "io.closed",
//!         }
//!     }
//! }
//!
//! assert_eq!(Io::Closed(3).kind(), "io.closed");
//! ```

/// Marker trait for values that can travel through a sink
///
/// Events must be:
/// - Clone: sources may fan the same value out, and handlers may keep copies
/// - Send: delivery happens on whatever thread the producer runs on
/// - 'static: events are buffered across threads by mailboxes
///
/// `kind()` is used for logging and filtering only. The default returns the
/// Rust type name, which is enough for single-variant payloads.
pub trait Event: Clone + Send + 'static {
    /// Category of this event
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl Event for () {
    fn kind(&self) -> &'static str {
        "unit"
    }
}

impl Event for String {}

impl Event for u64 {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Tick(u64);

    impl Event for Tick {}

    #[derive(Clone, Debug, PartialEq)]
    enum Readiness {
        Read,
        Write,
    }

    impl Event for Readiness {
        fn kind(&self) -> &'static str {
            match self {
                Readiness::Read => "read",
                Readiness::Write => "write",
            }
        }
    }

    #[test]
    fn test_default_kind_is_type_name() {
        assert!(Tick(1).kind().ends_with("Tick"));
    }

    #[test]
    fn test_custom_kind_per_variant() {
        assert_eq!(Readiness::Read.kind(), "read");
        assert_eq!(Readiness::Write.kind(), "write");
    }

    #[test]
    fn test_unit_kind() {
        assert_eq!(().kind(), "unit");
    }
}
