//! Thread-safe event sinks
//!
//! A sink aggregates events from many concurrently active sources into one
//! consumer. Producers on background threads (I/O completion, timers, signal
//! handlers) deliver in one of three ways:
//!
//! - **Commit**: synchronous, the consumer's hook runs on the producer's thread
//! - **Queue**: buffered for the consumer's owning thread to drain later
//! - **Wake**: interrupt the owning thread's wait, with no payload
//!
//! Subscription teardown is safe in both directions. A source that detaches
//! stops delivering; a sink that goes away tells every still-attached source
//! exactly once, without holding any lock while it does so.
//!
//! # Quick Start
//!
//! ```rust
//! use evsink_core::{EventSink, EventSource, QueueingHandler};
//! use evsink_core::mailbox::Signal;
//!
//! // Consumer: commits are printed inline, queued events go to a mailbox
//! let (handler, receiver) = QueueingHandler::new(|line: String| {
//!     println!("committed: {line}");
//!     Ok(())
//! });
//! let sink = EventSink::new(handler);
//!
//! // Producer
//! let source = EventSource::named("stdin");
//! source.attach(&sink).unwrap();
//! source.commit_event("now".to_string()).unwrap();
//! source.queue_event("later".to_string());
//! source.wake();
//!
//! // Owning thread drains
//! let drained: Vec<_> = receiver.try_iter().collect();
//! assert_eq!(drained, vec![Signal::Event("later".to_string()), Signal::Wake]);
//! ```
//!
//! # Architecture
//!
//! ```text
//! EventSource<E> ──Weak<dyn SinkPort<E>>──► SinkCore<E, H> ◄── EventSink<E, H> (owner)
//!       ▲                                     │
//!       └──────Weak<dyn SourceLink>───────────┤ registry: Mutex<Vec<(SourceId, link)>>
//!                                             │
//!                                             └── handler: H: SinkHandler<E>
//!                                                   ├── on_commit_event
//!                                                   ├── on_queue_event ──► Mailbox ──► MailboxReceiver
//!                                                   └── on_wake ─────────► Mailbox ──► MailboxReceiver
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod id;
pub mod logging;
pub mod mailbox;
pub mod sink;
pub mod source;
pub mod stats;

// Re-exports - Public API
pub use config::SinkConfig;
pub use error::{HandlerError, Result, SinkError};
pub use event::Event;
pub use handler::{FnHandler, SinkHandler};
pub use id::{SinkId, SourceId};
pub use mailbox::{Mailbox, MailboxReceiver, QueueingHandler, Signal};
pub use sink::{ConnectOutcome, Delivery, EventSink, SinkPort, SourceLink};
pub use source::EventSource;
pub use stats::SinkStats;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::event::Event;
    pub use crate::handler::SinkHandler;
    pub use crate::mailbox::{QueueingHandler, Signal};
    pub use crate::sink::{Delivery, EventSink};
    pub use crate::source::EventSource;
}
