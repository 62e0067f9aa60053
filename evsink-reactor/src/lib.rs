//! # evsink-reactor
//!
//! Owning-thread consumers for [`evsink_core`] sinks.
//!
//! - [`EventLoop`] spawns a named thread, owns a mailbox-backed sink and
//!   dispatches queued events, wakes and idle ticks to a [`LoopConsumer`].
//! - [`async_mailbox`] provides the same FIFO, coalesced-wake mailbox for
//!   consumers that live in a tokio task.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use evsink_core::EventSource;
//! use evsink_reactor::{EventLoop, LoopConfig};
//! use std::time::Duration;
//!
//! let config = LoopConfig::named("ui").with_idle_timeout(Duration::from_millis(100));
//! let event_loop = EventLoop::spawn(config, |line: String| println!("{line}"))?;
//!
//! let stdin = EventSource::named("stdin");
//! event_loop.attach(&stdin)?;
//! stdin.queue_event("hello".to_string());
//! # Ok::<(), evsink_reactor::ReactorError>(())
//! ```

pub mod async_mailbox;
pub mod config;
pub mod error;
pub mod event_loop;

// Re-export main types for convenience
pub use async_mailbox::{AsyncMailbox, AsyncQueueingHandler, AsyncReceiver};
pub use config::LoopConfig;
pub use error::{ReactorError, Result};
pub use event_loop::{EventLoop, LoopConsumer, LoopHandler, LoopSink, LoopStats};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{EventLoop, LoopConfig, LoopConsumer, ReactorError};
    pub use evsink_core::prelude::*;
}
