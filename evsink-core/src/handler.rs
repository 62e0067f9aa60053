//! Consumer-side delivery hooks
//!
//! A sink does not know what its consumer does with events. It only calls the
//! three hooks of [`SinkHandler`] and, optionally, the attach/detach
//! notifications.

use crate::error::HandlerError;
use crate::event::Event;
use crate::id::SourceId;

/// Capability set a consumer implements to receive events from a sink
///
/// Hooks run on the producer's thread, outside the sink's registry lock, so a
/// hook may freely attach or detach sources.
///
/// - `on_commit_event` is synchronous delivery. Its error is returned to the
///   committing caller.
/// - `on_queue_event` must buffer the event for the owning thread and return
///   promptly. It must never wait for the consumer to drain.
/// - `on_wake` must unblock the owning thread's wait, or arrange for its next
///   wait to return immediately.
pub trait SinkHandler<E: Event>: Send + Sync + 'static {
    /// Handle an event synchronously on the calling thread
    fn on_commit_event(&self, event: E) -> Result<(), HandlerError>;

    /// Buffer an event for the owning thread
    fn on_queue_event(&self, event: E);

    /// Interrupt the owning thread's wait
    fn on_wake(&self);

    /// Called after a source has been added to the registry
    fn on_source_attached(&self, _source: SourceId) {}

    /// Called after a source has been removed from the registry
    fn on_source_detached(&self, _source: SourceId) {}
}

/// Handler assembled from three closures
///
/// Convenient for tests and small consumers that do not want a dedicated
/// type.
///
/// ```rust
/// use evsink_core::{EventSink, FnHandler};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&seen);
///
/// let handler = FnHandler::new(
///     move |_: String| {
///         counter.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     },
///     |_: String| {},
///     || {},
/// );
///
/// let sink = EventSink::new(handler);
/// sink.commit_event("hello".to_string()).unwrap();
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct FnHandler<C, Q, W> {
    commit: C,
    queue: Q,
    wake: W,
}

impl<C, Q, W> FnHandler<C, Q, W> {
    /// Build a handler from commit, queue and wake closures
    pub fn new<E>(commit: C, queue: Q, wake: W) -> Self
    where
        E: Event,
        C: Fn(E) -> Result<(), HandlerError> + Send + Sync + 'static,
        Q: Fn(E) + Send + Sync + 'static,
        W: Fn() + Send + Sync + 'static,
    {
        Self {
            commit,
            queue,
            wake,
        }
    }
}

impl<E, C, Q, W> SinkHandler<E> for FnHandler<C, Q, W>
where
    E: Event,
    C: Fn(E) -> Result<(), HandlerError> + Send + Sync + 'static,
    Q: Fn(E) + Send + Sync + 'static,
    W: Fn() + Send + Sync + 'static,
{
    fn on_commit_event(&self, event: E) -> Result<(), HandlerError> {
        (self.commit)(event)
    }

    fn on_queue_event(&self, event: E) {
        (self.queue)(event)
    }

    fn on_wake(&self) {
        (self.wake)()
    }
}

impl<C, Q, W> std::fmt::Debug for FnHandler<C, Q, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}
