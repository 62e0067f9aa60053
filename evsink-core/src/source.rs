//! Reference event source
//!
//! [`EventSource`] implements the producer side of the sink contract:
//! - attached to at most one sink at a time
//! - attaching to a new sink detaches from the old one first
//! - detaching (explicitly or on drop) disconnects exactly once
//! - after a forced unsubscribe it never delivers to that sink again
//!
//! Producers that need their own source type can implement
//! [`SourceLink`] and talk to a [`SinkPort`] directly; this type is what
//! most producers embed.
//!
//! Attach and detach on one source must be serialized by its owner.
//! Deliveries may come from any number of threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{Result, SinkError};
use crate::event::Event;
use crate::handler::SinkHandler;
use crate::id::{SinkId, SourceId};
use crate::sink::{ConnectOutcome, Delivery, EventSink, SinkPort, SourceLink};

type UnsubscribeCallback = Box<dyn Fn(SinkId) + Send + Sync>;

struct Attachment<E: Event> {
    sink: SinkId,
    port: Weak<dyn SinkPort<E>>,
}

struct SourceInner<E: Event> {
    id: SourceId,
    name: String,
    slot: Mutex<Option<Attachment<E>>>,
    forced_unsubscribes: AtomicUsize,
    on_unsubscribe: Option<UnsubscribeCallback>,
}

impl<E: Event> SourceInner<E> {
    fn current_port(&self) -> Option<Arc<dyn SinkPort<E>>> {
        self.slot.lock().as_ref().and_then(|a| a.port.upgrade())
    }

    fn clear_if(&self, sink: SinkId) -> bool {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|a| a.sink) == Some(sink) {
            *slot = None;
            true
        } else {
            false
        }
    }
}

impl<E: Event> SourceLink for SourceInner<E> {
    fn on_unsubscribe(&self, sink: SinkId) {
        if !self.clear_if(sink) {
            tracing::debug!(
                "{} ({}): stale unsubscribe from {}",
                self.name,
                self.id,
                sink
            );
            return;
        }

        self.forced_unsubscribes.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("{} ({}): unsubscribed by {}", self.name, self.id, sink);

        if let Some(callback) = &self.on_unsubscribe {
            callback(sink);
        }
    }
}

/// Producer handle attached to at most one sink
///
/// # Example
///
/// ```rust
/// use evsink_core::{EventSink, EventSource, FnHandler};
///
/// let sink = EventSink::new(FnHandler::new(|_: u64| Ok(()), |_: u64| {}, || {}));
/// let source = EventSource::named("timer");
///
/// source.attach(&sink).unwrap();
/// assert!(sink.is_attached(source.id()));
///
/// drop(sink);
/// assert!(!source.is_attached());
/// assert_eq!(source.forced_unsubscribes(), 1);
/// ```
pub struct EventSource<E: Event> {
    inner: Arc<SourceInner<E>>,
}

impl<E: Event> EventSource<E> {
    /// Create an unattached source
    pub fn new() -> Self {
        Self::build("source".to_string(), None)
    }

    /// Create an unattached source with a name used in logs
    pub fn named(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// Create a source that runs `callback` when a sink force-unsubscribes it
    ///
    /// The callback runs on the thread tearing the sink down, after the
    /// source has already forgotten the sink. It may re-attach the source
    /// elsewhere.
    pub fn with_unsubscribe_callback<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(SinkId) + Send + Sync + 'static,
    {
        Self::build(name.into(), Some(Box::new(callback)))
    }

    fn build(name: String, on_unsubscribe: Option<UnsubscribeCallback>) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                id: SourceId::next(),
                name,
                slot: Mutex::new(None),
                forced_unsubscribes: AtomicUsize::new(0),
                on_unsubscribe,
            }),
        }
    }

    /// Identity of this source
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Name of this source
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Attach to `sink`, detaching from any previous sink first
    pub fn attach<H>(&self, sink: &EventSink<E, H>) -> Result<ConnectOutcome>
    where
        H: SinkHandler<E>,
    {
        self.attach_port(sink.port())
    }

    /// Attach through a type-erased port
    pub fn attach_port(&self, port: Weak<dyn SinkPort<E>>) -> Result<ConnectOutcome> {
        let target = port.upgrade().ok_or(SinkError::Gone)?;
        let sink = target.sink_id();

        let previous = self.inner.slot.lock().replace(Attachment {
            sink,
            port: port.clone(),
        });

        if let Some(previous) = previous {
            if previous.sink != sink {
                if let Some(old) = previous.port.upgrade() {
                    old.disconnect(self.inner.id);
                }
            }
        }

        let link: Weak<SourceInner<E>> = Arc::downgrade(&self.inner);
        let result = target.connect(self.inner.id, link);

        match &result {
            Ok(outcome) => tracing::debug!(
                "{} ({}): attach to {} -> {:?}",
                self.inner.name,
                self.inner.id,
                target.sink_name(),
                outcome
            ),
            Err(e) => {
                self.inner.clear_if(sink);
                tracing::warn!(
                    "{} ({}): attach to {} failed: {}",
                    self.inner.name,
                    self.inner.id,
                    target.sink_name(),
                    e
                );
            }
        }

        result
    }

    /// Detach from the current sink
    ///
    /// Returns true if the sink still had this source registered.
    pub fn detach(&self) -> bool {
        let previous = self.inner.slot.lock().take();
        match previous.and_then(|a| a.port.upgrade()) {
            Some(port) => port.disconnect(self.inner.id),
            None => false,
        }
    }

    /// Check whether this source believes it is attached
    pub fn is_attached(&self) -> bool {
        self.inner.slot.lock().is_some()
    }

    /// The sink this source is attached to, if any
    pub fn attached_sink(&self) -> Option<SinkId> {
        self.inner.slot.lock().as_ref().map(|a| a.sink)
    }

    /// Number of forced unsubscribes this source has received
    pub fn forced_unsubscribes(&self) -> usize {
        self.inner.forced_unsubscribes.load(Ordering::SeqCst)
    }

    /// Commit an event to the attached sink
    ///
    /// Returns [`Delivery::Ignored`] when unattached.
    pub fn commit_event(&self, event: E) -> Result<Delivery> {
        match self.inner.current_port() {
            Some(port) => port.commit_from(self.inner.id, event),
            None => Ok(Delivery::Ignored),
        }
    }

    /// Queue an event on the attached sink
    pub fn queue_event(&self, event: E) -> Delivery {
        match self.inner.current_port() {
            Some(port) => port.queue_from(self.inner.id, event),
            None => Delivery::Ignored,
        }
    }

    /// Wake the attached sink's owning thread
    pub fn wake(&self) -> Delivery {
        match self.inner.current_port() {
            Some(port) => port.wake_from(self.inner.id),
            None => Delivery::Ignored,
        }
    }
}

impl<E: Event> Default for EventSource<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> Drop for EventSource<E> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<E: Event> std::fmt::Debug for EventSource<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("attached_sink", &self.attached_sink())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnHandler;
    use std::sync::Mutex as StdMutex;

    fn recording_sink() -> (
        EventSink<u64, impl SinkHandler<u64>>,
        Arc<StdMutex<Vec<u64>>>,
    ) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let seen = Arc::clone(&log);
        let queued = Arc::clone(&log);
        let sink = EventSink::new(FnHandler::new(
            move |e: u64| {
                seen.lock().unwrap().push(e);
                Ok(())
            },
            move |e: u64| queued.lock().unwrap().push(e),
            || {},
        ));
        (sink, log)
    }

    #[test]
    fn test_attach_commit_detach() {
        let (sink, log) = recording_sink();
        let source = EventSource::named("s1");

        assert_eq!(source.attach(&sink).unwrap(), ConnectOutcome::Attached);
        assert!(source.is_attached());
        assert_eq!(source.attached_sink(), Some(sink.id()));

        assert!(source.commit_event(1).unwrap().is_delivered());
        assert!(source.detach());
        assert!(!source.is_attached());

        assert_eq!(source.commit_event(2).unwrap(), Delivery::Ignored);
        assert_eq!(source.queue_event(3), Delivery::Ignored);
        assert_eq!(source.wake(), Delivery::Ignored);
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_attach_twice_is_idempotent() {
        let (sink, _log) = recording_sink();
        let source = EventSource::new();

        source.attach(&sink).unwrap();
        assert_eq!(
            source.attach(&sink).unwrap(),
            ConnectOutcome::AlreadyAttached
        );
        assert_eq!(sink.source_count(), 1);

        drop(sink);
        assert_eq!(source.forced_unsubscribes(), 1);
    }

    #[test]
    fn test_attach_moves_between_sinks() {
        let (first, first_log) = recording_sink();
        let (second, second_log) = recording_sink();
        let source = EventSource::new();

        source.attach(&first).unwrap();
        source.attach(&second).unwrap();

        assert!(!first.is_attached(source.id()));
        assert!(second.is_attached(source.id()));

        source.commit_event(5).unwrap();
        assert!(first_log.lock().unwrap().is_empty());
        assert_eq!(*second_log.lock().unwrap(), vec![5]);

        drop(first);
        assert_eq!(source.forced_unsubscribes(), 0);
        assert!(source.is_attached());
    }

    #[test]
    fn test_drop_source_disconnects() {
        let (sink, _log) = recording_sink();
        let source = EventSource::new();
        source.attach(&sink).unwrap();
        assert_eq!(sink.source_count(), 1);

        drop(source);
        assert_eq!(sink.source_count(), 0);
    }

    #[test]
    fn test_forced_unsubscribe_runs_callback() {
        let (sink, _log) = recording_sink();
        let notified = Arc::new(StdMutex::new(Vec::new()));
        let record = Arc::clone(&notified);
        let source = EventSource::with_unsubscribe_callback("cb", move |id| {
            record.lock().unwrap().push(id);
        });

        source.attach(&sink).unwrap();
        let sink_id = sink.id();
        drop(sink);

        assert_eq!(*notified.lock().unwrap(), vec![sink_id]);
        assert!(!source.is_attached());
        assert_eq!(source.commit_event(1).unwrap(), Delivery::Ignored);
        assert!(!source.detach());
    }

    #[test]
    fn test_attach_to_closed_sink_fails() {
        let (sink, _log) = recording_sink();
        sink.close();

        let source = EventSource::new();
        let err = source.attach(&sink).unwrap_err();
        assert!(matches!(err, SinkError::Closed(_)));
        assert!(!source.is_attached());
    }

    #[test]
    fn test_attach_failure_keeps_nothing() {
        let (sink, _log) = recording_sink();
        let port = sink.port();
        drop(sink);

        let source = EventSource::new();
        assert!(matches!(source.attach_port(port), Err(SinkError::Gone)));
        assert!(!source.is_attached());
    }

    #[test]
    fn test_queue_and_wake_through_source() {
        let (sink, log) = recording_sink();
        let source = EventSource::new();
        source.attach(&sink).unwrap();

        assert!(source.queue_event(4).is_delivered());
        assert!(source.wake().is_delivered());
        assert_eq!(*log.lock().unwrap(), vec![4]);
        assert_eq!(sink.stats().wakes, 1);
    }
}
