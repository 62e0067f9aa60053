//! Consumer-side buffering for queued events and wakes
//!
//! A mailbox is the usual backing store for a handler's `on_queue_event` and
//! `on_wake` hooks. Producers push into a [`Mailbox`]; the owning thread
//! drains the paired [`MailboxReceiver`]:
//! - Blocking: `recv()`, `for signal in receiver`
//! - Non-blocking: `try_recv()`, `try_iter()`
//! - Timeout: `recv_timeout()`, `timeout_iter()`
//!
//! # Policy
//!
//! - FIFO: signals are received in the order they were pushed.
//! - Unbounded: `push` never blocks and never drops while the receiver lives.
//! - Coalesced wakes: a wake pushed while an earlier wake is still pending is
//!   merged into it. A wake is pending from the moment it is pushed until the
//!   receiver hands it out, so every `wake()` is followed by at least one
//!   [`Signal::Wake`] returned after it.
//!
//! # Example
//!
//! ```rust
//! use evsink_core::mailbox::{self, Signal};
//!
//! let (mailbox, receiver) = mailbox::channel::<u64>();
//! mailbox.push(1);
//! mailbox.wake();
//! mailbox.wake();
//!
//! assert_eq!(receiver.try_recv(), Some(Signal::Event(1)));
//! assert_eq!(receiver.try_recv(), Some(Signal::Wake));
//! assert_eq!(receiver.try_recv(), None);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::HandlerError;
use crate::event::Event;
use crate::handler::SinkHandler;

/// One item drained from a mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<E> {
    /// A queued event
    Event(E),
    /// A wake request with no payload
    Wake,
}

impl<E> Signal<E> {
    /// The event, if this is an event signal
    pub fn into_event(self) -> Option<E> {
        match self {
            Signal::Event(event) => Some(event),
            Signal::Wake => None,
        }
    }

    /// Returns true for [`Signal::Wake`]
    pub fn is_wake(&self) -> bool {
        matches!(self, Signal::Wake)
    }
}

/// Result of [`MailboxReceiver::wait`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wait<E> {
    /// A signal arrived
    Signal(Signal<E>),
    /// The timeout expired first
    TimedOut,
    /// Every producer is gone and the buffer is empty
    Disconnected,
}

#[derive(Debug, Default)]
struct WakeState {
    pending: AtomicBool,
}

/// Create a connected mailbox pair
pub fn channel<E>() -> (Mailbox<E>, MailboxReceiver<E>) {
    let (tx, rx) = unbounded();
    let wake = Arc::new(WakeState::default());

    (
        Mailbox {
            tx,
            wake: Arc::clone(&wake),
        },
        MailboxReceiver { rx, wake },
    )
}

/// Producer half of a mailbox
///
/// Cloneable and usable from any thread.
pub struct Mailbox<E> {
    tx: Sender<Signal<E>>,
    wake: Arc<WakeState>,
}

impl<E> Mailbox<E> {
    /// Append an event
    ///
    /// Returns false if the receiver has been dropped.
    pub fn push(&self, event: E) -> bool {
        self.tx.send(Signal::Event(event)).is_ok()
    }

    /// Request a wake, merging with a wake that is still pending
    ///
    /// Returns false if the receiver has been dropped.
    pub fn wake(&self) -> bool {
        if self.wake.pending.swap(true, Ordering::AcqRel) {
            return true;
        }
        if self.tx.send(Signal::Wake).is_err() {
            self.wake.pending.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Number of signals waiting to be received
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Check if nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<E> Clone for Mailbox<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            wake: Arc::clone(&self.wake),
        }
    }
}

impl<E> std::fmt::Debug for Mailbox<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("pending", &self.tx.len())
            .field("wake_pending", &self.wake.pending.load(Ordering::Relaxed))
            .finish()
    }
}

/// Consumer half of a mailbox, owned by the draining thread
pub struct MailboxReceiver<E> {
    rx: Receiver<Signal<E>>,
    wake: Arc<WakeState>,
}

impl<E> MailboxReceiver<E> {
    fn observe(&self, signal: Signal<E>) -> Signal<E> {
        if signal.is_wake() {
            // Pairs with the producer's swap so state written before a merged
            // wake is visible once this wake is returned.
            self.wake.pending.swap(false, Ordering::AcqRel);
        }
        signal
    }

    /// Block until the next signal is available
    ///
    /// Returns `None` once every [`Mailbox`] has been dropped and the buffer
    /// is empty.
    pub fn recv(&self) -> Option<Signal<E>> {
        self.rx.recv().ok().map(|s| self.observe(s))
    }

    /// Block until the next signal or timeout expires
    ///
    /// Returns `None` if the timeout expires or all producers are gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Signal<E>> {
        self.rx.recv_timeout(timeout).ok().map(|s| self.observe(s))
    }

    /// Wait for the next signal, optionally bounded by `timeout`
    ///
    /// Unlike [`recv_timeout`](Self::recv_timeout) this tells an expired
    /// timeout apart from a closed mailbox.
    pub fn wait(&self, timeout: Option<Duration>) -> Wait<E> {
        match timeout {
            None => match self.rx.recv() {
                Ok(signal) => Wait::Signal(self.observe(signal)),
                Err(_) => Wait::Disconnected,
            },
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(signal) => Wait::Signal(self.observe(signal)),
                Err(RecvTimeoutError::Timeout) => Wait::TimedOut,
                Err(RecvTimeoutError::Disconnected) => Wait::Disconnected,
            },
        }
    }

    /// Try to receive a signal without blocking
    pub fn try_recv(&self) -> Option<Signal<E>> {
        self.rx.try_recv().ok().map(|s| self.observe(s))
    }

    /// Get a non-blocking iterator over currently available signals
    pub fn try_iter(&self) -> TryIter<'_, E> {
        TryIter { inner: self }
    }

    /// Get a blocking iterator with timeout
    ///
    /// Stops when a wait of `timeout` passes without a signal.
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIter<'_, E> {
        TimeoutIter {
            inner: self,
            timeout,
        }
    }

    /// Number of signals waiting to be received
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check if nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<E> Iterator for MailboxReceiver<E> {
    type Item = Signal<E>;

    /// Block until the next signal
    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl<E> std::fmt::Debug for MailboxReceiver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxReceiver")
            .field("pending", &self.rx.len())
            .finish()
    }
}

/// Non-blocking iterator over currently available signals
pub struct TryIter<'a, E> {
    inner: &'a MailboxReceiver<E>,
}

impl<'a, E> Iterator for TryIter<'a, E> {
    type Item = Signal<E>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with timeout
pub struct TimeoutIter<'a, E> {
    inner: &'a MailboxReceiver<E>,
    timeout: Duration,
}

impl<'a, E> Iterator for TimeoutIter<'a, E> {
    type Item = Signal<E>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}

/// Handler that commits through a closure and queues into a mailbox
///
/// ```rust
/// use evsink_core::{EventSink, QueueingHandler};
/// use evsink_core::mailbox::Signal;
///
/// let (handler, receiver) = QueueingHandler::new(|_: u64| Ok(()));
/// let sink = EventSink::new(handler);
///
/// sink.queue_event(10);
/// sink.wake();
///
/// let drained: Vec<_> = receiver.try_iter().collect();
/// assert_eq!(drained, vec![Signal::Event(10), Signal::Wake]);
/// ```
pub struct QueueingHandler<E, F> {
    commit: F,
    mailbox: Mailbox<E>,
}

impl<E, F> QueueingHandler<E, F>
where
    E: Event,
    F: Fn(E) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    /// Create a handler and the receiver its owning thread drains
    pub fn new(commit: F) -> (Self, MailboxReceiver<E>) {
        let (mailbox, receiver) = channel();
        (Self { commit, mailbox }, receiver)
    }

    /// Producer half used for queued events and wakes
    pub fn mailbox(&self) -> &Mailbox<E> {
        &self.mailbox
    }
}

impl<E, F> SinkHandler<E> for QueueingHandler<E, F>
where
    E: Event,
    F: Fn(E) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn on_commit_event(&self, event: E) -> Result<(), HandlerError> {
        (self.commit)(event)
    }

    fn on_queue_event(&self, event: E) {
        let kind = event.kind();
        if !self.mailbox.push(event) {
            tracing::warn!("dropping queued {}: mailbox receiver is gone", kind);
        }
    }

    fn on_wake(&self) {
        if !self.mailbox.wake() {
            tracing::debug!("wake ignored: mailbox receiver is gone");
        }
    }
}

impl<E, F> std::fmt::Debug for QueueingHandler<E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueingHandler")
            .field("mailbox", &self.mailbox)
            .finish_non_exhaustive()
    }
}
