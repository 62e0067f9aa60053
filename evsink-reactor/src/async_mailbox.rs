//! Mailbox for consumers that run inside a tokio runtime
//!
//! Same policy as [`evsink_core::mailbox`]: FIFO, unbounded, coalesced
//! wakes. The receiving side is awaited instead of blocked on, so a consumer
//! task can `select!` on it next to its other futures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use evsink_core::mailbox::{Signal, Wait};
use evsink_core::{Event, HandlerError, SinkHandler};
use tokio::sync::mpsc;

/// Create a connected async mailbox pair
pub fn channel<E>() -> (AsyncMailbox<E>, AsyncReceiver<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let wake_pending = Arc::new(AtomicBool::new(false));

    (
        AsyncMailbox {
            tx,
            wake_pending: Arc::clone(&wake_pending),
        },
        AsyncReceiver { rx, wake_pending },
    )
}

/// Producer half, usable from any thread without a runtime
pub struct AsyncMailbox<E> {
    tx: mpsc::UnboundedSender<Signal<E>>,
    wake_pending: Arc<AtomicBool>,
}

impl<E> AsyncMailbox<E> {
    /// Append an event
    ///
    /// Returns false if the receiver has been dropped.
    pub fn push(&self, event: E) -> bool {
        self.tx.send(Signal::Event(event)).is_ok()
    }

    /// Request a wake, merging with a wake that is still pending
    pub fn wake(&self) -> bool {
        if self.wake_pending.swap(true, Ordering::AcqRel) {
            return true;
        }
        if self.tx.send(Signal::Wake).is_err() {
            self.wake_pending.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Check whether the receiver has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<E> Clone for AsyncMailbox<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            wake_pending: Arc::clone(&self.wake_pending),
        }
    }
}

impl<E> std::fmt::Debug for AsyncMailbox<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMailbox")
            .field("closed", &self.tx.is_closed())
            .field("wake_pending", &self.wake_pending.load(Ordering::Relaxed))
            .finish()
    }
}

/// Consumer half, owned by one task
pub struct AsyncReceiver<E> {
    rx: mpsc::UnboundedReceiver<Signal<E>>,
    wake_pending: Arc<AtomicBool>,
}

impl<E> AsyncReceiver<E> {
    fn observe(&self, signal: Signal<E>) -> Signal<E> {
        if signal.is_wake() {
            self.wake_pending.swap(false, Ordering::AcqRel);
        }
        signal
    }

    /// Wait for the next signal
    ///
    /// Returns `None` once every [`AsyncMailbox`] is gone and the buffer is
    /// empty. Cancel safe.
    pub async fn recv(&mut self) -> Option<Signal<E>> {
        let signal = self.rx.recv().await?;
        Some(self.observe(signal))
    }

    /// Wait for the next signal, optionally bounded by `timeout`
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Wait<E> {
        let received = match timeout {
            None => self.rx.recv().await,
            Some(timeout) => match tokio::time::timeout(timeout, self.rx.recv()).await {
                Ok(received) => received,
                Err(_) => return Wait::TimedOut,
            },
        };

        match received {
            Some(signal) => Wait::Signal(self.observe(signal)),
            None => Wait::Disconnected,
        }
    }

    /// Try to receive a signal without waiting
    pub fn try_recv(&mut self) -> Option<Signal<E>> {
        let signal = self.rx.try_recv().ok()?;
        Some(self.observe(signal))
    }

    /// Receive everything currently buffered
    pub fn drain(&mut self) -> Vec<Signal<E>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl<E> std::fmt::Debug for AsyncReceiver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncReceiver").finish_non_exhaustive()
    }
}

/// Handler that commits through a closure and queues into an async mailbox
///
/// ```rust
/// use evsink_core::{EventSink, EventSource};
/// use evsink_core::mailbox::Signal;
/// use evsink_reactor::AsyncQueueingHandler;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (handler, mut receiver) = AsyncQueueingHandler::new(|_: u64| Ok(()));
/// let sink = EventSink::new(handler);
///
/// let source = EventSource::new();
/// source.attach(&sink).unwrap();
/// std::thread::spawn(move || {
///     source.queue_event(42);
/// });
///
/// assert_eq!(receiver.recv().await, Some(Signal::Event(42)));
/// # }
/// ```
pub struct AsyncQueueingHandler<E, F> {
    commit: F,
    mailbox: AsyncMailbox<E>,
}

impl<E, F> AsyncQueueingHandler<E, F>
where
    E: Event,
    F: Fn(E) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    /// Create a handler and the receiver its consumer task awaits
    pub fn new(commit: F) -> (Self, AsyncReceiver<E>) {
        let (mailbox, receiver) = channel();
        (Self { commit, mailbox }, receiver)
    }

    /// Producer half used for queued events and wakes
    pub fn mailbox(&self) -> &AsyncMailbox<E> {
        &self.mailbox
    }
}

impl<E, F> SinkHandler<E> for AsyncQueueingHandler<E, F>
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
            tracing::warn!("dropping queued {}: async receiver is gone", kind);
        }
    }

    fn on_wake(&self) {
        if !self.mailbox.wake() {
            tracing::debug!("wake ignored: async receiver is gone");
        }
    }
}
