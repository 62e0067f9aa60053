//! Owning-thread event loop
//!
//! Spawns a named thread that owns the receiving half of a mailbox and
//! dispatches everything queued on the loop's sink to a consumer. Sources on
//! any thread attach to [`EventLoop::sink`] and use the usual commit, queue
//! and wake calls.
//!
//! ```text
//! producers ──queue/wake──► EventSink<E, LoopHandler<E>> ──► Mailbox
//!                                                              │
//!                                   loop thread: MailboxReceiver::wait
//!                                     ├── Signal::Event ──► consumer.on_event
//!                                     ├── Signal::Wake  ──► consumer.on_wake (or stop)
//!                                     └── timeout       ──► consumer.on_idle
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use evsink_core::mailbox::{MailboxReceiver, Signal, Wait};
use evsink_core::{
    ConnectOutcome, Event, EventSink, EventSource, HandlerError, QueueingHandler, SinkId,
    SinkPort, SinkStats,
};

use crate::config::LoopConfig;
use crate::error::{ReactorError, Result};

type CommitFn<E> = Box<dyn Fn(E) -> std::result::Result<(), HandlerError> + Send + Sync>;

/// Handler used by every loop-owned sink
pub type LoopHandler<E> = QueueingHandler<E, CommitFn<E>>;

/// Sink type owned by an [`EventLoop`]
pub type LoopSink<E> = EventSink<E, LoopHandler<E>>;

/// Consumer running on the loop thread
///
/// Any `FnMut(E)` closure is a consumer that only handles events.
pub trait LoopConsumer<E>: Send + 'static {
    /// A queued event, in queue order
    fn on_event(&mut self, event: E);

    /// A (possibly coalesced) wake
    ///
    /// A wake that is the last signal left when the loop stops is answered
    /// by stopping instead.
    fn on_wake(&mut self) {}

    /// The idle timeout passed without any signal
    fn on_idle(&mut self) {}

    /// The loop is about to exit
    fn on_stop(&mut self) {}
}

impl<E, F> LoopConsumer<E> for F
where
    F: FnMut(E) + Send + 'static,
{
    fn on_event(&mut self, event: E) {
        self(event)
    }
}

#[derive(Debug, Default)]
struct LoopCounters {
    dispatched: AtomicU64,
    wakes: AtomicU64,
    idle_ticks: AtomicU64,
}

/// Snapshot of loop activity
#[derive(Debug, Clone)]
pub struct LoopStats {
    /// Name of the loop thread
    pub thread_name: String,
    /// Whether the loop thread is still running
    pub running: bool,
    /// Queued events handed to the consumer
    pub dispatched: u64,
    /// Wakes handed to the consumer
    pub wakes: u64,
    /// Idle timeouts handed to the consumer
    pub idle_ticks: u64,
    /// Statistics of the loop's sink
    pub sink: SinkStats,
}

impl fmt::Display for LoopStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Event Loop Stats ({}):", self.thread_name)?;
        writeln!(f, "  Running: {}", self.running)?;
        writeln!(f, "  Dispatched events: {}", self.dispatched)?;
        writeln!(f, "  Wakes: {}", self.wakes)?;
        writeln!(f, "  Idle ticks: {}", self.idle_ticks)?;
        write!(f, "{}", self.sink)
    }
}

/// Event loop owning a sink and the thread that drains it
///
/// # Example
///
/// ```rust
/// use evsink_core::EventSource;
/// use evsink_reactor::{EventLoop, LoopConfig};
/// use std::sync::mpsc;
///
/// let (tx, rx) = mpsc::channel();
/// let mut event_loop = EventLoop::spawn(LoopConfig::named("demo"), move |n: u64| {
///     tx.send(n).unwrap();
/// })?;
///
/// let source = EventSource::named("counter");
/// event_loop.attach(&source)?;
/// source.queue_event(1);
/// source.queue_event(2);
///
/// assert_eq!(rx.recv().unwrap(), 1);
/// assert_eq!(rx.recv().unwrap(), 2);
///
/// event_loop.shutdown()?;
/// assert_eq!(source.forced_unsubscribes(), 1);
/// # Ok::<(), evsink_reactor::ReactorError>(())
/// ```
pub struct EventLoop<E: Event> {
    sink: LoopSink<E>,
    stop: Arc<AtomicBool>,
    counters: Arc<LoopCounters>,
    thread_name: String,
    worker: Option<JoinHandle<()>>,
}

impl<E: Event> EventLoop<E> {
    /// Spawn a loop whose sink rejects committed events
    ///
    /// Commits fail with [`ReactorError::CommitUnsupported`] wrapped in the
    /// sink's handler error.
    pub fn spawn<C>(config: LoopConfig, consumer: C) -> Result<Self>
    where
        C: LoopConsumer<E>,
    {
        let name = config.sink.name.clone();
        Self::spawn_with_commit(config, consumer, move |_: E| {
            Err(Box::new(ReactorError::CommitUnsupported(name.clone())) as HandlerError)
        })
    }

    /// Spawn a loop whose sink runs `commit` synchronously on producer threads
    pub fn spawn_with_commit<C, F>(config: LoopConfig, consumer: C, commit: F) -> Result<Self>
    where
        C: LoopConsumer<E>,
        F: Fn(E) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        config.validate()?;

        let commit: CommitFn<E> = Box::new(commit);
        let (handler, receiver) = QueueingHandler::new(commit);
        let sink = EventSink::with_config(handler, config.sink.clone())?;

        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(LoopCounters::default());

        let worker = {
            let stop = Arc::clone(&stop);
            let counters = Arc::clone(&counters);
            let thread_name = config.thread_name.clone();
            let idle_timeout = config.idle_timeout;

            thread::Builder::new()
                .name(config.thread_name.clone())
                .spawn(move || {
                    run_loop(
                        &thread_name,
                        receiver,
                        consumer,
                        &stop,
                        &counters,
                        idle_timeout,
                    )
                })
                .map_err(|source| ReactorError::Spawn {
                    thread: config.thread_name.clone(),
                    source,
                })?
        };

        tracing::debug!("spawned event loop {}", config.thread_name);

        Ok(Self {
            sink,
            stop,
            counters,
            thread_name: config.thread_name,
            worker: Some(worker),
        })
    }

    /// The sink sources attach to
    pub fn sink(&self) -> &LoopSink<E> {
        &self.sink
    }

    /// Identity of the loop's sink
    pub fn sink_id(&self) -> SinkId {
        self.sink.id()
    }

    /// Non-owning port for sources that are not handed the loop itself
    pub fn port(&self) -> Weak<dyn SinkPort<E>> {
        self.sink.port()
    }

    /// Attach `source` to the loop's sink
    pub fn attach(&self, source: &EventSource<E>) -> Result<ConnectOutcome> {
        Ok(source.attach(&self.sink)?)
    }

    /// Name of the loop thread
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Check whether the loop thread is still running
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Get current statistics
    pub fn stats(&self) -> LoopStats {
        LoopStats {
            thread_name: self.thread_name.clone(),
            running: self.is_running(),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            wakes: self.counters.wakes.load(Ordering::Relaxed),
            idle_ticks: self.counters.idle_ticks.load(Ordering::Relaxed),
            sink: self.sink.stats(),
        }
    }

    /// Stop the loop and wait for its thread
    ///
    /// The sink is closed first, so every attached source is unsubscribed
    /// and nothing new is queued. Everything queued before that is still
    /// handed to the consumer, including events behind a pending wake. Then
    /// the consumer's `on_stop` runs and the thread exits.
    pub fn shutdown(&mut self) -> Result<()> {
        let worker = self.worker.take().ok_or(ReactorError::Stopped)?;

        let unsubscribed = self.sink.close();
        tracing::debug!(
            "shutting down {} ({} sources unsubscribed)",
            self.thread_name,
            unsubscribed
        );

        self.stop.store(true, Ordering::SeqCst);
        // Sink deliveries are ignored once closed; post the stop wake directly
        self.sink.handler().mailbox().wake();

        worker
            .join()
            .map_err(|_| ReactorError::Panicked(self.thread_name.clone()))
    }
}

impl<E: Event> Drop for EventLoop<E> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.shutdown() {
                tracing::warn!("{}", e);
            }
        }
    }
}

impl<E: Event> fmt::Debug for EventLoop<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("thread_name", &self.thread_name)
            .field("sink", &self.sink)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run_loop<E, C>(
    name: &str,
    receiver: MailboxReceiver<E>,
    mut consumer: C,
    stop: &AtomicBool,
    counters: &LoopCounters,
    idle_timeout: Option<Duration>,
) where
    C: LoopConsumer<E>,
{
    tracing::info!("Event loop {} started", name);

    // The stop wake may merge into a wake that is still queued, so stopping
    // waits until the mailbox is empty rather than for one particular wake.
    let drained = || stop.load(Ordering::SeqCst) && receiver.is_empty();

    loop {
        match receiver.wait(idle_timeout) {
            Wait::Signal(Signal::Event(event)) => {
                counters.dispatched.fetch_add(1, Ordering::Relaxed);
                consumer.on_event(event);
            }
            Wait::Signal(Signal::Wake) => {
                if drained() {
                    break;
                }
                counters.wakes.fetch_add(1, Ordering::Relaxed);
                consumer.on_wake();
            }
            Wait::TimedOut => {
                if drained() {
                    break;
                }
                counters.idle_ticks.fetch_add(1, Ordering::Relaxed);
                consumer.on_idle();
            }
            Wait::Disconnected => {
                tracing::debug!("Event loop {}: mailbox closed", name);
                break;
            }
        }

        if drained() {
            break;
        }
    }

    consumer.on_stop();
    tracing::info!("Event loop {} shut down", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Event(u64),
        Wake,
        Idle,
        Stop,
    }

    struct Recorder {
        seen: mpsc::Sender<Seen>,
        started: Option<mpsc::Sender<()>>,
    }

    impl Recorder {
        fn new(seen: mpsc::Sender<Seen>) -> Self {
            Self {
                seen,
                started: None,
            }
        }

        /// Signal on the first event, then stay busy with it for a while
        fn with_start_signal(mut self, started: mpsc::Sender<()>) -> Self {
            self.started = Some(started);
            self
        }
    }

    impl LoopConsumer<u64> for Recorder {
        fn on_event(&mut self, event: u64) {
            if let Some(started) = self.started.take() {
                let _ = started.send(());
                thread::sleep(Duration::from_millis(50));
            }
            let _ = self.seen.send(Seen::Event(event));
        }

        fn on_wake(&mut self) {
            let _ = self.seen.send(Seen::Wake);
        }

        fn on_idle(&mut self) {
            let _ = self.seen.send(Seen::Idle);
        }

        fn on_stop(&mut self) {
            let _ = self.seen.send(Seen::Stop);
        }
    }

    fn recording_loop(config: LoopConfig) -> (EventLoop<u64>, mpsc::Receiver<Seen>) {
        let (tx, rx) = mpsc::channel();
        let event_loop = EventLoop::spawn(config, Recorder::new(tx)).unwrap();
        (event_loop, rx)
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_events_dispatched_in_order() {
        let (mut event_loop, rx) = recording_loop(LoopConfig::named("order"));
        let source = EventSource::new();
        event_loop.attach(&source).unwrap();

        for n in 0..10 {
            source.queue_event(n);
        }
        for n in 0..10 {
            assert_eq!(rx.recv_timeout(WAIT).unwrap(), Seen::Event(n));
        }

        event_loop.shutdown().unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Seen::Stop);
        assert_eq!(event_loop.stats().dispatched, 10);
    }

    #[test]
    fn test_shutdown_dispatches_events_behind_pending_wake() {
        let (tx, rx) = mpsc::channel();
        let (started_tx, started_rx) = mpsc::channel();
        let mut event_loop = EventLoop::spawn(
            LoopConfig::named("busy"),
            Recorder::new(tx).with_start_signal(started_tx),
        )
        .unwrap();

        event_loop.sink().queue_event(1);
        started_rx.recv_timeout(WAIT).unwrap();

        // Consumer is still inside event 1
        event_loop.sink().wake();
        event_loop.sink().queue_event(2);
        event_loop.shutdown().unwrap();

        let seen: Vec<Seen> = rx.try_iter().collect();
        assert_eq!(
            seen,
            vec![Seen::Event(1), Seen::Wake, Seen::Event(2), Seen::Stop]
        );
        assert_eq!(event_loop.stats().dispatched, 2);
        assert_eq!(event_loop.stats().wakes, 1);
    }

    #[test]
    fn test_shutdown_when_idle_does_not_report_wake() {
        let (mut event_loop, rx) = recording_loop(LoopConfig::default());
        event_loop.sink().queue_event(7);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Seen::Event(7));

        event_loop.shutdown().unwrap();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![Seen::Stop]);
    }

    #[test]
    fn test_wake_reaches_consumer() {
        let (event_loop, rx) = recording_loop(LoopConfig::default());
        let source = EventSource::new();
        event_loop.attach(&source).unwrap();

        assert!(source.wake().is_delivered());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Seen::Wake);
    }

    #[test]
    fn test_idle_ticks() {
        let config = LoopConfig::default().with_idle_timeout(Duration::from_millis(5));
        let (event_loop, rx) = recording_loop(config);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Seen::Idle);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Seen::Idle);
        drop(event_loop);
        assert!(rx.iter().any(|seen| seen == Seen::Stop));
    }

    #[test]
    fn test_shutdown_twice() {
        let (mut event_loop, _rx) = recording_loop(LoopConfig::default());
        assert!(event_loop.shutdown().is_ok());
        assert!(!event_loop.is_running());
        assert!(matches!(event_loop.shutdown(), Err(ReactorError::Stopped)));
    }

    #[test]
    fn test_shutdown_unsubscribes_sources() {
        let (mut event_loop, _rx) = recording_loop(LoopConfig::default());
        let source = EventSource::new();
        event_loop.attach(&source).unwrap();

        event_loop.shutdown().unwrap();
        assert_eq!(source.forced_unsubscribes(), 1);
        assert!(!source.queue_event(1).is_delivered());
    }

    #[test]
    fn test_commit_unsupported_by_default() {
        let (event_loop, _rx) = recording_loop(LoopConfig::named("no-commit"));
        let source = EventSource::new();
        event_loop.attach(&source).unwrap();

        let err = source.commit_event(1).unwrap_err();
        let inner = err.handler_error().unwrap();
        assert!(matches!(
            inner.downcast_ref::<ReactorError>(),
            Some(ReactorError::CommitUnsupported(name)) if name == "no-commit"
        ));
    }

    #[test]
    fn test_commit_runs_on_producer_thread() {
        let (tx, _rx) = mpsc::channel();
        let event_loop = EventLoop::spawn_with_commit(
            LoopConfig::default(),
            Recorder::new(tx),
            |n: u64| {
                assert_ne!(thread::current().name(), Some("evsink-loop"));
                if n > 100 {
                    return Err("too large".into());
                }
                Ok(())
            },
        )
        .unwrap();
        let source = EventSource::new();
        event_loop.attach(&source).unwrap();

        assert!(source.commit_event(1).unwrap().is_delivered());
        assert!(source.commit_event(101).is_err());
        assert_eq!(event_loop.stats().sink.committed, 2);
    }

    #[test]
    fn test_consumer_panic_reported() {
        let mut event_loop = EventLoop::spawn(LoopConfig::named("fragile"), |_: u64| {
            panic!("consumer failed");
        })
        .unwrap();
        event_loop.sink().queue_event(1);

        while event_loop.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(
            event_loop.shutdown(),
            Err(ReactorError::Panicked(name)) if name == "fragile"
        ));
    }

    #[test]
    fn test_invalid_config() {
        let (tx, _rx) = mpsc::channel();
        let result = EventLoop::spawn(LoopConfig::default().with_thread_name(""), Recorder::new(tx));
        assert!(matches!(result, Err(ReactorError::Configuration(_))));
    }

    #[test]
    fn test_stats_display() {
        let (event_loop, _rx) = recording_loop(LoopConfig::named("display"));
        let text = event_loop.stats().to_string();
        assert!(text.contains("Event Loop Stats (display)"));
        assert!(text.contains("Dispatched events: 0"));
    }
}
