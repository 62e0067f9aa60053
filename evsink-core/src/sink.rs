//! Event sinks and their subscription registry
//!
//! An [`EventSink`] aggregates events from any number of sources into one
//! consumer-provided [`SinkHandler`]. The sink keeps a registry of attached
//! sources for two reasons only: deliveries from sources that are no longer
//! attached are ignored, and every source still attached when the sink goes
//! away is told so exactly once.
//!
//! # Locking
//!
//! ```text
//! EventSink<E, H>  (owner handle, tears down on drop)
//!     │
//!     └── Arc<SinkCore<E, H>>
//!             │
//!             ├── handler: H            (never called with the lock held)
//!             │
//!             └── registry: Mutex<Registry>
//!                     ├── entries: Vec<(SourceId, Weak<dyn SourceLink>)>
//!                     └── closed: bool
//! ```
//!
//! The registry lock is held only for membership checks and mutations. Hooks
//! and source callbacks always run after the lock is released, so a hook may
//! attach or detach sources (including itself) without deadlocking.
//!
//! Teardown drains the registry under the lock, marks the sink closed,
//! releases the lock, and only then notifies each drained source.
//!
//! Each entry carries a hook state so that, per source, the handler's detach
//! hook always runs after its attach hook, even when a disconnect or teardown
//! on another thread removes the entry before the attach hook has run.

use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::SinkConfig;
use crate::error::{Result, SinkError};
use crate::event::Event;
use crate::handler::SinkHandler;
use crate::id::{SinkId, SourceId};
use crate::stats::{Counters, SinkStats};

/// Outcome of a delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The handler hook was invoked
    Delivered,
    /// The sender is not attached or the sink is closed; nothing happened
    Ignored,
}

impl Delivery {
    /// Returns true if the handler hook was invoked
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// Outcome of a successful connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The source was added to the registry
    Attached,
    /// The source was already in the registry; nothing changed
    AlreadyAttached,
}

/// Non-owning callback a sink uses to reach an attached source
///
/// The sink only calls this during teardown. After `on_unsubscribe` the source
/// must not deliver to that sink again; deliveries that still arrive are
/// ignored.
pub trait SourceLink: Send + Sync {
    /// The sink identified by `sink` is going away
    fn on_unsubscribe(&self, sink: SinkId);
}

/// Type-erased view of a sink used by sources
///
/// Sources hold a `Weak<dyn SinkPort<E>>`, so they never keep a sink's handler
/// alive and never need to know the handler type.
pub trait SinkPort<E: Event>: Send + Sync {
    /// Identity of the sink behind this port
    fn sink_id(&self) -> SinkId;

    /// Name of the sink behind this port
    fn sink_name(&self) -> &str;

    /// Add `source` to the registry
    ///
    /// Idempotent for a source that is already attached. Fails with
    /// [`SinkError::Closed`] once teardown has begun and with
    /// [`SinkError::RegistryFull`] when the configured limit is reached.
    fn connect(&self, source: SourceId, link: Weak<dyn SourceLink>) -> Result<ConnectOutcome>;

    /// Remove `source` from the registry, returning whether it was attached
    fn disconnect(&self, source: SourceId) -> bool;

    /// Commit an event on behalf of `source`
    fn commit_from(&self, source: SourceId, event: E) -> Result<Delivery>;

    /// Queue an event on behalf of `source`
    fn queue_from(&self, source: SourceId, event: E) -> Delivery;

    /// Wake the owning thread on behalf of `source`
    fn wake_from(&self, source: SourceId) -> Delivery;
}

const HOOK_ATTACHING: u8 = 0;
const HOOK_ATTACHED: u8 = 1;
const HOOK_DETACHED_EARLY: u8 = 2;

struct Subscription {
    source: SourceId,
    link: Weak<dyn SourceLink>,
    hooks: Arc<AtomicU8>,
}

impl Subscription {
    /// Called by whoever removed this entry from the registry
    ///
    /// Returns true if the detach hook should run now. Returns false while the
    /// attach hook is still pending; the connecting thread then runs the
    /// detach hook itself once the attach hook has returned.
    fn detach_hook_due(&self) -> bool {
        self.hooks
            .compare_exchange(
                HOOK_ATTACHING,
                HOOK_DETACHED_EARLY,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
    }
}

#[derive(Default)]
struct Registry {
    entries: Vec<Subscription>,
    closed: bool,
}

impl Registry {
    fn contains(&self, source: SourceId) -> bool {
        self.entries.iter().any(|s| s.source == source)
    }
}

struct SinkCore<E, H> {
    id: SinkId,
    config: SinkConfig,
    handler: H,
    registry: Mutex<Registry>,
    closed: AtomicBool,
    counters: Counters,
    _event: PhantomData<fn(E)>,
}

impl<E, H> SinkCore<E, H>
where
    E: Event,
    H: SinkHandler<E>,
{
    fn is_member(&self, source: SourceId) -> bool {
        let registry = self.registry.lock();
        !registry.closed && registry.contains(source)
    }

    fn ignore(&self, source: Option<SourceId>, what: &'static str) -> Delivery {
        self.counters.record_ignored();
        tracing::trace!(
            "{} ignored {} from {:?}: not attached or sink closed",
            self.config.name,
            what,
            source
        );
        Delivery::Ignored
    }

    fn dispatch_commit(&self, event: E) -> Result<Delivery> {
        tracing::trace!("{} commit {}", self.config.name, event.kind());
        self.counters.record_commit();
        self.handler
            .on_commit_event(event)
            .map(|()| Delivery::Delivered)
            .map_err(|source| SinkError::Handler {
                sink: self.config.name.clone(),
                source,
            })
    }

    fn dispatch_queue(&self, event: E) -> Delivery {
        tracing::trace!("{} queue {}", self.config.name, event.kind());
        self.counters.record_queue();
        self.handler.on_queue_event(event);
        Delivery::Delivered
    }

    fn dispatch_wake(&self) -> Delivery {
        tracing::trace!("{} wake", self.config.name);
        self.counters.record_wake();
        self.handler.on_wake();
        Delivery::Delivered
    }

    /// Drain the registry and notify every drained source
    ///
    /// Returns the number of sources that were attached when teardown began.
    /// A second call is a no-op returning 0.
    fn teardown(&self) -> usize {
        let drained = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return 0;
            }
            registry.closed = true;
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut registry.entries)
        };

        let count = drained.len();
        tracing::debug!(
            "{} ({}) closing, unsubscribing {} sources",
            self.config.name,
            self.id,
            count
        );

        for subscription in drained {
            if let Some(link) = subscription.link.upgrade() {
                let notified = catch_unwind(AssertUnwindSafe(|| link.on_unsubscribe(self.id)));
                if notified.is_err() {
                    tracing::error!(
                        "{}: unsubscribe notification for {} panicked",
                        self.config.name,
                        subscription.source
                    );
                }
            }

            if !subscription.detach_hook_due() {
                continue;
            }
            let detached = catch_unwind(AssertUnwindSafe(|| {
                self.handler.on_source_detached(subscription.source)
            }));
            if detached.is_err() {
                tracing::error!(
                    "{}: detach hook for {} panicked",
                    self.config.name,
                    subscription.source
                );
            }
        }

        count
    }
}

impl<E, H> SinkPort<E> for SinkCore<E, H>
where
    E: Event,
    H: SinkHandler<E>,
{
    fn sink_id(&self) -> SinkId {
        self.id
    }

    fn sink_name(&self) -> &str {
        &self.config.name
    }

    fn connect(&self, source: SourceId, link: Weak<dyn SourceLink>) -> Result<ConnectOutcome> {
        let hooks = Arc::new(AtomicU8::new(HOOK_ATTACHING));
        {
            let mut registry = self.registry.lock();
            if registry.closed {
                return Err(SinkError::Closed(self.id));
            }
            if registry.contains(source) {
                tracing::debug!("{}: {} already attached", self.config.name, source);
                return Ok(ConnectOutcome::AlreadyAttached);
            }
            if registry.entries.len() >= self.config.max_sources {
                tracing::warn!(
                    "{}: rejecting {}, registry full ({} sources)",
                    self.config.name,
                    source,
                    self.config.max_sources
                );
                return Err(SinkError::RegistryFull {
                    max_sources: self.config.max_sources,
                });
            }
            registry.entries.push(Subscription {
                source,
                link,
                hooks: Arc::clone(&hooks),
            });
            tracing::debug!(
                "{}: attached {} ({} sources)",
                self.config.name,
                source,
                registry.entries.len()
            );
        }

        self.handler.on_source_attached(source);

        let announced = hooks.compare_exchange(
            HOOK_ATTACHING,
            HOOK_ATTACHED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if announced.is_err() {
            // Removed while the attach hook ran
            tracing::debug!(
                "{}: {} detached before its attach hook finished",
                self.config.name,
                source
            );
            self.handler.on_source_detached(source);
        }
        Ok(ConnectOutcome::Attached)
    }

    fn disconnect(&self, source: SourceId) -> bool {
        let removed = {
            let mut registry = self.registry.lock();
            match registry.entries.iter().position(|s| s.source == source) {
                Some(index) => {
                    let subscription = registry.entries.remove(index);
                    tracing::debug!(
                        "{}: detached {} ({} sources)",
                        self.config.name,
                        source,
                        registry.entries.len()
                    );
                    Some(subscription)
                }
                None => None,
            }
        };

        match removed {
            Some(subscription) => {
                if subscription.detach_hook_due() {
                    self.handler.on_source_detached(source);
                }
                true
            }
            None => false,
        }
    }

    fn commit_from(&self, source: SourceId, event: E) -> Result<Delivery> {
        if !self.is_member(source) {
            return Ok(self.ignore(Some(source), "commit"));
        }
        self.dispatch_commit(event)
    }

    fn queue_from(&self, source: SourceId, event: E) -> Delivery {
        if !self.is_member(source) {
            return self.ignore(Some(source), "queue");
        }
        self.dispatch_queue(event)
    }

    fn wake_from(&self, source: SourceId) -> Delivery {
        if !self.is_member(source) {
            return self.ignore(Some(source), "wake");
        }
        self.dispatch_wake()
    }
}

/// Consumer-owned event sink
///
/// The sink is generic over its handler, so the consumer's hooks are called
/// without dynamic dispatch. Sources reach it through [`EventSink::port`].
///
/// Dropping the sink (or calling [`close`](Self::close)) tears it down: no
/// source can attach afterwards, and every source still attached receives
/// exactly one forced unsubscribe notification before `drop` returns.
///
/// # Example
///
/// ```rust
/// use evsink_core::{EventSink, EventSource, FnHandler};
/// use std::sync::{Arc, Mutex};
///
/// let log = Arc::new(Mutex::new(Vec::new()));
/// let seen = Arc::clone(&log);
/// let sink = EventSink::new(FnHandler::new(
///     move |e: u64| {
///         seen.lock().unwrap().push(e);
///         Ok(())
///     },
///     |_: u64| {},
///     || {},
/// ));
///
/// let source = EventSource::new();
/// source.attach(&sink).unwrap();
/// source.commit_event(7).unwrap();
/// assert_eq!(*log.lock().unwrap(), vec![7]);
///
/// source.detach();
/// assert!(!source.commit_event(8).unwrap().is_delivered());
/// ```
pub struct EventSink<E, H>
where
    E: Event,
    H: SinkHandler<E>,
{
    core: Arc<SinkCore<E, H>>,
}

impl<E, H> EventSink<E, H>
where
    E: Event,
    H: SinkHandler<E>,
{
    /// Create a sink with the default configuration
    pub fn new(handler: H) -> Self {
        Self::build(handler, SinkConfig::default())
    }

    /// Create a sink with a custom configuration
    pub fn with_config(handler: H, config: SinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(handler, config))
    }

    fn build(handler: H, config: SinkConfig) -> Self {
        let id = SinkId::next();
        tracing::debug!("created {} ({})", config.name, id);
        Self {
            core: Arc::new(SinkCore {
                id,
                config,
                handler,
                registry: Mutex::new(Registry::default()),
                closed: AtomicBool::new(false),
                counters: Counters::default(),
                _event: PhantomData,
            }),
        }
    }

    /// Identity of this sink
    pub fn id(&self) -> SinkId {
        self.core.id
    }

    /// Configured name of this sink
    pub fn name(&self) -> &str {
        &self.core.config.name
    }

    /// Configuration this sink was built with
    pub fn config(&self) -> &SinkConfig {
        &self.core.config
    }

    /// The consumer's handler
    pub fn handler(&self) -> &H {
        &self.core.handler
    }

    /// Non-owning port for sources
    ///
    /// The port stops upgrading once the sink and every in-flight delivery
    /// through it have been dropped.
    pub fn port(&self) -> Weak<dyn SinkPort<E>> {
        let weak: Weak<SinkCore<E, H>> = Arc::downgrade(&self.core);
        weak
    }

    /// Deliver an event synchronously to the handler on this thread
    ///
    /// Returns the handler's error wrapped in [`SinkError::Handler`]. Ignored
    /// once the sink is closed.
    pub fn commit_event(&self, event: E) -> Result<Delivery> {
        if self.is_closed() {
            return Ok(self.core.ignore(None, "commit"));
        }
        self.core.dispatch_commit(event)
    }

    /// Hand an event to the handler's buffer for the owning thread
    pub fn queue_event(&self, event: E) -> Delivery {
        if self.is_closed() {
            return self.core.ignore(None, "queue");
        }
        self.core.dispatch_queue(event)
    }

    /// Interrupt the owning thread's wait
    pub fn wake(&self) -> Delivery {
        if self.is_closed() {
            return self.core.ignore(None, "wake");
        }
        self.core.dispatch_wake()
    }

    /// Add a source to the registry
    ///
    /// `link` is used only to notify the source if the sink closes while the
    /// source is still attached.
    pub fn connect(&self, source: SourceId, link: Weak<dyn SourceLink>) -> Result<ConnectOutcome> {
        self.core.connect(source, link)
    }

    /// Remove a source from the registry
    pub fn disconnect(&self, source: SourceId) -> bool {
        self.core.disconnect(source)
    }

    /// Check whether a source is currently attached
    pub fn is_attached(&self, source: SourceId) -> bool {
        self.core.registry.lock().contains(source)
    }

    /// Number of attached sources
    pub fn source_count(&self) -> usize {
        self.core.registry.lock().entries.len()
    }

    /// Attached sources in attach order
    pub fn sources(&self) -> Vec<SourceId> {
        self.core
            .registry
            .lock()
            .entries
            .iter()
            .map(|s| s.source)
            .collect()
    }

    /// Check whether teardown has begun
    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }

    /// Tear the sink down without dropping it
    ///
    /// Returns the number of sources that were unsubscribed. Later calls (and
    /// the eventual drop) do nothing.
    pub fn close(&self) -> usize {
        self.core.teardown()
    }

    /// Get current statistics
    pub fn stats(&self) -> SinkStats {
        let (attached_sources, closed) = {
            let registry = self.core.registry.lock();
            (registry.entries.len(), registry.closed)
        };
        let (committed, queued, wakes, ignored) = self.core.counters.snapshot();

        SinkStats {
            sink_id: self.core.id,
            name: self.core.config.name.clone(),
            attached_sources,
            max_sources: self.core.config.max_sources,
            committed,
            queued,
            wakes,
            ignored,
            closed,
        }
    }
}

impl<E, H> Drop for EventSink<E, H>
where
    E: Event,
    H: SinkHandler<E>,
{
    fn drop(&mut self) {
        self.core.teardown();
    }
}

impl<E, H> std::fmt::Debug for EventSink<E, H>
where
    E: Event,
    H: SinkHandler<E>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("id", &self.core.id)
            .field("name", &self.core.config.name)
            .field("sources", &self.source_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
