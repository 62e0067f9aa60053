//! Delivery counters and registry snapshots

use std::sync::atomic::{AtomicU64, Ordering};

use crate::id::SinkId;

/// Running delivery counters kept by each sink
#[derive(Debug, Default)]
pub(crate) struct Counters {
    committed: AtomicU64,
    queued: AtomicU64,
    wakes: AtomicU64,
    ignored: AtomicU64,
}

impl Counters {
    pub(crate) fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queue(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wake(&self) {
        self.wakes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.committed.load(Ordering::Relaxed),
            self.queued.load(Ordering::Relaxed),
            self.wakes.load(Ordering::Relaxed),
            self.ignored.load(Ordering::Relaxed),
        )
    }
}

/// Point-in-time statistics about a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkStats {
    /// Identity of the sink
    pub sink_id: SinkId,
    /// Configured sink name
    pub name: String,
    /// Sources in the registry when the snapshot was taken
    pub attached_sources: usize,
    /// Configured registry limit
    pub max_sources: usize,
    /// Commits that reached the handler (including ones that returned an error)
    pub committed: u64,
    /// Events handed to the handler's queue hook
    pub queued: u64,
    /// Wakes handed to the handler's wake hook
    pub wakes: u64,
    /// Deliveries dropped because the sender was detached or the sink closed
    pub ignored: u64,
    /// Whether teardown has begun
    pub closed: bool,
}

impl std::fmt::Display for SinkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sink Stats ({} / {}):", self.name, self.sink_id)?;
        writeln!(f, "  Sources: {}/{}", self.attached_sources, self.max_sources)?;
        writeln!(
            f,
            "  Deliveries: {} committed, {} queued, {} wakes, {} ignored",
            self.committed, self.queued, self.wakes, self.ignored
        )?;
        writeln!(f, "  Closed: {}", self.closed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = Counters::default();
        counters.record_commit();
        counters.record_commit();
        counters.record_queue();
        counters.record_wake();
        counters.record_ignored();

        assert_eq!(counters.snapshot(), (2, 1, 1, 1));
    }

    #[test]
    fn test_stats_display() {
        let stats = SinkStats {
            sink_id: SinkId::next(),
            name: "io".to_string(),
            attached_sources: 2,
            max_sources: 16,
            committed: 5,
            queued: 3,
            wakes: 1,
            ignored: 0,
            closed: false,
        };

        let text = stats.to_string();
        assert!(text.contains("Sources: 2/16"));
        assert!(text.contains("5 committed, 3 queued, 1 wakes, 0 ignored"));
        assert!(text.contains("Closed: false"));
    }
}
