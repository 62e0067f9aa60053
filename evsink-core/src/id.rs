//! Opaque identities for sinks and sources
//!
//! Identities are only compared and hashed. The registry uses them for
//! membership, and sources use them to tell which sink a forced unsubscribe
//! came from.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

impl SinkId {
    /// Allocate a fresh, process-unique sink ID
    pub fn next() -> Self {
        Self(NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sink-{}", self.0)
    }
}

/// Unique identifier for a source
///
/// Sources created through [`EventSource`](crate::EventSource) allocate one
/// automatically. Custom sources call [`SourceId::next`] once and keep it for
/// their whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a fresh, process-unique source ID
    pub fn next() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<SourceId> = (0..100).map(|_| SourceId::next()).collect();
        assert_eq!(ids.len(), 100);

        let a = SinkId::next();
        let b = SinkId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_display() {
        let id = SourceId::next();
        assert_eq!(id.to_string(), format!("source-{}", id.as_u64()));

        let id = SinkId::next();
        assert_eq!(id.to_string(), format!("sink-{}", id.as_u64()));
    }
}
