//! Property tests for the sink registry
//!
//! Random attach/detach/commit sequences are replayed against a sink and a
//! plain set that models which sources should be attached.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use evsink_core::{Delivery, EventSink, EventSource, FnHandler};
use proptest::prelude::*;

const SOURCES: usize = 6;

#[derive(Debug, Clone)]
enum Op {
    Attach(usize),
    Detach(usize),
    Commit(usize),
    Queue(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..SOURCES).prop_map(Op::Attach),
        (0..SOURCES).prop_map(Op::Detach),
        (0..SOURCES).prop_map(Op::Commit),
        (0..SOURCES).prop_map(Op::Queue),
    ]
}

proptest! {
    #[test]
    fn registry_matches_model(ops in proptest::collection::vec(op(), 0..64)) {
        let commits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&commits);
        let sink = EventSink::new(FnHandler::new(
            move |_: u64| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            |_: u64| {},
            || {},
        ));
        let sources: Vec<EventSource<u64>> = (0..SOURCES).map(|_| EventSource::new()).collect();
        let mut attached = BTreeSet::new();
        let mut expected_commits = 0;

        for op in ops {
            match op {
                Op::Attach(i) => {
                    sources[i].attach(&sink).unwrap();
                    attached.insert(i);
                }
                Op::Detach(i) => {
                    prop_assert_eq!(sources[i].detach(), attached.remove(&i));
                }
                Op::Commit(i) => {
                    let delivery = sources[i].commit_event(i as u64).unwrap();
                    if attached.contains(&i) {
                        expected_commits += 1;
                        prop_assert_eq!(delivery, Delivery::Delivered);
                    } else {
                        prop_assert_eq!(delivery, Delivery::Ignored);
                    }
                }
                Op::Queue(i) => {
                    prop_assert_eq!(sources[i].queue_event(0).is_delivered(), attached.contains(&i));
                }
            }

            prop_assert_eq!(sink.source_count(), attached.len());
            for (i, source) in sources.iter().enumerate() {
                prop_assert_eq!(sink.is_attached(source.id()), attached.contains(&i));
            }
        }

        prop_assert_eq!(commits.load(Ordering::SeqCst), expected_commits);
        prop_assert_eq!(sink.close(), attached.len());

        for (i, source) in sources.iter().enumerate() {
            let expected = usize::from(attached.contains(&i));
            prop_assert_eq!(source.forced_unsubscribes(), expected);
            prop_assert!(!source.is_attached());
        }
    }

    #[test]
    fn registry_never_exceeds_limit(limit in 1usize..8, attempts in 0usize..16) {
        let config = evsink_core::SinkConfig::named("bounded").with_max_sources(limit);
        let sink = EventSink::with_config(
            FnHandler::new(|_: u64| Ok(()), |_: u64| {}, || {}),
            config,
        )
        .unwrap();
        let sources: Vec<EventSource<u64>> = (0..attempts).map(|_| EventSource::new()).collect();

        let accepted = sources.iter().filter(|s| s.attach(&sink).is_ok()).count();

        prop_assert_eq!(accepted, attempts.min(limit));
        prop_assert_eq!(sink.source_count(), accepted);
        prop_assert_eq!(sources.iter().filter(|s| s.is_attached()).count(), accepted);
    }
}
