//! Feed aggregation properties
//!
//! Arbitrary interleavings of baseline loads, peer arrivals and own commits
//! must keep the feed duplicate-free and prepend-only.

use chorus_feed::FeedAggregator;
use chorus_testkit::{ids, post};
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    Initialize(Vec<u8>),
    Peer(u8),
    Own(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => prop::collection::vec(0u8..24, 0..8).prop_map(Op::Initialize),
        4 => (0u8..24).prop_map(Op::Peer),
        2 => (0u8..24).prop_map(Op::Own),
    ]
}

proptest! {
    #[test]
    fn ids_stay_unique(ops in prop::collection::vec(op(), 0..64)) {
        let mut feed = FeedAggregator::new();
        for op in ops {
            match op {
                Op::Initialize(baseline) => {
                    feed.initialize(baseline.into_iter().map(|id| post(u64::from(id))));
                }
                Op::Peer(id) => { feed.on_peer_post(post(u64::from(id))); }
                Op::Own(id) => { feed.on_own_post_committed(post(u64::from(id))); }
            }
            let snapshot = feed.snapshot();
            let unique: HashSet<_> = snapshot.iter().map(|p| p.id.clone()).collect();
            prop_assert_eq!(unique.len(), snapshot.len());
            prop_assert_eq!(feed.len(), snapshot.len());
        }
    }

    #[test]
    fn inserted_arrival_precedes_everything_else(
        baseline in prop::collection::vec(0u8..24, 0..10),
        arrivals in prop::collection::vec(0u8..24, 1..20),
    ) {
        let mut feed = FeedAggregator::new();
        feed.initialize(baseline.into_iter().map(|id| post(u64::from(id))));

        for id in arrivals {
            let before = ids(feed.iter());
            let arrival = post(u64::from(id));
            let inserted = feed.on_peer_post(arrival.clone());
            let after = ids(feed.iter());

            if inserted {
                prop_assert_eq!(&after[0], &arrival.id.to_string());
                prop_assert_eq!(&after[1..], &before[..]);
            } else {
                prop_assert!(before.contains(&arrival.id.to_string()));
                prop_assert_eq!(after, before);
            }
        }
    }

    #[test]
    fn baseline_order_is_kept(baseline in prop::collection::vec(0u8..32, 0..16)) {
        let mut feed = FeedAggregator::new();
        feed.initialize(baseline.iter().map(|id| post(u64::from(*id))));

        let mut seen = HashSet::new();
        let expected: Vec<String> = baseline
            .into_iter()
            .filter(|id| seen.insert(*id))
            .map(|id| id.to_string())
            .collect();
        prop_assert_eq!(ids(feed.iter()), expected);
    }
}

#[test]
fn peer_post_is_prepended_to_baseline() {
    let mut feed = FeedAggregator::new();
    feed.initialize([post(1u64), post(2u64)]);
    feed.on_peer_post(post(3u64));
    assert_eq!(ids(feed.iter()), ["3", "1", "2"]);
}

#[test]
fn duplicate_peer_post_is_ignored() {
    let mut feed = FeedAggregator::new();
    feed.on_peer_post(post(1u64));
    feed.on_peer_post(post(1u64));
    assert_eq!(ids(feed.iter()), ["1"]);
}
