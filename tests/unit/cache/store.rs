use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;
use crate::foundation::core::{ChannelSet, FrameTime, NodeId, XRange};

fn fp(node: u64, y: i32) -> Fingerprint {
    Fingerprint {
        node: NodeId(node),
        version: 0,
        time: FrameTime(0),
        y,
        x_range: XRange { x: 0, r: 8 },
        channels: ChannelSet::RGB,
    }
}

fn data(v: f32) -> Vec<f32> {
    vec![v; 8 * 3]
}

fn compute(cache: &RowCache, f: Fingerprint, priority: CachePriority, v: f32) -> RowPin {
    match cache.lookup_or_reserve(f, priority).unwrap() {
        Lookup::Hit(pin) => pin,
        Lookup::Reserved(r) => match cache.begin(r) {
            Begin::Run(r) => cache.publish(r, Ok(data(v))).unwrap(),
            Begin::Joined(outcome) => outcome.unwrap(),
        },
    }
}

#[test]
fn miss_then_hit_returns_the_same_row() {
    let cache = RowCache::default();
    let first = compute(&cache, fp(1, 0), CachePriority::Normal, 1.0);
    let second = compute(&cache, fp(1, 0), CachePriority::Normal, 2.0);
    assert!(first.same_row(&second));
    assert_eq!(second.as_slice()[0], 1.0);

    let s = cache.stats();
    assert_eq!((s.misses, s.hits, s.computations), (1, 1, 1));
    assert_eq!(s.entries, 1);
    assert_eq!(s.pinned_entries, 1);
    assert_eq!(s.bytes, first.byte_len());
}

#[test]
fn concurrent_requests_share_one_computation() {
    let cache = RowCache::default();
    let computations = AtomicUsize::new(0);
    let barrier = Barrier::new(8);
    let f = fp(1, 5);

    let pins: Vec<RowPin> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    match cache.lookup_or_reserve(f, CachePriority::Normal).unwrap() {
                        Lookup::Hit(pin) => pin,
                        Lookup::Reserved(r) => match cache.begin(r) {
                            Begin::Run(r) => {
                                computations.fetch_add(1, Ordering::SeqCst);
                                std::thread::sleep(Duration::from_millis(20));
                                cache.publish(r, Ok(data(7.0))).unwrap()
                            }
                            Begin::Joined(outcome) => outcome.unwrap(),
                        },
                    }
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert!(pins.iter().all(|p| p.same_row(&pins[0])));
    assert_eq!(cache.pin_count(&f), Some(8));
    assert_eq!(cache.stats().computations, 1);
    drop(pins);
    assert_eq!(cache.pin_count(&f), Some(0));
}

#[test]
fn failure_reaches_waiters_and_allows_retry() {
    let cache = RowCache::default();
    let f = fp(2, 3);
    let Lookup::Reserved(r) = cache.lookup_or_reserve(f, CachePriority::Normal).unwrap() else {
        panic!("expected reservation");
    };
    let Begin::Run(r) = cache.begin(r) else {
        panic!("expected to run");
    };

    std::thread::scope(|s| {
        let waiter = s.spawn(|| cache.lookup_or_reserve(f, CachePriority::Normal));
        // Let the waiter register before publishing.
        while cache.stats().waits == 0 {
            std::thread::yield_now();
        }
        let err = cache
            .publish(r, Err(RowFailure::new(f.node, f.y, "boom")))
            .unwrap_err();
        assert!(err.message.contains("boom"));
        let waited = waiter.join().unwrap();
        assert_eq!(waited.unwrap_err(), err);
    });

    assert!(!cache.contains(&f));
    assert_eq!(cache.stats().failures, 1);
    let retried = compute(&cache, f, CachePriority::Normal, 4.0);
    assert_eq!(retried.as_slice()[0], 4.0);
}

#[test]
fn wrong_buffer_length_is_a_failure() {
    let cache = RowCache::default();
    let f = fp(2, 0);
    let Lookup::Reserved(r) = cache.lookup_or_reserve(f, CachePriority::Normal).unwrap() else {
        panic!("expected reservation");
    };
    let Begin::Run(r) = cache.begin(r) else {
        panic!("expected to run");
    };
    assert!(cache.publish(r, Ok(vec![0.0; 3])).is_err());
    assert!(!cache.contains(&f));
}

#[test]
fn pending_reservation_is_taken_over() {
    let cache = RowCache::default();
    let f = fp(3, 1);
    let Probe::Reserved(queued) = cache.probe(f, CachePriority::Normal) else {
        panic!("expected reservation");
    };
    assert!(!queued.is_running());
    assert!(matches!(cache.probe(f, CachePriority::Normal), Probe::Busy));

    let Lookup::Reserved(taken) = cache.lookup_or_reserve(f, CachePriority::Normal).unwrap() else {
        panic!("expected takeover");
    };
    assert!(taken.is_running());
    let published = cache.publish(taken, Ok(data(9.0))).unwrap();

    let Begin::Joined(joined) = cache.begin(queued) else {
        panic!("queued reservation must join the takeover");
    };
    let joined = joined.unwrap();
    assert!(joined.same_row(&published));
    assert_eq!(cache.stats().takeovers, 1);
    assert_eq!(cache.stats().computations, 1);
    assert_eq!(cache.pin_count(&f), Some(2));
}

#[test]
fn dropping_a_taken_over_reservation_does_not_fail_the_new_owner() {
    let cache = RowCache::default();
    let f = fp(3, 2);
    let Probe::Reserved(queued) = cache.probe(f, CachePriority::Normal) else {
        panic!("expected reservation");
    };
    let Lookup::Reserved(taken) = cache.lookup_or_reserve(f, CachePriority::Normal).unwrap() else {
        panic!("expected takeover");
    };
    drop(queued);
    assert!(cache.publish(taken, Ok(data(1.0))).is_ok());
    assert!(cache.contains(&f));
}

#[test]
fn dropping_an_unstarted_reservation_releases_the_fingerprint() {
    let cache = RowCache::default();
    let f = fp(3, 3);
    let Probe::Reserved(queued) = cache.probe(f, CachePriority::Normal) else {
        panic!("expected reservation");
    };
    drop(queued);
    assert_eq!(cache.stats().in_flight, 0);
    assert!(matches!(
        cache.probe(f, CachePriority::Normal),
        Probe::Reserved(_)
    ));
}

#[test]
fn eviction_never_removes_pinned_rows() {
    let cache = RowCache::default();
    let pinned = compute(&cache, fp(4, 0), CachePriority::Low, 1.0);
    let loose = compute(&cache, fp(4, 1), CachePriority::High, 1.0);
    let row_bytes = loose.byte_len();
    drop(loose);

    let evicted = cache.set_budget(1).unwrap();
    assert_eq!(evicted, 1);
    assert!(cache.contains(&fp(4, 0)));
    assert!(!cache.contains(&fp(4, 1)));

    let s = cache.stats();
    assert_eq!(s.bytes, row_bytes);
    assert_eq!(s.over_budget_events, 1);
    assert_eq!(pinned.as_slice()[0], 1.0);
}

#[test]
fn unpinned_rows_are_evicted_by_priority_then_recency() {
    let cache = RowCache::default();
    drop(compute(&cache, fp(5, 0), CachePriority::Normal, 0.0));
    drop(compute(&cache, fp(5, 1), CachePriority::Low, 0.0));
    drop(compute(&cache, fp(5, 2), CachePriority::Normal, 0.0));
    // Touch row 0 so row 2 becomes the least recently used Normal row.
    drop(cache.try_get(&fp(5, 0)));

    let total = cache.stats().bytes;
    let one = total / 3;
    assert_eq!(cache.set_budget(total - one).unwrap(), 1);
    assert!(!cache.contains(&fp(5, 1)));

    assert_eq!(cache.set_budget(total - 2 * one).unwrap(), 1);
    assert!(!cache.contains(&fp(5, 2)));
    assert!(cache.contains(&fp(5, 0)));
}

#[test]
fn transient_rows_are_swept_once_unpinned() {
    let cache = RowCache::default();
    let pin = compute(&cache, fp(6, 0), CachePriority::Transient, 0.0);
    assert_eq!(cache.evict_if_needed(), 0);
    drop(pin);
    assert_eq!(cache.evict_if_needed(), 1);
    assert!(!cache.contains(&fp(6, 0)));
}

#[test]
fn purge_keeps_pinned_rows_and_budget() {
    let cache = RowCache::default();
    let budget = cache.budget();
    let keep = compute(&cache, fp(7, 0), CachePriority::Normal, 0.0);
    drop(compute(&cache, fp(7, 1), CachePriority::High, 0.0));
    assert_eq!(cache.purge_unpinned(), 1);
    assert!(cache.contains(keep.fingerprint()));
    assert_eq!(cache.budget(), budget);
}

#[test]
fn zero_budget_is_rejected() {
    let cache = RowCache::default();
    assert!(cache.set_budget(0).is_err());
}

#[test]
fn pin_re_adopts_an_evicted_row() {
    let cache = RowCache::default();
    let pin = compute(&cache, fp(8, 0), CachePriority::Normal, 3.0);
    let row = Arc::clone(pin.row());
    drop(pin);
    assert_eq!(cache.purge_unpinned(), 1);

    let again = cache.pin(&row);
    assert!(cache.contains(&fp(8, 0)));
    assert_eq!(cache.pin_count(&fp(8, 0)), Some(1));
    drop(again);
}

#[test]
fn re_adopted_row_keeps_its_priority() {
    let cache = RowCache::default();
    let pin = compute(&cache, fp(9, 0), CachePriority::Transient, 1.0);
    let row = Arc::clone(pin.row());
    assert_eq!(row.priority(), CachePriority::Transient);
    drop(pin);
    assert_eq!(cache.evict_if_needed(), 1);

    let again = cache.pin(&row);
    assert_eq!(cache.evict_if_needed(), 0);
    drop(again);
    // Still transient: swept as soon as the pin is gone, far under budget.
    assert_eq!(cache.evict_if_needed(), 1);
    assert!(!cache.contains(&fp(9, 0)));
}
