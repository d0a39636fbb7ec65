#![allow(
    clippy::unwrap_used,
    reason = "test code uses unwrap for concise assertions"
)]

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, OnceLock, Weak};

use pretty_assertions::assert_eq;
use tether_core::{
    CollectorConfig, DeferredCollector, Handle, Native, NativeObject, OwnershipState,
};

use super::IdentityTracker;
use crate::{NativeObjectProvider, Target, TrackerError};

struct Widget {
    native: NativeObject,
    serial: usize,
}

impl Native for Widget {
    fn native(&self) -> &NativeObject {
        &self.native
    }
}

/// Shared state for a test factory: a private collector plus counters.
#[derive(Clone)]
struct Fixture {
    collector: DeferredCollector,
    created: Arc<AtomicUsize>,
    deleted: Arc<AtomicUsize>,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            collector: DeferredCollector::new(CollectorConfig::manual()),
            created: Arc::new(AtomicUsize::new(0)),
            deleted: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn widget(&self, handle: Handle, owned: bool) -> Widget {
        let serial = self.created.fetch_add(1, Ordering::SeqCst);
        let deleted = Arc::clone(&self.deleted);
        let native = NativeObject::builder(handle)
            .owned(owned)
            .deleter(move |_: Handle| {
                deleted.fetch_add(1, Ordering::SeqCst);
            })
            .collector(&self.collector)
            .build()
            .unwrap();
        Widget { native, serial }
    }

    fn tracker(&self, target: Target) -> IdentityTracker<Widget> {
        let fixture = self.clone();
        IdentityTracker::new(
            move |h: Handle, owned: bool| fixture.widget(h, owned),
            target,
        )
    }
}

const H1: Handle = Handle::from_raw(0x1000);
const H2: Handle = Handle::from_raw(0x2000);

// ── get_or_create ───────────────────────────────────────

#[test]
fn same_handle_same_instance() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::UnownedObjects);

    let a = tracker.get_or_create(H2);
    let b = tracker.get_or_create(H2);

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(fixture.created.load(Ordering::SeqCst), 1);
    assert_eq!(a.state(), OwnershipState::Unowned);
}

#[test]
fn distinct_handles_distinct_instances() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::UnownedObjects);

    let a = tracker.get_or_create(H1);
    let b = tracker.get_or_create(H2);
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(tracker.len(), 2);
}

#[test]
fn dropped_wrapper_is_recreated() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::UnownedObjects);

    let first = tracker.get_or_create(H1).serial;
    let second = tracker.get_or_create(H1).serial;

    assert_ne!(first, second);
    assert_eq!(fixture.created.load(Ordering::SeqCst), 2);
}

#[test]
fn factory_receives_partition_ownership() {
    let fixture = Fixture::new();
    let owned = fixture.tracker(Target::OwnedObjects);
    let unowned = fixture.tracker(Target::UnownedObjects);

    assert_eq!(owned.get_or_create(H1).state(), OwnershipState::Owned);
    assert_eq!(unowned.get_or_create(H1).state(), OwnershipState::Unowned);
    assert_eq!(owned.target(), Target::OwnedObjects);
    assert_eq!(unowned.target(), Target::UnownedObjects);
}

#[test]
fn partitions_are_independent() {
    let fixture = Fixture::new();
    let owned = fixture.tracker(Target::OwnedObjects);
    let unowned = fixture.tracker(Target::UnownedObjects);

    let owner = owned.get_or_create(H1);
    let view = unowned.get_or_create(H1);
    assert!(!Arc::ptr_eq(&owner, &view));

    // Dropping the view never releases the handle.
    drop(view);
    fixture.collector.collect_pending();
    assert_eq!(fixture.deleted.load(Ordering::SeqCst), 0);
    assert!(owner.handle().is_ok());
}

// ── Eviction ────────────────────────────────────────────

#[test]
fn stale_entries_are_evicted_on_next_insert() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::UnownedObjects);

    drop(tracker.get_or_create(H1));
    assert_eq!(tracker.len(), 1, "eviction is lazy");
    assert!(tracker.get(H1).is_none());

    let _keep = tracker.get_or_create(H2);
    assert_eq!(tracker.len(), 1);
    assert!(tracker.get(H2).is_some());
}

#[test]
fn purge_removes_all_stale_entries() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::UnownedObjects);

    let keep = tracker.get_or_create(H1);
    let batch: Vec<_> = (0..10)
        .map(|i| tracker.get_or_create(Handle::from_raw(0x9000 + i)))
        .collect();
    assert_eq!(tracker.len(), 11);

    drop(batch);
    assert_eq!(tracker.purge(), 10);
    assert_eq!(tracker.len(), 1);
    assert!(Arc::ptr_eq(&tracker.get(H1).unwrap(), &keep));
}

#[test]
fn eviction_spares_live_entry() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::UnownedObjects);

    let live = tracker.get_or_create(H1);
    // A release notice for the handle arrives while a live wrapper holds it,
    // as happens when an old wrapper's drop races a fresh insertion.
    tracker.released_tx.send(H1).unwrap();
    assert_eq!(tracker.purge(), 0);
    assert!(Arc::ptr_eq(&tracker.get(H1).unwrap(), &live));
}

#[test]
fn unwatched_stale_entry_is_replaced() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::UnownedObjects);

    let stale = Arc::new(fixture.widget(H1, false));
    tracker.entries.insert(H1, Arc::downgrade(&stale));
    drop(stale);

    let fresh = tracker.get_or_create(H1);
    assert_eq!(fresh.raw_handle(), H1);
    assert!(Arc::ptr_eq(&tracker.get(H1).unwrap(), &fresh));
}

// ── register ────────────────────────────────────────────

#[test]
fn register_rejects_wrong_partition() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::OwnedObjects);
    let view = Arc::new(fixture.widget(H1, false));

    assert_eq!(
        tracker.register(&view),
        Err(TrackerError::OwnershipMismatch {
            handle: H1,
            expected: OwnershipState::Owned,
            actual: OwnershipState::Unowned,
        })
    );
    assert!(tracker.is_empty());
}

#[test]
fn register_rejects_cleared_object() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::OwnedObjects);
    let owner = Arc::new(fixture.widget(H1, true));
    owner.dispose();

    assert!(matches!(
        tracker.register(&owner),
        Err(TrackerError::OwnershipMismatch {
            actual: OwnershipState::Cleared,
            ..
        })
    ));
}

#[test]
fn register_rejects_second_live_wrapper() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::OwnedObjects);

    let first = Arc::new(fixture.widget(H1, true));
    let second = Arc::new(fixture.widget(H1, true));
    tracker.register(&first).unwrap();

    assert_eq!(
        tracker.register(&second),
        Err(TrackerError::AlreadyTracked { handle: H1 })
    );
    assert!(Arc::ptr_eq(&tracker.get_or_create(H1), &first));
}

#[test]
fn register_replaces_dead_entry() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::OwnedObjects);

    drop(tracker.get_or_create(H1));
    let fresh = Arc::new(fixture.widget(H1, true));
    tracker.register(&fresh).unwrap();
    assert!(Arc::ptr_eq(&tracker.get_or_create(H1), &fresh));

    // Same again with a dead entry that never reported its release.
    let stale = Arc::new(fixture.widget(H2, true));
    tracker.entries.insert(H2, Arc::downgrade(&stale));
    drop(stale);
    let replacement = Arc::new(fixture.widget(H2, true));
    assert_eq!(tracker.register(&replacement), Ok(()));
}

#[test]
fn registered_wrapper_is_evicted_after_drop() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::UnownedObjects);
    let view = Arc::new(fixture.widget(H1, false));
    tracker.register(&view).unwrap();

    drop(view);
    assert_eq!(tracker.purge(), 1);
    assert!(tracker.is_empty());
}

// ── Collection through the tracker ──────────────────────

#[test]
fn owned_wrapper_collected_once_after_last_reference() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::OwnedObjects);

    let a = tracker.get_or_create(H1);
    let b = tracker.get_or_create(H1);
    drop(a);
    fixture.collector.collect_pending();
    assert_eq!(fixture.deleted.load(Ordering::SeqCst), 0, "still reachable through b");

    b.dispose();
    drop(b);
    fixture.collector.collect_pending();
    assert_eq!(fixture.deleted.load(Ordering::SeqCst), 1);
}

#[test]
fn provider_delegates_to_get_or_create() {
    fn lookup(provider: &dyn NativeObjectProvider<Widget>, handle: Handle) -> Arc<Widget> {
        provider.provide(handle)
    }

    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::UnownedObjects);
    let direct = tracker.get_or_create(H1);
    assert!(Arc::ptr_eq(&lookup(&tracker, H1), &direct));
}

// ── Factory re-entry ────────────────────────────────────

#[test]
fn factory_reentry_panics_instead_of_deadlocking() {
    let fixture = Fixture::new();
    let slot: Arc<OnceLock<Weak<IdentityTracker<Widget>>>> = Arc::new(OnceLock::new());
    let inner = Arc::clone(&slot);
    let builder = fixture.clone();
    let tracker = Arc::new(IdentityTracker::unowned(move |h: Handle, owned: bool| {
        if h == H1 {
            // Resolve a child pointer through the tracker that is building us.
            if let Some(tracker) = inner.get().and_then(Weak::upgrade) {
                drop(tracker.get_or_create(H2));
            }
        }
        builder.widget(h, owned)
    }));
    slot.set(Arc::downgrade(&tracker)).unwrap();

    let outcome = catch_unwind(AssertUnwindSafe(|| tracker.get_or_create(H1)));
    assert!(outcome.is_err());
    assert!(tracker.get(H1).is_none());

    // The unwound build leaves the tracker usable from this thread.
    let child = tracker.get_or_create(H2);
    assert_eq!(child.raw_handle(), H2);
}

#[test]
fn factory_may_use_other_trackers() {
    let fixture = Fixture::new();
    let children = Arc::new(fixture.tracker(Target::UnownedObjects));
    let inner = Arc::clone(&children);
    let builder = fixture.clone();
    let parents = IdentityTracker::unowned(move |h: Handle, owned: bool| {
        drop(inner.get_or_create(h.offset(8)));
        builder.widget(h, owned)
    });

    let parent = parents.get_or_create(H1);
    assert_eq!(parent.raw_handle(), H1);
    assert_eq!(fixture.created.load(Ordering::SeqCst), 2);
}

// ── Concurrency ─────────────────────────────────────────

#[test]
fn racing_lookups_agree_on_one_instance() {
    const THREADS: usize = 8;

    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::OwnedObjects);
    let barrier = Barrier::new(THREADS);

    let results: Vec<Arc<Widget>> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    tracker.get_or_create(H1)
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(fixture.created.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|w| Arc::ptr_eq(w, &results[0])));
}

#[test]
fn lookups_race_with_drops() {
    let fixture = Fixture::new();
    let tracker = fixture.tracker(Target::UnownedObjects);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for i in 0..500 {
                    let handle = Handle::from_raw(0x100 + (i % 8));
                    let wrapper = tracker.get_or_create(handle);
                    assert_eq!(wrapper.raw_handle(), handle);
                }
            });
        }
    });

    tracker.purge();
    assert!(tracker.is_empty());
}
