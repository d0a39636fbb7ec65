//! Handle → wrapper identity cache.
//!
//! Entries hold `Weak` references, so the tracker never keeps a wrapper
//! alive. Every wrapper the tracker hands out or accepts is given a drop
//! watcher feeding the tracker's release queue; the queue is drained before
//! each insertion and stale entries are removed then. Draining only bounds
//! the map's growth: a stale entry still in the map fails to upgrade and is
//! treated as absent.
//!
//! # Thread Safety
//!
//! The map is a sharded `DashMap`. Lookup-and-insert for one handle runs
//! under that handle's shard lock, so two racing `get_or_create` calls for
//! the same handle agree on one wrapper. Evictions use `remove_if` on a dead
//! weak reference, so an entry replaced by a newer live wrapper is left alone.
//!
//! The factory runs under the shard lock. A factory calling back into the
//! tracker that is building with it would deadlock on a shard collision, so
//! such a call panics instead.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use crossbeam::channel::{self, Receiver, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use tether_core::{Handle, Native};

use crate::{NativeObjectFactory, NativeObjectProvider, Target, TrackerError};

thread_local! {
    /// Trackers whose factory is running on this thread, by address.
    static BUILDING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a tracker's factory as running on this thread until dropped.
struct FactoryScope {
    tracker: usize,
}

impl FactoryScope {
    fn enter(tracker: usize) -> Self {
        BUILDING.with(|building| building.borrow_mut().push(tracker));
        FactoryScope { tracker }
    }

    /// Panics if the factory of `tracker` is already running on this thread.
    fn check(tracker: usize) {
        let reentered = BUILDING.with(|building| building.borrow().contains(&tracker));
        assert!(
            !reentered,
            "factory called back into the tracker that is building with it"
        );
    }
}

impl Drop for FactoryScope {
    fn drop(&mut self) {
        BUILDING.with(|building| {
            let mut building = building.borrow_mut();
            if let Some(pos) = building.iter().rposition(|t| *t == self.tracker) {
                building.remove(pos);
            }
        });
    }
}

/// Canonicalizes handles to wrapper instances within one ownership partition.
pub struct IdentityTracker<T> {
    entries: DashMap<Handle, Weak<T>, FxBuildHasher>,
    factory: Box<dyn NativeObjectFactory<T>>,
    target: Target,
    released_tx: Sender<Handle>,
    released_rx: Receiver<Handle>,
}

impl<T: Native + Send + Sync + 'static> IdentityTracker<T> {
    pub fn new<F>(factory: F, target: Target) -> Self
    where
        F: NativeObjectFactory<T> + 'static,
    {
        let (released_tx, released_rx) = channel::unbounded();
        IdentityTracker {
            entries: DashMap::with_hasher(FxBuildHasher),
            factory: Box::new(factory),
            target,
            released_tx,
            released_rx,
        }
    }

    /// Tracker for wrappers that own their handles.
    pub fn owned<F>(factory: F) -> Self
    where
        F: NativeObjectFactory<T> + 'static,
    {
        Self::new(factory, Target::OwnedObjects)
    }

    /// Tracker for non-owning views.
    pub fn unowned<F>(factory: F) -> Self
    where
        F: NativeObjectFactory<T> + 'static,
    {
        Self::new(factory, Target::UnownedObjects)
    }

    #[inline]
    pub fn target(&self) -> Target {
        self.target
    }

    /// The live wrapper for `handle`, creating and caching one if needed.
    ///
    /// Repeated calls return the same instance for as long as any caller
    /// holds it. Once it has been dropped, the next call builds a new one.
    ///
    /// # Panics
    ///
    /// If called from inside this tracker's own factory.
    #[tracing::instrument(level = "trace", skip(self), fields(target = %self.target))]
    pub fn get_or_create(&self, handle: Handle) -> Arc<T> {
        FactoryScope::check(self.address());
        self.drain_released();

        match self.entries.entry(handle) {
            Entry::Occupied(mut slot) => {
                if let Some(live) = slot.get().upgrade() {
                    tracing::trace!("tracker hit");
                    return live;
                }
                let fresh = self.create(handle);
                slot.insert(Arc::downgrade(&fresh));
                tracing::trace!("tracker replaced stale entry");
                fresh
            }
            Entry::Vacant(slot) => {
                let fresh = self.create(handle);
                slot.insert(Arc::downgrade(&fresh));
                tracing::trace!("tracker miss");
                fresh
            }
        }
    }

    /// Track a wrapper built outside the factory, e.g. one returned directly
    /// from a foreign call.
    ///
    /// Fails if its ownership state does not match this tracker's partition,
    /// or if another live wrapper is tracked for the same handle. A stale
    /// entry for the handle is replaced.
    ///
    /// # Panics
    ///
    /// If called from inside this tracker's own factory.
    pub fn register(&self, instance: &Arc<T>) -> Result<(), TrackerError> {
        FactoryScope::check(self.address());
        let native = instance.native();
        let handle = native.raw_handle();
        let expected = self.target.owning_state();
        let actual = native.state();
        if actual != expected {
            return Err(TrackerError::OwnershipMismatch {
                handle,
                expected,
                actual,
            });
        }

        self.drain_released();

        match self.entries.entry(handle) {
            Entry::Occupied(mut slot) => {
                if slot.get().upgrade().is_some() {
                    return Err(TrackerError::AlreadyTracked { handle });
                }
                slot.insert(Arc::downgrade(instance));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::downgrade(instance));
            }
        }
        native.notify_on_drop(self.released_tx.clone());
        tracing::trace!(%handle, target = %self.target, "registered");
        Ok(())
    }

    /// The live wrapper for `handle`, without creating one.
    pub fn get(&self, handle: Handle) -> Option<Arc<T>> {
        self.entries.get(&handle).and_then(|weak| weak.upgrade())
    }

    /// Remove every stale entry now. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let mut removed = self.drain_released();
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        removed += before.saturating_sub(self.entries.len());
        removed
    }

    /// Number of entries, including stale ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn create(&self, handle: Handle) -> Arc<T> {
        let instance = {
            let _scope = FactoryScope::enter(self.address());
            Arc::new(self.factory.create_instance(handle, self.target.owned()))
        };
        debug_assert_eq!(
            instance.native().state(),
            self.target.owning_state(),
            "factory ignored the requested ownership"
        );
        instance.native().notify_on_drop(self.released_tx.clone());
        instance
    }

    fn address(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    /// Evict entries whose wrappers have reported being dropped.
    fn drain_released(&self) -> usize {
        let mut evicted = 0;
        for handle in self.released_rx.try_iter() {
            if self
                .entries
                .remove_if(&handle, |_, weak| weak.strong_count() == 0)
                .is_some()
            {
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::trace!(evicted, target = %self.target, "evicted stale entries");
        }
        evicted
    }
}

impl<T: Native + Send + Sync + 'static> NativeObjectProvider<T> for IdentityTracker<T> {
    fn provide(&self, handle: Handle) -> Arc<T> {
        self.get_or_create(handle)
    }
}

impl<T> fmt::Debug for IdentityTracker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityTracker")
            .field("target", &self.target)
            .field("entries", &self.entries.len())
            .field("pending_releases", &self.released_rx.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
