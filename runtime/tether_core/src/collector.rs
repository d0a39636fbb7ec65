//! Deferred collection of unreachable owned wrappers.
//!
//! Every owned wrapper built with [`DisposalMethod::Collected`] holds a
//! [`Registration`]. The registration keeps the wrapper's [`Lifecycle`] (never
//! the wrapper itself) and, when the wrapper is dropped, pushes that lifecycle
//! onto the collector's queue. A worker thread drains the queue and calls
//! `dispose()` on each entry unconditionally; lifecycles already disposed
//! explicitly fall through as no-ops.
//!
//! ```text
//! wrapper dropped ─▶ Registration::drop ─▶ queue ─▶ worker ─▶ Lifecycle::dispose
//!                                            └──▶ collect_pending (caller thread)
//! ```
//!
//! Collection is a safety net. Nothing bounds when the worker gets to an
//! entry, and entries still queued at process exit are never released.
//! Deletion actions that panic on the collector path are caught and logged;
//! there is no caller to report them to.
//!
//! [`DisposalMethod::Collected`]: crate::DisposalMethod::Collected

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam::channel::{self, Receiver, Sender};

use crate::{CollectorConfig, Lifecycle};

static GLOBAL: OnceLock<DeferredCollector> = OnceLock::new();

/// Counters shared with the worker thread.
#[derive(Default)]
struct CollectorStats {
    /// Lifecycles queued and not yet processed.
    pending: AtomicUsize,
    /// Lifecycles whose deletion action ran on the collector path.
    collected: AtomicU64,
}

struct CollectorShared {
    sender: Sender<Arc<Lifecycle>>,
    receiver: Receiver<Arc<Lifecycle>>,
    stats: Arc<CollectorStats>,
    background: bool,
}

/// Queue of released lifecycles awaiting disposal.
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct DeferredCollector {
    shared: Arc<CollectorShared>,
}

impl DeferredCollector {
    /// Create a collector, spawning its worker thread if configured.
    ///
    /// If the thread cannot be spawned the collector falls back to draining
    /// on [`collect_pending`](Self::collect_pending) only.
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = channel::unbounded();
        let stats = Arc::new(CollectorStats::default());
        let background = config.background && spawn_worker(&config, &receiver, &stats);

        DeferredCollector {
            shared: Arc::new(CollectorShared {
                sender,
                receiver,
                stats,
                background,
            }),
        }
    }

    /// The process-wide collector, built from
    /// [`CollectorConfig::from_env`] on first use.
    pub fn global() -> &'static DeferredCollector {
        GLOBAL.get_or_init(|| DeferredCollector::new(CollectorConfig::from_env()))
    }

    /// Watch `lifecycle` until the returned registration is dropped.
    pub fn register(&self, lifecycle: &Arc<Lifecycle>) -> Registration {
        Registration {
            lifecycle: Arc::clone(lifecycle),
            collector: self.clone(),
        }
    }

    fn enqueue(&self, lifecycle: Arc<Lifecycle>) {
        let stats = &self.shared.stats;
        stats.pending.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(
            handle = %lifecycle.raw_handle(),
            pending = stats.pending.load(Ordering::Acquire),
            "lifecycle queued for collection"
        );
        // The shared receiver keeps the channel open, so this only fails if
        // the collector is being torn down; release inline in that case.
        if let Err(err) = self.shared.sender.send(lifecycle) {
            collect_one(&err.into_inner(), stats);
        }
    }

    /// Dispose every queued lifecycle on the calling thread.
    ///
    /// Returns how many entries were taken off the queue. Safe to call while
    /// the worker thread is running; each entry is processed by exactly one
    /// of them.
    pub fn collect_pending(&self) -> usize {
        let mut processed = 0;
        while let Ok(lifecycle) = self.shared.receiver.try_recv() {
            collect_one(&lifecycle, &self.shared.stats);
            processed += 1;
        }
        if processed > 0 {
            tracing::trace!(processed, "drained collection queue");
        }
        processed
    }

    /// Lifecycles queued and not yet processed.
    #[inline]
    pub fn pending(&self) -> usize {
        self.shared.stats.pending.load(Ordering::Acquire)
    }

    /// Lifecycles released on the collector path so far.
    #[inline]
    pub fn collected(&self) -> u64 {
        self.shared.stats.collected.load(Ordering::Acquire)
    }

    /// Whether a worker thread is draining this collector.
    #[inline]
    pub fn is_background(&self) -> bool {
        self.shared.background
    }
}

impl fmt::Debug for DeferredCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCollector")
            .field("background", &self.shared.background)
            .field("pending", &self.pending())
            .field("collected", &self.collected())
            .finish()
    }
}

/// Dispose one lifecycle, swallowing panics from its deletion actions.
fn collect_one(lifecycle: &Lifecycle, stats: &CollectorStats) {
    match catch_unwind(AssertUnwindSafe(|| lifecycle.dispose())) {
        Ok(true) => {
            stats.collected.fetch_add(1, Ordering::AcqRel);
        }
        Ok(false) => {}
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(
                handle = %lifecycle.raw_handle(),
                %message,
                "deletion action panicked during deferred collection"
            );
        }
    }
    stats.pending.fetch_sub(1, Ordering::AcqRel);
}

/// Spawn the worker draining `receiver`. Returns whether it started.
///
/// The worker holds only the receiver and counters, so it exits once every
/// sender (the collector and all registrations) is gone.
fn spawn_worker(
    config: &CollectorConfig,
    receiver: &Receiver<Arc<Lifecycle>>,
    stats: &Arc<CollectorStats>,
) -> bool {
    let receiver = receiver.clone();
    let stats = Arc::clone(stats);
    let spawned = std::thread::Builder::new()
        .name(config.thread_name.clone())
        .spawn(move || {
            for lifecycle in &receiver {
                collect_one(&lifecycle, &stats);
            }
            tracing::trace!("collector worker exiting");
        });

    match spawned {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(%err, "failed to spawn collector worker, collecting on demand only");
            false
        }
    }
}

/// Keeps a lifecycle queued for collection once its wrapper goes away.
///
/// Dropping the registration is the "unreachable" signal: it enqueues the
/// lifecycle on the collector it came from.
pub struct Registration {
    lifecycle: Arc<Lifecycle>,
    collector: DeferredCollector,
}

impl Registration {
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.collector.enqueue(Arc::clone(&self.lifecycle));
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("handle", &self.lifecycle.raw_handle())
            .finish_non_exhaustive()
    }
}
