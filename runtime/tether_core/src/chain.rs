//! Auxiliary deletion actions attached to a lifecycle.
//!
//! Components that build extra foreign state on top of a handle (callback
//! trampolines, pinned buffers, child allocations) attach their teardown here
//! so it runs with the handle's own release. Actions run in attachment order,
//! strictly after the primary deletion action, and only for owned lifecycles.
//!
//! The chain is sealed when disposal starts, before the primary action runs.
//! Anything attached afterwards is dropped without running, which closes the
//! race between a late `attach` and a concurrent dispose. Actions taken at
//! sealing still run if the primary action panics.

use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::deleter::BoxedDeleter;
use crate::Handle;

/// Most handles carry zero or one auxiliary action; two stay inline.
type Actions = SmallVec<[BoxedDeleter; 2]>;

struct ChainState {
    actions: Actions,
    sealed: bool,
}

/// Ordered, append-only list of auxiliary deletion actions.
pub struct DisposalChain {
    state: Mutex<ChainState>,
}

impl DisposalChain {
    /// An open chain accepting attachments.
    pub(crate) fn new() -> Self {
        DisposalChain {
            state: Mutex::new(ChainState {
                actions: SmallVec::new(),
                sealed: false,
            }),
        }
    }

    /// A chain that will never run (unowned lifecycles).
    pub(crate) fn sealed() -> Self {
        DisposalChain {
            state: Mutex::new(ChainState {
                actions: SmallVec::new(),
                sealed: true,
            }),
        }
    }

    /// Append an action. Returns `false` if the chain is sealed, in which case
    /// the action is dropped unrun.
    pub(crate) fn push(&self, action: BoxedDeleter) -> bool {
        let mut state = self.state.lock();
        if state.sealed {
            return false;
        }
        state.actions.push(action);
        true
    }

    /// Seal the chain and take its pending actions for `handle`.
    ///
    /// The returned set runs when [`SealedActions::run`] is called or, if the
    /// caller unwinds first, when it is dropped. Actions run outside the lock,
    /// so an action attaching to the same chain cannot deadlock.
    pub(crate) fn seal(&self, handle: Handle) -> SealedActions {
        let mut state = self.state.lock();
        state.sealed = true;
        SealedActions {
            handle,
            actions: std::mem::take(&mut state.actions),
        }
    }

    /// Number of actions waiting to run.
    pub fn len(&self) -> usize {
        self.state.lock().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }
}

impl std::fmt::Debug for DisposalChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DisposalChain")
            .field("pending", &state.actions.len())
            .field("sealed", &state.sealed)
            .finish()
    }
}

/// Actions taken off a sealed chain, not yet run.
pub(crate) struct SealedActions {
    handle: Handle,
    actions: Actions,
}

impl SealedActions {
    /// Run every action in attachment order. Returns how many ran.
    pub(crate) fn run(mut self) -> usize {
        let actions = std::mem::take(&mut self.actions);
        let count = actions.len();
        for action in actions {
            action.delete_handle(self.handle);
        }
        count
    }
}

impl Drop for SealedActions {
    /// Runs whatever `run` did not, e.g. when the primary action unwound
    /// past the seal. A second panic while unwinding would abort, so each
    /// action is isolated.
    fn drop(&mut self) {
        for action in self.actions.drain(..) {
            let handle = self.handle;
            if catch_unwind(AssertUnwindSafe(|| action.delete_handle(handle))).is_err() {
                tracing::error!(%handle, "auxiliary action panicked while unwinding");
            }
        }
    }
}
