//! Per-handle lifecycle state machine.
//!
//! A [`Lifecycle`] is the single authority deciding whether a handle's
//! deletion action fires. It is shared (`Arc`) between the wrapper that owns
//! it, tracker entries, and the deferred collector, so disposal can run after
//! the wrapper itself is gone.
//!
//! # States
//!
//! ```text
//! Unowned                      (terminal, no transitions)
//! Owned ──dispose()──▶ Cleared (terminal)
//! ```
//!
//! The `Owned → Cleared` transition is claimed with a compare-and-set before
//! any deletion work starts, so concurrent explicit and deferred disposal race
//! on a single atomic and exactly one of them runs the actions.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::chain::DisposalChain;
use crate::deleter::{BoxedDeleter, HandleDeleter};
use crate::{Handle, LifecycleError, OwnershipState};

/// Ownership state and deletion actions for one handle.
pub struct Lifecycle {
    handle: Handle,
    state: AtomicU8,
    /// Present iff the lifecycle was created owned.
    deleter: Option<BoxedDeleter>,
    chain: DisposalChain,
}

impl Lifecycle {
    /// Create a lifecycle for `handle`.
    ///
    /// Fails with [`LifecycleError::MissingDeleter`] when `owned` is set and
    /// no deletion action is given. A deleter passed for an unowned handle is
    /// dropped: unowned lifecycles never release anything.
    pub fn create(
        handle: Handle,
        owned: bool,
        deleter: Option<BoxedDeleter>,
    ) -> Result<Self, LifecycleError> {
        if !owned {
            return Ok(Self::unowned(handle));
        }
        match deleter {
            Some(deleter) => Ok(Self::owned(handle, deleter)),
            None => Err(LifecycleError::MissingDeleter { handle }),
        }
    }

    /// Owned lifecycle. Infallible since the deleter is provided.
    pub fn owned(handle: Handle, deleter: BoxedDeleter) -> Self {
        tracing::trace!(%handle, "owned lifecycle created");
        Lifecycle {
            handle,
            state: AtomicU8::new(OwnershipState::Owned.as_u8()),
            deleter: Some(deleter),
            chain: DisposalChain::new(),
        }
    }

    /// Non-owning lifecycle.
    pub fn unowned(handle: Handle) -> Self {
        Lifecycle {
            handle,
            state: AtomicU8::new(OwnershipState::Unowned.as_u8()),
            deleter: None,
            chain: DisposalChain::sealed(),
        }
    }

    /// The handle, if it has not been released.
    ///
    /// Every accessor that implies the handle is live goes through here.
    #[inline]
    pub fn handle(&self) -> Result<Handle, LifecycleError> {
        match self.state() {
            OwnershipState::Cleared => Err(LifecycleError::Released {
                handle: self.handle,
            }),
            OwnershipState::Owned | OwnershipState::Unowned => Ok(self.handle),
        }
    }

    /// The raw handle regardless of state. For diagnostics and logging only.
    #[inline]
    pub fn raw_handle(&self) -> Handle {
        self.handle
    }

    #[inline]
    pub fn state(&self) -> OwnershipState {
        OwnershipState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether this lifecycle was created owned (it may since have cleared).
    #[inline]
    pub fn was_owned(&self) -> bool {
        self.deleter.is_some()
    }

    #[inline]
    pub fn is_cleared(&self) -> bool {
        self.state() == OwnershipState::Cleared
    }

    /// Attach an auxiliary deletion action.
    ///
    /// The action runs after the primary deletion action, in attachment order.
    /// On an unowned or already-cleared lifecycle it is dropped without ever
    /// running. Returns whether the action was accepted.
    pub fn attach<D: HandleDeleter>(&self, action: D) -> bool {
        self.attach_boxed(Box::new(action))
    }

    pub fn attach_boxed(&self, action: BoxedDeleter) -> bool {
        let accepted = self.chain.push(action);
        tracing::trace!(handle = %self.handle, accepted, "auxiliary action attached");
        accepted
    }

    /// The auxiliary action chain.
    pub fn chain(&self) -> &DisposalChain {
        &self.chain
    }

    /// Number of auxiliary actions still pending.
    pub fn pending_auxiliary(&self) -> usize {
        self.chain.len()
    }

    /// Release the handle if this lifecycle still owns it.
    ///
    /// Idempotent and safe to race from any number of threads: the first call
    /// on an owned lifecycle runs the primary deletion action and then every
    /// auxiliary action. All other calls, and any call on an unowned
    /// lifecycle, do nothing. Returns whether this call performed the release.
    ///
    /// If the primary action panics the lifecycle stays `Cleared`, the chain
    /// stays sealed, and the auxiliary actions still run while unwinding.
    pub fn dispose(&self) -> bool {
        let claimed = self
            .state
            .compare_exchange(
                OwnershipState::Owned.as_u8(),
                OwnershipState::Cleared.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !claimed {
            return false;
        }

        // Sealed first: a panicking primary must still close the chain.
        let sealed = self.chain.seal(self.handle);
        if let Some(deleter) = &self.deleter {
            deleter.delete_handle(self.handle);
        }
        let auxiliary = sealed.run();
        tracing::trace!(handle = %self.handle, auxiliary, "handle released");
        true
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("handle", &self.handle)
            .field("state", &self.state())
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}
