//! Tracker partitions.

use std::fmt;

use tether_core::OwnershipState;

/// Which objects a tracker holds.
///
/// A handle may have one live owned wrapper and, separately, live unowned
/// views. Keeping the partitions in different trackers means a view can never
/// be handed out where the owner is expected, or the reverse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// Only objects that own their handle.
    OwnedObjects,
    /// Only non-owning views.
    UnownedObjects,
}

impl Target {
    /// The `owned` flag passed to the factory.
    #[inline]
    pub const fn owned(self) -> bool {
        matches!(self, Target::OwnedObjects)
    }

    /// The state a registered object must be in.
    #[inline]
    pub const fn owning_state(self) -> OwnershipState {
        match self {
            Target::OwnedObjects => OwnershipState::Owned,
            Target::UnownedObjects => OwnershipState::Unowned,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::OwnedObjects => write!(f, "owned objects"),
            Target::UnownedObjects => write!(f, "unowned objects"),
        }
    }
}
