//! Tracker errors.
//!
//! Both variants mean a caller or generated binding is wrong; neither is
//! transient.

use tether_core::{Handle, OwnershipState};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// The object's ownership does not match the tracker's partition.
    #[error("cannot track {handle}: object is {actual}, tracker only holds {expected} objects")]
    OwnershipMismatch {
        handle: Handle,
        expected: OwnershipState,
        actual: OwnershipState,
    },

    /// A live object is already tracked for this handle.
    #[error("another live object is already tracked for handle {handle}")]
    AlreadyTracked { handle: Handle },
}
