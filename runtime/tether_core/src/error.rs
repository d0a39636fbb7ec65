//! Lifecycle errors.

use crate::Handle;

/// Errors raised by [`Lifecycle`](crate::Lifecycle) and
/// [`NativeObject`](crate::NativeObject) construction and access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// An owned lifecycle was requested without a deletion action.
    #[error("owned handle {handle} requires a deletion action")]
    MissingDeleter { handle: Handle },

    /// The handle was accessed after its deletion action ran.
    #[error("handle {handle} has already been released")]
    Released { handle: Handle },
}

impl LifecycleError {
    /// The handle the failing operation was about.
    pub fn handle(&self) -> Handle {
        match self {
            LifecycleError::MissingDeleter { handle } | LifecycleError::Released { handle } => {
                *handle
            }
        }
    }
}
