//! Factory and provider seams.

use std::sync::Arc;

use tether_core::Handle;

/// Builds a wrapper for a handle with the given ownership.
///
/// Must not touch the foreign side beyond what constructing the managed
/// object needs, and must not call back into the tracker that owns it (such
/// a call panics). Other trackers are fine.
/// Implemented for any `Fn(Handle, bool) -> T + Send + Sync`.
pub trait NativeObjectFactory<T>: Send + Sync {
    fn create_instance(&self, handle: Handle, owned: bool) -> T;
}

impl<T, F> NativeObjectFactory<T> for F
where
    F: Fn(Handle, bool) -> T + Send + Sync,
{
    #[inline]
    fn create_instance(&self, handle: Handle, owned: bool) -> T {
        self(handle, owned)
    }
}

/// Hands out the wrapper for a handle.
///
/// Code that only needs "the object behind this pointer" depends on this
/// rather than on a concrete tracker.
pub trait NativeObjectProvider<T> {
    fn provide(&self, handle: Handle) -> Arc<T>;
}
