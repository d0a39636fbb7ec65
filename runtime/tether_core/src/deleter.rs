//! Deletion actions.

use crate::Handle;

/// Releases the foreign resource behind a handle.
///
/// Deletion is infallible from the core's point of view. A foreign side that
/// can fail must report through a channel the deleter manages itself.
///
/// Implemented for any `Fn(Handle) + Send + Sync`, so generated bindings can
/// pass their `extern` release function directly:
///
/// ```text
/// NativeObject::owned(handle, ffi::destroy_struct)
/// ```
pub trait HandleDeleter: Send + Sync + 'static {
    fn delete_handle(&self, handle: Handle);
}

impl<F> HandleDeleter for F
where
    F: Fn(Handle) + Send + Sync + 'static,
{
    #[inline]
    fn delete_handle(&self, handle: Handle) {
        self(handle);
    }
}

/// Boxed deletion action stored by a lifecycle.
pub type BoxedDeleter = Box<dyn HandleDeleter>;
