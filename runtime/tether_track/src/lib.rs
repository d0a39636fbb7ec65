//! Identity tracking for foreign handles.
//!
//! An [`IdentityTracker`] guarantees that, within one ownership partition, at
//! most one live wrapper exists per handle. Code that turns raw pointers back
//! into objects ("the wrapper for the struct this field points at") goes
//! through a tracker so two requests for the same handle yield the same
//! instance instead of two wrappers racing to release it.
//!
//! ```text
//! let textures = IdentityTracker::owned(|h, owned| Texture::from_handle(h, owned));
//! let a = textures.get_or_create(handle);
//! let b = textures.get_or_create(handle);
//! assert!(Arc::ptr_eq(&a, &b));
//! ```
//!
//! Trackers are partitioned by [`Target`]: owned wrappers and unowned views of
//! the same handle live in separate trackers and are never unified.

mod error;
mod factory;
mod target;
mod tracker;

pub use error::TrackerError;
pub use factory::{NativeObjectFactory, NativeObjectProvider};
pub use target::Target;
pub use tracker::IdentityTracker;
