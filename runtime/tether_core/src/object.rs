//! Base wrapper for foreign objects.
//!
//! Typed wrappers embed a [`NativeObject`] and implement [`Native`]:
//!
//! ```text
//! pub struct Texture {
//!     native: NativeObject,
//! }
//!
//! impl Texture {
//!     pub fn new() -> Self {
//!         Texture { native: NativeObject::owned(ffi::texture_create(), ffi::texture_destroy) }
//!     }
//!
//!     fn from_handle(handle: Handle, owned: bool) -> Result<Self, LifecycleError> {
//!         let native = NativeObject::builder(handle)
//!             .owned(owned)
//!             .deleter(ffi::texture_destroy)
//!             .build()?;
//!         Ok(Texture { native })
//!     }
//!
//!     pub fn width(&self) -> Result<u32, LifecycleError> {
//!         Ok(ffi::texture_width(self.native.handle()?))
//!     }
//! }
//!
//! impl Native for Texture {
//!     fn native(&self) -> &NativeObject {
//!         &self.native
//!     }
//! }
//! ```
//!
//! Dropping the last reference to a wrapper is what the rest of the system
//! treats as "unreachable": a [`Collected`](DisposalMethod::Collected) owned
//! wrapper hands its lifecycle to the [`DeferredCollector`], and any drop
//! watchers (identity trackers) are told the handle's entry is stale.

use std::fmt;
use std::sync::Arc;

use crossbeam::channel::Sender;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::collector::Registration;
use crate::deleter::{BoxedDeleter, HandleDeleter};
use crate::{DeferredCollector, DisposalMethod, Handle, Lifecycle, LifecycleError, OwnershipState};

/// Managed-side view of one foreign handle.
pub struct NativeObject {
    lifecycle: Arc<Lifecycle>,
    method: DisposalMethod,
    /// Present iff owned and collected.
    registration: Option<Registration>,
    /// Channels told this object's handle when it is dropped.
    watchers: Mutex<SmallVec<[Sender<Handle>; 1]>>,
}

impl NativeObject {
    /// Owned object released by the global collector or an explicit dispose.
    pub fn owned<D: HandleDeleter>(handle: Handle, deleter: D) -> Self {
        let lifecycle = Arc::new(Lifecycle::owned(handle, Box::new(deleter)));
        Self::assemble(lifecycle, DisposalMethod::Collected, None)
    }

    /// Non-owning view over `handle`.
    pub fn unowned(handle: Handle) -> Self {
        Self::assemble(
            Arc::new(Lifecycle::unowned(handle)),
            DisposalMethod::Collected,
            None,
        )
    }

    /// Object whose ownership is only known at runtime, with the deleter to
    /// use if it turns out owned. This is the usual factory constructor.
    pub fn with_deleter<D: HandleDeleter>(handle: Handle, owned: bool, deleter: D) -> Self {
        let lifecycle = if owned {
            Lifecycle::owned(handle, Box::new(deleter))
        } else {
            Lifecycle::unowned(handle)
        };
        Self::assemble(Arc::new(lifecycle), DisposalMethod::Collected, None)
    }

    /// Like [`with_deleter`](Self::with_deleter) with an optional deleter.
    /// Fails if `owned` is set without one.
    pub fn new(
        handle: Handle,
        owned: bool,
        deleter: Option<BoxedDeleter>,
    ) -> Result<Self, LifecycleError> {
        let lifecycle = Arc::new(Lifecycle::create(handle, owned, deleter)?);
        Ok(Self::assemble(lifecycle, DisposalMethod::Collected, None))
    }

    pub fn builder(handle: Handle) -> NativeObjectBuilder {
        NativeObjectBuilder::new(handle)
    }

    fn assemble(
        lifecycle: Arc<Lifecycle>,
        method: DisposalMethod,
        collector: Option<&DeferredCollector>,
    ) -> Self {
        let registration = (lifecycle.was_owned() && method == DisposalMethod::Collected)
            .then(|| collector.unwrap_or_else(|| DeferredCollector::global()).register(&lifecycle));
        NativeObject {
            lifecycle,
            method,
            registration,
            watchers: Mutex::new(SmallVec::new()),
        }
    }

    /// The live handle, or [`LifecycleError::Released`] after disposal.
    #[inline]
    pub fn handle(&self) -> Result<Handle, LifecycleError> {
        self.lifecycle.handle()
    }

    /// The handle value regardless of state. Diagnostics only.
    #[inline]
    pub fn raw_handle(&self) -> Handle {
        self.lifecycle.raw_handle()
    }

    #[inline]
    pub fn state(&self) -> OwnershipState {
        self.lifecycle.state()
    }

    /// Whether this object currently owns its handle.
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.state() == OwnershipState::Owned
    }

    #[inline]
    pub fn disposal_method(&self) -> DisposalMethod {
        self.method
    }

    /// Whether the deferred collector will release this object.
    #[inline]
    pub fn is_collected(&self) -> bool {
        self.registration.is_some()
    }

    /// The shared lifecycle record.
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Attach an auxiliary deletion action to this handle's lifetime.
    ///
    /// See [`Lifecycle::attach`].
    pub fn attach<D: HandleDeleter>(&self, action: D) -> bool {
        self.lifecycle.attach(action)
    }

    /// Release the handle now. Idempotent; see [`Lifecycle::dispose`].
    pub fn dispose(&self) -> bool {
        self.lifecycle.dispose()
    }

    /// Send this object's handle on `watcher` when the object is dropped.
    ///
    /// Identity trackers use this as their eviction queue.
    pub fn notify_on_drop(&self, watcher: Sender<Handle>) {
        self.watchers.lock().push(watcher);
    }
}

impl Drop for NativeObject {
    fn drop(&mut self) {
        let handle = self.lifecycle.raw_handle();
        for watcher in self.watchers.get_mut().drain(..) {
            // A closed channel means the tracker is gone already.
            let _ = watcher.send(handle);
        }

        if self.method == DisposalMethod::Manual && self.lifecycle.state() == OwnershipState::Owned {
            tracing::debug!(%handle, "manual object dropped without dispose, handle leaked");
        }
        // `registration` drops after this, queueing collected objects.
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObject")
            .field("handle", &self.lifecycle.raw_handle())
            .field("state", &self.lifecycle.state())
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&NativeDisplay(self), f)
    }
}

/// Builder for [`NativeObject`] when ownership, disposal method or collector
/// need choosing.
#[must_use]
pub struct NativeObjectBuilder {
    handle: Handle,
    owned: bool,
    deleter: Option<BoxedDeleter>,
    method: DisposalMethod,
    collector: Option<DeferredCollector>,
}

impl NativeObjectBuilder {
    fn new(handle: Handle) -> Self {
        NativeObjectBuilder {
            handle,
            owned: false,
            deleter: None,
            method: DisposalMethod::default(),
            collector: None,
        }
    }

    pub fn owned(mut self, owned: bool) -> Self {
        self.owned = owned;
        self
    }

    pub fn deleter<D: HandleDeleter>(mut self, deleter: D) -> Self {
        self.deleter = Some(Box::new(deleter));
        self
    }

    pub fn disposal(mut self, method: DisposalMethod) -> Self {
        self.method = method;
        self
    }

    /// Collector to register with instead of [`DeferredCollector::global`].
    pub fn collector(mut self, collector: &DeferredCollector) -> Self {
        self.collector = Some(collector.clone());
        self
    }

    /// Build the object. Fails if owned without a deleter.
    pub fn build(self) -> Result<NativeObject, LifecycleError> {
        let lifecycle = Arc::new(Lifecycle::create(self.handle, self.owned, self.deleter)?);
        Ok(NativeObject::assemble(
            lifecycle,
            self.method,
            self.collector.as_ref(),
        ))
    }
}

/// A typed wrapper over a foreign handle.
pub trait Native {
    fn native(&self) -> &NativeObject;

    #[inline]
    fn handle(&self) -> Result<Handle, LifecycleError> {
        self.native().handle()
    }

    #[inline]
    fn raw_handle(&self) -> Handle {
        self.native().raw_handle()
    }

    #[inline]
    fn state(&self) -> OwnershipState {
        self.native().state()
    }

    fn dispose(&self) -> bool {
        self.native().dispose()
    }

    /// Diagnostic rendering: `TypeName[0x…, State]`.
    fn display(&self) -> NativeDisplay<'_, Self>
    where
        Self: Sized,
    {
        NativeDisplay(self)
    }
}

impl Native for NativeObject {
    #[inline]
    fn native(&self) -> &NativeObject {
        self
    }
}

/// Renders a wrapper as its short type name, fixed-width handle and state.
///
/// For logs and debuggers; not meant to be parsed.
pub struct NativeDisplay<'a, T: ?Sized>(&'a T);

impl<T: Native + ?Sized> fmt::Display for NativeDisplay<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let native = self.0.native();
        write!(
            f,
            "{}[{}, {}]",
            short_type_name(std::any::type_name::<T>()),
            native.raw_handle(),
            native.state()
        )
    }
}

/// Strip the module path from a type name, leaving generic arguments alone.
fn short_type_name(full: &str) -> &str {
    let base_end = full.find('<').unwrap_or(full.len());
    let start = full[..base_end].rfind("::").map_or(0, |i| i + 2);
    &full[start..]
}
