//! Lifecycle management for foreign resources.
//!
//! Foreign resources are identified only by an opaque [`Handle`]. This crate
//! lets managed code wrap handles in typed objects while guaranteeing that
//! each handle is released at most once:
//!
//! - **[`Lifecycle`]** — the per-handle state machine
//!   (`Unowned` / `Owned` / `Cleared`) and the only place that decides whether
//!   a deletion action fires.
//! - **Disposal chain** — auxiliary deletion actions attached to a lifecycle,
//!   run in order after the primary one.
//! - **[`DeferredCollector`]** — releases owned wrappers that were dropped
//!   without an explicit dispose, on a background worker.
//! - **[`NativeObject`]** / **[`Native`]** — the base wrapper typed bindings
//!   embed, with diagnostic rendering.
//!
//! Identity tracking (one live wrapper per handle) lives in `tether_track`.
//!
//! # Disposal
//!
//! Owned wrappers pick a [`DisposalMethod`] at construction:
//!
//! - [`Collected`](DisposalMethod::Collected): released when the last
//!   reference to the wrapper is dropped, by the collector's worker.
//! - [`Manual`](DisposalMethod::Manual): released only by an explicit
//!   `dispose()`. Dropping an undisposed manual wrapper leaks the handle.
//!
//! Any mix of explicit and deferred disposal runs the deletion action exactly
//! once.

mod chain;
mod collector;
mod config;
mod deleter;
mod error;
mod handle;
mod lifecycle;
mod object;
mod state;

pub use chain::DisposalChain;
pub use collector::{DeferredCollector, Registration};
pub use config::{CollectorConfig, BACKGROUND_ENV, THREAD_NAME_ENV};
pub use deleter::{BoxedDeleter, HandleDeleter};
pub use error::LifecycleError;
pub use handle::Handle;
pub use lifecycle::Lifecycle;
pub use object::{Native, NativeDisplay, NativeObject, NativeObjectBuilder};
pub use state::{DisposalMethod, OwnershipState};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Only installs a subscriber when `RUST_LOG`
/// is set, e.g. `RUST_LOG=tether_core=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .try_init();
        }
    });
}
