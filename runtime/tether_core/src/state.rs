//! Ownership states and disposal methods.

use std::fmt;

/// Who is responsible for releasing a handle.
///
/// `Unowned` never changes. `Owned` moves to `Cleared` exactly once, when the
/// deletion action runs. No other transition exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OwnershipState {
    /// Non-owning view. No deletion action exists or will ever run.
    Unowned = 0,

    /// Responsible for releasing the handle. One deletion action is pending.
    Owned = 1,

    /// Terminal. The deletion action has run; the handle is kept for
    /// diagnostics only.
    Cleared = 2,
}

impl OwnershipState {
    #[inline]
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => OwnershipState::Unowned,
            1 => OwnershipState::Owned,
            _ => OwnershipState::Cleared,
        }
    }

    #[inline]
    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OwnershipState::Unowned => "Unowned",
            OwnershipState::Owned => "Owned",
            OwnershipState::Cleared => "Cleared",
        }
    }
}

impl fmt::Display for OwnershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an owned wrapper's deletion action gets triggered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DisposalMethod {
    /// Released by the [`DeferredCollector`](crate::DeferredCollector) once the
    /// wrapper becomes unreachable, or earlier by an explicit dispose.
    #[default]
    Collected,

    /// Released only by an explicit dispose. A wrapper dropped without one
    /// leaks its handle.
    Manual,
}

impl fmt::Display for DisposalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisposalMethod::Collected => write!(f, "collected"),
            DisposalMethod::Manual => write!(f, "manual"),
        }
    }
}
