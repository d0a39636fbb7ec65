//! Opaque foreign handles.
//!
//! A [`Handle`] is the address of a resource living on the foreign side of the
//! call boundary. The core never dereferences it; the value is only compared,
//! hashed, rendered, and handed to a [`HandleDeleter`](crate::HandleDeleter).

use std::fmt;

/// Opaque pointer-width handle identifying a foreign resource.
///
/// Equality and hashing are by raw value.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[repr(transparent)]
pub struct Handle(usize);

impl Handle {
    /// The null handle (address 0).
    pub const NULL: Handle = Handle(0);

    /// Number of hex digits used when rendering a handle.
    const HEX_DIGITS: usize = std::mem::size_of::<usize>() * 2;

    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Handle(raw)
    }

    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Handle advanced by `bytes`, wrapping on overflow.
    ///
    /// Used by generated accessors walking arrays of foreign elements.
    #[inline]
    #[must_use]
    pub const fn offset(self, bytes: isize) -> Self {
        Handle(self.0.wrapping_add_signed(bytes))
    }
}

impl From<usize> for Handle {
    fn from(raw: usize) -> Self {
        Handle(raw)
    }
}

impl From<Handle> for usize {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({self})")
    }
}

/// Fixed-width, zero-padded `0x…` rendering.
impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:0width$X}", self.0, width = Self::HEX_DIGITS)
    }
}

impl fmt::LowerHex for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::UpperHex for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}
