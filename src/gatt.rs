//! Generic Attribute Profile server side ([Vol 3] Part G).

use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU16;

pub use {consts::*, io::*, notify::*, schema::*, server::*};

mod consts;
mod io;
mod notify;
mod schema;
mod server;

/// Attribute handle ([Vol 3] Part F, Section 3.2.2).
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Handle(NonZeroU16);

impl Handle {
    pub(crate) const MIN: Self = Self(
        // SAFETY: Non-zero
        unsafe { NonZeroU16::new_unchecked(0x0001) },
    );

    /// Wraps a raw handle. Returns `None` if the handle is invalid.
    #[inline]
    #[must_use]
    pub const fn new(h: u16) -> Option<Self> {
        match NonZeroU16::new(h) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the next handle or `None` if the maximum handle was reached.
    #[inline]
    pub(crate) const fn next(self) -> Option<Self> {
        Self::new(self.0.get().wrapping_add(1))
    }
}

impl Debug for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({:#06X})", self.0.get())
    }
}

impl Display for Handle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Handle> for u16 {
    #[inline]
    fn from(h: Handle) -> Self {
        h.0.get()
    }
}

/// GATT server operation reported in [`crate::Error::Gatt`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum GattOp {
    OpenServer,
    AddService,
    Notify,
    Respond,
    CreateBond,
    RemoveBond,
    ConfirmPairing,
}

impl Display for GattOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match *self {
            Self::OpenServer => "open server",
            Self::AddService => "add service",
            Self::Notify => "notify",
            Self::Respond => "respond",
            Self::CreateBond => "create bond",
            Self::RemoveBond => "remove bond",
            Self::ConfirmPairing => "confirm pairing",
        })
    }
}
