//! Component signatures: which component types an entity (or a system's
//! requirement) includes, as a fixed-width bitmask.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};

use crate::component::ComponentType;

/// Maximum number of component types one registry can hold.
pub const MAX_COMPONENTS: usize = 64;

/// Bit `i` is set iff the component type with ordinal `i` is included.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(u64);

impl Signature {
    /// No component types.
    pub const EMPTY: Signature = Signature(0);

    /// Build from raw bits.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// This signature with `ty` added.
    #[inline]
    #[must_use]
    pub fn with(self, ty: ComponentType) -> Self {
        Self(self.0 | ty.bit())
    }

    /// This signature with `ty` removed.
    #[inline]
    #[must_use]
    pub fn without(self, ty: ComponentType) -> Self {
        Self(self.0 & !ty.bit())
    }

    /// Add `ty` in place.
    #[inline]
    pub fn set(&mut self, ty: ComponentType) {
        self.0 |= ty.bit();
    }

    /// Remove `ty` in place.
    #[inline]
    pub fn reset(&mut self, ty: ComponentType) {
        self.0 &= !ty.bit();
    }

    /// Whether `ty` is included.
    #[inline]
    pub fn contains(self, ty: ComponentType) -> bool {
        self.0 & ty.bit() != 0
    }

    /// Whether every type in `required` is also in `self`, i.e.
    /// `self & required == required`.
    #[inline]
    pub fn contains_all(self, required: Signature) -> bool {
        self.0 & required.0 == required.0
    }

    /// Whether no component type is included.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of component types included.
    #[inline]
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

impl FromIterator<ComponentType> for Signature {
    fn from_iter<I: IntoIterator<Item = ComponentType>>(iter: I) -> Self {
        iter.into_iter().fold(Signature::EMPTY, Signature::with)
    }
}

impl BitOr for Signature {
    type Output = Signature;

    fn bitor(self, rhs: Signature) -> Signature {
        Signature(self.0 | rhs.0)
    }
}

impl BitAnd for Signature {
    type Output = Signature;

    fn bitand(self, rhs: Signature) -> Signature {
        Signature(self.0 & rhs.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({:#b})", self.0)
    }
}
