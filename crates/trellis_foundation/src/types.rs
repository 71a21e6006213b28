//! Type descriptors for values.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type descriptor for a [`crate::Value`].
///
/// Every type has a stable numeric [`tag`](Type::tag) that participates in
/// join-key hashing, so values of different types that happen to share a
/// payload hash never land in the same bucket by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Type {
    /// The nil type (absent slot).
    Nil,
    /// Boolean type.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// Text.
    String,
    /// Symbol (an identifier-like atom).
    Symbol,
    /// Ordered sequence of values (a multi-valued slot).
    Seq,
}

impl Type {
    /// Returns the stable numeric tag for this type.
    #[must_use]
    pub const fn tag(self) -> u64 {
        match self {
            Self::Nil => 0,
            Self::Bool => 1,
            Self::Int => 2,
            Self::Float => 3,
            Self::String => 4,
            Self::Symbol => 5,
            Self::Seq => 6,
        }
    }

    /// Returns true if values of this type are numbers.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nil => "nil",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::Seq => "seq",
        };
        write!(f, "{name}")
    }
}
