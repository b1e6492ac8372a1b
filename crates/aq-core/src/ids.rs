use core::fmt;
use core::num::NonZeroU32;

/// Compact, stable identifier for an element slot in the network store.
///
/// - `u32` keeps memory small
/// - `NonZero` enables `Option<Idx>` to be pointer-optimized
///
/// Internally the store is 0-based; the public API is 1-based with 0 as the
/// "none" sentinel, so `position()` / `from_position()` convert exactly once
/// at the facade boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Idx(NonZeroU32);

impl Idx {
    /// Create an Idx from a 0-based index by storing index+1.
    pub fn from_index(index: usize) -> Self {
        Self(NonZeroU32::new(index as u32 + 1).expect("index+1 is nonzero"))
    }

    /// Recover the 0-based index.
    pub fn index(self) -> usize {
        self.0.get() as usize - 1
    }

    /// The 1-based position used by the public API.
    pub fn position(self) -> usize {
        self.0.get() as usize
    }

    /// Convert a 1-based API position; 0 and negative values are None.
    pub fn from_position(position: i64) -> Option<Self> {
        if position < 1 || position > u32::MAX as i64 {
            return None;
        }
        Some(Self(NonZeroU32::new(position as u32).expect("position is nonzero")))
    }
}

impl fmt::Debug for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Idx({})", self.position())
    }
}

impl fmt::Display for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.position())
    }
}

/// Domain-specific aliases for clarity (no runtime cost).
pub type NodeIdx = Idx;
pub type LinkIdx = Idx;
pub type PatternIdx = Idx;
pub type CurveIdx = Idx;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idx_round_trip_index() {
        for i in [0_usize, 1, 2, 42, 10_000] {
            let id = Idx::from_index(i);
            assert_eq!(id.index(), i);
            assert_eq!(id.position(), i + 1);
        }
    }

    #[test]
    fn position_zero_is_none() {
        assert!(Idx::from_position(0).is_none());
        assert!(Idx::from_position(-3).is_none());
        assert_eq!(Idx::from_position(1).unwrap().index(), 0);
    }

    #[test]
    fn option_idx_is_small() {
        assert_eq!(
            core::mem::size_of::<Idx>(),
            core::mem::size_of::<Option<Idx>>()
        );
    }
}
