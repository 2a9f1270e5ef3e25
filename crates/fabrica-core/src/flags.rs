//! Fixed-width flag sets with named bit constants and bulk operations.
//!
//! All derived flag state in the workspace (milestone masks, per-row
//! warnings, per-link match state) uses the same u64/u32 bitset pattern so
//! that OR/AND/popcount work uniformly across them.

use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr, BitOrAssign};

// ---------------------------------------------------------------------------
// MilestoneMask
// ---------------------------------------------------------------------------

/// Which milestones gate an object's availability.
///
/// Bit 0 is reserved: set once the object is accessible at all, independent
/// of milestones. Bits 1..=63 correspond to entries of the user-selected
/// milestone list, so at most [`MilestoneMask::MAX_MILESTONES`] milestones
/// are supported. The all-bits-set sentinel [`MilestoneMask::UNREACHABLE`]
/// marks objects whose mask is unknown because they are not accessible;
/// callers must check accessibility before trusting a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MilestoneMask(pub u64);

impl MilestoneMask {
    pub const EMPTY: Self = Self(0);
    /// Bit 0: accessible independent of milestones.
    pub const ACCESSIBLE: Self = Self(1);
    /// Sentinel for objects that are not accessible.
    pub const UNREACHABLE: Self = Self(u64::MAX);
    /// Bits 1..=63 are milestone bits.
    pub const MAX_MILESTONES: usize = 63;

    /// The bit for the milestone at `index` in the milestone list (0-based).
    #[inline]
    pub fn milestone_bit(index: usize) -> Self {
        debug_assert!(index < Self::MAX_MILESTONES);
        Self(1u64 << (index + 1))
    }

    #[inline]
    pub fn is_unreachable(self) -> bool {
        self == Self::UNREACHABLE
    }

    /// True if every bit of `other` is set in `self`.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Number of set bits, O(1).
    #[inline]
    pub fn popcount(self) -> u32 {
        self.0.count_ones()
    }

    /// Position of the highest set bit, O(1). None for an empty mask.
    #[inline]
    pub fn highest_bit(self) -> Option<u32> {
        if self.0 == 0 {
            None
        } else {
            Some(63 - self.0.leading_zeros())
        }
    }
}

impl BitOr for MilestoneMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MilestoneMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for MilestoneMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

// ---------------------------------------------------------------------------
// RowWarnings
// ---------------------------------------------------------------------------

/// Derived warning state of a recipe row. Recomputed by the flow resolver;
/// never an error, the model stays editable with warnings present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowWarnings(pub u32);

impl RowWarnings {
    pub const EMPTY: Self = Self(0);
    /// Part of a cycle of links with no externally anchored amount.
    pub const DEADLOCK_CANDIDATE: Self = Self(1 << 0);
    /// An exact match needs a negative multiplier; switching the link to
    /// overproduction would make the system feasible.
    pub const OVERPRODUCTION_REQUIRED: Self = Self(1 << 1);
    /// The row has a crafting recipe but no entity selected.
    pub const ENTITY_NOT_SPECIFIED: Self = Self(1 << 2);
    /// The entity burns fuel but no fuel is selected.
    pub const FUEL_NOT_SPECIFIED: Self = Self(1 << 3);
    /// A fluid ingredient's temperature band excludes the linked producer.
    pub const TEMPERATURE_MISMATCH: Self = Self(1 << 4);
    /// Resolved building requirement exceeds the user-declared built count.
    pub const EXCEEDS_BUILT_COUNT: Self = Self(1 << 5);
    /// Conflicting fixed amounts pinned this row to an impossible value.
    pub const FIXED_AMOUNT_CONFLICT: Self = Self(1 << 6);
    /// The numeric optimizer failed or timed out; the retained multiplier
    /// is best-effort, not exact.
    pub const SOLUTION_INACCURATE: Self = Self(1 << 7);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for RowWarnings {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RowWarnings {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// LinkFlags
// ---------------------------------------------------------------------------

/// Derived state of a production link after flow resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkFlags(pub u32);

impl LinkFlags {
    pub const EMPTY: Self = Self(0);
    pub const HAS_PRODUCTION: Self = Self(1 << 0);
    pub const HAS_CONSUMPTION: Self = Self(1 << 1);
    pub const HAS_PRODUCTION_AND_CONSUMPTION: Self = Self(1 << 2);
    /// Sum of captured flows differs from the requested amount.
    pub const LINK_NOT_MATCHED: Self = Self(1 << 3);
    /// Unmatched, and the mismatch involves an unmatched nested table.
    pub const LINK_RECURSIVE_NOT_MATCHED: Self = Self(1 << 4);
    /// A captured row owns a nested table with an unmatched link.
    pub const CHILD_NOT_MATCHED: Self = Self(1 << 5);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for LinkFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for LinkFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
