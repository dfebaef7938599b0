//! `HandleSignalsState`: the {satisfied, satisfiable} bitmask pair every
//! dispatcher reports, and the signal alphabet itself.

use std::ops::{BitOr, BitOrAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals(u32);

impl Signals {
    pub const NONE: Signals = Signals(0);
    pub const READABLE: Signals = Signals(1 << 0);
    pub const WRITABLE: Signals = Signals(1 << 1);
    pub const PEER_CLOSED: Signals = Signals(1 << 2);
    pub const READ_THRESHOLD: Signals = Signals(1 << 3);
    pub const WRITE_THRESHOLD: Signals = Signals(1 << 4);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u32) -> Signals {
        Signals(bits & 0b11111)
    }

    pub fn contains(self, other: Signals) -> bool {
        self.0 & other.0 == other.0
    }

    /// Non-empty intersection, the test the whole model is built on:
    /// `satisfies`/`can_satisfy` are both "does this mask share any bit".
    pub fn intersects(self, other: Signals) -> bool {
        self.0 & other.0 != 0
    }

    pub fn remove(&mut self, other: Signals) {
        self.0 &= !other.0;
    }
}

impl BitOr for Signals {
    type Output = Signals;
    fn bitor(self, rhs: Signals) -> Signals {
        Signals(self.0 | rhs.0)
    }
}

impl BitOrAssign for Signals {
    fn bitor_assign(&mut self, rhs: Signals) {
        self.0 |= rhs.0;
    }
}

/// Snapshot of a resource's current signal state.
///
/// Invariant upheld by every constructor and mutator in this crate:
/// `satisfied ⊆ satisfiable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleSignalsState {
    pub satisfied: Signals,
    pub satisfiable: Signals,
}

impl HandleSignalsState {
    pub fn new(satisfied: Signals, satisfiable: Signals) -> HandleSignalsState {
        debug_assert_eq!(satisfied.0 & !satisfiable.0, 0, "satisfied must be a subset of satisfiable");
        HandleSignalsState { satisfied, satisfiable }
    }

    /// Does `mask` intersect the satisfied set?
    pub fn satisfies(self, mask: Signals) -> bool {
        self.satisfied.intersects(mask)
    }

    /// Could `mask` ever become satisfied from here on?
    pub fn can_satisfy(self, mask: Signals) -> bool {
        self.satisfiable.intersects(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfied_is_subset_of_satisfiable() {
        let s = HandleSignalsState::new(Signals::READABLE, Signals::READABLE | Signals::WRITABLE);
        assert!(s.satisfies(Signals::READABLE));
        assert!(!s.satisfies(Signals::WRITABLE));
        assert!(s.can_satisfy(Signals::WRITABLE));
    }

    #[test]
    #[should_panic]
    fn debug_asserts_on_invariant_violation() {
        HandleSignalsState::new(Signals::WRITABLE, Signals::READABLE);
    }
}
