use serde::{Deserialize, Serialize};
use ssz_derive::Ssz;
use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Ssz, Default, Serialize, Deserialize)]
pub struct Slot(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Ssz, Default, Serialize, Deserialize)]
pub struct Epoch(pub u64);

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Epoch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Epoch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Slot {
    /// Epoch containing this slot.
    ///
    /// # Panics
    ///
    /// Panics if `slots_per_epoch` is zero.
    pub fn epoch(self, slots_per_epoch: u64) -> Epoch {
        Epoch(self.0 / slots_per_epoch)
    }

    /// Floors the slot to the first slot of its epoch.
    pub fn epoch_start(self, slots_per_epoch: u64) -> Slot {
        self.epoch(slots_per_epoch).start_slot(slots_per_epoch)
    }
}

impl Epoch {
    /// First slot of the epoch, saturating at `u64::MAX`.
    pub fn start_slot(self, slots_per_epoch: u64) -> Slot {
        Slot(self.0.saturating_mul(slots_per_epoch))
    }

    /// Last slot of the epoch (inclusive).
    pub fn end_slot(self, slots_per_epoch: u64) -> Slot {
        Slot(self.next().start_slot(slots_per_epoch).0.saturating_sub(1))
    }

    pub fn next(self) -> Epoch {
        Epoch(self.0.saturating_add(1))
    }
}
