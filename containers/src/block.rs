use crate::{Bytes32, Signature, Slot, ValidatorIndex};
use serde::{Deserialize, Serialize};
use ssz_derive::Ssz;

/// Block as seen by the networking layer. The body is committed to by root only.
#[derive(Clone, Debug, PartialEq, Eq, Ssz, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconBlock {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: Bytes32,
    pub state_root: Bytes32,
    pub body_root: Bytes32,
}

#[derive(Clone, Debug, PartialEq, Eq, Ssz, Default, Serialize, Deserialize)]
pub struct SignedBeaconBlock {
    pub message: BeaconBlock,
    pub signature: Signature,
}

impl SignedBeaconBlock {
    pub fn slot(&self) -> Slot {
        self.message.slot
    }

    pub fn block_root(&self) -> Bytes32 {
        hash_tree_root(&self.message)
    }
}

/// Request for blocks at `start_slot, start_slot + step, ...` (`count` entries).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Ssz, Default, Serialize, Deserialize)]
pub struct BlocksByRangeRequest {
    pub start_slot: Slot,
    pub count: u64,
    pub step: u64,
}

impl BlocksByRangeRequest {
    pub fn new(start_slot: Slot, count: u64, step: u64) -> Self {
        Self {
            start_slot,
            count,
            step,
        }
    }

    /// Slot of the last block covered by the request, saturating.
    pub fn last_slot(&self) -> Slot {
        let span = self.count.saturating_sub(1).saturating_mul(self.step);
        Slot(self.start_slot.0.saturating_add(span))
    }
}

/// Compute the SSZ hash tree root for any type implementing `SszHash`.
pub fn hash_tree_root<T: ssz::SszHash>(value: &T) -> Bytes32 {
    let h = value.hash_tree_root();
    Bytes32(h)
}
