use crate::{Bytes32, Epoch};
use serde::{Deserialize, Serialize};
use ssz_derive::Ssz;

/// Represents a checkpoint in the chain's history.
///
/// A checkpoint pairs an epoch with the root of the block at its first
/// slot. The local finalized checkpoint bounds how far back a sync search
/// starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Ssz, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The epoch of the checkpoint.
    pub epoch: Epoch,
    /// The root hash of the checkpoint's block.
    pub root: Bytes32,
}

impl Checkpoint {
    pub fn new(epoch: Epoch, root: Bytes32) -> Self {
        Self { epoch, root }
    }
}
