use crate::{Bytes32, Epoch, ForkDigest, Slot};
use serde::{Deserialize, Serialize};

/// Chain summary exchanged with every peer on connect.
///
/// Encoded as a fixed 84-byte SSZ container:
/// `fork_digest(4) | finalized_root(32) | finalized_epoch(8) | head_root(32) | head_slot(8)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Status {
    #[serde(skip)]
    pub fork_digest: ForkDigest,
    pub finalized_root: Bytes32,
    pub finalized_epoch: Epoch,
    pub head_root: Bytes32,
    pub head_slot: Slot,
}

impl Status {
    pub const SSZ_LEN: usize = 84;

    pub fn head_epoch(&self, slots_per_epoch: u64) -> Epoch {
        self.head_slot.epoch(slots_per_epoch)
    }

    pub fn to_ssz_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SSZ_LEN);
        out.extend_from_slice(&self.fork_digest.0);
        out.extend_from_slice(self.finalized_root.as_bytes());
        out.extend_from_slice(&self.finalized_epoch.0.to_le_bytes());
        out.extend_from_slice(self.head_root.as_bytes());
        out.extend_from_slice(&self.head_slot.0.to_le_bytes());
        out
    }

    pub fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != Self::SSZ_LEN {
            return Err(format!(
                "status must be {} bytes, got {}",
                Self::SSZ_LEN,
                bytes.len()
            ));
        }

        let mut digest = [0u8; 4];
        digest.copy_from_slice(&bytes[0..4]);
        let mut finalized_root = [0u8; 32];
        finalized_root.copy_from_slice(&bytes[4..36]);
        let mut finalized_epoch = [0u8; 8];
        finalized_epoch.copy_from_slice(&bytes[36..44]);
        let mut head_root = [0u8; 32];
        head_root.copy_from_slice(&bytes[44..76]);
        let mut head_slot = [0u8; 8];
        head_slot.copy_from_slice(&bytes[76..84]);

        Ok(Self {
            fork_digest: ForkDigest(digest),
            finalized_root: Bytes32::from(finalized_root),
            finalized_epoch: Epoch(u64::from_le_bytes(finalized_epoch)),
            head_root: Bytes32::from(head_root),
            head_slot: Slot(u64::from_le_bytes(head_slot)),
        })
    }
}
