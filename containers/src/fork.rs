use crate::Bytes32;
use sha2::{Digest, Sha256};
use std::fmt;

pub type Version = [u8; 4];

/// First four bytes of `sha256(version ++ genesis_validators_root)`.
///
/// Distinguishes networks that share a transport, so every gossip topic
/// carries one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ForkDigest(pub [u8; 4]);

impl ForkDigest {
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for ForkDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Root of the two-leaf tree `(version padded to 32 bytes, genesis_validators_root)`.
pub fn compute_fork_data_root(version: Version, genesis_validators_root: Bytes32) -> Bytes32 {
    let mut leaf = [0u8; 32];
    leaf[..4].copy_from_slice(&version);

    let mut hasher = Sha256::new();
    hasher.update(leaf);
    hasher.update(genesis_validators_root.as_bytes());
    let out: [u8; 32] = hasher.finalize().into();
    Bytes32::from(out)
}

pub fn compute_fork_digest(version: Version, genesis_validators_root: Bytes32) -> ForkDigest {
    let root = compute_fork_data_root(version, genesis_validators_root);
    let mut digest = [0u8; 4];
    digest.copy_from_slice(&root.as_bytes()[..4]);
    ForkDigest(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_prefix_of_fork_data_root() {
        let gvr = Bytes32::from([0x11; 32]);
        let root = compute_fork_data_root([0, 0, 0, 0], gvr);
        let digest = compute_fork_digest([0, 0, 0, 0], gvr);
        assert_eq!(&digest.0[..], &root.as_bytes()[..4]);
    }

    #[test]
    fn digest_changes_with_version() {
        let gvr = Bytes32::zero();
        assert_ne!(
            compute_fork_digest([0, 0, 0, 0], gvr),
            compute_fork_digest([1, 0, 0, 0], gvr)
        );
    }

    #[test]
    fn digest_displays_as_hex() {
        assert_eq!(ForkDigest([0xb5, 0x30, 0x3f, 0x2a]).to_string(), "b5303f2a");
    }
}
