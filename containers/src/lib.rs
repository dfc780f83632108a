pub mod attestation;
pub mod block;
pub mod checkpoint;
pub mod exit;
pub mod fork;
pub mod slot;
pub mod status;
pub mod types;

pub use attestation::{AggregateAndProof, Attestation, AttestationData, SignedAggregateAndProof};
pub use block::{hash_tree_root, BeaconBlock, BlocksByRangeRequest, SignedBeaconBlock};
pub use checkpoint::Checkpoint;
pub use exit::{SignedVoluntaryExit, VoluntaryExit};
pub use fork::{compute_fork_digest, ForkDigest, Version};
pub use slot::{Epoch, Slot};
pub use status::Status;
pub use types::{Bytes20, Bytes32, Signature, ValidatorIndex};
pub use ssz;
