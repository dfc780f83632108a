use containers::Slot;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("target epoch is not ahead of the head epoch, nothing to search")]
    SlotTooHigh,
    #[error("no peers available")]
    NoPeersAvailable,
    #[error("slot {found} is outside the searched range [{lower}, {upper}]")]
    InvalidRange { found: Slot, lower: Slot, upper: Slot },
    #[error("{0} is not mapped to a gossip topic")]
    MessageNotMapped(&'static str),
    #[error("fork digest unavailable before genesis is known")]
    ForkDigestUnavailable,
    #[error("topic {0} still has active subscriptions")]
    TopicInUse(String),
    #[error("subnet {0} is out of range")]
    UnknownSubnet(u64),
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("encoding failed: {0}")]
    Encoding(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub type Result<T, E = NetworkError> = std::result::Result<T, E>;
