/// Gossipsub Topics
///
/// Topic definitions for the beacon gossip network.
///
/// ## Topic Format
///
/// ```text
/// /{prefix}/{fork_digest}/{topic_name}/{encoding}
///
/// Example: /eth2/b5303f2a/beacon_block/ssz_snappy
/// ```
///
/// | Component      | Description                                      |
/// |----------------|--------------------------------------------------|
/// | prefix         | Network identifier (`eth2`)                      |
/// | fork_digest    | 4-byte fork identifier as lowercase hex          |
/// | topic_name     | Message type (`beacon_block`, ...)               |
/// | encoding       | Serialization format (always `ssz_snappy`)       |
///
/// The fork digest ensures peers on different forks never exchange
/// incompatible messages. It is recomputed for every broadcast, so a fork
/// transition moves publishing to the new topics immediately.
///
/// ## Topic Types
///
/// | Topic                          | Content                             |
/// |--------------------------------|-------------------------------------|
/// | beacon_block                   | Signed beacon blocks                |
/// | beacon_aggregate_and_proof     | Signed aggregates                   |
/// | voluntary_exit                 | Signed voluntary exits              |
/// | beacon_attestation_{subnet}    | Unaggregated attestations           |
use containers::ForkDigest;
use libp2p::gossipsub::{IdentTopic, TopicHash};

use crate::types::SubnetId;

pub const TOPIC_PREFIX: &str = "eth2";

pub const SSZ_SNAPPY_ENCODING_POSTFIX: &str = "ssz_snappy";

pub const BEACON_BLOCK_TOPIC: &str = "beacon_block";

pub const BEACON_AGGREGATE_AND_PROOF_TOPIC: &str = "beacon_aggregate_and_proof";

pub const VOLUNTARY_EXIT_TOPIC: &str = "voluntary_exit";

/// Prefix of the per-subnet attestation topic name; the subnet id follows.
pub const BEACON_ATTESTATION_PREFIX: &str = "beacon_attestation_";

#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq)]
pub enum GossipKind {
    BeaconBlock,
    BeaconAggregateAndProof,
    VoluntaryExit,
    Attestation(SubnetId),
}

impl std::fmt::Display for GossipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GossipKind::BeaconBlock => write!(f, "{BEACON_BLOCK_TOPIC}"),
            GossipKind::BeaconAggregateAndProof => write!(f, "{BEACON_AGGREGATE_AND_PROOF_TOPIC}"),
            GossipKind::VoluntaryExit => write!(f, "{VOLUNTARY_EXIT_TOPIC}"),
            GossipKind::Attestation(subnet) => write!(f, "{BEACON_ATTESTATION_PREFIX}{subnet}"),
        }
    }
}

impl GossipKind {
    fn from_name(name: &str) -> Result<Self, String> {
        match name {
            BEACON_BLOCK_TOPIC => Ok(GossipKind::BeaconBlock),
            BEACON_AGGREGATE_AND_PROOF_TOPIC => Ok(GossipKind::BeaconAggregateAndProof),
            VOLUNTARY_EXIT_TOPIC => Ok(GossipKind::VoluntaryExit),
            other => {
                let subnet = other
                    .strip_prefix(BEACON_ATTESTATION_PREFIX)
                    .ok_or_else(|| format!("Unknown topic: '{other}'"))?;
                subnet
                    .parse::<SubnetId>()
                    .map(GossipKind::Attestation)
                    .map_err(|_| format!("Invalid attestation subnet: '{subnet}'"))
            }
        }
    }
}

/// A fully-qualified gossipsub topic.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct GossipTopic {
    pub fork_digest: ForkDigest,
    pub kind: GossipKind,
}

impl GossipTopic {
    pub fn new(fork_digest: ForkDigest, kind: GossipKind) -> Self {
        Self { fork_digest, kind }
    }

    pub fn attestation(fork_digest: ForkDigest, subnet: SubnetId) -> Self {
        Self::new(fork_digest, GossipKind::Attestation(subnet))
    }

    /// Topic string without the encoding postfix, e.g. `/eth2/b5303f2a/beacon_block`.
    pub fn base(&self) -> String {
        format!("/{}/{}/{}", TOPIC_PREFIX, self.fork_digest, self.kind)
    }

    /// Topic string with an encoding's protocol suffix appended.
    pub fn with_suffix(&self, suffix: &str) -> String {
        format!("{}{}", self.base(), suffix)
    }

    /// Parse a full topic string into a GossipTopic.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix, fork digest, topic name or encoding is malformed.
    pub fn from_string(topic_str: &str) -> Result<Self, String> {
        let parts: Vec<&str> = topic_str.trim_start_matches('/').split('/').collect();

        if parts.len() != 4 {
            return Err(format!(
                "Invalid topic format: expected 4 parts, got {}",
                parts.len()
            ));
        }

        if parts[0] != TOPIC_PREFIX {
            return Err(format!(
                "Invalid prefix: expected '{TOPIC_PREFIX}', got '{}'",
                parts[0]
            ));
        }

        if parts[3] != SSZ_SNAPPY_ENCODING_POSTFIX {
            return Err(format!(
                "Invalid encoding: expected '{SSZ_SNAPPY_ENCODING_POSTFIX}', got '{}'",
                parts[3]
            ));
        }

        let fork_digest = parse_fork_digest(parts[1])?;
        let kind = GossipKind::from_name(parts[2])?;

        Ok(Self::new(fork_digest, kind))
    }

    pub fn decode(topic: &TopicHash) -> Result<Self, String> {
        Self::from_string(topic.as_str())
    }
}

impl std::fmt::Display for GossipTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base(), SSZ_SNAPPY_ENCODING_POSTFIX)
    }
}

impl From<GossipTopic> for IdentTopic {
    fn from(topic: GossipTopic) -> IdentTopic {
        IdentTopic::new(topic.to_string())
    }
}

impl From<GossipTopic> for TopicHash {
    fn from(val: GossipTopic) -> Self {
        TopicHash::from_raw(val.to_string())
    }
}

fn parse_fork_digest(value: &str) -> Result<ForkDigest, String> {
    let value = value.trim_start_matches("0x");
    if value.len() != 8 || !value.is_ascii() {
        return Err(format!("Invalid fork digest: '{value}'"));
    }

    let mut digest = [0u8; 4];
    for (i, byte) in digest.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&value[i * 2..i * 2 + 2], 16)
            .map_err(|_| format!("Invalid fork digest: '{value}'"))?;
    }
    Ok(ForkDigest(digest))
}

/// Topics every node subscribes to for a fork, excluding attestation subnets.
pub fn core_topics(fork_digest: ForkDigest) -> Vec<GossipTopic> {
    vec![
        GossipTopic::new(fork_digest, GossipKind::BeaconBlock),
        GossipTopic::new(fork_digest, GossipKind::BeaconAggregateAndProof),
        GossipTopic::new(fork_digest, GossipKind::VoluntaryExit),
    ]
}
