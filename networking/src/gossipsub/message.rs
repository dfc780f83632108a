use containers::ssz::{SszReadDefault, SszWrite};
use containers::{Attestation, SignedAggregateAndProof, SignedBeaconBlock, SignedVoluntaryExit};

use crate::gossipsub::topic::GossipKind;

/// Decoded gossip payload by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubsubMessage {
    BeaconBlock(SignedBeaconBlock),
    AggregateAndProof(SignedAggregateAndProof),
    VoluntaryExit(SignedVoluntaryExit),
    Attestation(Attestation),
}

impl PubsubMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            PubsubMessage::BeaconBlock(_) => "SignedBeaconBlock",
            PubsubMessage::AggregateAndProof(_) => "SignedAggregateAndProof",
            PubsubMessage::VoluntaryExit(_) => "SignedVoluntaryExit",
            PubsubMessage::Attestation(_) => "Attestation",
        }
    }

    /// Static message-type to topic table.
    ///
    /// Attestations have no fixed topic: their topic depends on the subnet
    /// and they are published through the attestation broadcast path.
    pub fn topic_kind(&self) -> Option<GossipKind> {
        match self {
            PubsubMessage::BeaconBlock(_) => Some(GossipKind::BeaconBlock),
            PubsubMessage::AggregateAndProof(_) => Some(GossipKind::BeaconAggregateAndProof),
            PubsubMessage::VoluntaryExit(_) => Some(GossipKind::VoluntaryExit),
            PubsubMessage::Attestation(_) => None,
        }
    }

    pub fn to_ssz(&self) -> Result<Vec<u8>, String> {
        let bytes = match self {
            PubsubMessage::BeaconBlock(block) => block.to_ssz(),
            PubsubMessage::AggregateAndProof(aggregate) => aggregate.to_ssz(),
            PubsubMessage::VoluntaryExit(exit) => exit.to_ssz(),
            PubsubMessage::Attestation(attestation) => attestation.to_ssz(),
        };
        bytes.map_err(|e| format!("{e:?}"))
    }

    pub fn from_ssz(kind: &GossipKind, data: &[u8]) -> Result<Self, String> {
        match kind {
            GossipKind::BeaconBlock => Ok(Self::BeaconBlock(
                SignedBeaconBlock::from_ssz_default(data).map_err(|e| format!("{e:?}"))?,
            )),
            GossipKind::BeaconAggregateAndProof => Ok(Self::AggregateAndProof(
                SignedAggregateAndProof::from_ssz_default(data).map_err(|e| format!("{e:?}"))?,
            )),
            GossipKind::VoluntaryExit => Ok(Self::VoluntaryExit(
                SignedVoluntaryExit::from_ssz_default(data).map_err(|e| format!("{e:?}"))?,
            )),
            GossipKind::Attestation(_) => Ok(Self::Attestation(
                Attestation::from_ssz_default(data).map_err(|e| format!("{e:?}"))?,
            )),
        }
    }
}
