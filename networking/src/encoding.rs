use crate::compressor;
use crate::error::{NetworkError, Result};
use crate::gossipsub::{GossipKind, PubsubMessage, SSZ_SNAPPY_ENCODING_POSTFIX};
use crate::types::GOSSIP_MAX_SIZE;

/// Wire encoding for gossip payloads.
pub trait GossipEncoding: Send + Sync {
    fn encode_gossip(&self, message: &PubsubMessage) -> Result<Vec<u8>>;

    fn decode_gossip(&self, kind: &GossipKind, data: &[u8]) -> Result<PubsubMessage>;

    /// Suffix appended to every topic published with this encoding, e.g. `/ssz_snappy`.
    fn protocol_suffix(&self) -> String;
}

/// SSZ serialization followed by raw snappy compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct SszSnappyEncoding;

impl GossipEncoding for SszSnappyEncoding {
    fn encode_gossip(&self, message: &PubsubMessage) -> Result<Vec<u8>> {
        let ssz = message.to_ssz().map_err(NetworkError::Encoding)?;
        if ssz.len() > GOSSIP_MAX_SIZE {
            return Err(NetworkError::Encoding(format!(
                "{} of {} bytes exceeds gossip limit {GOSSIP_MAX_SIZE}",
                message.type_name(),
                ssz.len()
            )));
        }
        compressor::compress(&ssz).map_err(|e| NetworkError::Encoding(e.to_string()))
    }

    fn decode_gossip(&self, kind: &GossipKind, data: &[u8]) -> Result<PubsubMessage> {
        if data.len() > GOSSIP_MAX_SIZE {
            return Err(NetworkError::Encoding(format!(
                "payload of {} bytes exceeds gossip limit {GOSSIP_MAX_SIZE}",
                data.len()
            )));
        }
        let ssz = compressor::decompress(data, GOSSIP_MAX_SIZE)
            .map_err(|e| NetworkError::Encoding(e.to_string()))?;
        PubsubMessage::from_ssz(kind, &ssz).map_err(NetworkError::Encoding)
    }

    fn protocol_suffix(&self) -> String {
        format!("/{SSZ_SNAPPY_ENCODING_POSTFIX}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use containers::{BeaconBlock, SignedBeaconBlock, Slot};

    #[test]
    fn decode_inverts_encode() {
        let block = SignedBeaconBlock {
            message: BeaconBlock {
                slot: Slot(310),
                ..BeaconBlock::default()
            },
            ..SignedBeaconBlock::default()
        };
        let message = PubsubMessage::BeaconBlock(block);

        let encoding = SszSnappyEncoding;
        let bytes = encoding.encode_gossip(&message).unwrap();
        let decoded = encoding
            .decode_gossip(&GossipKind::BeaconBlock, &bytes)
            .unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn decode_rejects_uncompressed_ssz() {
        let message = PubsubMessage::BeaconBlock(SignedBeaconBlock::default());
        let ssz = message.to_ssz().unwrap();
        let err = SszSnappyEncoding
            .decode_gossip(&GossipKind::BeaconBlock, &ssz)
            .unwrap_err();
        assert!(matches!(err, NetworkError::Encoding(_)));
    }

    #[test]
    fn suffix_matches_topic_encoding() {
        assert_eq!(SszSnappyEncoding.protocol_suffix(), "/ssz_snappy");
    }
}
