/// Gossipsub Message Identifiers
///
/// Every gossip message is identified by a 20-byte value derived from its
/// payload, so the same content always deduplicates to the same id:
///
/// ```text
/// valid snappy:   SHA256(MESSAGE_DOMAIN_VALID_SNAPPY   + snappy_decompress(data))[:20]
/// invalid snappy: SHA256(MESSAGE_DOMAIN_INVALID_SNAPPY + data)[:20]
/// ```
///
/// The domain prefix keeps a payload that fails to decompress from ever
/// colliding with a valid message whose decompressed bytes equal it.
use chain::ChainConfig;
use containers::Bytes20;
use libp2p::gossipsub::{Message, MessageId};
use sha2::{Digest, Sha256};

use crate::compressor;
use crate::types::GOSSIP_MAX_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageIdentifier {
    valid_snappy_domain: [u8; 4],
    invalid_snappy_domain: [u8; 4],
}

impl MessageIdentifier {
    pub fn new(valid_snappy_domain: [u8; 4], invalid_snappy_domain: [u8; 4]) -> Self {
        Self {
            valid_snappy_domain,
            invalid_snappy_domain,
        }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        Self::new(
            config.message_domain_valid_snappy,
            config.message_domain_invalid_snappy,
        )
    }

    /// Computes the id of a raw (still compressed) gossip payload.
    ///
    /// Payloads whose declared decompressed size exceeds `GOSSIP_MAX_SIZE`
    /// are treated as invalid snappy.
    pub fn id(&self, raw: &[u8]) -> Bytes20 {
        let mut hasher = Sha256::new();
        match compressor::decompress(raw, GOSSIP_MAX_SIZE) {
            Ok(decompressed) => {
                hasher.update(self.valid_snappy_domain);
                hasher.update(&decompressed);
            }
            Err(_) => {
                hasher.update(self.invalid_snappy_domain);
                hasher.update(raw);
            }
        }

        let hash = hasher.finalize();
        let mut id = [0u8; 20];
        id.copy_from_slice(&hash[..20]);
        Bytes20(id)
    }
}

impl Default for MessageIdentifier {
    fn default() -> Self {
        Self::from_config(&ChainConfig::default())
    }
}

/// Adapter for `libp2p::gossipsub::ConfigBuilder::message_id_fn`.
///
/// Gossipsub runs with the identity transform, so `message.data` is the
/// payload exactly as it travelled on the wire.
pub fn compute_message_id(identifier: &MessageIdentifier, message: &Message) -> MessageId {
    MessageId::from(identifier.id(&message.data).as_bytes())
}
