use chain::config::{MESSAGE_DOMAIN_INVALID_SNAPPY, MESSAGE_DOMAIN_VALID_SNAPPY};
use libp2p::gossipsub::{Message, TopicHash};
use sha2::{Digest, Sha256};

use crate::compressor;
use crate::gossipsub::message_id::{MessageIdentifier, compute_message_id};

/// Snappy block made only of one literal, a different framing than the encoder produces.
fn literal_only_snappy(data: &[u8]) -> Vec<u8> {
    assert!(!data.is_empty() && data.len() <= 60);
    let mut out = vec![data.len() as u8, ((data.len() - 1) as u8) << 2];
    out.extend_from_slice(data);
    out
}

fn expected_id(domain: [u8; 4], data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    let hash = hasher.finalize();
    let mut id = [0u8; 20];
    id.copy_from_slice(&hash[..20]);
    id
}

#[test]
fn test_message_id_valid_snappy() {
    let identifier = MessageIdentifier::default();
    let content = b"attestation payload".to_vec();
    let raw = compressor::compress(&content).unwrap();

    assert_eq!(
        identifier.id(&raw).0,
        expected_id(MESSAGE_DOMAIN_VALID_SNAPPY, &content)
    );
}

#[test]
fn test_message_id_invalid_snappy_hashes_raw_bytes() {
    let identifier = MessageIdentifier::default();
    let raw = [0xffu8; 12];

    assert_eq!(
        identifier.id(&raw).0,
        expected_id(MESSAGE_DOMAIN_INVALID_SNAPPY, &raw)
    );
}

#[test]
fn test_message_id_deterministic() {
    let identifier = MessageIdentifier::default();
    let raw = compressor::compress(b"same bytes").unwrap();
    assert_eq!(identifier.id(&raw), identifier.id(&raw));
}

#[test]
fn test_framings_of_same_content_agree() {
    let identifier = MessageIdentifier::default();
    let content = b"abcabcabcabcabcabcabcabcabcabcabcabc";

    let encoded = compressor::compress(content).unwrap();
    let literal = literal_only_snappy(content);
    assert_ne!(encoded, literal);

    assert_eq!(identifier.id(&encoded), identifier.id(&literal));
}

#[test]
fn test_invalid_payload_never_collides_with_its_decompressed_twin() {
    let identifier = MessageIdentifier::default();
    let mut content = vec![0xffu8; 8];
    content.extend_from_slice(b"payload");
    assert!(compressor::decompress(&content, 1 << 20).is_err());

    let valid = compressor::compress(&content).unwrap();
    assert_ne!(identifier.id(&content), identifier.id(&valid));
}

#[test]
fn test_domains_come_from_config() {
    let content = compressor::compress(b"x").unwrap();
    let a = MessageIdentifier::new([1, 0, 0, 0], [0, 0, 0, 0]);
    let b = MessageIdentifier::new([2, 0, 0, 0], [0, 0, 0, 0]);
    assert_ne!(a.id(&content), b.id(&content));
}

#[test]
fn test_libp2p_adapter_uses_raw_data() {
    let identifier = MessageIdentifier::default();
    let data = compressor::compress(b"block").unwrap();
    let message = Message {
        source: None,
        data: data.clone(),
        sequence_number: None,
        topic: TopicHash::from_raw("/eth2/00000000/beacon_block/ssz_snappy"),
    };

    let message_id = compute_message_id(&identifier, &message);
    assert_eq!(message_id.0, identifier.id(&data).as_bytes().to_vec());
}
