use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

pub const SLOTS_PER_EPOCH: u64 = 32;
pub const SECONDS_PER_SLOT: u64 = 12;
pub const SLOT_DURATION_MS: u64 = SECONDS_PER_SLOT * 1_000;

/// Upper bound of peers a finalized-epoch vote is collected from.
pub const MAX_PEERS_TO_SYNC: usize = 15;
/// Lower bound of peers that must agree on a non-finalized head.
pub const MINIMUM_SYNC_PEERS: usize = 3;

pub const ATTESTATION_SUBNET_COUNT: u64 = 64;

pub const MESSAGE_DOMAIN_INVALID_SNAPPY: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
pub const MESSAGE_DOMAIN_VALID_SNAPPY: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

pub const GENESIS_FORK_VERSION: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ChainConfig {
    pub slots_per_epoch: u64,
    pub seconds_per_slot: u64,
    pub max_peers_to_sync: usize,
    pub minimum_sync_peers: usize,
    pub attestation_subnet_count: u64,
    #[serde(with = "hex_bytes4")]
    pub message_domain_valid_snappy: [u8; 4],
    #[serde(with = "hex_bytes4")]
    pub message_domain_invalid_snappy: [u8; 4],
    #[serde(with = "hex_bytes4")]
    pub genesis_fork_version: [u8; 4],
}

pub const MAINNET_CONFIG: ChainConfig = ChainConfig {
    slots_per_epoch: SLOTS_PER_EPOCH,
    seconds_per_slot: SECONDS_PER_SLOT,
    max_peers_to_sync: MAX_PEERS_TO_SYNC,
    minimum_sync_peers: MINIMUM_SYNC_PEERS,
    attestation_subnet_count: ATTESTATION_SUBNET_COUNT,
    message_domain_valid_snappy: MESSAGE_DOMAIN_VALID_SNAPPY,
    message_domain_invalid_snappy: MESSAGE_DOMAIN_INVALID_SNAPPY,
    genesis_fork_version: GENESIS_FORK_VERSION,
};

impl Default for ChainConfig {
    fn default() -> Self {
        MAINNET_CONFIG
    }
}

impl ChainConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        if config.slots_per_epoch == 0 || config.seconds_per_slot == 0 {
            return Err("SLOTS_PER_EPOCH and SECONDS_PER_SLOT must be non-zero".into());
        }
        Ok(config)
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::from_secs(self.seconds_per_slot)
    }

    pub fn epoch_duration(&self) -> Duration {
        Duration::from_secs(self.seconds_per_slot * self.slots_per_epoch)
    }
}

/// `0x`-prefixed hex encoding for 4-byte config values (fork versions, domains).
mod hex_bytes4 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as SerdeError};

    pub fn serialize<S>(value: &[u8; 4], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: String = value.iter().map(|byte| format!("{byte:02x}")).collect();
        serializer.serialize_str(&format!("0x{encoded}"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 4], D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        let digits = value.trim_start_matches("0x");
        if digits.len() != 8 {
            return Err(SerdeError::custom(format!("expected 4 hex bytes, got {value:?}")));
        }

        let mut bytes = [0u8; 4];
        for (index, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[index * 2..index * 2 + 2], 16)
                .map_err(|err| SerdeError::custom(format!("invalid hex byte: {err}")))?;
        }
        Ok(bytes)
    }
}
