use hex::FromHex;
use serde::{Deserialize, Serialize};
use ssz::{ByteVector, H256};
use ssz_derive::Ssz;
use std::fmt;
use std::str::FromStr;
use typenum::U96;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Ssz, Default, Serialize, Deserialize)]
#[ssz(transparent)]
pub struct Bytes32(pub H256);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Ssz, Default, Serialize, Deserialize)]
#[ssz(transparent)]
pub struct ValidatorIndex(pub u64);

/// BLS signature bytes. Never verified by this crate.
pub type Signature = ByteVector<U96>;

/// 20-byte value used for gossip message identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Bytes20(pub [u8; 20]);

impl Bytes20 {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 20]> for Bytes20 {
    fn from(bytes: [u8; 20]) -> Self {
        Bytes20(bytes)
    }
}

impl TryFrom<&[u8]> for Bytes20 {
    type Error = String;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 20] = value
            .try_into()
            .map_err(|_| format!("expected 20 bytes, got {}", value.len()))?;
        Ok(Bytes20(bytes))
    }
}

impl fmt::Display for Bytes20 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Bytes32 {
    pub fn zero() -> Self {
        Bytes32(H256::zero())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<[u8; 32]> for Bytes32 {
    fn from(bytes: [u8; 32]) -> Self {
        Bytes32(H256::from(bytes))
    }
}

impl FromStr for Bytes32 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 32] = <[u8; 32]>::from_hex(s.trim_start_matches("0x"))?;
        Ok(Bytes32(H256::from(bytes)))
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.as_bytes()))
    }
}
