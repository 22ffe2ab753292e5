//! Hash and address primitives for LedgerChain

use crate::error::ChainError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Address credited with every block reward.
pub const MINER_ADDRESS: &str = "miner";

/// A 32-byte SHA-256 digest.
///
/// The all-zero value is the null hash: it is the prior hash of the genesis
/// block and the source id of a coinbase input.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Sha256Hash([u8; 32]);

impl Sha256Hash {
    pub const LEN: usize = 32;

    pub const fn null() -> Self {
        Sha256Hash([0u8; 32])
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Sha256Hash(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ChainError> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            ChainError::Serialization(format!("Hash must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Sha256Hash(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, ChainError> {
        let trimmed = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(trimmed)
            .map_err(|e| ChainError::Serialization(format!("Invalid hex hash: {}", e)))?;
        Self::from_slice(&bytes)
    }

    /// Number of leading zero bits, reading the digest as a big-endian number.
    pub fn leading_zero_bits(&self) -> u32 {
        let mut zeros = 0u32;
        for byte in self.0.iter() {
            if *byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }
        zeros
    }
}

impl AsRef<[u8]> for Sha256Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Sha256Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Sha256Hash(bytes)
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Sha256Hash({})", self.to_hex())
    }
}

// Hex in human-readable formats (JSON), raw bytes otherwise (bincode).
impl Serialize for Sha256Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Sha256Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Sha256Hash::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Sha256Hash)
        }
    }
}

/// SHA-256 over arbitrary bytes.
pub fn hash256(data: &[u8]) -> Sha256Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Sha256Hash(hasher.finalize().into())
}

/// Opaque identifier of an output owner.
///
/// Ownership is compared by value only; no key material is attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Address(value.into())
    }

    /// The reserved block-reward recipient.
    pub fn miner() -> Self {
        Address(MINER_ADDRESS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Address(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_hash() {
        let null = Sha256Hash::null();
        assert!(null.is_null());
        assert_eq!(null, Sha256Hash::default());
        assert_eq!(null.leading_zero_bits(), 256);
        assert!(!hash256(b"ledger").is_null());
    }

    #[test]
    fn test_hash256_known_vector() {
        let digest = hash256(b"abc");
        assert_eq!(
            digest.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hex_roundtrip_and_prefix() {
        let digest = hash256(b"roundtrip");
        assert_eq!(Sha256Hash::from_hex(&digest.to_hex()).unwrap(), digest);
        let prefixed = format!("0x{}", digest.to_hex());
        assert_eq!(Sha256Hash::from_hex(&prefixed).unwrap(), digest);
        assert!(Sha256Hash::from_hex("abcd").is_err());
        assert!(Sha256Hash::from_hex("zz").is_err());
    }

    #[test]
    fn test_leading_zero_bits() {
        let mut bytes = [0xFFu8; 32];
        assert_eq!(Sha256Hash::from_bytes(bytes).leading_zero_bits(), 0);

        bytes[0] = 0x00;
        bytes[1] = 0x0F;
        assert_eq!(Sha256Hash::from_bytes(bytes).leading_zero_bits(), 12);

        bytes[1] = 0x80;
        assert_eq!(Sha256Hash::from_bytes(bytes).leading_zero_bits(), 8);
    }

    #[test]
    fn test_hash_serializes_as_hex_in_json() {
        let digest = hash256(b"json");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest.to_hex()));
        let back: Sha256Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn test_address_equality() {
        assert_eq!(Address::miner(), Address::from("miner"));
        assert_ne!(Address::from("alice"), Address::from("bob"));
        assert_eq!(Address::from("alice").to_string(), "alice");
    }
}
