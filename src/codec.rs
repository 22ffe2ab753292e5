//! Binary encoding of ledger values for storage and hashing.

use crate::error::{ChainError, Result};
use serde::{de::DeserializeOwned, Serialize};

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| ChainError::Serialization(format!("Encode failed: {}", e)))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| ChainError::Serialization(format!("Decode failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_roundtrip() {
        let bytes = encode(&42u64).unwrap();
        assert_eq!(decode::<u64>(&bytes).unwrap(), 42);
    }

    #[test]
    fn test_truncated_input_is_serialization_error() {
        let bytes = encode(&u64::MAX).unwrap();
        let err = decode::<u64>(&bytes[..3]).unwrap_err();
        assert!(matches!(err, ChainError::Serialization(_)));
    }
}
