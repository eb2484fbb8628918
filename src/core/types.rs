// Basic types for the ledger

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// 256-bit hash type (32 bytes)
/// Used for block hashes and the previous-block link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Create a new Hash256 from a byte array
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a Hash256 from a slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, String> {
        if slice.len() != 32 {
            return Err(format!("Invalid hash length: expected 32, got {}", slice.len()));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Create zero hash (the genesis block's previous_block_hash)
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Lowercase hex, most significant byte first
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string. The bare `"0"` the genesis link
    /// uses on the wire is accepted as the zero hash.
    pub fn from_hex(hex_str: &str) -> Result<Self, String> {
        if hex_str == "0" {
            return Ok(Self::zero());
        }
        let bytes = hex::decode(hex_str)
            .map_err(|e| format!("Invalid hex string: {}", e))?;
        Self::from_slice(&bytes)
    }

    /// Number of leading `'0'` characters in the hex form
    pub fn leading_zero_digits(&self) -> usize {
        let mut zeros = 0;
        for byte in &self.0 {
            if *byte == 0 {
                zeros += 2;
            } else {
                if *byte < 0x10 {
                    zeros += 1;
                }
                break;
            }
        }
        zeros
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash256_zero() {
        let zero = Hash256::zero();
        assert_eq!(zero, Hash256::new([0u8; 32]));
        assert!(zero.is_zero());
        assert_eq!(zero.leading_zero_digits(), 64);
    }

    #[test]
    fn test_hash256_hex() {
        let mut bytes = [0xabu8; 32];
        bytes[0] = 0x00;
        bytes[1] = 0x0f;
        let hash = Hash256::new(bytes);
        let hex = hash.to_hex();
        assert!(hex.starts_with("000fab"));
        assert_eq!(Hash256::from_hex(&hex).unwrap(), hash);
    }

    #[test]
    fn test_leading_zero_digits() {
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0x00;
        bytes[1] = 0x01;
        assert_eq!(Hash256::new(bytes).leading_zero_digits(), 3);

        bytes[1] = 0x10;
        assert_eq!(Hash256::new(bytes).leading_zero_digits(), 2);
    }

    #[test]
    fn test_genesis_marker_parses() {
        assert_eq!(Hash256::from_hex("0").unwrap(), Hash256::zero());
        assert!(Hash256::from_hex("zz").is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let hash = Hash256::new([0x12; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "12".repeat(32)));
        let back: Hash256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
