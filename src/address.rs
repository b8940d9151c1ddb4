use std::{fmt, str::FromStr};

use ed25519_dalek::VerifyingKey;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const ADDRESS_LEN: usize = 20;

/// Opaque 20-byte account identifier, written as `0x` + 40 hex chars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LEN]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("invalid address hex: {0}")]
    Hex(String),
}

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    /// Address owned by an ed25519 key: trailing 20 bytes of `sha256(pk)`.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let digest: [u8; 32] = Sha256::digest(key.as_bytes()).into();
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[32 - ADDRESS_LEN..]);
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(body).map_err(|e| AddressError::Hex(e.to_string()))?;
        if bytes.len() != ADDRESS_LEN {
            return Err(AddressError::Length {
                expected: ADDRESS_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; ADDRESS_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

// Serialized as a string so addresses can key JSON maps.
impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use ed25519_dalek::SigningKey;

    #[test]
    fn display_and_parse_agree() {
        let addr = Address::new([0xab; ADDRESS_LEN]);
        let text = addr.to_string();
        assert_eq!(text, format!("0x{}", "ab".repeat(ADDRESS_LEN)));
        assert_eq!(text.parse::<Address>().unwrap(), addr);
        assert_eq!(
            "ABABABABABABABABABABABABABABABABABABABAB"
                .parse::<Address>()
                .unwrap(),
            addr
        );
    }

    #[test]
    fn rejects_wrong_length_and_bad_hex() {
        assert_eq!(
            "0x1234".parse::<Address>(),
            Err(AddressError::Length {
                expected: ADDRESS_LEN,
                actual: 2
            })
        );
        assert!(matches!("0xzz".parse::<Address>(), Err(AddressError::Hex(_))));
    }

    #[test]
    fn zero_address_is_detected() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::new([1; ADDRESS_LEN]).is_zero());
    }

    #[test]
    fn key_derived_address_is_stable() {
        let sk = SigningKey::from_bytes(&[7u8; 32]);
        let a = Address::from_verifying_key(&sk.verifying_key());
        let b = Address::from_verifying_key(&sk.verifying_key());
        assert_eq!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn addresses_can_key_json_maps() {
        let mut map = BTreeMap::new();
        map.insert(Address::new([1; ADDRESS_LEN]), 5u64);
        let json = serde_json::to_string(&map).unwrap();
        let back: BTreeMap<Address, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
