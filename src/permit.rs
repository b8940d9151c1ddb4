//! Grantor-signed delegation permits.
//!
//! A company signs a permit naming the account it wants to delegate to; any
//! relayer can then submit it to `Ledger::mint_with_permit` and pay the mint
//! price on the company's behalf.

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{address::Address, ledger::LedgerId};

const PERMIT_DOMAIN: &[u8] = b"business-card/permit/v1";

#[derive(Debug, Error)]
pub enum PermitError {
    #[error("permit token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("permit token is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("secret key must be 32 bytes (64 hex chars)")]
    SecretKeyLength,
    #[error("invalid key hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Message a grantor signs. `ledger` binds it to one ledger instance.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermitCore {
    pub ledger: LedgerId,
    pub grantor: Address,
    pub holder: Address,
    pub nonce: u64,
}

impl PermitCore {
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(PERMIT_DOMAIN);
        hasher.update(self.ledger.as_bytes());
        hasher.update(self.grantor.as_bytes());
        hasher.update(self.holder.as_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.finalize().into()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permit {
    pub core: PermitCore,
    #[serde(with = "crate::permit::serde_hex")]
    pub verifying_key: Vec<u8>,
    #[serde(with = "crate::permit::serde_hex")]
    pub signature: Vec<u8>,
}

impl Permit {
    /// Signs a permit; the grantor is the address of `signing_key`.
    pub fn sign(signing_key: &SigningKey, ledger: LedgerId, holder: Address, nonce: u64) -> Self {
        let verifying_key = signing_key.verifying_key();
        let core = PermitCore {
            ledger,
            grantor: Address::from_verifying_key(&verifying_key),
            holder,
            nonce,
        };
        let signature = signing_key.sign(&core.digest());
        Self {
            core,
            verifying_key: verifying_key.as_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        }
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.core.ledger
    }

    pub fn grantor(&self) -> Address {
        self.core.grantor
    }

    pub fn holder(&self) -> Address {
        self.core.holder
    }

    pub fn nonce(&self) -> u64 {
        self.core.nonce
    }

    /// Checks key ownership of the grantor address and the signature.
    /// Nonce freshness is the ledger's concern.
    pub fn verify(&self) -> Result<(), &'static str> {
        let key_bytes: [u8; 32] = self
            .verifying_key
            .as_slice()
            .try_into()
            .map_err(|_| "malformed verifying key")?;
        let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| "malformed verifying key")?;
        if Address::from_verifying_key(&key) != self.core.grantor {
            return Err("verifying key does not own grantor address");
        }
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| "malformed signature")?;
        key.verify_strict(&self.core.digest(), &signature)
            .map_err(|_| "signature does not verify")
    }

    pub fn to_token(&self) -> String {
        let json = serde_json::to_vec(self).expect("permit encode");
        general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    pub fn from_token(token: &str) -> Result<Self, PermitError> {
        let json = general_purpose::URL_SAFE_NO_PAD.decode(token.trim())?;
        Ok(serde_json::from_slice(&json)?)
    }
}

pub fn parse_signing_key(sk_hex: &str) -> Result<SigningKey, PermitError> {
    let bytes = hex::decode(sk_hex.trim())?;
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| PermitError::SecretKeyLength)?;
    Ok(SigningKey::from_bytes(&arr))
}

pub(crate) mod serde_hex {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
