use serde::{Deserialize, Serialize};

use crate::{address::Address, amount::Amount, error::LedgerError};

/// Classification resolved from the authority a card consumed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CardType {
    /// Minted from the caller's own authority.
    Personal,
    /// Minted from authority delegated by `company`.
    Company { company: Address },
}

impl CardType {
    pub(crate) fn resolve(grantor: &Address, minter: &Address) -> Self {
        if grantor == minter {
            CardType::Personal
        } else {
            CardType::Company { company: *grantor }
        }
    }

    pub fn is_company(&self) -> bool {
        matches!(self, CardType::Company { .. })
    }
}

/// What a caller submits to `create_card`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub recipient: Address,
    pub declared_value: Amount,
    /// Grantor whose authority to spend; resolved automatically when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grantor: Option<Address>,
}

impl CardRequest {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        recipient: Address,
        declared_value: Amount,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
            recipient,
            declared_value,
            grantor: None,
        }
    }

    pub fn with_grantor(mut self, grantor: Address) -> Self {
        self.grantor = Some(grantor);
        self
    }

    /// Field checks, first failure wins.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.name.is_empty() {
            return Err(LedgerError::InvalidInput("name"));
        }
        if self.email.is_empty() {
            return Err(LedgerError::InvalidInput("email"));
        }
        if self.phone.is_empty() {
            return Err(LedgerError::InvalidInput("phone"));
        }
        if self.recipient.is_zero() {
            return Err(LedgerError::InvalidInput("recipient"));
        }
        if self.declared_value == 0 {
            return Err(LedgerError::InvalidInput("declared value"));
        }
        Ok(())
    }
}

/// Immutable card stored under its recipient.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardRecord {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub recipient: Address,
    pub declared_value: Amount,
    pub minter: Address,
    pub card_type: CardType,
}

impl CardRecord {
    pub(crate) fn from_request(request: CardRequest, minter: Address, card_type: CardType) -> Self {
        Self {
            name: request.name,
            email: request.email,
            phone: request.phone,
            recipient: request.recipient,
            declared_value: request.declared_value,
            minter,
            card_type,
        }
    }
}
