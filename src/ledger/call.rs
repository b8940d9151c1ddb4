use serde::{Deserialize, Serialize};

use crate::{
    address::Address,
    amount::Amount,
    card::{CardRequest, CardType},
    permit::Permit,
};

/// A state-changing call as delivered by the hosting environment. The caller
/// identity travels next to it, not inside it.
// Externally tagged: serde buffers internally tagged enums in a form that cannot hold u128.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerCall {
    Mint {
        payment: Amount,
        #[serde(default)]
        beneficiary: Option<Address>,
    },
    CreateCard(CardRequest),
    Stake {
        payment: Amount,
    },
    MintWithPermit {
        payment: Amount,
        permit: Permit,
    },
}

impl LedgerCall {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCall::Mint { .. } => "mint",
            LedgerCall::CreateCard(_) => "create_card",
            LedgerCall::Stake { .. } => "stake",
            LedgerCall::MintWithPermit { .. } => "mint_with_permit",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MintReceipt {
    pub grantor: Address,
    pub holder: Address,
    pub credits: u64,
    /// `(grantor, holder)` balance after the grant.
    pub balance: u64,
    pub first_mint: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardReceipt {
    pub owner: Address,
    pub index: usize,
    pub card_type: CardType,
    /// Credits left on the balance that paid for the card.
    pub remaining: u64,
}

// Externally tagged: serde buffers internally tagged enums in a form that cannot hold u128.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Minted(MintReceipt),
    CardCreated(CardReceipt),
    Staked { total: Amount },
}
