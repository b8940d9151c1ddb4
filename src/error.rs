use thiserror::Error;

use crate::{address::Address, amount::Amount};

/// Failures surfaced by ledger calls. A call that returns one of these has
/// left the ledger untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// `initialize` was already accepted once for this instance.
    #[error("ledger already initialized")]
    AlreadyInitialized,

    /// A state-changing call arrived before `initialize`.
    #[error("ledger not initialized")]
    NotInitialized,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),

    /// Payment below the tier threshold for the call.
    #[error("invalid payment amount: paid {paid} wei, required at least {required} wei")]
    InvalidPaymentAmount { required: Amount, paid: Amount },

    /// Names the offending field.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("{caller} holds no usable minting authority")]
    NotMintable { caller: Address },

    #[error("{caller} holds delegated authority from {candidates} grantors; pick one")]
    AmbiguousGrantor { caller: Address, candidates: usize },

    #[error("index {index} out of range for {owner} ({len} cards)")]
    IndexOutOfRange {
        owner: Address,
        index: usize,
        len: usize,
    },

    #[error("invalid permit: {0}")]
    InvalidPermit(&'static str),

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

impl LedgerError {
    /// Errors the caller can fix by resubmitting with different arguments or payment.
    pub fn is_caller_error(&self) -> bool {
        !matches!(
            self,
            LedgerError::AlreadyInitialized | LedgerError::NotInitialized | LedgerError::Overflow(_)
        )
    }
}
