//! Pricing and grant configuration.
//!
//! `PricingConfig` is what `Ledger::initialize` stores. `LedgerConfig` is the
//! TOML file the CLI reads at bootstrap:
//!
//! ```toml
//! [pricing]
//! first_mint_price = "1"
//! mint_price = "0.2"
//! stake_price = "2"
//!
//! [grants]
//! first_mint_credits = 10
//! mint_credits = 1
//! ```

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    amount::{self, Amount, WEI_PER_ETHER},
    error::LedgerError,
};

/// Launch prices: 1, 0.2 and 2 ether.
pub const DEFAULT_FIRST_MINT_PRICE: Amount = WEI_PER_ETHER;
pub const DEFAULT_MINT_PRICE: Amount = WEI_PER_ETHER / 5;
pub const DEFAULT_STAKE_PRICE: Amount = 2 * WEI_PER_ETHER;

pub const DEFAULT_FIRST_MINT_CREDITS: u64 = 10;
pub const DEFAULT_MINT_CREDITS: u64 = 1;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingConfig {
    #[serde(with = "amount::ether_string")]
    pub first_mint_price: Amount,
    #[serde(with = "amount::ether_string")]
    pub mint_price: Amount,
    #[serde(with = "amount::ether_string")]
    pub stake_price: Amount,
}

impl PricingConfig {
    pub fn new(first_mint_price: Amount, mint_price: Amount, stake_price: Amount) -> Self {
        Self {
            first_mint_price,
            mint_price,
            stake_price,
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.first_mint_price == 0 {
            return Err(LedgerError::InvalidConfiguration(
                "first mint price must be positive",
            ));
        }
        if self.mint_price == 0 {
            return Err(LedgerError::InvalidConfiguration(
                "mint price must be positive",
            ));
        }
        if self.stake_price == 0 {
            return Err(LedgerError::InvalidConfiguration(
                "stake price must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_FIRST_MINT_PRICE,
            DEFAULT_MINT_PRICE,
            DEFAULT_STAKE_PRICE,
        )
    }
}

/// Credits handed out per accepted mint, independent of overpayment.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantPolicy {
    pub first_mint_credits: u64,
    pub mint_credits: u64,
}

impl GrantPolicy {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.first_mint_credits == 0 || self.mint_credits == 0 {
            return Err(LedgerError::InvalidConfiguration(
                "grant credits must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for GrantPolicy {
    fn default() -> Self {
        Self {
            first_mint_credits: DEFAULT_FIRST_MINT_CREDITS,
            mint_credits: DEFAULT_MINT_CREDITS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] LedgerError),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub grants: GrantPolicy,
}

impl LedgerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig = toml::from_str(text)?;
        config.grants.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
