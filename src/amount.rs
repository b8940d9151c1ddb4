//! Currency amounts.
//!
//! The ledger counts in wei (`u128`). People type and read ether, so this
//! module converts between the two decimal forms.

use thiserror::Error;

pub type Amount = u128;

/// Number of fractional digits in one ether.
pub const ETHER_DECIMALS: u32 = 18;
pub const WEI_PER_ETHER: Amount = 1_000_000_000_000_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount {0:?}")]
    Malformed(String),
    #[error("amount {0:?} has more than 18 fractional digits")]
    TooPrecise(String),
    #[error("amount {0:?} does not fit in 128 bits")]
    Overflow(String),
}

/// Parses a decimal ether string (`"1"`, `"0.2"`, `".5"`) into wei.
pub fn parse_ether(input: &str) -> Result<Amount, AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::Malformed(s.to_string()));
    }
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return Err(AmountError::Malformed(s.to_string()));
    }
    if frac.len() > ETHER_DECIMALS as usize {
        return Err(AmountError::TooPrecise(s.to_string()));
    }

    let overflow = || AmountError::Overflow(s.to_string());
    let whole_wei = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<Amount>()
            .map_err(|_| overflow())?
            .checked_mul(WEI_PER_ETHER)
            .ok_or_else(overflow)?
    };
    let frac_wei = if frac.is_empty() {
        0
    } else {
        let scale = 10u128.pow(ETHER_DECIMALS - frac.len() as u32);
        frac.parse::<Amount>().map_err(|_| overflow())? * scale
    };
    whole_wei.checked_add(frac_wei).ok_or_else(overflow)
}

/// Renders wei as a decimal ether string without trailing zeros.
pub fn format_ether(wei: Amount) -> String {
    let whole = wei / WEI_PER_ETHER;
    let frac = wei % WEI_PER_ETHER;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:018}", frac);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Serde adapter storing an amount as an ether string, used by the config file.
pub(crate) mod ether_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::{format_ether, parse_ether, Amount};

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_ether(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        parse_ether(&encoded).map_err(D::Error::custom)
    }
}
