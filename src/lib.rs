//! Business card ledger.
//!
//! Accounts buy minting authority, optionally delegate it to other accounts,
//! and spend it to create immutable business-card records classified as
//! personal or company cards. Accounts may also post stake as collateral.
//!
//! * [`ledger`] — the state machine and its event log.
//! * [`card`] — card requests, records and their classification.
//! * [`permit`] — grantor-signed delegation permits for sponsored minting.
//! * [`config`] — pricing and grant configuration, loadable from TOML.
//! * [`store`] — JSON state file used by the command-line host.

pub mod address;
pub mod amount;
pub mod card;
pub mod config;
pub mod ledger;
pub mod permit;
pub mod store;

mod error;

pub use address::Address;
pub use amount::Amount;
pub use error::LedgerError;
pub use ledger::{Ledger, LedgerCall, LedgerEvent, LedgerId};
