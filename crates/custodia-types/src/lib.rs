//! # custodia-types
//!
//! Shared types, errors, and configuration for the **Custodia** custodial
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`UserId`], [`OrderId`], [`DepositId`], [`HoldingId`], [`WithdrawalId`], [`EntryId`], [`TxHash`]
//! - **Coins**: [`Coin`] with smallest-unit scales and address prefixes
//! - **Payment reference**: [`Fingerprint`] amount-digit matching
//! - **Deposit model**: [`DepositRequest`], [`DepositStatus`]
//! - **Escrow model**: [`EscrowHolding`], [`EscrowStatus`], [`ProductKind`], [`PayoutStatus`]
//! - **Withdrawal model**: [`WithdrawalRequest`], [`WithdrawalStatus`]
//! - **Wallet model**: [`WalletBalance`], [`DepositAddress`], [`PoolAddress`]
//! - **Ledger model**: [`LedgerEntry`], [`EntryKind`], [`EntryDirection`], [`EntryStatus`]
//! - **Audit model**: [`EscrowAuditRecord`]
//! - **Configuration**: [`CoinConfig`], [`FeeSchedule`], [`EngineConfig`]
//! - **Errors**: [`CustodiaError`] with `CD_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod audit;
pub mod coin;
pub mod config;
pub mod constants;
pub mod deposit;
pub mod error;
pub mod escrow;
pub mod fingerprint;
pub mod ids;
pub mod ledger;
pub mod wallet;
pub mod withdrawal;

// Re-export all primary types at crate root for ergonomic imports:
//   use custodia_types::{DepositRequest, EscrowHolding, Coin, ...};

pub use audit::*;
pub use coin::*;
pub use config::*;
pub use deposit::*;
pub use error::*;
pub use escrow::*;
pub use fingerprint::*;
pub use ids::*;
pub use ledger::*;
pub use wallet::*;
pub use withdrawal::*;

// Constants are accessed via `custodia_types::constants::FOO`
// (not re-exported to avoid name collisions).
