//! # custodia-clients
//!
//! Narrow async contracts over the engine's external collaborators, plus
//! HTTP implementations and in-memory test doubles.
//!
//! ## Architecture
//!
//! The settlement engine never talks to a blockchain vendor directly; every
//! reconciliation job consumes one of three seams:
//!
//! 1. **`PriceOracle`**: fiat exchange rates, best-effort with hardcoded
//!    fallbacks — a stale rate is better than a stalled job pass
//! 2. **`ChainClient`**: address transactions, balances, and block height —
//!    polling-based visibility, re-derived from scratch every pass
//! 3. **`BroadcastClient`**: outbound payouts, failing loudly with the
//!    vendor's message on rejection
//!
//! The `test-helpers` feature exposes seedable in-memory doubles
//! ([`MockChain`], [`MockBroadcaster`], [`StaticRates`]) used throughout
//! the engine's test suites.

pub mod broadcast;
pub mod chain;
pub mod price;

pub use broadcast::{BroadcastClient, HttpBroadcastClient};
pub use chain::{ChainClient, ChainTransaction, HttpChainClient, TxOutput};
pub use price::{HttpPriceOracle, PriceOracle, RateMap};

#[cfg(feature = "test-helpers")]
pub use broadcast::MockBroadcaster;
#[cfg(feature = "test-helpers")]
pub use chain::MockChain;
#[cfg(feature = "test-helpers")]
pub use price::StaticRates;
