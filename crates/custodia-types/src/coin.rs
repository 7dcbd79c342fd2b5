//! Supported coins and their smallest-unit arithmetic.
//!
//! All crypto amounts flow through the engine as [`Decimal`] in whole-coin
//! units; fingerprint derivation and chain clients work in atomic units
//! (satoshi, litoshi, piconero).

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// A coin supported by the custodial wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coin {
    Btc,
    Ltc,
    Xmr,
}

impl Coin {
    /// All coins the platform settles, in a stable iteration order.
    pub const ALL: [Coin; 3] = [Coin::Btc, Coin::Ltc, Coin::Xmr];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Btc => "btc",
            Self::Ltc => "ltc",
            Self::Xmr => "xmr",
        }
    }

    /// Ticker symbol for display and oracle queries.
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Ltc => "LTC",
            Self::Xmr => "XMR",
        }
    }

    /// Smallest-unit scale: atomic units per whole coin.
    #[must_use]
    pub fn atomic_scale(&self) -> u64 {
        match self {
            Self::Btc | Self::Ltc => 100_000_000,
            Self::Xmr => 1_000_000_000_000,
        }
    }

    /// Number of decimal places in the atomic scale.
    #[must_use]
    pub fn decimals(&self) -> u32 {
        match self {
            Self::Btc | Self::Ltc => 8,
            Self::Xmr => 12,
        }
    }

    /// Custodial address prefix for this coin.
    #[must_use]
    pub fn address_prefix(&self) -> &'static str {
        match self {
            Self::Btc => "bc1",
            Self::Ltc => "ltc1",
            Self::Xmr => "xmr1",
        }
    }

    /// Convert a whole-coin amount to atomic units, truncating sub-atomic
    /// precision. Negative amounts map to zero.
    #[must_use]
    pub fn to_atomic(&self, amount: Decimal) -> u64 {
        let scaled = amount * Decimal::from(self.atomic_scale());
        scaled.trunc().to_u64().unwrap_or(0)
    }

    /// Convert atomic units back to a whole-coin amount.
    #[must_use]
    pub fn from_atomic(&self, units: u64) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(units), self.decimals())
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Coin {
    type Err = crate::CustodiaError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "btc" | "bitcoin" => Ok(Self::Btc),
            "ltc" | "litecoin" => Ok(Self::Ltc),
            "xmr" | "monero" => Ok(Self::Xmr),
            other => Err(crate::CustodiaError::UnsupportedCoin(other.to_string())),
        }
    }
}
