//! Amount fingerprints — the pseudo payment-reference scheme.
//!
//! A single pooled deposit address cannot carry a payment reference, so the
//! platform encodes one into the exact amount the user is told to send: the
//! digit slice of the amount's smallest units in the `10^2`–`10^6` range.
//! Each deposit request is assigned a random fingerprint, embedded into its
//! crypto amount; the matcher recovers the fingerprint from observed chain
//! transactions and compares within a fixed tolerance.
//!
//! This is a probabilistic scheme, not a strong reference: it stays
//! unambiguous in practice because requests are short-lived and fingerprints
//! are drawn uniformly per request.

use std::fmt;

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Coin;
use crate::constants::{FINGERPRINT_DIVISOR, FINGERPRINT_MODULUS};

/// A numeric payment-reference derived from an amount's lower-order digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Fingerprint(pub u32);

impl Fingerprint {
    /// Derive the fingerprint of an amount given in atomic units.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn of_units(units: u64) -> Self {
        Self(((units / FINGERPRINT_DIVISOR) % FINGERPRINT_MODULUS) as u32)
    }

    /// Derive the fingerprint of a whole-coin amount.
    #[must_use]
    pub fn of_amount(coin: Coin, amount: Decimal) -> Self {
        Self::of_units(coin.to_atomic(amount))
    }

    /// Draw a uniformly random fingerprint for a new deposit request.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(0..FINGERPRINT_MODULUS) as u32)
    }

    /// Embed this fingerprint into an atomic amount, replacing the digit
    /// slice it is derived from. `of_units(embed(units)) == self` holds for
    /// any `units`.
    #[must_use]
    pub fn embed(&self, units: u64) -> u64 {
        let current = (units / FINGERPRINT_DIVISOR) % FINGERPRINT_MODULUS;
        units - current * FINGERPRINT_DIVISOR + u64::from(self.0) * FINGERPRINT_DIVISOR
    }

    /// Absolute distance to another fingerprint.
    #[must_use]
    pub fn distance(&self, other: Fingerprint) -> u32 {
        self.0.abs_diff(other.0)
    }

    /// Whether another fingerprint lies within `tolerance` units.
    #[must_use]
    pub fn matches(&self, other: Fingerprint, tolerance: u32) -> bool {
        self.distance(other) <= tolerance
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fp:{:04}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_middle_digit_slice() {
        // 0.001 BTC = 100_000 sat → digits 10^2..10^6 are "1000"
        assert_eq!(Fingerprint::of_units(100_000), Fingerprint(1000));
        // 98_000 sat → "0980"
        assert_eq!(Fingerprint::of_units(98_000), Fingerprint(980));
        // low two digits are ignored
        assert_eq!(Fingerprint::of_units(100_099), Fingerprint(1000));
    }

    #[test]
    fn of_amount_matches_of_units() {
        let amount = Decimal::new(1, 3); // 0.001 BTC
        assert_eq!(
            Fingerprint::of_amount(Coin::Btc, amount),
            Fingerprint::of_units(100_000)
        );
    }

    #[test]
    fn embed_roundtrips() {
        for fp in [0u32, 1, 4999, 9999] {
            let fp = Fingerprint(fp);
            let embedded = fp.embed(123_456_789);
            assert_eq!(Fingerprint::of_units(embedded), fp);
        }
    }

    #[test]
    fn embed_preserves_outer_digits() {
        let units = 123_456_789u64;
        let embedded = Fingerprint(42).embed(units);
        // Digits below 10^2 and at/above 10^6 are untouched.
        assert_eq!(embedded % 100, units % 100);
        assert_eq!(embedded / 1_000_000, units / 1_000_000);
    }

    #[test]
    fn tolerance_boundary() {
        let stored = Fingerprint(1000);
        assert!(stored.matches(Fingerprint(1005), 5));
        assert!(stored.matches(Fingerprint(995), 5));
        assert!(!stored.matches(Fingerprint(1006), 5));
        assert!(!stored.matches(Fingerprint(994), 5));
    }

    #[test]
    fn random_stays_in_range() {
        for _ in 0..1000 {
            let fp = Fingerprint::random();
            assert!(u64::from(fp.0) < FINGERPRINT_MODULUS);
        }
    }
}
