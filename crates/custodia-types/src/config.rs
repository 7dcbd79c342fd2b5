//! Configuration types for the Custodia engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Coin, ProductKind, constants};

/// Per-coin settlement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinConfig {
    pub coin: Coin,
    /// Minimum withdrawal size in fiat.
    pub min_withdrawal_fiat: Decimal,
    /// Balances below this (whole-coin units) are not worth sweeping.
    pub dust_threshold: Decimal,
    /// Estimated network fee for an outbound transaction (whole-coin units).
    pub network_fee: Decimal,
    /// Confirmations required before a deposit credits.
    pub confirmations_required: u32,
    /// Hardcoded fiat rate used when the price oracle is unreachable.
    pub fallback_rate: Decimal,
}

impl CoinConfig {
    /// Default BTC configuration.
    #[must_use]
    pub fn btc() -> Self {
        Self {
            coin: Coin::Btc,
            min_withdrawal_fiat: Decimal::new(10, 0),    // €10
            dust_threshold: Decimal::new(1, 5),          // 0.00001 BTC
            network_fee: Decimal::new(2, 5),             // 0.00002 BTC
            confirmations_required: 1,
            fallback_rate: Decimal::new(50_000, 0),
        }
    }

    /// Default LTC configuration.
    #[must_use]
    pub fn ltc() -> Self {
        Self {
            coin: Coin::Ltc,
            min_withdrawal_fiat: Decimal::new(5, 0),
            dust_threshold: Decimal::new(1, 3),          // 0.001 LTC
            network_fee: Decimal::new(2, 3),             // 0.002 LTC
            confirmations_required: 1,
            fallback_rate: Decimal::new(80, 0),
        }
    }

    /// Default XMR configuration.
    #[must_use]
    pub fn xmr() -> Self {
        Self {
            coin: Coin::Xmr,
            min_withdrawal_fiat: Decimal::new(5, 0),
            dust_threshold: Decimal::new(1, 4),          // 0.0001 XMR
            network_fee: Decimal::new(5, 4),             // 0.0005 XMR
            confirmations_required: 1,
            fallback_rate: Decimal::new(150, 0),
        }
    }

    /// Default configuration for any supported coin.
    #[must_use]
    pub fn for_coin(coin: Coin) -> Self {
        match coin {
            Coin::Btc => Self::btc(),
            Coin::Ltc => Self::ltc(),
            Coin::Xmr => Self::xmr(),
        }
    }
}

/// Withdrawal fee schedule: a clamped percent component plus a flat
/// network-fee component, all in fiat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub percent: Decimal,
    pub min_fee: Decimal,
    pub max_fee: Decimal,
    pub network_fee: Decimal,
}

impl FeeSchedule {
    /// Total fee for a gross fiat amount:
    /// `clamp(amount × percent, min_fee, max_fee) + network_fee`.
    #[must_use]
    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        (amount * self.percent).clamp(self.min_fee, self.max_fee) + self.network_fee
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            percent: constants::DEFAULT_WITHDRAWAL_PERCENT_FEE,
            min_fee: constants::DEFAULT_WITHDRAWAL_MIN_FEE,
            max_fee: constants::DEFAULT_WITHDRAWAL_MAX_FEE,
            network_fee: constants::DEFAULT_WITHDRAWAL_NETWORK_FEE,
        }
    }
}

/// Tunable platform settings shared by all engine jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Platform fee percent on escrow release. Read at release time, not at
    /// hold time, so rate changes apply to already-held funds.
    pub escrow_fee_percent: Decimal,
    /// Auto-release window for digital goods, in hours.
    pub digital_release_hours: i64,
    /// Auto-release window for physical goods, in hours.
    pub physical_release_hours: i64,
    /// Deposit request lifetime, in minutes.
    pub deposit_ttl_minutes: i64,
    /// Fingerprint matching tolerance (±units).
    pub fingerprint_tolerance: u32,
    /// Fraction of overpayment tolerated when matching (e.g. 0.01).
    pub overpay_tolerance: Decimal,
    /// Fraction of underpayment tolerated when matching (e.g. 0.05).
    pub underpay_tolerance: Decimal,
    /// Withdrawal fee schedule.
    pub fees: FeeSchedule,
    /// Maximum withdrawals per user per rolling day.
    pub daily_withdrawal_count: usize,
    /// Maximum fiat withdrawn per user per rolling day.
    pub daily_withdrawal_fiat: Decimal,
    /// Addresses swept per job pass.
    pub sweep_batch_size: usize,
    /// Delay between sweep items, in milliseconds.
    pub sweep_delay_ms: u64,
}

impl EngineConfig {
    /// The auto-release window for a product kind.
    #[must_use]
    pub fn release_window_hours(&self, kind: ProductKind) -> i64 {
        match kind {
            ProductKind::Digital => self.digital_release_hours,
            ProductKind::Physical => self.physical_release_hours,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            escrow_fee_percent: constants::DEFAULT_ESCROW_FEE_PERCENT,
            digital_release_hours: constants::DEFAULT_DIGITAL_RELEASE_HOURS,
            physical_release_hours: constants::DEFAULT_PHYSICAL_RELEASE_HOURS,
            deposit_ttl_minutes: constants::DEFAULT_DEPOSIT_TTL_MINUTES,
            fingerprint_tolerance: constants::DEFAULT_FINGERPRINT_TOLERANCE,
            overpay_tolerance: constants::OVERPAY_TOLERANCE,
            underpay_tolerance: constants::UNDERPAY_TOLERANCE,
            fees: FeeSchedule::default(),
            daily_withdrawal_count: constants::DEFAULT_DAILY_WITHDRAWAL_COUNT,
            daily_withdrawal_fiat: constants::DEFAULT_DAILY_WITHDRAWAL_FIAT,
            sweep_batch_size: constants::DEFAULT_SWEEP_BATCH_SIZE,
            sweep_delay_ms: constants::DEFAULT_SWEEP_DELAY_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_formula_matches_schedule() {
        // €20 at 1.5% with min €0.50 / max €25 plus €2.50 network fee:
        // percent component = 0.30 → clamped up to 0.50 → total 3.00
        let fees = FeeSchedule::default();
        assert_eq!(fees.fee_for(Decimal::new(20, 0)), Decimal::new(3, 0));
    }

    #[test]
    fn fee_percent_component_clamps_at_max() {
        let fees = FeeSchedule::default();
        // €10,000 × 1.5% = €150 → clamped to €25 → total €27.50
        assert_eq!(fees.fee_for(Decimal::new(10_000, 0)), Decimal::new(2750, 2));
    }

    #[test]
    fn fee_percent_component_clamps_at_min() {
        let fees = FeeSchedule::default();
        // €1 × 1.5% = €0.015 → clamped to €0.50 → total €3.00
        assert_eq!(fees.fee_for(Decimal::ONE), Decimal::new(3, 0));
    }

    #[test]
    fn release_window_depends_on_product_kind() {
        let cfg = EngineConfig::default();
        assert!(
            cfg.release_window_hours(ProductKind::Digital)
                < cfg.release_window_hours(ProductKind::Physical)
        );
    }

    #[test]
    fn coin_config_for_each_coin() {
        for coin in Coin::ALL {
            let cfg = CoinConfig::for_coin(coin);
            assert_eq!(cfg.coin, coin);
            assert!(cfg.dust_threshold > Decimal::ZERO);
            assert!(cfg.fallback_rate > Decimal::ZERO);
        }
    }

    #[test]
    fn engine_config_serde_roundtrip() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.escrow_fee_percent, cfg.escrow_fee_percent);
        assert_eq!(back.fingerprint_tolerance, cfg.fingerprint_tolerance);
    }
}
