//! System-wide constants for the Custodia settlement engine.

use rust_decimal::Decimal;

/// Fingerprint digit window: lowest digit position included (10^2).
pub const FINGERPRINT_DIVISOR: u64 = 100;

/// Fingerprint digit window: number of digit values covered (10^2..10^6).
pub const FINGERPRINT_MODULUS: u64 = 10_000;

/// Default fingerprint matching tolerance (±units).
pub const DEFAULT_FINGERPRINT_TOLERANCE: u32 = 5;

/// Overpayment tolerance for deposit matching: 1%.
pub const OVERPAY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Underpayment tolerance for deposit matching: 5%. Absorbs network-fee
/// deduction by the sending wallet.
pub const UNDERPAY_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Rounding tolerance for the escrow split invariant
/// (`seller + fee == total`), in whole-coin units.
pub const AMOUNT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// Default lifetime of a deposit request before it expires, in minutes.
pub const DEFAULT_DEPOSIT_TTL_MINUTES: i64 = 60;

/// Default escrow auto-release window for digital goods, in hours.
pub const DEFAULT_DIGITAL_RELEASE_HOURS: i64 = 48;

/// Default escrow auto-release window for physical goods, in hours.
pub const DEFAULT_PHYSICAL_RELEASE_HOURS: i64 = 336; // 14 days

/// Default escrow fee taken by the platform on release: 4%.
pub const DEFAULT_ESCROW_FEE_PERCENT: Decimal = Decimal::from_parts(4, 0, 0, false, 2);

/// Default withdrawal percent fee: 1.5%.
pub const DEFAULT_WITHDRAWAL_PERCENT_FEE: Decimal = Decimal::from_parts(15, 0, 0, false, 3);

/// Default withdrawal minimum percent-fee component, in fiat.
pub const DEFAULT_WITHDRAWAL_MIN_FEE: Decimal = Decimal::from_parts(50, 0, 0, false, 2); // 0.50

/// Default withdrawal maximum percent-fee component, in fiat.
pub const DEFAULT_WITHDRAWAL_MAX_FEE: Decimal = Decimal::from_parts(25, 0, 0, false, 0); // 25.00

/// Default flat network-fee component of a withdrawal, in fiat.
pub const DEFAULT_WITHDRAWAL_NETWORK_FEE: Decimal = Decimal::from_parts(250, 0, 0, false, 2); // 2.50

/// Default maximum number of withdrawals per user per rolling day.
pub const DEFAULT_DAILY_WITHDRAWAL_COUNT: usize = 5;

/// Default maximum fiat withdrawn per user per rolling day.
pub const DEFAULT_DAILY_WITHDRAWAL_FIAT: Decimal = Decimal::from_parts(5_000, 0, 0, false, 0);

/// Default number of addresses swept per job pass.
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 20;

/// Default delay between sweep items, in milliseconds. Keeps the chain
/// data vendor's rate limiter happy.
pub const DEFAULT_SWEEP_DELAY_MS: u64 = 250;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Custodia";
