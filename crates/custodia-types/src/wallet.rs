//! Custodial wallet state: balances, deposit addresses, and the pool.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Coin, DepositId, TxHash, UserId};

/// Per-user, per-coin custodial balance.
///
/// Only the ledger mutates these, and only together with the insert of the
/// corresponding [`crate::LedgerEntry`] — balance and ledger stay consistent
/// by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletBalance {
    /// Spendable internal balance in whole-coin units.
    pub available: Decimal,
    /// Lifetime total ever deposited, for solvency reporting.
    pub lifetime_deposited: Decimal,
}

impl WalletBalance {
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: Decimal::ZERO,
            lifetime_deposited: Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero()
    }
}

impl Default for WalletBalance {
    fn default() -> Self {
        Self::new()
    }
}

/// An ephemeral custodial keypair owned by one user for one coin.
///
/// The private key is stored encrypted and never leaves the key vault
/// boundary in plaintext. Addresses are deactivated after sweeping but
/// never deleted — the audit trail requires them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositAddress {
    pub user_id: UserId,
    pub coin: Coin,
    pub address: String,
    /// Vault-encrypted private key (hex, nonce prepended).
    pub encrypted_key: String,
    /// The deposit request this address was issued for, if per-request.
    pub deposit_id: Option<DepositId>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub swept_at: Option<DateTime<Utc>>,
    pub sweep_tx: Option<TxHash>,
    pub swept_amount: Option<Decimal>,
}

impl DepositAddress {
    #[must_use]
    pub fn is_swept(&self) -> bool {
        self.swept_at.is_some()
    }
}

/// The platform's single consolidated custodial address for one coin.
///
/// Funds every outbound payout. Its encrypted key is the most sensitive
/// secret in the system; consumers must re-check the live on-chain balance
/// immediately before broadcasting — `tracked_balance` is bookkeeping, not
/// a liquidity guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolAddress {
    pub coin: Coin,
    pub address: String,
    /// Vault-encrypted private key (hex, nonce prepended).
    pub encrypted_key: String,
    /// Where escrow fee payouts go on-chain.
    pub fee_address: String,
    /// Sweep-incremented running total. Informational only.
    pub tracked_balance: Decimal,
}
