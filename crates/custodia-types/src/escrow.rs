//! Escrow holding model.
//!
//! One [`EscrowHolding`] exists per (order, seller) pair: funds earmarked
//! for the seller but not yet released from platform custody. The gross
//! crypto amount is locked at holding creation; the fee/seller split is
//! computed at release time.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Coin, EntryId, HoldingId, OrderId, TxHash, UserId};

/// Lifecycle status of an escrow holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Funds are held pending a release condition.
    Held,
    /// Funds were released to the seller (minus the platform fee). Terminal.
    Released,
    /// Funds were returned to the buyer. Terminal.
    Refunded,
}

impl EscrowStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Held => "HELD",
            Self::Released => "RELEASED",
            Self::Refunded => "REFUNDED",
        };
        write!(f, "{s}")
    }
}

/// Outcome of the on-chain payout attempted at release.
///
/// A failed broadcast does not block the internal credit: on-chain
/// settlement failures become an operational reconciliation problem,
/// not a reason to strand the seller's funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// No payout attempted yet.
    Pending,
    /// The payout transaction was broadcast.
    Broadcast,
    /// The broadcast failed; the internal credit still happened.
    Failed,
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Broadcast => "BROADCAST",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// What kind of product the order line covers. Determines the auto-release
/// window: digital goods release quickly, physical goods wait for shipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Digital,
    Physical,
}

/// Funds owed to a seller for one order line, held pending release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowHolding {
    pub id: HoldingId,
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub coin: Coin,
    /// Gross amount in fiat at checkout time.
    pub total_fiat: Decimal,
    /// Gross amount in crypto, locked at checkout time. The release split
    /// is computed on this figure, never on a re-quoted rate.
    pub total_crypto: Decimal,
    pub fee_fiat: Decimal,
    pub fee_crypto: Decimal,
    pub seller_fiat: Decimal,
    pub seller_crypto: Decimal,
    /// Drives the auto-release window length.
    pub product_kind: ProductKind,
    /// The seller's `sale_pending` ledger row, settled or voided when the
    /// holding resolves.
    pub claim_entry: Option<EntryId>,
    pub status: EscrowStatus,
    /// When the holding auto-releases without explicit buyer action.
    pub auto_release_at: DateTime<Utc>,
    pub payout_tx: Option<TxHash>,
    pub payout_status: PayoutStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EscrowHolding {
    /// Create a held escrow for one (order, seller) pair. The split fields
    /// stay zero until release computes them.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        buyer_id: UserId,
        seller_id: UserId,
        coin: Coin,
        total_fiat: Decimal,
        total_crypto: Decimal,
        product_kind: ProductKind,
        release_window_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: HoldingId::new(),
            order_id,
            buyer_id,
            seller_id,
            coin,
            total_fiat,
            total_crypto,
            fee_fiat: Decimal::ZERO,
            fee_crypto: Decimal::ZERO,
            seller_fiat: Decimal::ZERO,
            seller_crypto: Decimal::ZERO,
            product_kind,
            claim_entry: None,
            status: EscrowStatus::Held,
            auto_release_at: now + Duration::hours(release_window_hours),
            payout_tx: None,
            payout_status: PayoutStatus::Pending,
            created_at: now,
            resolved_at: None,
        }
    }

    /// Compute the fee/seller split at `fee_percent` on the locked gross
    /// amounts. `seller = total − fee` by construction, so the split
    /// invariant holds exactly.
    pub fn apply_split(&mut self, fee_percent: Decimal) {
        self.fee_fiat = self.total_fiat * fee_percent;
        self.fee_crypto = self.total_crypto * fee_percent;
        self.seller_fiat = self.total_fiat - self.fee_fiat;
        self.seller_crypto = self.total_crypto - self.fee_crypto;
    }

    /// Whether `seller + fee == total` in both units, within `epsilon`.
    #[must_use]
    pub fn split_is_consistent(&self, epsilon: Decimal) -> bool {
        let fiat_drift = (self.seller_fiat + self.fee_fiat - self.total_fiat).abs();
        let crypto_drift = (self.seller_crypto + self.fee_crypto - self.total_crypto).abs();
        fiat_drift <= epsilon && crypto_drift <= epsilon
    }

    /// Whether the auto-release deadline has passed.
    #[must_use]
    pub fn auto_release_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EscrowStatus::Held && now >= self.auto_release_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::AMOUNT_EPSILON;

    fn holding() -> EscrowHolding {
        EscrowHolding::new(
            OrderId::new(),
            UserId::new(),
            UserId::new(),
            Coin::Btc,
            Decimal::new(100, 0),
            Decimal::new(2, 3), // 0.002 BTC
            ProductKind::Digital,
            48,
        )
    }

    #[test]
    fn new_holding_is_held_with_zero_split() {
        let h = holding();
        assert_eq!(h.status, EscrowStatus::Held);
        assert_eq!(h.fee_crypto, Decimal::ZERO);
        assert_eq!(h.seller_crypto, Decimal::ZERO);
        assert_eq!(h.payout_status, PayoutStatus::Pending);
    }

    #[test]
    fn split_adds_back_to_total() {
        let mut h = holding();
        h.apply_split(Decimal::new(4, 2)); // 4%
        assert_eq!(h.fee_fiat, Decimal::new(4, 0));
        assert_eq!(h.seller_fiat, Decimal::new(96, 0));
        assert!(h.split_is_consistent(AMOUNT_EPSILON));
        assert_eq!(h.seller_crypto + h.fee_crypto, h.total_crypto);
    }

    #[test]
    fn split_consistency_detects_drift() {
        let mut h = holding();
        h.apply_split(Decimal::new(4, 2));
        h.seller_crypto += Decimal::new(1, 3);
        assert!(!h.split_is_consistent(AMOUNT_EPSILON));
    }

    #[test]
    fn auto_release_due_only_when_held_and_past_deadline() {
        let mut h = holding();
        assert!(!h.auto_release_due(h.created_at));
        assert!(h.auto_release_due(h.auto_release_at + Duration::seconds(1)));

        h.status = EscrowStatus::Released;
        assert!(!h.auto_release_due(h.auto_release_at + Duration::seconds(1)));
    }

    #[test]
    fn status_terminality() {
        assert!(!EscrowStatus::Held.is_terminal());
        assert!(EscrowStatus::Released.is_terminal());
        assert!(EscrowStatus::Refunded.is_terminal());
    }
}
