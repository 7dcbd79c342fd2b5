//! Ledger entry model: immutable records of balance-affecting events.
//!
//! Entries double as the idempotency key set — an external transaction hash
//! must never be credited twice, so the ledger refuses duplicate hashes.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Coin, EntryId, TxHash, UserId};

/// What kind of balance-affecting event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// An on-chain deposit credited to a user.
    Deposit,
    /// A payout of internal balance back on-chain.
    Withdrawal,
    /// Escrowed funds released to a seller.
    Sale,
    /// A seller's claim on held escrow funds; moves no money.
    SalePending,
    /// A buyer's spend at checkout (or its refund, as a credit).
    Purchase,
    /// Consolidation of a deposit address into the pool.
    Sweep,
    /// Platform fee collected on an escrow release.
    FeeCollected,
}

impl EntryKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Sale => "sale",
            Self::SalePending => "sale_pending",
            Self::Purchase => "purchase",
            Self::Sweep => "sweep",
            Self::FeeCollected => "fee_collected",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which way the entry moves the user's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryDirection {
    Credit,
    Debit,
}

/// Settlement status of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// The balance moved but the external step (broadcast) is in flight.
    Pending,
    Completed,
    /// The external step failed and the balance move was compensated.
    Failed,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Immutable record of one balance-affecting event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub coin: Coin,
    pub kind: EntryKind,
    pub direction: EntryDirection,
    pub fiat_amount: Decimal,
    pub crypto_amount: Decimal,
    /// External transaction hash, when the event has an on-chain leg.
    /// Unique across the whole ledger.
    pub tx_hash: Option<TxHash>,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    #[must_use]
    pub fn new(
        user_id: UserId,
        coin: Coin,
        kind: EntryKind,
        direction: EntryDirection,
        fiat_amount: Decimal,
        crypto_amount: Decimal,
        tx_hash: Option<TxHash>,
        status: EntryStatus,
    ) -> Self {
        Self {
            id: EntryId::new(),
            user_id,
            coin,
            kind,
            direction,
            fiat_amount,
            crypto_amount,
            tx_hash,
            status,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_match_wire_names() {
        assert_eq!(EntryKind::SalePending.as_str(), "sale_pending");
        assert_eq!(EntryKind::FeeCollected.as_str(), "fee_collected");
        assert_eq!(EntryKind::Sweep.to_string(), "sweep");
    }

    #[test]
    fn serde_roundtrip() {
        let entry = LedgerEntry::new(
            UserId::new(),
            Coin::Btc,
            EntryKind::Deposit,
            EntryDirection::Credit,
            Decimal::new(50, 0),
            Decimal::new(1, 3),
            Some(TxHash::new("abc123")),
            EntryStatus::Completed,
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: LedgerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, entry.id);
        assert_eq!(back.kind, EntryKind::Deposit);
        assert_eq!(back.tx_hash, entry.tx_hash);
    }
}
