//! Withdrawal request model.
//!
//! A [`WithdrawalRequest`] moves internal balance back on-chain. A `Failed`
//! terminal state is always paired with a balance refund — the pipeline
//! never leaves a user under-credited without a compensating action.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Coin, TxHash, UserId, WithdrawalId};

/// Lifecycle status of a withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Validated but not yet executing.
    Pending,
    /// Balance deducted; broadcast in flight.
    Processing,
    /// Broadcast succeeded; hash attached. Terminal.
    Completed,
    /// Broadcast failed; balance was restored. Terminal.
    Failed,
}

impl WithdrawalStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// A user's request to move internal balance to an external address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub coin: Coin,
    /// Gross fiat amount the user asked to withdraw (fee included).
    pub fiat_amount: Decimal,
    /// Net crypto amount actually paid out.
    pub crypto_amount: Decimal,
    /// Total fee in fiat: clamped percent fee plus flat network fee.
    pub fee_fiat: Decimal,
    pub destination: String,
    pub status: WithdrawalStatus,
    pub payout_tx: Option<TxHash>,
    /// Vendor error message when the broadcast was rejected.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl WithdrawalRequest {
    #[must_use]
    pub fn new(
        user_id: UserId,
        coin: Coin,
        fiat_amount: Decimal,
        crypto_amount: Decimal,
        fee_fiat: Decimal,
        destination: String,
    ) -> Self {
        Self {
            id: WithdrawalId::new(),
            user_id,
            coin,
            fiat_amount,
            crypto_amount,
            fee_fiat,
            destination,
            status: WithdrawalStatus::Pending,
            payout_tx: None,
            error: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_is_pending() {
        let req = WithdrawalRequest::new(
            UserId::new(),
            Coin::Btc,
            Decimal::new(20, 0),
            Decimal::new(35, 5),
            Decimal::new(280, 2),
            "bc1destination".to_string(),
        );
        assert_eq!(req.status, WithdrawalStatus::Pending);
        assert!(req.payout_tx.is_none());
        assert!(req.error.is_none());
    }

    #[test]
    fn status_terminality() {
        assert!(!WithdrawalStatus::Pending.is_terminal());
        assert!(!WithdrawalStatus::Processing.is_terminal());
        assert!(WithdrawalStatus::Completed.is_terminal());
        assert!(WithdrawalStatus::Failed.is_terminal());
    }

    #[test]
    fn serde_roundtrip() {
        let req = WithdrawalRequest::new(
            UserId::new(),
            Coin::Ltc,
            Decimal::new(100, 0),
            Decimal::new(12, 1),
            Decimal::new(4, 0),
            "ltc1destination".to_string(),
        );
        let json = serde_json::to_string(&req).unwrap();
        let back: WithdrawalRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, req.id);
        assert_eq!(back.status, WithdrawalStatus::Pending);
        assert_eq!(back.crypto_amount, req.crypto_amount);
    }
}
