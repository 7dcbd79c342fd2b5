//! Deposit request model.
//!
//! A [`DepositRequest`] is one user's declared intent to deposit a
//! fiat-denominated amount in a given coin. The exchange rate is locked at
//! creation time and the exact crypto amount the user must send carries an
//! embedded [`Fingerprint`] as a pseudo payment-reference.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Coin, DepositId, Fingerprint, TxHash, UserId};

/// Lifecycle status of a deposit request.
///
/// Forward path: `Pending → Received → Confirmed → Completed`.
/// `Expired` and `Closed` are the terminal no-payment outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    /// Awaiting an on-chain payment.
    Pending,
    /// A zero-confirmation transaction matched; hash recorded, no money moved.
    Received,
    /// The transaction confirmed and the hash is recorded, but the balance
    /// credit has not completed yet. Safe to retry the credit.
    Confirmed,
    /// The balance was credited. Terminal.
    Completed,
    /// The request passed its expiry without a matching payment. Terminal.
    Expired,
    /// The request was closed by the user or an operator. Terminal.
    Closed,
}

impl DepositStatus {
    /// Terminal states never transition again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Closed)
    }

    /// Active requests participate in payment matching.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Received => "RECEIVED",
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::Expired => "EXPIRED",
            Self::Closed => "CLOSED",
        };
        write!(f, "{s}")
    }
}

/// One user's declared intent to deposit `requested_fiat` worth of `coin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub id: DepositId,
    pub user_id: UserId,
    pub coin: Coin,
    /// The fiat value the user asked to deposit.
    pub requested_fiat: Decimal,
    /// The exact crypto amount the user was told to send (fingerprint
    /// embedded in its lower digits).
    pub crypto_amount: Decimal,
    /// Exchange rate locked at creation time (fiat per whole coin).
    /// Crediting always uses this rate, never the live one.
    pub locked_rate: Decimal,
    /// The address the user was told to pay.
    pub target_address: String,
    /// The pseudo payment-reference embedded in `crypto_amount`.
    pub fingerprint: Fingerprint,
    pub status: DepositStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Hash of the matched on-chain transaction, once one is found.
    pub matched_tx: Option<TxHash>,
    /// Confirmation count of the matched transaction at last observation.
    pub confirmations: u32,
    /// The fiat value actually credited (clamped to `requested_fiat`).
    pub credited_fiat: Option<Decimal>,
}

impl DepositRequest {
    /// Create a new pending request. Converts `requested_fiat` at `rate`,
    /// embeds a freshly drawn random fingerprint into the amount, and sets
    /// the expiry `ttl_minutes` from now.
    #[must_use]
    pub fn new(
        user_id: UserId,
        coin: Coin,
        requested_fiat: Decimal,
        rate: Decimal,
        target_address: String,
        ttl_minutes: i64,
    ) -> Self {
        let base_units = coin.to_atomic(requested_fiat / rate);
        let fingerprint = Fingerprint::random();
        let crypto_amount = coin.from_atomic(fingerprint.embed(base_units));
        let now = Utc::now();
        Self {
            id: DepositId::new(),
            user_id,
            coin,
            requested_fiat,
            crypto_amount,
            locked_rate: rate,
            target_address,
            fingerprint,
            status: DepositStatus::Pending,
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
            matched_tx: None,
            confirmations: 0,
            credited_fiat: None,
        }
    }

    /// Whether the request has outlived its expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The fiat value to credit for a matched crypto amount: the locked
    /// rate applies, clamped to the requested fiat value so marginal
    /// overpayment never credits more than the user asked for.
    #[must_use]
    pub fn credit_value(&self, matched_crypto: Decimal) -> Decimal {
        (matched_crypto * self.locked_rate).min(self.requested_fiat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(fiat: i64, rate: i64) -> DepositRequest {
        DepositRequest::new(
            UserId::new(),
            Coin::Btc,
            Decimal::new(fiat, 0),
            Decimal::new(rate, 0),
            "bc1pooladdress".to_string(),
            60,
        )
    }

    #[test]
    fn new_request_embeds_its_fingerprint() {
        let req = request(50, 50_000);
        assert_eq!(
            Fingerprint::of_amount(req.coin, req.crypto_amount),
            req.fingerprint
        );
        assert_eq!(req.status, DepositStatus::Pending);
        assert!(req.matched_tx.is_none());
    }

    #[test]
    fn crypto_amount_stays_near_requested_value() {
        // €50 at €50,000/BTC is 0.001 BTC; the embedded fingerprint only
        // perturbs the 10^2..10^6 digit window (< 0.01 BTC).
        let req = request(50, 50_000);
        let diff = (req.crypto_amount - Decimal::new(1, 3)).abs();
        assert!(diff < Decimal::new(1, 2), "diff={diff}");
    }

    #[test]
    fn credit_value_clamps_overpayment() {
        let mut req = request(50, 50_000);
        req.crypto_amount = Decimal::new(1, 3); // exactly 0.001
        // 2% overpayment would credit €51 unclamped
        let credited = req.credit_value(Decimal::new(102, 5));
        assert_eq!(credited, Decimal::new(50, 0));
    }

    #[test]
    fn credit_value_uses_locked_rate_for_underpayment() {
        let req = request(50, 50_000);
        // 0.00098 BTC at the locked rate = €49
        let credited = req.credit_value(Decimal::new(98, 5));
        assert_eq!(credited, Decimal::new(49, 0));
    }

    #[test]
    fn expiry_is_ttl_from_creation() {
        let req = request(50, 50_000);
        assert!(!req.is_expired(req.created_at));
        assert!(req.is_expired(req.created_at + Duration::minutes(60)));
    }

    #[test]
    fn status_terminality() {
        assert!(DepositStatus::Pending.is_active());
        assert!(DepositStatus::Received.is_active());
        assert!(DepositStatus::Confirmed.is_active());
        assert!(DepositStatus::Completed.is_terminal());
        assert!(DepositStatus::Expired.is_terminal());
        assert!(DepositStatus::Closed.is_terminal());
    }
}
