//! Deposit matcher — attributes observed on-chain payments to open
//! deposit requests and credits them exactly once.
//!
//! Attribution cascade per observed payment:
//! 1. a payment to a request's dedicated address is attributed directly;
//! 2. a payment to the shared pool address matches by amount fingerprint
//!    within the configured tolerance;
//! 3. failing that, by amount window (underpayment up to the configured
//!    fraction, to absorb sender-side network fees; overpayment up to a
//!    smaller fraction).
//!
//! A payment that matches more than one open request is ambiguous and left
//! alone — the requests stay `pending` until expiry. Crediting always uses
//! the rate locked at request creation, clamped to the requested fiat.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use custodia_types::{
    Coin, CoinConfig, CustodiaError, DepositRequest, DepositStatus, EntryKind, Fingerprint,
    Result, TxHash, UserId,
};

use crate::SettlementEngine;

/// Counters for one matcher pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatcherSummary {
    /// Zero-confirmation matches recorded this pass.
    pub matched: usize,
    /// Requests credited and completed this pass.
    pub credited: usize,
    /// Per-item failures logged and skipped.
    pub errors: usize,
}

impl SettlementEngine {
    /// Open a deposit request: lock the live rate, embed a fresh random
    /// fingerprint into the crypto amount, and issue a dedicated custodial
    /// address. A user may hold one active request per coin.
    pub async fn open_deposit(
        &self,
        user: UserId,
        coin: Coin,
        requested_fiat: Decimal,
    ) -> Result<DepositRequest> {
        if requested_fiat <= Decimal::ZERO {
            return Err(CustodiaError::Configuration(
                "deposit amount must be positive".to_string(),
            ));
        }
        let rate = self.oracle().get_rate(coin).await?;

        let mut address = self.issuer().issue(user, coin, None)?;
        let request = DepositRequest::new(
            user,
            coin,
            requested_fiat,
            rate,
            address.address.clone(),
            self.config().deposit_ttl_minutes,
        );
        address.deposit_id = Some(request.id);

        self.deposits().insert(request.clone())?;
        self.addresses().insert(address);
        info!(
            deposit = %request.id,
            %user,
            %coin,
            fiat = %requested_fiat,
            amount = %request.crypto_amount,
            fingerprint = %request.fingerprint,
            "deposit request opened"
        );
        Ok(request)
    }

    /// One matcher pass over every coin. A chain-client failure for one
    /// address is logged and skipped; the rest of the pass continues.
    pub async fn run_matcher_pass(&self) -> MatcherSummary {
        let mut summary = MatcherSummary::default();
        for coin in Coin::ALL {
            self.match_coin(coin, &mut summary).await;
        }
        if summary.matched + summary.credited + summary.errors > 0 {
            info!(
                matched = summary.matched,
                credited = summary.credited,
                errors = summary.errors,
                "matcher pass done"
            );
        }
        summary
    }

    async fn match_coin(&self, coin: Coin, summary: &mut MatcherSummary) {
        let actives = self.deposits().active_for_coin(coin);
        if actives.is_empty() {
            return;
        }
        let required = CoinConfig::for_coin(coin).confirmations_required;

        // Dedicated addresses: each request watches its own target.
        for request in &actives {
            let txs = match self
                .chain()
                .get_transactions(coin, &request.target_address)
                .await
            {
                Ok(txs) => txs,
                Err(err) => {
                    warn!(deposit = %request.id, address = %request.target_address, error = %err, "chain lookup failed");
                    summary.errors += 1;
                    continue;
                }
            };
            let pick = if let Some(matched) = &request.matched_tx {
                txs.iter().find(|tx| &tx.hash == matched)
            } else {
                txs.iter().find(|tx| {
                    tx.paid_to(&request.target_address) > Decimal::ZERO
                        && !self.ledger().has_tx(&tx.hash)
                })
            };
            if let Some(tx) = pick {
                let amount = tx.paid_to(&request.target_address);
                self.observe(request, &tx.hash, amount, tx.confirmations, required, summary);
            }
        }

        // Pool address: attribution by fingerprint, then amount window.
        let Ok(pool) = self.pools().get(coin) else {
            return;
        };
        let pool_txs = match self.chain().get_transactions(coin, &pool.address).await {
            Ok(txs) => txs,
            Err(err) => {
                warn!(%coin, address = %pool.address, error = %err, "pool chain lookup failed");
                summary.errors += 1;
                return;
            }
        };
        for tx in pool_txs {
            let amount = tx.paid_to(&pool.address);
            if amount <= Decimal::ZERO {
                continue;
            }
            // Statuses may have moved above; work from a fresh snapshot.
            let actives = self.deposits().active_for_coin(coin);
            if let Some(request) = actives
                .iter()
                .find(|r| r.matched_tx.as_ref() == Some(&tx.hash))
            {
                self.observe(request, &tx.hash, amount, tx.confirmations, required, summary);
                continue;
            }
            if self.ledger().has_tx(&tx.hash) {
                continue;
            }
            if let Some(request) = self.attribute(&actives, coin, amount) {
                self.observe(request, &tx.hash, amount, tx.confirmations, required, summary);
            }
        }
    }

    /// Pick the unique open request a pool payment belongs to, or none.
    fn attribute<'a>(
        &self,
        actives: &'a [DepositRequest],
        coin: Coin,
        amount: Decimal,
    ) -> Option<&'a DepositRequest> {
        let unmatched: Vec<&DepositRequest> = actives
            .iter()
            .filter(|r| r.status == DepositStatus::Pending)
            .collect();

        let observed = Fingerprint::of_amount(coin, amount);
        let tolerance = self.config().fingerprint_tolerance;
        let by_fingerprint: Vec<&DepositRequest> = unmatched
            .iter()
            .copied()
            .filter(|r| r.fingerprint.matches(observed, tolerance))
            .collect();
        match by_fingerprint.as_slice() {
            [request] => return Some(*request),
            [] => {}
            _ => {
                warn!(%coin, %amount, %observed, "ambiguous fingerprint match, leaving requests pending");
                return None;
            }
        }

        let by_window: Vec<&DepositRequest> = unmatched
            .iter()
            .copied()
            .filter(|r| self.within_amount_window(r, amount))
            .collect();
        match by_window.as_slice() {
            [request] => Some(*request),
            [] => None,
            _ => {
                warn!(%coin, %amount, "ambiguous amount-window match, leaving requests pending");
                None
            }
        }
    }

    fn within_amount_window(&self, request: &DepositRequest, amount: Decimal) -> bool {
        let expected = request.crypto_amount;
        let low = expected * (Decimal::ONE - self.config().underpay_tolerance);
        let high = expected * (Decimal::ONE + self.config().overpay_tolerance);
        amount >= low && amount <= high
    }

    /// Apply one observed payment to its request. Confirmation threshold
    /// decides between a zero-conf `received` note and the full
    /// confirm-credit-complete move; the ledger's duplicate-hash guard
    /// makes the credit safe to retry from `confirmed`.
    fn observe(
        &self,
        request: &DepositRequest,
        hash: &TxHash,
        amount: Decimal,
        confirmations: u32,
        required: u32,
        summary: &mut MatcherSummary,
    ) {
        if confirmations >= required {
            if self
                .deposits()
                .mark_confirmed(request.id, hash.clone(), confirmations)
                .is_err()
            {
                // Already terminal; nothing to do.
                return;
            }
            let credited = request.credit_value(amount);
            match self.ledger().credit(
                request.user_id,
                request.coin,
                EntryKind::Deposit,
                credited,
                amount,
                Some(hash.clone()),
            ) {
                Ok(_) => {
                    if self.deposits().mark_completed(request.id, credited).is_ok() {
                        summary.credited += 1;
                    }
                }
                Err(CustodiaError::DuplicateTransaction(_)) => {
                    // A previous or concurrent pass won the credit; finish
                    // the status move if it didn't get there.
                    let _ = self.deposits().mark_completed(request.id, credited);
                }
                Err(err) => {
                    warn!(deposit = %request.id, error = %err, "credit failed, left confirmed for retry");
                    summary.errors += 1;
                }
            }
        } else if request.status == DepositStatus::Pending
            && self
                .deposits()
                .mark_received(request.id, hash.clone(), confirmations)
                .is_ok()
        {
            summary.matched += 1;
        }
    }

    /// Expire requests past their deadline that never saw a payment. A
    /// request with an observed zero-conf payment is left to confirm.
    pub fn run_expiry_pass(&self) -> usize {
        let now = Utc::now();
        let mut expired = 0;
        for request in self.deposits().active() {
            if request.status == DepositStatus::Pending
                && request.is_expired(now)
                && self.deposits().mark_expired(request.id).is_ok()
            {
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, "deposit expiry pass");
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use custodia_clients::{MockBroadcaster, MockChain, StaticRates};
    use custodia_types::{EngineConfig, PoolAddress};
    use custodia_vault::KeyVault;

    use super::*;

    fn engine_with_chain(chain: Arc<MockChain>) -> SettlementEngine {
        let oracle = StaticRates::new().with(Coin::Btc, Decimal::new(50_000, 0));
        SettlementEngine::new(
            EngineConfig::default(),
            Arc::new(KeyVault::new("test-secret")),
            Arc::new(oracle),
            chain,
            Arc::new(MockBroadcaster::new()),
        )
    }

    fn engine() -> SettlementEngine {
        engine_with_chain(Arc::new(MockChain::new()))
    }

    fn register_pool(engine: &SettlementEngine) -> String {
        let address = format!("bc1{}", "p".repeat(40));
        engine.register_pool(PoolAddress {
            coin: Coin::Btc,
            address: address.clone(),
            encrypted_key: KeyVault::new("test-secret").encrypt("pool-key").unwrap(),
            fee_address: format!("bc1{}", "f".repeat(40)),
            tracked_balance: Decimal::ZERO,
        });
        address
    }

    /// A pending request with a pinned fingerprint and crypto amount, for
    /// attribution tests that need controlled collisions.
    fn pinned_request(fingerprint: u32, units: i64) -> DepositRequest {
        let mut request = DepositRequest::new(
            UserId::new(),
            Coin::Btc,
            Decimal::new(50, 0),
            Decimal::new(50_000, 0),
            format!("bc1{}", "a".repeat(40)),
            60,
        );
        request.fingerprint = Fingerprint(fingerprint);
        request.crypto_amount = Decimal::new(units, 8);
        request
    }

    #[tokio::test]
    async fn amount_window_boundaries() {
        let engine = engine();
        let request = engine
            .open_deposit(UserId::new(), Coin::Btc, Decimal::new(50, 0))
            .await
            .unwrap();
        let expected = request.crypto_amount;

        // 5% under and 1% over are in; beyond either edge is out.
        assert!(engine.within_amount_window(&request, expected));
        assert!(engine.within_amount_window(&request, expected * Decimal::new(95, 2)));
        assert!(engine.within_amount_window(&request, expected * Decimal::new(101, 2)));
        assert!(!engine.within_amount_window(&request, expected * Decimal::new(94, 2)));
        assert!(!engine.within_amount_window(&request, expected * Decimal::new(102, 2)));
    }

    #[tokio::test]
    async fn second_active_request_same_coin_is_rejected() {
        let engine = engine();
        let user = UserId::new();
        engine
            .open_deposit(user, Coin::Btc, Decimal::new(50, 0))
            .await
            .unwrap();
        let err = engine
            .open_deposit(user, Coin::Btc, Decimal::new(20, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, CustodiaError::ActiveDepositExists { .. }));
    }

    #[tokio::test]
    async fn ambiguous_fingerprint_match_leaves_requests_pending() {
        let chain = Arc::new(MockChain::new());
        let engine = engine_with_chain(chain.clone());
        let pool = register_pool(&engine);

        // One pool payment (fingerprint 1236) within tolerance of both.
        let a = pinned_request(1234, 123_400);
        let b = pinned_request(1237, 123_700);
        engine.deposits().insert(a.clone()).unwrap();
        engine.deposits().insert(b.clone()).unwrap();
        chain.seed_payment(&pool, "tx-collide", Decimal::new(123_600, 8), 1);

        let summary = engine.run_matcher_pass().await;

        // Never guess: both stay pending and no money moves.
        assert_eq!(summary.matched + summary.credited, 0);
        assert_eq!(
            engine.deposits().get(a.id).unwrap().status,
            DepositStatus::Pending
        );
        assert_eq!(
            engine.deposits().get(b.id).unwrap().status,
            DepositStatus::Pending
        );
        assert_eq!(engine.ledger().entry_count(), 0);
        assert!(!engine.ledger().has_tx(&TxHash::new("tx-collide")));
    }

    #[tokio::test]
    async fn ambiguous_amount_window_match_leaves_requests_pending() {
        let chain = Arc::new(MockChain::new());
        let engine = engine_with_chain(chain.clone());
        let pool = register_pool(&engine);

        // The payment's fingerprint (5010) misses both, but its amount sits
        // inside both requests' underpayment windows.
        let a = pinned_request(5000, 500_000);
        let b = pinned_request(5050, 505_000);
        engine.deposits().insert(a.clone()).unwrap();
        engine.deposits().insert(b.clone()).unwrap();
        chain.seed_payment(&pool, "tx-overlap", Decimal::new(501_000, 8), 1);

        let summary = engine.run_matcher_pass().await;

        assert_eq!(summary.matched + summary.credited, 0);
        assert_eq!(
            engine.deposits().get(a.id).unwrap().status,
            DepositStatus::Pending
        );
        assert_eq!(
            engine.deposits().get(b.id).unwrap().status,
            DepositStatus::Pending
        );
        assert_eq!(engine.ledger().entry_count(), 0);
    }

    #[tokio::test]
    async fn non_positive_amount_is_rejected() {
        let engine = engine();
        let err = engine
            .open_deposit(UserId::new(), Coin::Btc, Decimal::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, CustodiaError::Configuration(_)));
    }
}
