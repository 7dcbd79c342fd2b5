//! Record books: interior-mutex registries with status-guarded transitions.
//!
//! Each book owns the canonical copy of its records. Transitions check the
//! current status under the lock and return a typed conflict error when the
//! record is not where the caller expects it, which makes concurrent job
//! passes safe: the second pass to attempt the same transition loses
//! cleanly instead of double-applying it.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use custodia_types::{
    Coin, CustodiaError, DepositAddress, DepositId, DepositRequest, DepositStatus, EscrowHolding,
    EscrowStatus, HoldingId, PoolAddress, Result, TxHash, UserId, WithdrawalId, WithdrawalRequest,
    WithdrawalStatus,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =================================================================
// Deposit book
// =================================================================

/// Registry of deposit requests.
///
/// Enforces one *active* request per (user, coin): a second concurrent
/// request would make amount-fingerprint matching ambiguous.
#[derive(Default)]
pub struct DepositBook {
    requests: Mutex<HashMap<DepositId, DepositRequest>>,
}

impl DepositBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request: DepositRequest) -> Result<DepositId> {
        let mut requests = lock(&self.requests);
        let clash = requests.values().any(|r| {
            r.user_id == request.user_id && r.coin == request.coin && r.status.is_active()
        });
        if clash {
            return Err(CustodiaError::ActiveDepositExists { coin: request.coin });
        }
        let id = request.id;
        requests.insert(id, request);
        Ok(id)
    }

    pub fn get(&self, id: DepositId) -> Result<DepositRequest> {
        lock(&self.requests)
            .get(&id)
            .cloned()
            .ok_or(CustodiaError::DepositNotFound(id))
    }

    /// All non-terminal requests for `coin` — the matcher's work set.
    #[must_use]
    pub fn active_for_coin(&self, coin: Coin) -> Vec<DepositRequest> {
        lock(&self.requests)
            .values()
            .filter(|r| r.coin == coin && r.status.is_active())
            .cloned()
            .collect()
    }

    /// All non-terminal requests across coins.
    #[must_use]
    pub fn active(&self) -> Vec<DepositRequest> {
        lock(&self.requests)
            .values()
            .filter(|r| r.status.is_active())
            .cloned()
            .collect()
    }

    fn transition(
        &self,
        id: DepositId,
        allowed: &[DepositStatus],
        expected: DepositStatus,
        apply: impl FnOnce(&mut DepositRequest),
    ) -> Result<()> {
        let mut requests = lock(&self.requests);
        let request = requests
            .get_mut(&id)
            .ok_or(CustodiaError::DepositNotFound(id))?;
        if !allowed.contains(&request.status) {
            return Err(CustodiaError::DepositStatusConflict {
                expected,
                actual: request.status,
            });
        }
        apply(request);
        Ok(())
    }

    /// A zero-confirmation match was observed: record the hash, no money.
    pub fn mark_received(&self, id: DepositId, tx: TxHash, confirmations: u32) -> Result<()> {
        self.transition(id, &[DepositStatus::Pending], DepositStatus::Pending, |r| {
            r.status = DepositStatus::Received;
            r.matched_tx = Some(tx);
            r.confirmations = confirmations;
        })
    }

    /// The matched transaction reached the confirmation threshold. Safe to
    /// call repeatedly; a confirmed request just refreshes its count.
    pub fn mark_confirmed(&self, id: DepositId, tx: TxHash, confirmations: u32) -> Result<()> {
        self.transition(
            id,
            &[
                DepositStatus::Pending,
                DepositStatus::Received,
                DepositStatus::Confirmed,
            ],
            DepositStatus::Received,
            |r| {
                r.status = DepositStatus::Confirmed;
                r.matched_tx = Some(tx);
                r.confirmations = confirmations;
            },
        )
    }

    /// The balance credit went through. Terminal.
    pub fn mark_completed(&self, id: DepositId, credited_fiat: Decimal) -> Result<()> {
        self.transition(
            id,
            &[DepositStatus::Confirmed],
            DepositStatus::Confirmed,
            |r| {
                r.status = DepositStatus::Completed;
                r.credited_fiat = Some(credited_fiat);
                info!(deposit = %r.id, user = %r.user_id, %credited_fiat, "deposit completed");
            },
        )
    }

    /// The request outlived its TTL without seeing any payment. Terminal.
    /// Only `Pending` requests expire; a `Received` request has a zero-conf
    /// payment on record and is left to confirm.
    pub fn mark_expired(&self, id: DepositId) -> Result<()> {
        self.transition(
            id,
            &[DepositStatus::Pending],
            DepositStatus::Pending,
            |r| r.status = DepositStatus::Expired,
        )
    }

    /// Close an active request on user or operator action. Terminal.
    pub fn close(&self, id: DepositId) -> Result<()> {
        self.transition(
            id,
            &[
                DepositStatus::Pending,
                DepositStatus::Received,
                DepositStatus::Confirmed,
            ],
            DepositStatus::Pending,
            |r| r.status = DepositStatus::Closed,
        )
    }
}

// =================================================================
// Escrow book
// =================================================================

/// Registry of escrow holdings, with a claim set that serializes
/// resolution: only one caller at a time may resolve a given holding.
#[derive(Default)]
pub struct EscrowBook {
    holdings: Mutex<HashMap<HoldingId, EscrowHolding>>,
    claimed: Mutex<HashSet<HoldingId>>,
}

impl EscrowBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, holding: EscrowHolding) -> HoldingId {
        let id = holding.id;
        lock(&self.holdings).insert(id, holding);
        id
    }

    pub fn get(&self, id: HoldingId) -> Result<EscrowHolding> {
        lock(&self.holdings)
            .get(&id)
            .cloned()
            .ok_or(CustodiaError::HoldingNotFound(id))
    }

    /// Held holdings whose auto-release deadline has passed.
    #[must_use]
    pub fn held_due(&self, now: DateTime<Utc>) -> Vec<EscrowHolding> {
        lock(&self.holdings)
            .values()
            .filter(|h| h.auto_release_due(now))
            .cloned()
            .collect()
    }

    /// Claim a held holding for resolution. Fails if the holding already
    /// left `held` or another caller holds the claim. The claim must be
    /// settled with [`resolve`](Self::resolve) or dropped with
    /// [`abort_claim`](Self::abort_claim).
    pub fn claim(&self, id: HoldingId) -> Result<EscrowHolding> {
        let holdings = lock(&self.holdings);
        let holding = holdings.get(&id).ok_or(CustodiaError::HoldingNotFound(id))?;
        if holding.status != EscrowStatus::Held {
            return Err(CustodiaError::HoldingStatusConflict {
                expected: EscrowStatus::Held,
                actual: holding.status,
            });
        }
        if !lock(&self.claimed).insert(id) {
            return Err(CustodiaError::HoldingStatusConflict {
                expected: EscrowStatus::Held,
                actual: holding.status,
            });
        }
        Ok(holding.clone())
    }

    /// Write back a resolved holding and release the claim.
    pub fn resolve(&self, holding: EscrowHolding) -> Result<()> {
        let id = holding.id;
        let mut holdings = lock(&self.holdings);
        if !holdings.contains_key(&id) {
            return Err(CustodiaError::HoldingNotFound(id));
        }
        info!(holding = %id, status = %holding.status, payout = %holding.payout_status, "escrow resolved");
        holdings.insert(id, holding);
        lock(&self.claimed).remove(&id);
        Ok(())
    }

    /// Drop a claim without resolving (an early step failed).
    pub fn abort_claim(&self, id: HoldingId) {
        lock(&self.claimed).remove(&id);
    }
}

// =================================================================
// Withdrawal book
// =================================================================

/// Registry of withdrawal requests, also the source of the velocity
/// counters the submit path enforces.
#[derive(Default)]
pub struct WithdrawalBook {
    requests: Mutex<HashMap<WithdrawalId, WithdrawalRequest>>,
}

impl WithdrawalBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request: WithdrawalRequest) -> WithdrawalId {
        let id = request.id;
        lock(&self.requests).insert(id, request);
        id
    }

    pub fn get(&self, id: WithdrawalId) -> Result<WithdrawalRequest> {
        lock(&self.requests)
            .get(&id)
            .cloned()
            .ok_or(CustodiaError::WithdrawalNotFound(id))
    }

    fn transition(
        &self,
        id: WithdrawalId,
        allowed: &[WithdrawalStatus],
        expected: WithdrawalStatus,
        apply: impl FnOnce(&mut WithdrawalRequest),
    ) -> Result<()> {
        let mut requests = lock(&self.requests);
        let request = requests
            .get_mut(&id)
            .ok_or(CustodiaError::WithdrawalNotFound(id))?;
        if !allowed.contains(&request.status) {
            return Err(CustodiaError::WithdrawalStatusConflict {
                expected,
                actual: request.status,
            });
        }
        apply(request);
        Ok(())
    }

    /// Balance deducted; broadcast in flight.
    pub fn mark_processing(&self, id: WithdrawalId) -> Result<()> {
        self.transition(
            id,
            &[WithdrawalStatus::Pending],
            WithdrawalStatus::Pending,
            |r| r.status = WithdrawalStatus::Processing,
        )
    }

    /// Broadcast succeeded. Terminal.
    pub fn mark_completed(&self, id: WithdrawalId, tx: TxHash) -> Result<()> {
        self.transition(
            id,
            &[WithdrawalStatus::Processing],
            WithdrawalStatus::Processing,
            |r| {
                r.status = WithdrawalStatus::Completed;
                r.payout_tx = Some(tx);
                r.resolved_at = Some(Utc::now());
            },
        )
    }

    /// Broadcast failed and the balance was restored. Terminal; the vendor
    /// error is kept verbatim for support.
    pub fn mark_failed(&self, id: WithdrawalId, error: &str) -> Result<()> {
        self.transition(
            id,
            &[WithdrawalStatus::Pending, WithdrawalStatus::Processing],
            WithdrawalStatus::Processing,
            |r| {
                r.status = WithdrawalStatus::Failed;
                r.error = Some(error.to_string());
                r.resolved_at = Some(Utc::now());
            },
        )
    }

    /// Non-failed requests a user created after `since`. Failed attempts
    /// do not count against velocity limits.
    #[must_use]
    pub fn counted_since(&self, user: UserId, since: DateTime<Utc>) -> Vec<WithdrawalRequest> {
        lock(&self.requests)
            .values()
            .filter(|r| {
                r.user_id == user
                    && r.created_at >= since
                    && r.status != WithdrawalStatus::Failed
            })
            .cloned()
            .collect()
    }
}

// =================================================================
// Address book
// =================================================================

/// Registry of custodial deposit addresses, keyed by address string, plus
/// the users' registered external payout addresses. Deposit addresses are
/// deactivated after sweeping but never removed.
#[derive(Default)]
pub struct AddressBook {
    addresses: Mutex<HashMap<String, DepositAddress>>,
    payout: Mutex<HashMap<(UserId, Coin), String>>,
}

impl AddressBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, address: DepositAddress) {
        lock(&self.addresses).insert(address.address.clone(), address);
    }

    pub fn get(&self, address: &str) -> Result<DepositAddress> {
        lock(&self.addresses)
            .get(address)
            .cloned()
            .ok_or_else(|| CustodiaError::AddressNotFound(address.to_string()))
    }

    /// Active, unswept addresses for `coin` — the matcher's watch set and
    /// the sweep job's candidate pool.
    #[must_use]
    pub fn unswept_for_coin(&self, coin: Coin) -> Vec<DepositAddress> {
        lock(&self.addresses)
            .values()
            .filter(|a| a.coin == coin && a.active && !a.is_swept())
            .cloned()
            .collect()
    }

    /// The user's most recently issued deposit address for `coin`,
    /// preferring one that has not been drained yet.
    #[must_use]
    pub fn latest_for_user(&self, user: UserId, coin: Coin) -> Option<DepositAddress> {
        let addresses = lock(&self.addresses);
        let mine = || {
            addresses
                .values()
                .filter(|a| a.user_id == user && a.coin == coin)
        };
        mine()
            .filter(|a| !a.is_swept())
            .max_by_key(|a| a.created_at)
            .or_else(|| mine().max_by_key(|a| a.created_at))
            .cloned()
    }

    /// Register the user's external payout address for `coin` (seller
    /// payouts at escrow release go here).
    pub fn set_payout_address(&self, user: UserId, coin: Coin, address: String) {
        lock(&self.payout).insert((user, coin), address);
    }

    #[must_use]
    pub fn payout_address(&self, user: UserId, coin: Coin) -> Option<String> {
        lock(&self.payout).get(&(user, coin)).cloned()
    }

    /// Record a sweep outcome and retire the address. `tx` is `None` for
    /// dust balances written off without a broadcast.
    pub fn mark_swept(
        &self,
        address: &str,
        tx: Option<TxHash>,
        amount: Decimal,
    ) -> Result<()> {
        let mut addresses = lock(&self.addresses);
        let record = addresses
            .get_mut(address)
            .ok_or_else(|| CustodiaError::AddressNotFound(address.to_string()))?;
        if record.is_swept() {
            return Err(CustodiaError::AlreadySwept(address.to_string()));
        }
        record.swept_at = Some(Utc::now());
        record.sweep_tx = tx;
        record.swept_amount = Some(amount);
        record.active = false;
        Ok(())
    }
}

// =================================================================
// Pool registry
// =================================================================

/// The per-coin consolidated pool wallets.
#[derive(Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<Coin, PoolAddress>>,
}

impl PoolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, pool: PoolAddress) {
        lock(&self.pools).insert(pool.coin, pool);
    }

    pub fn get(&self, coin: Coin) -> Result<PoolAddress> {
        lock(&self.pools)
            .get(&coin)
            .cloned()
            .ok_or(CustodiaError::PoolNotConfigured(coin))
    }

    /// Bump the informational running total after a sweep lands.
    pub fn add_tracked(&self, coin: Coin, amount: Decimal) -> Result<()> {
        let mut pools = lock(&self.pools);
        let pool = pools
            .get_mut(&coin)
            .ok_or(CustodiaError::PoolNotConfigured(coin))?;
        pool.tracked_balance += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_types::ProductKind;

    fn deposit(user: UserId, coin: Coin) -> DepositRequest {
        DepositRequest::new(
            user,
            coin,
            Decimal::new(50, 0),
            Decimal::new(50_000, 0),
            format!("{}{}", coin.address_prefix(), "a".repeat(40)),
            60,
        )
    }

    #[test]
    fn one_active_deposit_per_user_and_coin() {
        let book = DepositBook::new();
        let user = UserId::new();
        book.insert(deposit(user, Coin::Btc)).unwrap();

        let err = book.insert(deposit(user, Coin::Btc)).unwrap_err();
        assert!(matches!(err, CustodiaError::ActiveDepositExists { .. }));
        // A different coin is fine.
        book.insert(deposit(user, Coin::Xmr)).unwrap();
    }

    #[test]
    fn terminal_deposit_frees_the_slot() {
        let book = DepositBook::new();
        let user = UserId::new();
        let id = book.insert(deposit(user, Coin::Btc)).unwrap();
        book.mark_expired(id).unwrap();
        book.insert(deposit(user, Coin::Btc)).unwrap();
    }

    #[test]
    fn deposit_forward_path() {
        let book = DepositBook::new();
        let id = book.insert(deposit(UserId::new(), Coin::Btc)).unwrap();

        book.mark_received(id, TxHash::new("tx-a"), 0).unwrap();
        book.mark_confirmed(id, TxHash::new("tx-a"), 2).unwrap();
        // Re-confirmation refreshes the count without conflict.
        book.mark_confirmed(id, TxHash::new("tx-a"), 3).unwrap();
        book.mark_completed(id, Decimal::new(49, 0)).unwrap();

        let req = book.get(id).unwrap();
        assert_eq!(req.status, DepositStatus::Completed);
        assert_eq!(req.confirmations, 3);
        assert_eq!(req.credited_fiat, Some(Decimal::new(49, 0)));
    }

    #[test]
    fn received_deposit_cannot_expire() {
        let book = DepositBook::new();
        let id = book.insert(deposit(UserId::new(), Coin::Btc)).unwrap();
        book.mark_received(id, TxHash::new("tx-zc"), 0).unwrap();

        // A zero-conf payment is on record; the request waits to confirm.
        assert!(matches!(
            book.mark_expired(id).unwrap_err(),
            CustodiaError::DepositStatusConflict { .. }
        ));
        assert_eq!(book.get(id).unwrap().status, DepositStatus::Received);
    }

    #[test]
    fn completed_deposit_rejects_further_transitions() {
        let book = DepositBook::new();
        let id = book.insert(deposit(UserId::new(), Coin::Ltc)).unwrap();
        book.mark_confirmed(id, TxHash::new("tx-b"), 1).unwrap();
        book.mark_completed(id, Decimal::new(50, 0)).unwrap();

        assert!(matches!(
            book.mark_expired(id).unwrap_err(),
            CustodiaError::DepositStatusConflict { .. }
        ));
        assert!(matches!(
            book.mark_completed(id, Decimal::ZERO).unwrap_err(),
            CustodiaError::DepositStatusConflict { .. }
        ));
    }

    fn holding() -> EscrowHolding {
        EscrowHolding::new(
            custodia_types::OrderId::new(),
            UserId::new(),
            UserId::new(),
            Coin::Btc,
            Decimal::new(100, 0),
            Decimal::new(2, 3),
            ProductKind::Digital,
            48,
        )
    }

    #[test]
    fn escrow_claim_is_exclusive() {
        let book = EscrowBook::new();
        let id = book.insert(holding());

        let claimed = book.claim(id).unwrap();
        let err = book.claim(id).unwrap_err();
        assert!(matches!(err, CustodiaError::HoldingStatusConflict { .. }));

        let mut resolved = claimed;
        resolved.status = EscrowStatus::Released;
        book.resolve(resolved).unwrap();

        // Terminal now; a fresh claim also fails.
        let err = book.claim(id).unwrap_err();
        assert!(matches!(err, CustodiaError::HoldingStatusConflict { .. }));
    }

    #[test]
    fn aborted_claim_can_be_retried() {
        let book = EscrowBook::new();
        let id = book.insert(holding());
        book.claim(id).unwrap();
        book.abort_claim(id);
        book.claim(id).unwrap();
    }

    #[test]
    fn held_due_filters_by_deadline_and_status() {
        let book = EscrowBook::new();
        let h = holding();
        let deadline = h.auto_release_at;
        let id = book.insert(h);

        assert!(book.held_due(deadline - chrono::Duration::hours(1)).is_empty());
        assert_eq!(book.held_due(deadline).len(), 1);

        let mut resolved = book.claim(id).unwrap();
        resolved.status = EscrowStatus::Refunded;
        book.resolve(resolved).unwrap();
        assert!(book.held_due(deadline).is_empty());
    }

    #[test]
    fn withdrawal_failed_attempts_do_not_count() {
        let book = WithdrawalBook::new();
        let user = UserId::new();
        let since = Utc::now() - chrono::Duration::days(1);

        let ok = WithdrawalRequest::new(
            user,
            Coin::Btc,
            Decimal::new(20, 0),
            Decimal::new(35, 5),
            Decimal::new(280, 2),
            "bc1dest".to_string(),
        );
        let failed = WithdrawalRequest::new(
            user,
            Coin::Btc,
            Decimal::new(20, 0),
            Decimal::new(35, 5),
            Decimal::new(280, 2),
            "bc1dest".to_string(),
        );
        let ok_id = book.insert(ok);
        let failed_id = book.insert(failed);
        book.mark_processing(ok_id).unwrap();
        book.mark_completed(ok_id, TxHash::new("tx-w")).unwrap();
        book.mark_processing(failed_id).unwrap();
        book.mark_failed(failed_id, "vendor said no").unwrap();

        assert_eq!(book.counted_since(user, since).len(), 1);
        let failed = book.get(failed_id).unwrap();
        assert_eq!(failed.error.as_deref(), Some("vendor said no"));
    }

    #[test]
    fn address_sweeps_once() {
        let book = AddressBook::new();
        let addr = DepositAddress {
            user_id: UserId::new(),
            coin: Coin::Btc,
            address: "bc1sweepme".to_string(),
            encrypted_key: "00".to_string(),
            deposit_id: None,
            active: true,
            created_at: Utc::now(),
            swept_at: None,
            sweep_tx: None,
            swept_amount: None,
        };
        book.insert(addr);

        assert_eq!(book.unswept_for_coin(Coin::Btc).len(), 1);
        book.mark_swept("bc1sweepme", Some(TxHash::new("sweep-tx")), Decimal::new(1, 3))
            .unwrap();
        assert!(book.unswept_for_coin(Coin::Btc).is_empty());

        let err = book
            .mark_swept("bc1sweepme", None, Decimal::ZERO)
            .unwrap_err();
        assert!(matches!(err, CustodiaError::AlreadySwept(_)));
    }

    #[test]
    fn pool_registry_tracks_per_coin() {
        let registry = PoolRegistry::new();
        assert!(matches!(
            registry.get(Coin::Btc).unwrap_err(),
            CustodiaError::PoolNotConfigured(Coin::Btc)
        ));

        registry.set(PoolAddress {
            coin: Coin::Btc,
            address: "bc1pool".to_string(),
            encrypted_key: "00".to_string(),
            fee_address: "bc1fees".to_string(),
            tracked_balance: Decimal::ZERO,
        });
        registry.add_tracked(Coin::Btc, Decimal::new(5, 3)).unwrap();
        assert_eq!(
            registry.get(Coin::Btc).unwrap().tracked_balance,
            Decimal::new(5, 3)
        );
    }
}
