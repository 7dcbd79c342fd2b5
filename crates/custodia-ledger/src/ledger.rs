//! The append-only ledger and the balances it governs.
//!
//! Entries, balances, and the set of seen external transaction hashes
//! share one mutex. Every balance mutation happens inside the same
//! critical section as its entry insert, so the ledger and the balances
//! can never disagree, and a duplicate hash is rejected before any money
//! moves.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;
use tracing::debug;

use custodia_types::{
    Coin, CustodiaError, EntryDirection, EntryId, EntryKind, EntryStatus, LedgerEntry, Result,
    TxHash, UserId, WalletBalance,
};

#[derive(Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    seen_hashes: HashSet<TxHash>,
    balances: HashMap<(UserId, Coin), WalletBalance>,
}

impl LedgerState {
    fn claim_hash(&mut self, tx_hash: &Option<TxHash>) -> Result<()> {
        if let Some(hash) = tx_hash {
            if !self.seen_hashes.insert(hash.clone()) {
                return Err(CustodiaError::DuplicateTransaction(hash.clone()));
            }
        }
        Ok(())
    }

    fn balance_mut(&mut self, user: UserId, coin: Coin) -> &mut WalletBalance {
        self.balances.entry((user, coin)).or_default()
    }

    fn entry_mut(&mut self, id: EntryId) -> Result<&mut LedgerEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(CustodiaError::EntryNotFound(id))
    }
}

/// Append-only ledger plus the per-user, per-coin balances it governs.
#[derive(Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =================================================================
    // Mutations
    // =================================================================

    /// Credit `crypto` to the user's available balance and append a
    /// completed entry. When `tx_hash` is given it is claimed atomically
    /// with the credit — a hash already in the ledger fails the whole
    /// call with [`CustodiaError::DuplicateTransaction`] and no balance
    /// moves.
    pub fn credit(
        &self,
        user: UserId,
        coin: Coin,
        kind: EntryKind,
        fiat: Decimal,
        crypto: Decimal,
        tx_hash: Option<TxHash>,
    ) -> Result<EntryId> {
        let mut state = self.lock();
        state.claim_hash(&tx_hash)?;

        let balance = state.balance_mut(user, coin);
        balance.available += crypto;
        if kind == EntryKind::Deposit {
            balance.lifetime_deposited += crypto;
        }

        let entry = LedgerEntry::new(
            user,
            coin,
            kind,
            EntryDirection::Credit,
            fiat,
            crypto,
            tx_hash,
            EntryStatus::Completed,
        );
        let id = entry.id;
        debug!(entry = %id, %user, %coin, %kind, %crypto, "ledger credit");
        state.entries.push(entry);
        Ok(id)
    }

    /// Deduct `crypto` from the user's available balance and append a
    /// *pending* debit entry. The deduction happens immediately; callers
    /// later settle the entry with [`complete_entry`](Self::complete_entry)
    /// or compensate it with [`fail_entry`](Self::fail_entry).
    pub fn debit_pending(
        &self,
        user: UserId,
        coin: Coin,
        kind: EntryKind,
        fiat: Decimal,
        crypto: Decimal,
    ) -> Result<EntryId> {
        let mut state = self.lock();

        let balance = state.balance_mut(user, coin);
        if balance.available < crypto {
            return Err(CustodiaError::InsufficientBalance {
                needed: crypto,
                available: balance.available,
            });
        }
        balance.available -= crypto;

        let entry = LedgerEntry::new(
            user,
            coin,
            kind,
            EntryDirection::Debit,
            fiat,
            crypto,
            None,
            EntryStatus::Pending,
        );
        let id = entry.id;
        debug!(entry = %id, %user, %coin, %kind, %crypto, "ledger pending debit");
        state.entries.push(entry);
        Ok(id)
    }

    /// Debit the user immediately as a *completed* entry. Used at escrow
    /// checkout, where the buyer's spend settles internally with no
    /// on-chain leg.
    pub fn debit(
        &self,
        user: UserId,
        coin: Coin,
        kind: EntryKind,
        fiat: Decimal,
        crypto: Decimal,
    ) -> Result<EntryId> {
        let id = self.debit_pending(user, coin, kind, fiat, crypto)?;
        self.complete_entry(id, None)?;
        Ok(id)
    }

    /// Append a seller's claim on escrowed funds: a pending credit that
    /// moves no money. Promoted to a real credit at release via
    /// [`promote_claim`](Self::promote_claim), or voided on refund.
    pub fn append_claim(
        &self,
        user: UserId,
        coin: Coin,
        fiat: Decimal,
        crypto: Decimal,
    ) -> EntryId {
        let entry = LedgerEntry::new(
            user,
            coin,
            EntryKind::SalePending,
            EntryDirection::Credit,
            fiat,
            crypto,
            None,
            EntryStatus::Pending,
        );
        let id = entry.id;
        debug!(entry = %id, %user, %coin, %crypto, "ledger sale claim");
        self.lock().entries.push(entry);
        id
    }

    /// Promote a `sale_pending` claim into a settled `sale`. The claim was
    /// recorded at the gross amount; the final fiat/crypto figures are the
    /// seller's net share after the fee split computed at release time. The
    /// net amount credits the seller's balance now, and the entry becomes a
    /// completed `sale` carrying the payout hash (when one exists).
    pub fn promote_claim(
        &self,
        id: EntryId,
        fiat: Decimal,
        crypto: Decimal,
        tx_hash: Option<TxHash>,
    ) -> Result<()> {
        let mut state = self.lock();
        state.claim_hash(&tx_hash)?;

        let entry = state.entry_mut(id)?;
        if entry.kind != EntryKind::SalePending || entry.status != EntryStatus::Pending {
            return Err(CustodiaError::EntryStatusConflict {
                expected: EntryStatus::Pending,
                actual: entry.status,
            });
        }
        entry.kind = EntryKind::Sale;
        entry.status = EntryStatus::Completed;
        entry.fiat_amount = fiat;
        entry.crypto_amount = crypto;
        if tx_hash.is_some() {
            entry.tx_hash = tx_hash;
        }
        let (user, coin) = (entry.user_id, entry.coin);
        state.balance_mut(user, coin).available += crypto;
        debug!(entry = %id, %user, %coin, %crypto, "sale claim promoted");
        Ok(())
    }

    /// Void a pending claim without moving money (escrow was refunded).
    pub fn void_claim(&self, id: EntryId) -> Result<()> {
        let mut state = self.lock();
        let entry = state.entry_mut(id)?;
        if entry.status != EntryStatus::Pending {
            return Err(CustodiaError::EntryStatusConflict {
                expected: EntryStatus::Pending,
                actual: entry.status,
            });
        }
        entry.status = EntryStatus::Failed;
        Ok(())
    }

    /// Append a completed entry that records an external event without
    /// touching any balance (a pool sweep, for instance). The hash still
    /// joins the idempotency set, so a sweep transaction arriving at the
    /// pool can never be mistaken for a fresh deposit.
    pub fn record_external(
        &self,
        user: UserId,
        coin: Coin,
        kind: EntryKind,
        fiat: Decimal,
        crypto: Decimal,
        tx_hash: TxHash,
    ) -> Result<EntryId> {
        let mut state = self.lock();
        let hash = Some(tx_hash);
        state.claim_hash(&hash)?;

        let entry = LedgerEntry::new(
            user,
            coin,
            kind,
            EntryDirection::Credit,
            fiat,
            crypto,
            hash,
            EntryStatus::Completed,
        );
        let id = entry.id;
        state.entries.push(entry);
        Ok(id)
    }

    /// Settle a pending entry, attaching the external hash when the
    /// operation had an on-chain leg.
    pub fn complete_entry(&self, id: EntryId, tx_hash: Option<TxHash>) -> Result<()> {
        let mut state = self.lock();
        state.claim_hash(&tx_hash)?;

        let entry = state.entry_mut(id)?;
        if entry.status != EntryStatus::Pending {
            return Err(CustodiaError::EntryStatusConflict {
                expected: EntryStatus::Pending,
                actual: entry.status,
            });
        }
        entry.status = EntryStatus::Completed;
        if tx_hash.is_some() {
            entry.tx_hash = tx_hash;
        }
        Ok(())
    }

    /// Fail a pending entry and compensate its balance move: a failed
    /// debit refunds the user in full. The entry stays in the ledger as
    /// the audit record of the attempt.
    pub fn fail_entry(&self, id: EntryId) -> Result<()> {
        let mut state = self.lock();
        let entry = state.entry_mut(id)?;
        if entry.status != EntryStatus::Pending {
            return Err(CustodiaError::EntryStatusConflict {
                expected: EntryStatus::Pending,
                actual: entry.status,
            });
        }
        entry.status = EntryStatus::Failed;
        let refund = match entry.direction {
            EntryDirection::Debit => entry.crypto_amount,
            EntryDirection::Credit => Decimal::ZERO,
        };
        let (user, coin) = (entry.user_id, entry.coin);
        if !refund.is_zero() {
            state.balance_mut(user, coin).available += refund;
            debug!(entry = %id, %user, %coin, %refund, "failed debit compensated");
        }
        Ok(())
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Whether an external transaction hash is already recorded.
    #[must_use]
    pub fn has_tx(&self, hash: &TxHash) -> bool {
        self.lock().seen_hashes.contains(hash)
    }

    /// The user's balance for `coin`. Zero if never touched.
    #[must_use]
    pub fn balance(&self, user: UserId, coin: Coin) -> WalletBalance {
        self.lock()
            .balances
            .get(&(user, coin))
            .cloned()
            .unwrap_or_default()
    }

    /// All entries for one user, oldest first.
    #[must_use]
    pub fn entries_for_user(&self, user: UserId) -> Vec<LedgerEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.user_id == user)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<LedgerEntry> {
        self.lock().entries.iter().find(|e| e.id == id).cloned()
    }

    /// Sum of all available balances for `coin` — the internal liability
    /// the pool must be able to cover.
    #[must_use]
    pub fn total_available(&self, coin: Coin) -> Decimal {
        self.lock()
            .balances
            .iter()
            .filter(|((_, c), _)| *c == coin)
            .map(|(_, b)| b.available)
            .sum()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: i64, scale: u32) -> Decimal {
        Decimal::new(value, scale)
    }

    #[test]
    fn credit_moves_balance_and_appends_entry() {
        let ledger = Ledger::new();
        let user = UserId::new();
        ledger
            .credit(
                user,
                Coin::Btc,
                EntryKind::Deposit,
                dec(50, 0),
                dec(1, 3),
                Some(TxHash::new("tx-1")),
            )
            .unwrap();

        let bal = ledger.balance(user, Coin::Btc);
        assert_eq!(bal.available, dec(1, 3));
        assert_eq!(bal.lifetime_deposited, dec(1, 3));
        assert_eq!(ledger.entries_for_user(user).len(), 1);
        assert!(ledger.has_tx(&TxHash::new("tx-1")));
    }

    #[test]
    fn duplicate_hash_is_rejected_without_balance_change() {
        let ledger = Ledger::new();
        let user = UserId::new();
        let hash = TxHash::new("tx-dup");
        ledger
            .credit(user, Coin::Btc, EntryKind::Deposit, dec(50, 0), dec(1, 3), Some(hash.clone()))
            .unwrap();
        let err = ledger
            .credit(user, Coin::Btc, EntryKind::Deposit, dec(50, 0), dec(1, 3), Some(hash))
            .unwrap_err();
        assert!(matches!(err, CustodiaError::DuplicateTransaction(_)));
        assert_eq!(ledger.balance(user, Coin::Btc).available, dec(1, 3));
        assert_eq!(ledger.entries_for_user(user).len(), 1);
    }

    #[test]
    fn debit_requires_available_balance() {
        let ledger = Ledger::new();
        let user = UserId::new();
        let err = ledger
            .debit_pending(user, Coin::Ltc, EntryKind::Withdrawal, dec(20, 0), dec(5, 1))
            .unwrap_err();
        assert!(matches!(err, CustodiaError::InsufficientBalance { .. }));
        assert!(ledger.entries_for_user(user).is_empty());
    }

    #[test]
    fn failed_debit_restores_the_balance() {
        let ledger = Ledger::new();
        let user = UserId::new();
        ledger
            .credit(user, Coin::Btc, EntryKind::Deposit, dec(50, 0), dec(1, 3), None)
            .unwrap();
        let id = ledger
            .debit_pending(user, Coin::Btc, EntryKind::Withdrawal, dec(25, 0), dec(5, 4))
            .unwrap();
        assert_eq!(ledger.balance(user, Coin::Btc).available, dec(5, 4));

        ledger.fail_entry(id).unwrap();
        assert_eq!(ledger.balance(user, Coin::Btc).available, dec(1, 3));
        let entry = ledger.entry(id).unwrap();
        assert_eq!(entry.status, EntryStatus::Failed);
    }

    #[test]
    fn completed_entry_cannot_be_failed() {
        let ledger = Ledger::new();
        let user = UserId::new();
        ledger
            .credit(user, Coin::Btc, EntryKind::Deposit, dec(50, 0), dec(1, 3), None)
            .unwrap();
        let id = ledger
            .debit_pending(user, Coin::Btc, EntryKind::Withdrawal, dec(25, 0), dec(5, 4))
            .unwrap();
        ledger.complete_entry(id, Some(TxHash::new("payout-1"))).unwrap();

        let err = ledger.fail_entry(id).unwrap_err();
        assert!(matches!(err, CustodiaError::EntryStatusConflict { .. }));
        // The deduction stands.
        assert_eq!(ledger.balance(user, Coin::Btc).available, dec(5, 4));
    }

    #[test]
    fn claim_moves_no_money_until_promoted() {
        let ledger = Ledger::new();
        let seller = UserId::new();
        // Gross claim at checkout; net share settles at release.
        let id = ledger.append_claim(seller, Coin::Xmr, dec(100, 0), dec(600, 3));
        assert!(ledger.balance(seller, Coin::Xmr).is_zero());

        ledger
            .promote_claim(id, dec(96, 0), dec(576, 3), Some(TxHash::new("payout-2")))
            .unwrap();
        assert_eq!(ledger.balance(seller, Coin::Xmr).available, dec(576, 3));
        let entry = ledger.entry(id).unwrap();
        assert_eq!(entry.kind, EntryKind::Sale);
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.crypto_amount, dec(576, 3));
    }

    #[test]
    fn voided_claim_never_credits() {
        let ledger = Ledger::new();
        let seller = UserId::new();
        let id = ledger.append_claim(seller, Coin::Btc, dec(100, 0), dec(2, 3));
        ledger.void_claim(id).unwrap();
        assert!(ledger.balance(seller, Coin::Btc).is_zero());

        let err = ledger
            .promote_claim(id, dec(96, 0), dec(192, 5), None)
            .unwrap_err();
        assert!(matches!(err, CustodiaError::EntryStatusConflict { .. }));
        assert!(ledger.balance(seller, Coin::Btc).is_zero());
    }

    #[test]
    fn external_record_claims_the_hash_without_balance() {
        let ledger = Ledger::new();
        let platform = UserId::platform();
        let hash = TxHash::new("sweep-1");
        ledger
            .record_external(platform, Coin::Btc, EntryKind::Sweep, Decimal::ZERO, dec(3, 3), hash.clone())
            .unwrap();
        assert!(ledger.balance(platform, Coin::Btc).is_zero());
        assert!(ledger.has_tx(&hash));

        // A matcher pass seeing the sweep land at the pool cannot credit it.
        let err = ledger
            .credit(UserId::new(), Coin::Btc, EntryKind::Deposit, dec(150, 0), dec(3, 3), Some(hash))
            .unwrap_err();
        assert!(matches!(err, CustodiaError::DuplicateTransaction(_)));
    }

    #[test]
    fn total_available_sums_one_coin_only() {
        let ledger = Ledger::new();
        let a = UserId::new();
        let b = UserId::new();
        ledger.credit(a, Coin::Btc, EntryKind::Deposit, dec(50, 0), dec(1, 3), None).unwrap();
        ledger.credit(b, Coin::Btc, EntryKind::Deposit, dec(100, 0), dec(2, 3), None).unwrap();
        ledger.credit(b, Coin::Ltc, EntryKind::Deposit, dec(80, 0), dec(1, 0), None).unwrap();
        assert_eq!(ledger.total_available(Coin::Btc), dec(3, 3));
        assert_eq!(ledger.total_available(Coin::Ltc), dec(1, 0));
    }
}
