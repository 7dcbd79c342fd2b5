//! Escrow state machine — hold at checkout, release with a fee split, or
//! refund the buyer.
//!
//! Release order matters: the on-chain legs (seller payout from the
//! buyer-custodied address, fee payout from the pool) run first and are
//! both tolerated to fail; the internal settlement — promoting the
//! seller's `sale_pending` claim and crediting the platform fee account —
//! always happens. Solvency accounting is internal-balance-based, so a
//! failed broadcast becomes an operational reconciliation item, never a
//! stranded seller credit.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use custodia_types::{
    AuditActor, Coin, CustodiaError, EntryKind, EscrowAuditRecord, EscrowHolding, EscrowStatus,
    HoldingId, OrderId, PayoutStatus, ProductKind, Result, TxHash, UserId,
    constants::AMOUNT_EPSILON,
};

use crate::SettlementEngine;

/// Counters for one auto-release pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReleaseSummary {
    pub released: usize,
    pub errors: usize,
}

impl SettlementEngine {
    /// Hold checkout funds for one (order, seller) pair. Debits the buyer
    /// at the live rate and records the seller's pending claim; the fee
    /// split stays uncomputed until release.
    pub async fn create_holding(
        &self,
        order: OrderId,
        buyer: UserId,
        seller: UserId,
        coin: Coin,
        total_fiat: Decimal,
        product_kind: ProductKind,
    ) -> Result<EscrowHolding> {
        let rate = self.oracle().get_rate(coin).await?;
        let total_crypto = total_fiat / rate;

        self.ledger()
            .debit(buyer, coin, EntryKind::Purchase, total_fiat, total_crypto)?;

        let mut holding = EscrowHolding::new(
            order,
            buyer,
            seller,
            coin,
            total_fiat,
            total_crypto,
            product_kind,
            self.config().release_window_hours(product_kind),
        );
        holding.claim_entry =
            Some(self.ledger().append_claim(seller, coin, total_fiat, total_crypto));
        self.escrows().insert(holding.clone());
        info!(
            holding = %holding.id,
            %order,
            %buyer,
            %seller,
            %coin,
            fiat = %total_fiat,
            crypto = %total_crypto,
            "escrow holding created"
        );
        Ok(holding)
    }

    /// Release a held escrow to its seller. The fee percent is read from
    /// configuration *now*, not at hold time, so rate changes apply to
    /// already-held funds. Mutually exclusive with refund via the book's
    /// claim.
    pub async fn release(&self, id: HoldingId, actor: AuditActor) -> Result<EscrowHolding> {
        let holding = self.escrows().claim(id)?;
        match self.release_claimed(holding, actor).await {
            Ok(holding) => Ok(holding),
            Err(err) => {
                self.escrows().abort_claim(id);
                Err(err)
            }
        }
    }

    async fn release_claimed(
        &self,
        mut holding: EscrowHolding,
        actor: AuditActor,
    ) -> Result<EscrowHolding> {
        holding.apply_split(self.config().escrow_fee_percent);
        if !holding.split_is_consistent(AMOUNT_EPSILON) {
            return Err(CustodiaError::SplitMismatch {
                total: holding.total_crypto,
                seller: holding.seller_crypto,
                fee: holding.fee_crypto,
            });
        }

        // On-chain legs, both best-effort.
        let payout_tx = self.broadcast_seller_payout(&holding).await;
        let fee_tx = self.broadcast_fee_payout(&holding).await;

        // Internal settlement, unconditional.
        if let Some(entry) = holding.claim_entry {
            self.ledger().promote_claim(
                entry,
                holding.seller_fiat,
                holding.seller_crypto,
                payout_tx.clone(),
            )?;
        }
        self.ledger().credit(
            UserId::platform(),
            holding.coin,
            EntryKind::FeeCollected,
            holding.fee_fiat,
            holding.fee_crypto,
            fee_tx,
        )?;

        holding.payout_status = if payout_tx.is_some() {
            PayoutStatus::Broadcast
        } else {
            PayoutStatus::Failed
        };
        holding.payout_tx = payout_tx;
        holding.status = EscrowStatus::Released;
        holding.resolved_at = Some(Utc::now());
        self.escrows().resolve(holding.clone())?;

        self.audit().record(EscrowAuditRecord::new(
            holding.id,
            actor,
            EscrowStatus::Held,
            EscrowStatus::Released,
            holding.seller_crypto,
            holding.fee_crypto,
        ));
        Ok(holding)
    }

    /// Seller payout: spend from the buyer's custodial address to the
    /// seller's registered external address. Any missing piece (no
    /// address, vault failure, vendor rejection) downgrades to a failed
    /// payout status without blocking the internal credit.
    async fn broadcast_seller_payout(&self, holding: &EscrowHolding) -> Option<TxHash> {
        let Some(source) = self
            .addresses()
            .latest_for_user(holding.buyer_id, holding.coin)
        else {
            warn!(holding = %holding.id, "no custodial address for buyer, payout skipped");
            return None;
        };
        let Some(destination) = self
            .addresses()
            .payout_address(holding.seller_id, holding.coin)
        else {
            warn!(holding = %holding.id, seller = %holding.seller_id, "no seller payout address, payout skipped");
            return None;
        };
        let key = match self.issuer().reveal_key(&source.encrypted_key) {
            Ok(key) => key,
            Err(err) => {
                warn!(holding = %holding.id, error = %err, "custodial key unavailable, payout skipped");
                return None;
            }
        };
        match self
            .broadcaster()
            .send(
                holding.coin,
                &source.address,
                &key,
                &destination,
                holding.seller_crypto,
            )
            .await
        {
            Ok(hash) => {
                info!(holding = %holding.id, tx = %hash, "seller payout broadcast");
                Some(hash)
            }
            Err(err) => {
                warn!(holding = %holding.id, error = %err, "seller payout broadcast failed");
                None
            }
        }
    }

    /// Fee payout: pool → platform fee address. Re-checks the live pool
    /// balance immediately before broadcasting; the pool is shared
    /// liquidity and the tracked figure is not trusted.
    async fn broadcast_fee_payout(&self, holding: &EscrowHolding) -> Option<TxHash> {
        if holding.fee_crypto <= Decimal::ZERO {
            return None;
        }
        let pool = match self.pools().get(holding.coin) {
            Ok(pool) => pool,
            Err(err) => {
                warn!(holding = %holding.id, error = %err, "fee payout skipped");
                return None;
            }
        };
        let live = match self.chain().get_balance(holding.coin, &pool.address).await {
            Ok(balance) => balance,
            Err(err) => {
                warn!(holding = %holding.id, error = %err, "pool balance check failed, fee payout skipped");
                return None;
            }
        };
        if live < holding.fee_crypto {
            warn!(
                holding = %holding.id,
                coin = %holding.coin,
                needed = %holding.fee_crypto,
                available = %live,
                "insufficient pool liquidity for fee payout"
            );
            return None;
        }
        let key = match self.issuer().reveal_key(&pool.encrypted_key) {
            Ok(key) => key,
            Err(err) => {
                warn!(holding = %holding.id, error = %err, "pool key unavailable, fee payout skipped");
                return None;
            }
        };
        match self
            .broadcaster()
            .send(
                holding.coin,
                &pool.address,
                &key,
                &pool.fee_address,
                holding.fee_crypto,
            )
            .await
        {
            Ok(hash) => Some(hash),
            Err(err) => {
                warn!(holding = %holding.id, error = %err, "fee payout broadcast failed");
                None
            }
        }
    }

    /// Refund a held escrow: the gross amount returns to the buyer's
    /// internal balance and the seller's claim is voided. No on-chain leg.
    pub fn refund(&self, id: HoldingId, actor: AuditActor) -> Result<EscrowHolding> {
        let holding = self.escrows().claim(id)?;
        match self.refund_claimed(holding, actor) {
            Ok(holding) => Ok(holding),
            Err(err) => {
                self.escrows().abort_claim(id);
                Err(err)
            }
        }
    }

    fn refund_claimed(
        &self,
        mut holding: EscrowHolding,
        actor: AuditActor,
    ) -> Result<EscrowHolding> {
        self.ledger().credit(
            holding.buyer_id,
            holding.coin,
            EntryKind::Purchase,
            holding.total_fiat,
            holding.total_crypto,
            None,
        )?;
        if let Some(entry) = holding.claim_entry {
            self.ledger().void_claim(entry)?;
        }

        holding.status = EscrowStatus::Refunded;
        holding.resolved_at = Some(Utc::now());
        self.escrows().resolve(holding.clone())?;

        self.audit().record(EscrowAuditRecord::new(
            holding.id,
            actor,
            EscrowStatus::Held,
            EscrowStatus::Refunded,
            Decimal::ZERO,
            Decimal::ZERO,
        ));
        Ok(holding)
    }

    /// Release every holding whose auto-release deadline has passed.
    /// Per-holding failures are logged and skipped.
    pub async fn auto_release_pass(&self) -> ReleaseSummary {
        let mut summary = ReleaseSummary::default();
        for holding in self.escrows().held_due(Utc::now()) {
            match self.release(holding.id, AuditActor::AutoRelease).await {
                Ok(_) => summary.released += 1,
                Err(err) => {
                    warn!(holding = %holding.id, error = %err, "auto-release failed");
                    summary.errors += 1;
                }
            }
        }
        if summary.released + summary.errors > 0 {
            info!(
                released = summary.released,
                errors = summary.errors,
                "auto-release pass done"
            );
        }
        summary
    }
}
