//! Sweep job — consolidates drained deposit addresses into the per-coin
//! pool.
//!
//! An address becomes sweep-eligible once its owning deposit request has
//! completed. Balances at or below the coin's dust threshold are written
//! off as swept with zero amount, so the job converges instead of
//! revisiting dust forever. Batches are small and spaced out to respect
//! external rate limits.

use rust_decimal::Decimal;
use tracing::{info, warn};

use custodia_types::{
    Coin, CoinConfig, DepositAddress, DepositStatus, EntryKind, PoolAddress, Result, UserId,
};

use crate::SettlementEngine;

/// Counters for one sweep pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepSummary {
    /// Addresses drained on-chain this pass.
    pub swept: usize,
    /// Addresses written off below the dust threshold.
    pub dusted: usize,
    /// Per-address failures logged and skipped.
    pub errors: usize,
}

impl SettlementEngine {
    /// One sweep pass over every coin. A failure sweeping one address is
    /// logged and never blocks the rest of the batch.
    pub async fn run_sweep_pass(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        for coin in Coin::ALL {
            let Ok(pool) = self.pools().get(coin) else {
                continue;
            };
            let coin_config = CoinConfig::for_coin(coin);
            let mut batch = 0usize;
            for address in self.addresses().unswept_for_coin(coin) {
                if !self.sweep_eligible(&address) {
                    continue;
                }
                if batch >= self.config().sweep_batch_size {
                    break;
                }
                batch += 1;
                match self.sweep_address(&address, &pool, &coin_config).await {
                    Ok(true) => summary.swept += 1,
                    Ok(false) => summary.dusted += 1,
                    Err(err) => {
                        warn!(address = %address.address, error = %err, "sweep failed");
                        summary.errors += 1;
                    }
                }
                tokio::time::sleep(std::time::Duration::from_millis(
                    self.config().sweep_delay_ms,
                ))
                .await;
            }
        }
        if summary.swept + summary.dusted + summary.errors > 0 {
            info!(
                swept = summary.swept,
                dusted = summary.dusted,
                errors = summary.errors,
                "sweep pass done"
            );
        }
        summary
    }

    /// An address is eligible once its owning deposit request completed.
    /// Addresses without a linked request are left alone.
    fn sweep_eligible(&self, address: &DepositAddress) -> bool {
        address
            .deposit_id
            .and_then(|id| self.deposits().get(id).ok())
            .is_some_and(|request| request.status == DepositStatus::Completed)
    }

    async fn sweep_address(
        &self,
        address: &DepositAddress,
        pool: &PoolAddress,
        coin_config: &CoinConfig,
    ) -> Result<bool> {
        let coin = address.coin;
        let balance = self.chain().get_balance(coin, &address.address).await?;

        let amount = balance - coin_config.network_fee;
        if balance <= coin_config.dust_threshold || amount <= Decimal::ZERO {
            // Not worth a broadcast; write off so the job converges.
            self.addresses()
                .mark_swept(&address.address, None, Decimal::ZERO)?;
            return Ok(false);
        }

        let key = self.issuer().reveal_key(&address.encrypted_key)?;
        let hash = self
            .broadcaster()
            .send(coin, &address.address, &key, &pool.address, amount)
            .await?;

        self.addresses()
            .mark_swept(&address.address, Some(hash.clone()), amount)?;
        self.pools().add_tracked(coin, amount)?;
        // The hash joins the ledger's idempotency set here, so the sweep
        // landing at the pool can never be matched as a fresh deposit.
        self.ledger().record_external(
            UserId::platform(),
            coin,
            EntryKind::Sweep,
            Decimal::ZERO,
            amount,
            hash.clone(),
        )?;
        info!(address = %address.address, tx = %hash, %amount, "address swept to pool");
        Ok(true)
    }
}
