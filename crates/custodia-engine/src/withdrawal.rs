//! Withdrawal pipeline — validate, deduct, broadcast, and compensate on
//! failure.
//!
//! The deduction happens *before* the broadcast because broadcasting is
//! the step most likely to fail; a failed broadcast restores the balance,
//! fails the ledger entry, and records the vendor message on the request.
//! Every pre-flight check runs before any state is created, so a rejected
//! submission leaves nothing behind.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use custodia_types::{
    Coin, CoinConfig, CustodiaError, EntryKind, PoolAddress, Result, UserId, WithdrawalRequest,
};
use custodia_vault::validate_address;

use crate::SettlementEngine;

impl SettlementEngine {
    /// Submit a withdrawal of `fiat_amount` to `destination`.
    ///
    /// Validation and pre-flight checks reject with no state created.
    /// Past that point a request row always exists: `completed` with the
    /// payout hash, or `failed` with the vendor message and the balance
    /// restored. The returned row reflects the terminal state.
    pub async fn submit_withdrawal(
        &self,
        user: UserId,
        coin: Coin,
        fiat_amount: Decimal,
        destination: String,
    ) -> Result<WithdrawalRequest> {
        validate_address(coin, &destination)?;

        let coin_config = CoinConfig::for_coin(coin);
        if fiat_amount < coin_config.min_withdrawal_fiat {
            return Err(CustodiaError::BelowMinimumWithdrawal {
                coin,
                requested: fiat_amount,
                minimum: coin_config.min_withdrawal_fiat,
            });
        }

        let fee_fiat = self.config().fees.fee_for(fiat_amount);
        let net_fiat = fiat_amount - fee_fiat;
        if net_fiat <= Decimal::ZERO {
            return Err(CustodiaError::BelowMinimumWithdrawal {
                coin,
                requested: fiat_amount,
                minimum: fee_fiat,
            });
        }

        let rate = self.oracle().get_rate(coin).await?;
        let gross_crypto = fiat_amount / rate;
        let net_crypto = net_fiat / rate;

        // The user pays the gross equivalent; the fee difference stays
        // with the platform implicitly.
        let balance = self.ledger().balance(user, coin);
        if balance.available < gross_crypto {
            return Err(CustodiaError::InsufficientBalance {
                needed: gross_crypto,
                available: balance.available,
            });
        }

        self.check_velocity(user, fiat_amount)?;

        let pool = self.pools().get(coin)?;
        let live = self.chain().get_balance(coin, &pool.address).await?;
        if live < net_crypto {
            error!(
                %coin,
                needed = %net_crypto,
                available = %live,
                "pool liquidity short, withdrawal aborted"
            );
            return Err(CustodiaError::InsufficientPoolLiquidity {
                coin,
                needed: net_crypto,
                available: live,
            });
        }

        // Point of no return: a row exists from here on and always reaches
        // a terminal status. A non-terminal leftover would keep counting
        // against the user's velocity limits with no way to reap it.
        let request = WithdrawalRequest::new(user, coin, fiat_amount, net_crypto, fee_fiat, destination);
        let id = self.withdrawals().insert(request.clone());
        self.withdrawals().mark_processing(id)?;

        if let Err(err) = self.settle(&request, gross_crypto, &pool).await {
            self.withdrawals().mark_failed(id, &err.to_string())?;
            warn!(withdrawal = %id, %user, error = %err, "withdrawal failed, balance restored");
        }
        self.withdrawals().get(id)
    }

    /// Deduct, broadcast, finalize. Every error path compensates its own
    /// balance move before bubbling up, so the caller only has to mark the
    /// row failed.
    async fn settle(
        &self,
        request: &WithdrawalRequest,
        gross_crypto: Decimal,
        pool: &PoolAddress,
    ) -> Result<()> {
        // A concurrent spend may have drained the balance since the
        // pre-check; the debit re-checks solvency and fails cleanly.
        let entry = self.ledger().debit_pending(
            request.user_id,
            request.coin,
            EntryKind::Withdrawal,
            request.fiat_amount,
            gross_crypto,
        )?;

        let outcome = match self.issuer().reveal_key(&pool.encrypted_key) {
            Ok(key) => {
                self.broadcaster()
                    .send(
                        request.coin,
                        &pool.address,
                        &key,
                        &request.destination,
                        request.crypto_amount,
                    )
                    .await
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(hash) => {
                self.ledger().complete_entry(entry, Some(hash.clone()))?;
                self.withdrawals().mark_completed(request.id, hash)?;
                info!(
                    withdrawal = %request.id,
                    user = %request.user_id,
                    coin = %request.coin,
                    fiat = %request.fiat_amount,
                    "withdrawal completed"
                );
                Ok(())
            }
            Err(err) => {
                // Compensate: the deducted balance comes back in full.
                self.ledger().fail_entry(entry)?;
                Err(err)
            }
        }
    }

    /// Rolling-day velocity limits: request count and fiat volume. Failed
    /// attempts do not count.
    fn check_velocity(&self, user: UserId, fiat_amount: Decimal) -> Result<()> {
        let since = Utc::now() - Duration::days(1);
        let recent = self.withdrawals().counted_since(user, since);

        if recent.len() >= self.config().daily_withdrawal_count {
            return Err(CustodiaError::WithdrawalLimitExceeded {
                reason: format!(
                    "daily withdrawal count {} reached",
                    self.config().daily_withdrawal_count
                ),
            });
        }
        let volume: Decimal = recent.iter().map(|r| r.fiat_amount).sum();
        if volume + fiat_amount > self.config().daily_withdrawal_fiat {
            return Err(CustodiaError::WithdrawalLimitExceeded {
                reason: format!(
                    "daily withdrawal volume cap {} exceeded",
                    self.config().daily_withdrawal_fiat
                ),
            });
        }
        Ok(())
    }
}
