//! The engine context: configuration, stores, vault, and client seams
//! shared by all four jobs.

use std::sync::Arc;

use custodia_clients::{BroadcastClient, ChainClient, PriceOracle};
use custodia_ledger::{
    AddressBook, DepositBook, EscrowAuditLog, EscrowBook, Ledger, PoolRegistry, WithdrawalBook,
};
use custodia_types::{Coin, EngineConfig, PoolAddress, Result, UserId};
use custodia_vault::{AddressIssuer, KeyVault, validate_address};

/// Shared context of the settlement jobs.
///
/// Owns the ledger, the record books, and the audit log; talks to the
/// outside world only through the three client traits. Cheap to share:
/// wrap in an [`Arc`] and hand clones to every scheduler task.
pub struct SettlementEngine {
    config: EngineConfig,
    issuer: AddressIssuer,
    ledger: Ledger,
    deposits: DepositBook,
    escrows: EscrowBook,
    withdrawals: WithdrawalBook,
    addresses: AddressBook,
    pools: PoolRegistry,
    audit: EscrowAuditLog,
    oracle: Arc<dyn PriceOracle>,
    chain: Arc<dyn ChainClient>,
    broadcaster: Arc<dyn BroadcastClient>,
}

impl SettlementEngine {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        vault: Arc<KeyVault>,
        oracle: Arc<dyn PriceOracle>,
        chain: Arc<dyn ChainClient>,
        broadcaster: Arc<dyn BroadcastClient>,
    ) -> Self {
        Self {
            config,
            issuer: AddressIssuer::new(vault),
            ledger: Ledger::new(),
            deposits: DepositBook::new(),
            escrows: EscrowBook::new(),
            withdrawals: WithdrawalBook::new(),
            addresses: AddressBook::new(),
            pools: PoolRegistry::new(),
            audit: EscrowAuditLog::new(),
            oracle,
            chain,
            broadcaster,
        }
    }

    /// Register (or replace) the consolidated pool wallet for a coin.
    pub fn register_pool(&self, pool: PoolAddress) {
        self.pools.set(pool);
    }

    /// Register a user's external payout address for escrow releases.
    /// The address format is validated for the coin.
    pub fn register_payout_address(
        &self,
        user: UserId,
        coin: Coin,
        address: String,
    ) -> Result<()> {
        validate_address(coin, &address)?;
        self.addresses.set_payout_address(user, coin, address);
        Ok(())
    }

    // Accessors used across the job modules and by callers embedding the
    // engine.

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    #[must_use]
    pub fn deposits(&self) -> &DepositBook {
        &self.deposits
    }

    #[must_use]
    pub fn escrows(&self) -> &EscrowBook {
        &self.escrows
    }

    #[must_use]
    pub fn withdrawals(&self) -> &WithdrawalBook {
        &self.withdrawals
    }

    #[must_use]
    pub fn addresses(&self) -> &AddressBook {
        &self.addresses
    }

    #[must_use]
    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    #[must_use]
    pub fn audit(&self) -> &EscrowAuditLog {
        &self.audit
    }

    pub(crate) fn issuer(&self) -> &AddressIssuer {
        &self.issuer
    }

    pub(crate) fn oracle(&self) -> &dyn PriceOracle {
        self.oracle.as_ref()
    }

    pub(crate) fn chain(&self) -> &dyn ChainClient {
        self.chain.as_ref()
    }

    pub(crate) fn broadcaster(&self) -> &dyn BroadcastClient {
        self.broadcaster.as_ref()
    }
}
