//! Chain data client — polling-based blockchain visibility.
//!
//! Every reconciliation job re-derives confirmation state from scratch
//! through this seam: address transaction lists, live balances, and block
//! height. There is no push channel; idempotency lives in the ledger, not
//! in delivery semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use custodia_types::{Coin, CustodiaError, Result, TxHash};

/// One output of an on-chain transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    /// Value in whole-coin units.
    pub value: Decimal,
}

/// An observed on-chain transaction, as the vendor reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub hash: TxHash,
    pub outputs: Vec<TxOutput>,
    pub confirmations: u32,
}

impl ChainTransaction {
    /// Sum of all outputs paid to `address`.
    #[must_use]
    pub fn paid_to(&self, address: &str) -> Decimal {
        self.outputs
            .iter()
            .filter(|out| out.address == address)
            .map(|out| out.value)
            .sum()
    }
}

/// Fetches address balances, transaction lists, and block height for a coin.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Recent transactions touching `address`.
    async fn get_transactions(&self, coin: Coin, address: &str) -> Result<Vec<ChainTransaction>>;

    /// Live balance of `address` (incoming − outgoing), whole-coin units.
    async fn get_balance(&self, coin: Coin, address: &str) -> Result<Decimal>;

    /// Current chain tip height.
    async fn get_block_height(&self, coin: Coin) -> Result<u64>;
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

#[derive(Debug, Deserialize)]
struct HeightResponse {
    height: u64,
}

/// Explorer-style HTTP chain client with one base URL per coin.
pub struct HttpChainClient {
    http: reqwest::Client,
    base_urls: HashMap<Coin, String>,
}

impl HttpChainClient {
    #[must_use]
    pub fn new(base_urls: HashMap<Coin, String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_urls,
        }
    }

    fn base_url(&self, coin: Coin) -> Result<&str> {
        self.base_urls
            .get(&coin)
            .map(String::as_str)
            .ok_or_else(|| CustodiaError::Configuration(format!("no chain endpoint for {coin}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CustodiaError::ChainUnavailable {
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| CustodiaError::ChainUnavailable {
                reason: e.to_string(),
            })?;
        response
            .json()
            .await
            .map_err(|e| CustodiaError::MalformedChainData {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn get_transactions(&self, coin: Coin, address: &str) -> Result<Vec<ChainTransaction>> {
        let url = format!("{}/address/{address}/txs", self.base_url(coin)?);
        self.get_json(&url).await
    }

    async fn get_balance(&self, coin: Coin, address: &str) -> Result<Decimal> {
        let url = format!("{}/address/{address}/balance", self.base_url(coin)?);
        let body: BalanceResponse = self.get_json(&url).await?;
        Ok(body.balance)
    }

    async fn get_block_height(&self, coin: Coin) -> Result<u64> {
        let url = format!("{}/blocks/tip", self.base_url(coin)?);
        let body: HeightResponse = self.get_json(&url).await?;
        Ok(body.height)
    }
}

/// Seedable in-memory chain for tests.
///
/// Transactions and balances are keyed by address; individual addresses can
/// be marked as erroring to exercise per-item failure isolation.
#[cfg(feature = "test-helpers")]
pub struct MockChain {
    state: std::sync::Mutex<MockChainState>,
}

#[cfg(feature = "test-helpers")]
#[derive(Default)]
struct MockChainState {
    transactions: HashMap<String, Vec<ChainTransaction>>,
    balances: HashMap<String, Decimal>,
    failing: std::collections::HashSet<String>,
    height: u64,
}

#[cfg(feature = "test-helpers")]
impl MockChain {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(MockChainState::default()),
        }
    }

    /// Seed a transaction paying `value` to `address` with the given
    /// confirmation count.
    pub fn seed_payment(&self, address: &str, hash: &str, value: Decimal, confirmations: u32) {
        let tx = ChainTransaction {
            hash: TxHash::new(hash),
            outputs: vec![TxOutput {
                address: address.to_string(),
                value,
            }],
            confirmations,
        };
        let mut state = self.state.lock().unwrap();
        state
            .transactions
            .entry(address.to_string())
            .or_default()
            .push(tx);
    }

    /// Bump the confirmation count of every seeded transaction.
    pub fn confirm_all(&self) {
        let mut state = self.state.lock().unwrap();
        for txs in state.transactions.values_mut() {
            for tx in txs {
                tx.confirmations += 1;
            }
        }
    }

    pub fn set_balance(&self, address: &str, balance: Decimal) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(address.to_string(), balance);
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
    }

    /// Make every call touching `address` fail with a chain error.
    pub fn fail_address(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(address.to_string());
    }

    fn check_failing(state: &MockChainState, address: &str) -> Result<()> {
        if state.failing.contains(address) {
            return Err(CustodiaError::ChainUnavailable {
                reason: format!("mock failure for {address}"),
            });
        }
        Ok(())
    }
}

#[cfg(feature = "test-helpers")]
impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "test-helpers")]
#[async_trait]
impl ChainClient for MockChain {
    async fn get_transactions(&self, _coin: Coin, address: &str) -> Result<Vec<ChainTransaction>> {
        let state = self.state.lock().unwrap();
        Self::check_failing(&state, address)?;
        Ok(state.transactions.get(address).cloned().unwrap_or_default())
    }

    async fn get_balance(&self, _coin: Coin, address: &str) -> Result<Decimal> {
        let state = self.state.lock().unwrap();
        Self::check_failing(&state, address)?;
        Ok(state.balances.get(address).copied().unwrap_or(Decimal::ZERO))
    }

    async fn get_block_height(&self, _coin: Coin) -> Result<u64> {
        Ok(self.state.lock().unwrap().height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paid_to_sums_matching_outputs() {
        let tx = ChainTransaction {
            hash: TxHash::new("t1"),
            outputs: vec![
                TxOutput {
                    address: "bc1pool".to_string(),
                    value: Decimal::new(1, 3),
                },
                TxOutput {
                    address: "bc1change".to_string(),
                    value: Decimal::new(5, 3),
                },
                TxOutput {
                    address: "bc1pool".to_string(),
                    value: Decimal::new(2, 3),
                },
            ],
            confirmations: 1,
        };
        assert_eq!(tx.paid_to("bc1pool"), Decimal::new(3, 3));
        assert_eq!(tx.paid_to("bc1elsewhere"), Decimal::ZERO);
    }

    #[test]
    fn transaction_wire_shape_parses() {
        let json = r#"[{
            "hash": "f00dbabe",
            "outputs": [{"address": "bc1pool", "value": "0.00123"}],
            "confirmations": 3
        }]"#;
        let txs: Vec<ChainTransaction> = serde_json::from_str(json).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].hash, TxHash::new("f00dbabe"));
        assert_eq!(txs[0].confirmations, 3);
        assert_eq!(txs[0].paid_to("bc1pool"), Decimal::new(123, 5));
    }

    #[test]
    fn balance_wire_shape_parses() {
        let json = r#"{"balance": "0.5"}"#;
        let body: BalanceResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.balance, Decimal::new(5, 1));
    }

    #[test]
    fn missing_endpoint_is_a_configuration_error() {
        let client = HttpChainClient::new(HashMap::new());
        let err = client.base_url(Coin::Btc).unwrap_err();
        assert!(matches!(err, CustodiaError::Configuration(_)));
    }
}
