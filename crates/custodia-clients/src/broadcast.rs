//! Broadcast client — outbound payout transactions.
//!
//! The single step most likely to fail in any settlement flow, so every
//! caller pairs it with a compensating action. Rejections surface the
//! vendor's message verbatim.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use custodia_types::{Coin, CustodiaError, Result, TxHash};

/// Broadcasts a payout from a custodial address.
#[async_trait]
pub trait BroadcastClient: Send + Sync {
    /// Sign and broadcast a payment of `amount` from `from` to `to`.
    /// The private key never leaves this call.
    async fn send(
        &self,
        coin: Coin,
        from: &str,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<TxHash>;
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    amount: Decimal,
    key: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    tx_hash: String,
}

/// HTTP broadcast client with one signing endpoint per coin.
pub struct HttpBroadcastClient {
    http: reqwest::Client,
    base_urls: std::collections::HashMap<Coin, String>,
}

impl HttpBroadcastClient {
    #[must_use]
    pub fn new(base_urls: std::collections::HashMap<Coin, String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_urls,
        }
    }
}

#[async_trait]
impl BroadcastClient for HttpBroadcastClient {
    async fn send(
        &self,
        coin: Coin,
        from: &str,
        private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<TxHash> {
        let base = self
            .base_urls
            .get(&coin)
            .ok_or_else(|| CustodiaError::Configuration(format!("no broadcast endpoint for {coin}")))?;
        let body = SendRequest {
            from,
            to,
            amount,
            key: private_key,
        };
        let response = self
            .http
            .post(format!("{base}/send"))
            .json(&body)
            .send()
            .await
            .map_err(|e| CustodiaError::BroadcastRejected {
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            let reason = response.text().await.unwrap_or_else(|_| "unknown".into());
            return Err(CustodiaError::BroadcastRejected { reason });
        }
        let body: SendResponse =
            response
                .json()
                .await
                .map_err(|e| CustodiaError::MalformedChainData {
                    reason: e.to_string(),
                })?;
        Ok(TxHash::new(body.tx_hash))
    }
}

/// One payment recorded by the [`MockBroadcaster`].
#[cfg(feature = "test-helpers")]
#[derive(Debug, Clone)]
pub struct SentPayment {
    pub coin: Coin,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub tx_hash: TxHash,
}

/// Recording broadcast double with scriptable failures.
#[cfg(feature = "test-helpers")]
pub struct MockBroadcaster {
    state: std::sync::Mutex<MockBroadcasterState>,
}

#[cfg(feature = "test-helpers")]
#[derive(Default)]
struct MockBroadcasterState {
    sent: Vec<SentPayment>,
    fail_next: usize,
    fail_all: bool,
    counter: u64,
}

#[cfg(feature = "test-helpers")]
impl MockBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(MockBroadcasterState::default()),
        }
    }

    /// Fail the next `n` sends with a vendor rejection.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().fail_next = n;
    }

    /// Fail every send until cleared.
    pub fn fail_all(&self, fail: bool) {
        self.state.lock().unwrap().fail_all = fail;
    }

    /// All payments broadcast so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentPayment> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[cfg(feature = "test-helpers")]
impl Default for MockBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "test-helpers")]
#[async_trait]
impl BroadcastClient for MockBroadcaster {
    async fn send(
        &self,
        coin: Coin,
        from: &str,
        _private_key: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<TxHash> {
        let mut state = self.state.lock().unwrap();
        if state.fail_all {
            return Err(CustodiaError::BroadcastRejected {
                reason: "vendor rejected transaction (mock)".to_string(),
            });
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(CustodiaError::BroadcastRejected {
                reason: "vendor rejected transaction (mock)".to_string(),
            });
        }
        state.counter += 1;
        let tx_hash = TxHash::new(format!("mocktx{:08}", state.counter));
        state.sent.push(SentPayment {
            coin,
            from: from.to_string(),
            to: to.to_string(),
            amount,
            tx_hash: tx_hash.clone(),
        });
        Ok(tx_hash)
    }
}
