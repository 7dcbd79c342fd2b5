//! Price oracle client — current fiat exchange rates for supported coins.
//!
//! Rates are best-effort: the HTTP implementation falls back to per-coin
//! hardcoded values when the vendor is unreachable, because a stalled job
//! pass is worse than a slightly stale rate. Deposit crediting never uses
//! live rates anyway — it uses the rate locked at request creation.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use custodia_types::{Coin, CoinConfig, CustodiaError, Result};

/// Fiat rate per whole coin, keyed by coin.
pub type RateMap = HashMap<Coin, Decimal>;

/// Fetches current fiat exchange rates for supported coins.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current fiat rate per whole coin for each requested coin.
    async fn get_rates(&self, coins: &[Coin]) -> Result<RateMap>;

    /// Convenience: the rate for a single coin.
    async fn get_rate(&self, coin: Coin) -> Result<Decimal> {
        let rates = self.get_rates(&[coin]).await?;
        rates
            .get(&coin)
            .copied()
            .ok_or_else(|| CustodiaError::OracleUnavailable {
                reason: format!("no rate returned for {coin}"),
            })
    }
}

/// Wire shape of the vendor's ticker response.
#[derive(Debug, Deserialize)]
struct TickerResponse {
    rates: HashMap<String, Decimal>,
}

/// HTTP price oracle with hardcoded fallback rates.
pub struct HttpPriceOracle {
    http: reqwest::Client,
    base_url: String,
    fallback: RateMap,
}

impl HttpPriceOracle {
    /// Create an oracle against `base_url`, with fallbacks taken from the
    /// default per-coin configuration.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let fallback = Coin::ALL
            .iter()
            .map(|&coin| (coin, CoinConfig::for_coin(coin).fallback_rate))
            .collect();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            fallback,
        }
    }

    /// Override the fallback rate for a coin.
    pub fn set_fallback(&mut self, coin: Coin, rate: Decimal) {
        self.fallback.insert(coin, rate);
    }

    fn fallback_for(&self, coins: &[Coin]) -> RateMap {
        coins
            .iter()
            .filter_map(|coin| self.fallback.get(coin).map(|rate| (*coin, *rate)))
            .collect()
    }

    async fn fetch(&self, coins: &[Coin]) -> Result<RateMap> {
        let symbols: Vec<&str> = coins.iter().map(|c| c.symbol()).collect();
        let url = format!("{}/v1/ticker?symbols={}", self.base_url, symbols.join(","));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CustodiaError::OracleUnavailable {
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| CustodiaError::OracleUnavailable {
                reason: e.to_string(),
            })?;
        let ticker: TickerResponse =
            response
                .json()
                .await
                .map_err(|e| CustodiaError::OracleUnavailable {
                    reason: e.to_string(),
                })?;

        let mut rates = RateMap::new();
        for coin in coins {
            if let Some(rate) = ticker.rates.get(coin.symbol()) {
                rates.insert(*coin, *rate);
            }
        }
        Ok(rates)
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn get_rates(&self, coins: &[Coin]) -> Result<RateMap> {
        match self.fetch(coins).await {
            Ok(rates) if rates.len() == coins.len() => Ok(rates),
            Ok(mut partial) => {
                // Vendor answered but skipped some coins; fill from fallback.
                for (coin, rate) in self.fallback_for(coins) {
                    partial.entry(coin).or_insert(rate);
                }
                Ok(partial)
            }
            Err(err) => {
                warn!(error = %err, "price oracle unreachable, using fallback rates");
                Ok(self.fallback_for(coins))
            }
        }
    }
}

/// Fixed-rate oracle for tests.
#[cfg(feature = "test-helpers")]
pub struct StaticRates {
    rates: RateMap,
}

#[cfg(feature = "test-helpers")]
impl StaticRates {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rates: RateMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, coin: Coin, rate: Decimal) -> Self {
        self.rates.insert(coin, rate);
        self
    }
}

#[cfg(feature = "test-helpers")]
impl Default for StaticRates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "test-helpers")]
#[async_trait]
impl PriceOracle for StaticRates {
    async fn get_rates(&self, coins: &[Coin]) -> Result<RateMap> {
        coins
            .iter()
            .map(|coin| {
                self.rates
                    .get(coin)
                    .map(|rate| (*coin, *rate))
                    .ok_or_else(|| CustodiaError::OracleUnavailable {
                        reason: format!("no static rate for {coin}"),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_response_parses() {
        let json = r#"{"rates": {"BTC": "50000.0", "LTC": "80.5"}}"#;
        let ticker: TickerResponse = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.rates["BTC"], Decimal::new(50_000, 0));
        assert_eq!(ticker.rates["LTC"], Decimal::new(805, 1));
    }

    #[test]
    fn fallback_covers_all_supported_coins() {
        let oracle = HttpPriceOracle::new("http://localhost:0");
        let rates = oracle.fallback_for(&Coin::ALL);
        assert_eq!(rates.len(), Coin::ALL.len());
        assert!(rates.values().all(|r| *r > Decimal::ZERO));
    }

    #[tokio::test]
    async fn unreachable_vendor_falls_back() {
        // Port 0 is never listening; the fetch fails and fallback kicks in.
        let oracle = HttpPriceOracle::new("http://127.0.0.1:0");
        let rates = oracle.get_rates(&[Coin::Btc]).await.unwrap();
        assert_eq!(rates[&Coin::Btc], CoinConfig::btc().fallback_rate);
    }
}
