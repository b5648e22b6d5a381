use crate::{adapters::quantize, config::Config, error::GatewayError};
use moka::future::Cache;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

/// Periodically refreshed fiat unit prices per currency, read at payment
/// creation to fix the requested crypto amount. A failed refresh keeps the
/// last known price; entries only age out after an hour without a
/// successful fetch.
pub struct PriceOracle {
    client: reqwest::Client,
    prices: Cache<String, Decimal>,
    price_api_url: String,
    baza_price_url: String,
    fiat_currency: String,
    currencies: Vec<String>,
}

impl PriceOracle {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        let prices = Cache::builder()
            .max_capacity(64)
            .time_to_live(Duration::from_secs(3600))
            .build();

        Self {
            client,
            prices,
            price_api_url: config.price_api_url.clone(),
            baza_price_url: config.baza_price_url.clone(),
            fiat_currency: config.fiat_currency.clone(),
            currencies: config.currencies.iter().map(|c| c.name.clone()).collect(),
        }
    }

    pub async fn refresh_prices(&self) {
        for currency in &self.currencies {
            match self.fetch_price(currency).await {
                Ok(Some(price)) => {
                    tracing::info!("{} price: {} {}", currency, price, self.fiat_currency);
                    self.prices.insert(currency.clone(), price).await;
                }
                Ok(None) => {
                    tracing::warn!("No {} price in oracle response", currency);
                }
                Err(e) => {
                    tracing::warn!("Price fetch for {} failed, keeping last known: {}", currency, e);
                }
            }
        }
    }

    async fn fetch_price(&self, currency: &str) -> Result<Option<Decimal>, GatewayError> {
        let unavailable = |reason: String| GatewayError::AdapterUnavailable {
            currency: currency.to_string(),
            reason,
        };

        let payload: Value = if currency == "baza" {
            // Exchange ticker, {"Last": <price>}
            let response = self
                .client
                .get(&self.baza_price_url)
                .send()
                .await
                .map_err(|e| unavailable(e.to_string()))?;
            let ticker: Value = response
                .json()
                .await
                .map_err(|e| unavailable(e.to_string()))?;
            ticker["Last"].clone()
        } else {
            let url = format!(
                "{}?ids={}&vs_currencies={}",
                self.price_api_url, currency, self.fiat_currency
            );
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| unavailable(e.to_string()))?;
            let body: Value = response
                .json()
                .await
                .map_err(|e| unavailable(e.to_string()))?;
            body[currency][&self.fiat_currency].clone()
        };

        Ok(payload.as_f64().and_then(Decimal::from_f64))
    }

    pub async fn unit_price(&self, currency: &str) -> Option<Decimal> {
        self.prices.get(currency).await
    }

    /// Convert a fiat amount in cents into the crypto amount a payment must
    /// request, at the last refreshed unit price, quantized half-up.
    pub async fn crypto_amount_for_cents(
        &self,
        currency: &str,
        fiat_cents: u64,
    ) -> Result<Decimal, GatewayError> {
        let price = self.unit_price(currency).await.ok_or_else(|| {
            GatewayError::ValidationFailed(format!("No {} price available", currency))
        })?;
        let cents_per_coin = price * Decimal::from(100);
        if cents_per_coin <= Decimal::ZERO {
            return Err(GatewayError::ValidationFailed(format!(
                "Non-positive {} price",
                currency
            )));
        }
        Ok(quantize(Decimal::from(fiat_cents) / cents_per_coin))
    }

    #[cfg(test)]
    pub(crate) async fn set_price(&self, currency: &str, price: Decimal) {
        self.prices.insert(currency.to_string(), price).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Environment};
    use rust_decimal_macros::dec;

    fn test_config(price_api_url: &str, baza_price_url: &str) -> Config {
        Config {
            environment: Environment::Development,
            host: "127.0.0.1".to_string(),
            port: 8080,
            redis_url: "redis://localhost".to_string(),
            currencies: vec![],
            price_api_url: price_api_url.to_string(),
            baza_price_url: baza_price_url.to_string(),
            fiat_currency: "usd".to_string(),
            price_refresh_secs: 300,
            payout_sweep_secs: 1800,
            adapter_timeout_secs: 15,
        }
    }

    fn oracle_for(config: &Config, currencies: &[&str]) -> PriceOracle {
        let mut oracle = PriceOracle::new(config, reqwest::Client::new());
        oracle.currencies = currencies.iter().map(|c| c.to_string()).collect();
        oracle
    }

    #[tokio::test]
    async fn refresh_parses_simple_price_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/price")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"bitcoin": {"usd": 50000.0}}"#)
            .create_async()
            .await;

        let config = test_config(&format!("{}/price", server.url()), "http://unused");
        let oracle = oracle_for(&config, &["bitcoin"]);

        oracle.refresh_prices().await;
        assert_eq!(oracle.unit_price("bitcoin").await, Some(dec!(50000)));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_last_known_price() {
        let config = test_config("http://127.0.0.1:1/price", "http://unused");
        let oracle = oracle_for(&config, &["bitcoin"]);
        oracle.set_price("bitcoin", dec!(42000)).await;

        oracle.refresh_prices().await;
        assert_eq!(oracle.unit_price("bitcoin").await, Some(dec!(42000)));
    }

    #[tokio::test]
    async fn converts_fiat_cents_at_the_unit_price() {
        let config = test_config("http://unused", "http://unused");
        let oracle = oracle_for(&config, &["bitcoin"]);
        oracle.set_price("bitcoin", dec!(50000)).await;

        // $25,000 at $50,000/BTC
        let amount = oracle
            .crypto_amount_for_cents("bitcoin", 2_500_000)
            .await
            .unwrap();
        assert_eq!(amount, dec!(0.5));
    }

    #[tokio::test]
    async fn missing_price_is_a_validation_error() {
        let config = test_config("http://unused", "http://unused");
        let oracle = oracle_for(&config, &["bitcoin"]);
        let err = oracle
            .crypto_amount_for_cents("bitcoin", 100)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ValidationFailed(_)));
    }
}
