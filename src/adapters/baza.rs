use crate::{
    adapters::{from_atomic, to_atomic, CurrencyAdapter, ReceiveTarget, TxDetail, TxObservation},
    config::CurrencyConfig,
    error::GatewayError,
};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};

/// Native atomic scale: 1 BAZA = 10^6 atomic units
const ATOMIC_SCALE: u32 = 6;

/// How far back from the current wallet height incoming transactions are
/// scanned when listing for an address.
const SCAN_WINDOW_BLOCKS: u64 = 500;

/// Ledger-API adapter for an HTTP wallet service (baza-style), authenticated
/// with an `X-API-KEY` header. The service exposes no confirmation count;
/// readiness means the wallet has caught up with the network tip.
pub struct BazaAdapter {
    currency: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    wallet_is_open: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct WalletStatus {
    #[serde(rename = "networkBlockCount")]
    network_block_count: u64,
    #[serde(rename = "walletBlockCount")]
    wallet_block_count: u64,
}

#[derive(Debug, Deserialize)]
struct LedgerTransaction {
    hash: Option<String>,
    #[serde(default)]
    transfers: Vec<LedgerTransfer>,
}

#[derive(Debug, Deserialize)]
struct LedgerTransfer {
    address: Option<String>,
    amount: Option<i64>,
}

impl BazaAdapter {
    pub fn new(config: &CurrencyConfig, client: reqwest::Client) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("baza adapter requires an API key")?;
        Ok(Self {
            currency: config.name.clone(),
            base_url: config.daemon_url.trim_end_matches('/').to_string(),
            api_key,
            client,
            wallet_is_open: AtomicBool::new(false),
        })
    }

    fn ensure_ready(&self) -> Result<(), GatewayError> {
        if self.wallet_is_open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(GatewayError::AdapterNotReady(self.currency.clone()))
        }
    }

    fn unavailable(&self, reason: String) -> GatewayError {
        GatewayError::AdapterUnavailable {
            currency: self.currency.clone(),
            reason,
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = self.api_key.parse() {
            headers.insert("X-API-KEY", value);
        }
        headers
    }

    async fn request(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut request = self.client.request(method, url).headers(self.headers());
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.map_err(|e| self.unavailable(e.to_string()))
    }

    async fn wallet_status(&self) -> Result<WalletStatus, GatewayError> {
        let response = self.request(reqwest::Method::GET, "/status", None).await?;
        if !response.status().is_success() {
            return Err(self.unavailable(format!("status returned {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid status response: {}", e)))
    }
}

#[async_trait]
impl CurrencyAdapter for BazaAdapter {
    fn currency(&self) -> &str {
        &self.currency
    }

    /// Ledger-API currencies have no confirmation concept.
    fn min_confirmations(&self) -> Option<u64> {
        None
    }

    fn is_ready(&self) -> bool {
        self.wallet_is_open.load(Ordering::Acquire)
    }

    async fn check_ready(&self) -> Result<bool, GatewayError> {
        match self.wallet_status().await {
            Ok(status) => {
                let synced = status.wallet_block_count == status.network_block_count;
                if synced {
                    self.wallet_is_open.store(true, Ordering::Release);
                } else {
                    tracing::warn!(
                        "{} wallet at block {} of {}, not ready",
                        self.currency,
                        status.wallet_block_count,
                        status.network_block_count
                    );
                }
                Ok(synced)
            }
            Err(e) => {
                tracing::warn!("{} wallet probe failed: {}", self.currency, e);
                Ok(false)
            }
        }
    }

    async fn new_address(&self) -> Result<ReceiveTarget, GatewayError> {
        self.ensure_ready()?;
        let response = self
            .request(reqwest::Method::POST, "/addresses/create", None)
            .await?;
        if response.status() != reqwest::StatusCode::CREATED {
            return Err(self.unavailable(format!(
                "address creation returned {}",
                response.status()
            )));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid response: {}", e)))?;
        payload["address"]
            .as_str()
            .map(|addr| ReceiveTarget::Address(addr.to_string()))
            .ok_or_else(|| self.unavailable("no address in response".to_string()))
    }

    async fn validate_address(&self, address: &str) -> Result<bool, GatewayError> {
        self.ensure_ready()?;
        let response = self
            .request(
                reqwest::Method::POST,
                "/addresses/validate",
                Some(json!({"address": address})),
            )
            .await?;
        Ok(response.status().is_success())
    }

    async fn list_incoming(
        &self,
        target: &ReceiveTarget,
    ) -> Result<Vec<TxObservation>, GatewayError> {
        self.ensure_ready()?;
        let status = self.wallet_status().await?;
        let from_height = status.wallet_block_count.saturating_sub(SCAN_WINDOW_BLOCKS);

        let endpoint = format!(
            "/transactions/address/{}/{}",
            target.address(),
            from_height
        );
        let response = self.request(reqwest::Method::GET, &endpoint, None).await?;
        if !response.status().is_success() {
            return Err(self.unavailable(format!(
                "transaction listing returned {}",
                response.status()
            )));
        }
        let mut payload: Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid response: {}", e)))?;

        let records = payload["transactions"].take();
        let mut observations = Vec::new();
        for raw in records.as_array().cloned().unwrap_or_default() {
            let record: LedgerTransaction = match serde_json::from_value(raw.clone()) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("{} unparseable transaction: {}", self.currency, e);
                    continue;
                }
            };
            let tx_ids: Vec<String> = record.hash.clone().into_iter().collect();
            // One observation per sub-transfer: the reconciler matches the
            // transfer address, not the top-level record.
            for transfer in record.transfers {
                let Some(amount) = transfer.amount.filter(|a| *a > 0) else {
                    continue;
                };
                observations.push(TxObservation {
                    address: transfer.address.unwrap_or_default(),
                    amount: from_atomic(amount as u64, ATOMIC_SCALE),
                    tx_ids: tx_ids.clone(),
                    confirmations: None,
                    raw: raw.clone(),
                });
            }
        }
        Ok(observations)
    }

    async fn send(&self, destination: &str, amount: Decimal) -> Result<String, GatewayError> {
        self.ensure_ready()?;
        let response = self
            .request(
                reqwest::Method::POST,
                "/transactions/send/basic",
                Some(json!({
                    "destination": destination,
                    "amount": to_atomic(amount, ATOMIC_SCALE),
                })),
            )
            .await?;
        if response.status() != reqwest::StatusCode::CREATED {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::TransferFailed {
                currency: self.currency.clone(),
                reason: format!("send returned {}: {}", status, body),
            });
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid response: {}", e)))?;
        payload["transactionHash"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.unavailable("no transaction hash in response".to_string()))
    }

    async fn get_transaction(&self, txid: &str) -> Result<TxDetail, GatewayError> {
        self.ensure_ready()?;
        let endpoint = format!("/transactions/hash/{}", txid);
        let response = self.request(reqwest::Method::GET, &endpoint, None).await?;
        if !response.status().is_success() {
            return Err(self.unavailable(format!(
                "transaction lookup returned {}",
                response.status()
            )));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid response: {}", e)))?;
        let fee = payload["transaction"]["fee"]
            .as_u64()
            .map(|fee| from_atomic(fee, ATOMIC_SCALE))
            .unwrap_or(Decimal::ZERO);
        Ok(TxDetail { fee, raw: payload })
    }
}
