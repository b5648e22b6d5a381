use crate::{
    adapters::{from_atomic, to_atomic, CurrencyAdapter, ReceiveTarget, TxDetail, TxObservation},
    config::CurrencyConfig,
    error::GatewayError,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};

/// Native atomic scale: 1 XMR = 10^12 piconero
const ATOMIC_SCALE: u32 = 12;

/// Account-model wallet RPC adapter (monero-style). A fresh receive target
/// is a new sub-account, and incoming transfers are listed per account
/// index rather than per address.
///
/// The wallet RPC reports no usable fee for a past transfer, so this
/// adapter always reports zero fee.
pub struct MoneroAdapter {
    currency: String,
    daemon_url: String,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    min_confirmations: Option<u64>,
    client: reqwest::Client,
    wallet_is_open: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct TransferEntry {
    address: Option<String>,
    amount: Option<u64>,
    confirmations: Option<u64>,
    txid: Option<String>,
}

impl MoneroAdapter {
    pub fn new(config: &CurrencyConfig, client: reqwest::Client) -> Self {
        Self {
            currency: config.name.clone(),
            daemon_url: config.daemon_url.clone(),
            rpc_user: config.rpc_user.clone(),
            rpc_password: config.rpc_password.clone(),
            min_confirmations: config.min_confirmations,
            client,
            wallet_is_open: AtomicBool::new(false),
        }
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

    async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&self.daemon_url).json(&body);
        if let Some(user) = &self.rpc_user {
            request = request.basic_auth(user, self.rpc_password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(self.unavailable(format!("daemon returned {}", response.status())));
        }

        let mut payload: Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid response: {}", e)))?;
        if !payload["error"].is_null() {
            return Err(self.unavailable(payload["error"].to_string()));
        }
        Ok(payload["result"].take())
    }
}

#[async_trait]
impl CurrencyAdapter for MoneroAdapter {
    fn currency(&self) -> &str {
        &self.currency
    }

    fn min_confirmations(&self) -> Option<u64> {
        self.min_confirmations
    }

    fn is_ready(&self) -> bool {
        self.wallet_is_open.load(Ordering::Acquire)
    }

    async fn check_ready(&self) -> Result<bool, GatewayError> {
        match self.call("get_balance", json!({"account_index": 0})).await {
            Ok(_) => {
                self.wallet_is_open.store(true, Ordering::Release);
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("{} wallet probe failed: {}", self.currency, e);
                Ok(false)
            }
        }
    }

    async fn new_address(&self) -> Result<ReceiveTarget, GatewayError> {
        self.ensure_ready()?;
        let result = self.call("create_account", json!({})).await?;
        let address = result["address"]
            .as_str()
            .ok_or_else(|| self.unavailable("create_account returned no address".to_string()))?;
        let account_index = result["account_index"]
            .as_u64()
            .ok_or_else(|| self.unavailable("create_account returned no index".to_string()))?;
        Ok(ReceiveTarget::Account {
            address: address.to_string(),
            account_index: account_index as u32,
        })
    }

    async fn validate_address(&self, address: &str) -> Result<bool, GatewayError> {
        self.ensure_ready()?;
        let result = self
            .call("validate_address", json!({"address": address}))
            .await?;
        Ok(result["valid"].as_bool().unwrap_or(false))
    }

    async fn list_incoming(
        &self,
        target: &ReceiveTarget,
    ) -> Result<Vec<TxObservation>, GatewayError> {
        self.ensure_ready()?;
        let account_index = target.account_index().unwrap_or(0);
        let result = self
            .call(
                "get_transfers",
                json!({"in": true, "account_index": account_index}),
            )
            .await?;

        let entries = result["in"].as_array().cloned().unwrap_or_default();
        let mut observations = Vec::with_capacity(entries.len());
        for raw in entries {
            match serde_json::from_value::<TransferEntry>(raw.clone()) {
                Ok(entry) => {
                    let Some(amount) = entry.amount else {
                        tracing::debug!("{} transfer without amount skipped", self.currency);
                        continue;
                    };
                    observations.push(TxObservation {
                        address: entry.address.unwrap_or_default(),
                        amount: from_atomic(amount, ATOMIC_SCALE),
                        tx_ids: entry.txid.into_iter().collect(),
                        confirmations: entry.confirmations,
                        raw,
                    });
                }
                Err(e) => tracing::warn!("{} unparseable transfer: {}", self.currency, e),
            }
        }
        Ok(observations)
    }

    async fn send(&self, destination: &str, amount: Decimal) -> Result<String, GatewayError> {
        self.ensure_ready()?;
        let atomic = to_atomic(amount, ATOMIC_SCALE);
        let result = self
            .call(
                "transfer",
                json!({"destinations": [{"amount": atomic, "address": destination}]}),
            )
            .await
            .map_err(|e| GatewayError::TransferFailed {
                currency: self.currency.clone(),
                reason: e.to_string(),
            })?;
        result["tx_hash"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.unavailable("transfer returned no tx_hash".to_string()))
    }

    async fn get_transaction(&self, txid: &str) -> Result<TxDetail, GatewayError> {
        self.ensure_ready()?;
        let result = self
            .call("get_transfer_by_txid", json!({"txid": txid}))
            .await?;
        Ok(TxDetail {
            fee: Decimal::ZERO,
            raw: result,
        })
    }
}
