use crate::{
    adapters::{quantize, CurrencyAdapter, ReceiveTarget, TxDetail, TxObservation},
    config::CurrencyConfig,
    error::GatewayError,
};
use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};

enum RpcFailure {
    /// Network/transport problem or malformed response
    Transport(String),
    /// The daemon answered and explicitly rejected the call
    Rejected(String),
}

/// Adapter for bitcoin-like wallet daemons speaking JSON-RPC 1.0 over
/// basic auth (bitcoin, dogecoin). Amounts are already denominated in
/// whole coins on the wire.
pub struct UtxoAdapter {
    currency: String,
    daemon_url: String,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    min_confirmations: Option<u64>,
    client: reqwest::Client,
    wallet_is_loaded: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct ReceivedEntry {
    address: Option<String>,
    amount: Option<f64>,
    confirmations: Option<u64>,
    #[serde(default)]
    txids: Vec<String>,
    // dogecoin reports a single txid per entry
    txid: Option<String>,
}

impl UtxoAdapter {
    pub fn new(config: &CurrencyConfig, client: reqwest::Client) -> Self {
        Self {
            currency: config.name.clone(),
            daemon_url: config.daemon_url.clone(),
            rpc_user: config.rpc_user.clone(),
            rpc_password: config.rpc_password.clone(),
            min_confirmations: config.min_confirmations,
            client,
            wallet_is_loaded: AtomicBool::new(false),
        }
    }

    fn ensure_ready(&self) -> Result<(), GatewayError> {
        if self.wallet_is_loaded.load(Ordering::Acquire) {
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

    async fn call_rpc(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let body = json!({
            "jsonrpc": "1.0",
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
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;

        let status = response.status();
        let mut payload: Value = response
            .json()
            .await
            .map_err(|e| RpcFailure::Transport(format!("invalid response: {}", e)))?;

        if !payload["error"].is_null() {
            return Err(RpcFailure::Rejected(payload["error"].to_string()));
        }
        if !status.is_success() {
            return Err(RpcFailure::Transport(format!("daemon returned {}", status)));
        }
        Ok(payload["result"].take())
    }

    /// Everything except `send` treats a daemon rejection the same as the
    /// daemon being unreachable: retried on the next cycle.
    async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        self.call_rpc(method, params).await.map_err(|e| match e {
            RpcFailure::Transport(reason) | RpcFailure::Rejected(reason) => {
                self.unavailable(reason)
            }
        })
    }

    fn entry_to_observation(&self, entry: ReceivedEntry, raw: Value) -> Option<TxObservation> {
        let amount = entry.amount.and_then(Decimal::from_f64)?;
        let mut tx_ids = entry.txids;
        if tx_ids.is_empty() {
            tx_ids.extend(entry.txid);
        }
        Some(TxObservation {
            address: entry.address.unwrap_or_default(),
            amount: quantize(amount),
            tx_ids,
            confirmations: entry.confirmations,
            raw,
        })
    }
}

#[async_trait]
impl CurrencyAdapter for UtxoAdapter {
    fn currency(&self) -> &str {
        &self.currency
    }

    fn min_confirmations(&self) -> Option<u64> {
        self.min_confirmations
    }

    fn is_ready(&self) -> bool {
        self.wallet_is_loaded.load(Ordering::Acquire)
    }

    async fn check_ready(&self) -> Result<bool, GatewayError> {
        match self.call("getbalance", json!([])).await {
            Ok(_) => {
                self.wallet_is_loaded.store(true, Ordering::Release);
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
        let result = self.call("getnewaddress", json!([])).await?;
        let address = result
            .as_str()
            .ok_or_else(|| self.unavailable("getnewaddress returned no address".to_string()))?;
        Ok(ReceiveTarget::Address(address.to_string()))
    }

    async fn validate_address(&self, address: &str) -> Result<bool, GatewayError> {
        self.ensure_ready()?;
        let result = self.call("validateaddress", json!([address])).await?;
        Ok(result["isvalid"].as_bool().unwrap_or(false))
    }

    async fn list_incoming(
        &self,
        target: &ReceiveTarget,
    ) -> Result<Vec<TxObservation>, GatewayError> {
        self.ensure_ready()?;
        let min_conf = self.min_confirmations.unwrap_or(1);
        let result = self
            .call(
                "listreceivedbyaddress",
                json!([min_conf, false, false, target.address()]),
            )
            .await?;

        let entries = result.as_array().cloned().unwrap_or_default();
        let mut observations = Vec::with_capacity(entries.len());
        for raw in entries {
            match serde_json::from_value::<ReceivedEntry>(raw.clone()) {
                Ok(entry) => {
                    if let Some(obs) = self.entry_to_observation(entry, raw) {
                        observations.push(obs);
                    } else {
                        tracing::debug!("{} entry without amount skipped", self.currency);
                    }
                }
                Err(e) => tracing::warn!("{} unparseable tx entry: {}", self.currency, e),
            }
        }
        Ok(observations)
    }

    async fn send(&self, destination: &str, amount: Decimal) -> Result<String, GatewayError> {
        self.ensure_ready()?;
        let coins = amount.to_f64().ok_or_else(|| GatewayError::TransferFailed {
            currency: self.currency.clone(),
            reason: format!("amount {} not representable", amount),
        })?;
        // subtractfeefromamount=true: fee comes out of the sent total
        let result = self
            .call_rpc("sendtoaddress", json!([destination, coins, "", "", true]))
            .await
            .map_err(|e| match e {
                RpcFailure::Transport(reason) => self.unavailable(reason),
                RpcFailure::Rejected(reason) => GatewayError::TransferFailed {
                    currency: self.currency.clone(),
                    reason,
                },
            })?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.unavailable("sendtoaddress returned no txid".to_string()))
    }

    async fn get_transaction(&self, txid: &str) -> Result<TxDetail, GatewayError> {
        self.ensure_ready()?;
        let result = self.call("gettransaction", json!([txid])).await?;
        // Wallet reports the fee as a negative delta
        let fee = result["fee"]
            .as_f64()
            .and_then(Decimal::from_f64)
            .map(|f| quantize(f.abs()))
            .unwrap_or(Decimal::ZERO);
        Ok(TxDetail { fee, raw: result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonKind;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    fn test_config(url: &str) -> CurrencyConfig {
        CurrencyConfig {
            name: "bitcoin".to_string(),
            kind: DaemonKind::Utxo,
            daemon_url: url.to_string(),
            rpc_user: Some("rpc".to_string()),
            rpc_password: Some("secret".to_string()),
            api_key: None,
            min_confirmations: Some(2),
        }
    }

    fn rpc_result(result: serde_json::Value) -> String {
        json!({"result": result, "error": null, "id": 1}).to_string()
    }

    #[tokio::test]
    async fn operations_fail_fast_until_ready() {
        let adapter = UtxoAdapter::new(&test_config("http://127.0.0.1:1"), reqwest::Client::new());
        let err = adapter
            .list_incoming(&ReceiveTarget::Address("bc1q".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AdapterNotReady(_)));
    }

    #[tokio::test]
    async fn readiness_probe_flips_the_flag() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"getbalance"}"#.into()))
            .with_body(rpc_result(json!(1.23)))
            .create_async()
            .await;

        let adapter = UtxoAdapter::new(&test_config(&server.url()), reqwest::Client::new());
        assert!(!adapter.is_ready());
        assert!(adapter.check_ready().await.unwrap());
        assert!(adapter.is_ready());
    }

    #[tokio::test]
    async fn list_incoming_normalizes_entries() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"getbalance"}"#.into()))
            .with_body(rpc_result(json!(0)))
            .create_async()
            .await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(
                r#"{"method":"listreceivedbyaddress"}"#.into(),
            ))
            .with_body(rpc_result(json!([
                {
                    "address": "bc1qpaid",
                    "amount": 0.5,
                    "confirmations": 3,
                    "txids": ["aa", "bb"]
                },
                {
                    "address": "bc1qpaid",
                    "confirmations": 1
                }
            ])))
            .create_async()
            .await;

        let adapter = UtxoAdapter::new(&test_config(&server.url()), reqwest::Client::new());
        adapter.check_ready().await.unwrap();

        let observations = adapter
            .list_incoming(&ReceiveTarget::Address("bc1qpaid".to_string()))
            .await
            .unwrap();

        // entry without an amount field is dropped at the boundary
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].amount, dec!(0.5));
        assert_eq!(observations[0].tx_ids, vec!["aa", "bb"]);
        assert_eq!(observations[0].confirmations, Some(3));
    }

    #[tokio::test]
    async fn rejected_send_maps_to_transfer_failed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"getbalance"}"#.into()))
            .with_body(rpc_result(json!(0)))
            .create_async()
            .await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"sendtoaddress"}"#.into()))
            .with_body(
                json!({"result": null, "error": {"code": -6, "message": "Insufficient funds"}, "id": 1})
                    .to_string(),
            )
            .create_async()
            .await;

        let adapter = UtxoAdapter::new(&test_config(&server.url()), reqwest::Client::new());
        adapter.check_ready().await.unwrap();

        let err = adapter.send("bc1qdest", dec!(1.0)).await.unwrap_err();
        assert!(matches!(err, GatewayError::TransferFailed { .. }));
    }

    #[tokio::test]
    async fn get_transaction_recovers_absolute_fee() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"getbalance"}"#.into()))
            .with_body(rpc_result(json!(0)))
            .create_async()
            .await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"gettransaction"}"#.into()))
            .with_body(rpc_result(json!({"txid": "aa", "fee": -0.0001})))
            .create_async()
            .await;

        let adapter = UtxoAdapter::new(&test_config(&server.url()), reqwest::Client::new());
        adapter.check_ready().await.unwrap();

        let detail = adapter.get_transaction("aa").await.unwrap();
        assert_eq!(detail.fee, dec!(0.0001));
    }
}
