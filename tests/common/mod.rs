#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use paygate::{
    adapters::{AdapterRegistry, CurrencyAdapter, ReceiveTarget, TxDetail, TxObservation},
    error::GatewayError,
    models::{Payment, PaymentStatus, Project},
    services::{PayoutBatcher, Reconciler, WebhookNotifier},
    store::MemoryStore,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Scripted backend: serves canned observations, records every send.
pub struct MockAdapter {
    currency: String,
    min_confirmations: Option<u64>,
    observations: Mutex<Result<Vec<TxObservation>, String>>,
    send_result: Result<String, String>,
    fee: Decimal,
    sent: Mutex<Vec<(String, Decimal)>>,
}

impl MockAdapter {
    pub fn new(currency: &str) -> Self {
        Self {
            currency: currency.to_string(),
            min_confirmations: Some(2),
            observations: Mutex::new(Ok(Vec::new())),
            send_result: Ok("mock-txid".to_string()),
            fee: Decimal::ZERO,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_observations(self, observations: Vec<TxObservation>) -> Self {
        *self.observations.lock().unwrap() = Ok(observations);
        self
    }

    pub fn with_listing_failure(self, reason: &str) -> Self {
        *self.observations.lock().unwrap() = Err(reason.to_string());
        self
    }

    pub fn with_send_failure(mut self, reason: &str) -> Self {
        self.send_result = Err(reason.to_string());
        self
    }

    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee = fee;
        self
    }

    /// Every (destination, amount) pair passed to `send`, in order.
    pub fn sent(&self) -> Vec<(String, Decimal)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl CurrencyAdapter for MockAdapter {
    fn currency(&self) -> &str {
        &self.currency
    }

    fn min_confirmations(&self) -> Option<u64> {
        self.min_confirmations
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn check_ready(&self) -> Result<bool, GatewayError> {
        Ok(true)
    }

    async fn new_address(&self) -> Result<ReceiveTarget, GatewayError> {
        Ok(ReceiveTarget::Address("mock-address".to_string()))
    }

    async fn validate_address(&self, _address: &str) -> Result<bool, GatewayError> {
        Ok(true)
    }

    async fn list_incoming(
        &self,
        _target: &ReceiveTarget,
    ) -> Result<Vec<TxObservation>, GatewayError> {
        match &*self.observations.lock().unwrap() {
            Ok(observations) => Ok(observations.clone()),
            Err(reason) => Err(GatewayError::AdapterUnavailable {
                currency: self.currency.clone(),
                reason: reason.clone(),
            }),
        }
    }

    async fn send(&self, destination: &str, amount: Decimal) -> Result<String, GatewayError> {
        match &self.send_result {
            Ok(txid) => {
                self.sent
                    .lock()
                    .unwrap()
                    .push((destination.to_string(), amount));
                Ok(txid.clone())
            }
            Err(reason) => Err(GatewayError::TransferFailed {
                currency: self.currency.clone(),
                reason: reason.clone(),
            }),
        }
    }

    async fn get_transaction(&self, txid: &str) -> Result<TxDetail, GatewayError> {
        Ok(TxDetail {
            fee: self.fee,
            raw: json!({ "txid": txid, "fee": self.fee.to_string() }),
        })
    }
}

/// The reconciliation/payout service graph over an in-memory store and a
/// single mock adapter.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub adapter: Arc<MockAdapter>,
    pub batcher: Arc<PayoutBatcher>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new(adapter: MockAdapter) -> Self {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(adapter);

        let mut registry = AdapterRegistry::new();
        registry.insert(adapter.clone());
        let adapters = Arc::new(registry);

        let batcher = Arc::new(PayoutBatcher::new(store.clone(), adapters.clone()));
        let notifier = Arc::new(WebhookNotifier::new(reqwest::Client::new()));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            adapters,
            notifier,
            batcher.clone(),
        ));

        Self {
            store,
            adapter,
            batcher,
            reconciler,
        }
    }
}

pub fn project(webhook_url: Option<String>) -> Project {
    Project {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        enabled_currency: vec!["bitcoin".to_string()],
        webhook_url,
        payment_signature_secret: "test-secret".to_string(),
    }
}

pub fn pending_payment(project: &Project, currency: &str, requested: Decimal) -> Payment {
    Payment {
        payment_id: format!("pay-{}", Uuid::new_v4().simple()),
        related_project_id: project.id,
        form_id: "form-1".to_string(),
        currency_name: currency.to_string(),
        wallet_address: "pay-addr".to_string(),
        account_index: None,
        amount_requested: requested,
        amount_received: Decimal::ZERO,
        tx_ids: Vec::new(),
        raw_tx_data: None,
        status: PaymentStatus::Pending,
        created_at: Utc::now(),
    }
}

/// A payment that already reached its requested amount.
pub fn settled_payment(payment_id: &str, amount_received: Decimal) -> Payment {
    Payment {
        payment_id: payment_id.to_string(),
        related_project_id: Uuid::new_v4(),
        form_id: "form-1".to_string(),
        currency_name: "bitcoin".to_string(),
        wallet_address: "pay-addr".to_string(),
        account_index: None,
        amount_requested: amount_received,
        amount_received,
        tx_ids: vec![format!("tx-{}", payment_id)],
        raw_tx_data: None,
        status: PaymentStatus::Fulfilled,
        created_at: Utc::now(),
    }
}

pub fn observation(address: &str, amount: Decimal, tx_id: &str) -> TxObservation {
    TxObservation {
        address: address.to_string(),
        amount,
        tx_ids: vec![tx_id.to_string()],
        confirmations: Some(6),
        raw: json!({ "txid": tx_id }),
    }
}
