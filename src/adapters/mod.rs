pub mod baza;
pub mod monero;
pub mod utxo;

pub use baza::BazaAdapter;
pub use monero::MoneroAdapter;
pub use utxo::UtxoAdapter;

use crate::{
    config::{Config, DaemonKind},
    error::GatewayError,
};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Canonical fixed-point precision for all amounts crossing the adapter
/// boundary, regardless of the currency's native atomic scale.
pub const CRYPTO_DECIMALS: u32 = 8;

/// Round to the canonical 8-decimal representation, half-up.
pub fn quantize(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CRYPTO_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a native atomic-unit amount (10^-scale) to canonical decimals.
pub fn from_atomic(amount: u64, scale: u32) -> Decimal {
    quantize(Decimal::from_i128_with_scale(amount as i128, scale))
}

/// Convert a canonical decimal amount back to native atomic units.
pub fn to_atomic(amount: Decimal, scale: u32) -> u64 {
    (amount * Decimal::from(10u64.pow(scale)))
        .trunc()
        .to_u64()
        .unwrap_or(0)
}

/// A freshly allocated receive target. Account-model wallets hand out a
/// sub-account index alongside the address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveTarget {
    Address(String),
    Account { address: String, account_index: u32 },
}

impl ReceiveTarget {
    pub fn address(&self) -> &str {
        match self {
            ReceiveTarget::Address(addr) => addr,
            ReceiveTarget::Account { address, .. } => address,
        }
    }

    pub fn account_index(&self) -> Option<u32> {
        match self {
            ReceiveTarget::Address(_) => None,
            ReceiveTarget::Account { account_index, .. } => Some(*account_index),
        }
    }
}

/// One incoming transaction reported by a daemon, normalized so the
/// reconciler never branches on the currency. Each adapter maps its own
/// wire fields into this shape and converts the amount up front.
#[derive(Debug, Clone)]
pub struct TxObservation {
    pub address: String,
    pub amount: Decimal,
    pub tx_ids: Vec<String>,
    /// None for ledger-API currencies with no confirmation concept
    pub confirmations: Option<u64>,
    pub raw: serde_json::Value,
}

impl TxObservation {
    /// Required-field check: amount, at least one non-empty txid, and a
    /// matched address must all be present.
    pub fn has_required_fields(&self) -> bool {
        !self.address.is_empty()
            && !self.tx_ids.is_empty()
            && self.tx_ids.iter().all(|id| !id.is_empty())
    }
}

/// Transaction detail fetched after a send, used to recover the network
/// fee actually charged. Adapters that cannot report a fee return zero.
#[derive(Debug, Clone)]
pub struct TxDetail {
    pub fee: Decimal,
    pub raw: serde_json::Value,
}

/// Uniform capability interface over one blockchain/wallet backend.
///
/// Every operation except `check_ready` fails fast with `AdapterNotReady`
/// until the readiness probe has succeeded once.
#[async_trait]
pub trait CurrencyAdapter: Send + Sync {
    fn currency(&self) -> &str;

    /// Confirmation threshold an observation must meet to count.
    fn min_confirmations(&self) -> Option<u64>;

    fn is_ready(&self) -> bool;

    /// Idempotent readiness probe; sets the internal readiness flag.
    async fn check_ready(&self) -> Result<bool, GatewayError>;

    /// Allocate a fresh receive target. Never reused across payments.
    async fn new_address(&self) -> Result<ReceiveTarget, GatewayError>;

    async fn validate_address(&self, address: &str) -> Result<bool, GatewayError>;

    async fn list_incoming(
        &self,
        target: &ReceiveTarget,
    ) -> Result<Vec<TxObservation>, GatewayError>;

    /// Transfer `amount` (canonical decimals) to `destination`, returning
    /// the transaction id.
    async fn send(&self, destination: &str, amount: Decimal) -> Result<String, GatewayError>;

    async fn get_transaction(&self, txid: &str) -> Result<TxDetail, GatewayError>;
}

/// All configured adapters, built once at startup and injected into the
/// reconciler and the payout batcher.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn CurrencyAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.adapter_timeout_secs))
            .build()?;

        let mut registry = Self::new();
        for currency in &config.currencies {
            tracing::info!("Creating {} adapter", currency.name);
            let adapter: Arc<dyn CurrencyAdapter> = match currency.kind {
                DaemonKind::Utxo => Arc::new(UtxoAdapter::new(currency, client.clone())),
                DaemonKind::Monero => Arc::new(MoneroAdapter::new(currency, client.clone())),
                DaemonKind::Baza => Arc::new(BazaAdapter::new(currency, client.clone())?),
            };
            match adapter.check_ready().await {
                Ok(true) => tracing::info!("{} wallet is ready", currency.name),
                Ok(false) => tracing::warn!("{} wallet is not ready yet", currency.name),
                Err(e) => tracing::warn!("{} readiness probe failed: {}", currency.name, e),
            }
            registry.insert(adapter);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, adapter: Arc<dyn CurrencyAdapter>) {
        self.adapters.insert(adapter.currency().to_string(), adapter);
    }

    pub fn get(&self, currency: &str) -> Result<Arc<dyn CurrencyAdapter>, GatewayError> {
        self.adapters
            .get(currency)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownCurrency(currency.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn CurrencyAdapter>)> {
        self.adapters.iter()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
