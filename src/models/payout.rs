use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one payout queue: owner and currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueKey {
    pub owner_id: Uuid,
    pub currency_name: String,
}

impl QueueKey {
    pub fn new(owner_id: Uuid, currency_name: &str) -> Self {
        Self {
            owner_id,
            currency_name: currency_name.to_string(),
        }
    }
}

impl std::fmt::Display for QueueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.owner_id, self.currency_name)
    }
}

/// Immutable record of one executed batch transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub currency_name: String,
    /// Net of fee, canonical 8-decimal precision
    pub amount: Decimal,
    pub tx_ids: Vec<String>,
    /// Exact list of payment ids settled by this transfer
    pub payout_processed_for_payments: Vec<String>,
    pub raw_tx_data: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutAddress {
    pub owner_id: Uuid,
    pub currency_name: String,
    pub payout_address: String,
}
